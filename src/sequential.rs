use crate::fetcher::{Fetcher, card_jobs};
use crate::importer::Board;
use crate::planner::BoardLayout;
use crate::utils::FetchSummary;
use tracing::{info, warn};

/// Download every attachment one after another, in document order.
pub fn execute(board: &Board, layout: &BoardLayout, fetcher: &Fetcher) -> FetchSummary {
    let mut summary = FetchSummary::default();

    for card in &board.cards {
        let Some(dir) = layout.dir_for(&card.id_list) else {
            warn!(card = %card.name, list_id = %card.id_list, "Card references an unknown list, skipping");
            summary.skipped_cards += 1;
            continue;
        };
        if card.attachments.is_empty() {
            continue;
        }

        info!(card = %card.name, attachments = card.attachments.len(), "Processing card");
        for job in card_jobs(&board.name, card, dir) {
            summary.record(fetcher.run_job(&job));
        }
    }

    summary
}
