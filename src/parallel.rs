use crate::fetcher::{DownloadJob, Fetcher, card_jobs};
use crate::importer::Board;
use crate::planner::BoardLayout;
use crate::utils::FetchSummary;
use crossbeam_channel::bounded;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tracing::{debug, warn};

/// Download attachments on `workers` threads.
///
/// Jobs are planned in document order first, so skip warnings come out in the
/// same order as in the sequential run. Each job is independent; a failed download
/// only bumps the failure counter.
pub fn execute(board: &Board, layout: &BoardLayout, fetcher: &Fetcher, workers: usize) -> FetchSummary {
    let (jobs, skipped_cards) = plan_jobs(board, layout);
    debug!(jobs = jobs.len(), workers, "Starting download workers");

    let (tx, rx) = bounded::<DownloadJob>(workers * 2);
    let downloaded = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);
    let bytes = AtomicU64::new(0);

    std::thread::scope(|s| {
        for _ in 0..workers.max(1) {
            let rx = rx.clone();
            let (downloaded, failed, bytes) = (&downloaded, &failed, &bytes);

            s.spawn(move || {
                while let Ok(job) = rx.recv() {
                    match fetcher.run_job(&job) {
                        Some(n) => {
                            downloaded.fetch_add(1, Ordering::Relaxed);
                            bytes.fetch_add(n, Ordering::Relaxed);
                        }
                        None => {
                            failed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            });
        }

        drop(rx);

        for job in jobs {
            if tx.send(job).is_err() {
                break;
            }
        }

        drop(tx);
    });

    FetchSummary {
        downloaded: downloaded.into_inner(),
        failed: failed.into_inner(),
        skipped_cards,
        bytes: bytes.into_inner(),
    }
}

fn plan_jobs(board: &Board, layout: &BoardLayout) -> (Vec<DownloadJob>, usize) {
    let mut jobs = Vec::new();
    let mut skipped = 0usize;
    for card in &board.cards {
        match layout.dir_for(&card.id_list) {
            Some(dir) => jobs.extend(card_jobs(&board.name, card, dir)),
            None => {
                warn!(card = %card.name, list_id = %card.id_list, "Card references an unknown list, skipping");
                skipped += 1;
            }
        }
    }
    (jobs, skipped)
}
