use crate::archive::{ArchiveOutcome, archive_directory};
use crate::cookies::{CredentialSource, resolve_credentials};
use crate::fetcher::Fetcher;
use crate::importer::load_board;
use crate::planner::plan_directories;
use crate::utils::{ExportConfig, FetchSummary};
use crate::{parallel, sequential};
use eyre::{Context, Result};
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};

/// Where the result of a run ended up.
#[derive(Debug)]
pub enum Deliverable {
    Archive(PathBuf),
    /// The archive was written but parts of the folder tree could not be removed.
    ArchiveWithLeftovers { archive: PathBuf, dir: PathBuf },
    Directory(PathBuf),
}

#[derive(Debug)]
pub struct ExportReport {
    pub board: String,
    pub source: CredentialSource,
    pub summary: FetchSummary,
    pub deliverable: Deliverable,
}

/// Run the whole export: credentials, input, directories, downloads, archive.
///
/// Only unusable input, missing credentials and unwritable output directories are
/// errors. Download and archive problems are logged and reflected in the report.
pub fn run(config: &ExportConfig) -> Result<ExportReport> {
    info!("Resolving credentials");
    let credentials = resolve_credentials(&config.sources)?;

    fs::create_dir_all(&config.output_root).wrap_err_with(|| {
        format!(
            "Failed to create output directory: {}",
            config.output_root.display()
        )
    })?;

    info!(path = %config.input.display(), "Loading board export");
    let board = load_board(&config.input)?;
    info!(
        board = %board.name,
        lists = board.lists.len(),
        cards = board.cards.len(),
        "Board loaded"
    );

    let layout = plan_directories(&config.output_root, &board)?;

    info!("Downloading attachments");
    let fetcher = Fetcher::new(&credentials.cookies, config.timeout)?;
    let summary = if config.jobs > 1 {
        parallel::execute(&board, &layout, &fetcher, config.jobs)
    } else {
        sequential::execute(&board, &layout, &fetcher)
    };

    let deliverable = if config.archive {
        deliver(archive_directory(&layout.board_dir), layout.board_dir)
    } else {
        Deliverable::Directory(layout.board_dir)
    };

    Ok(ExportReport {
        board: board.name,
        source: credentials.source,
        summary,
        deliverable,
    })
}

fn deliver(archived: Result<ArchiveOutcome>, board_dir: PathBuf) -> Deliverable {
    let outcome = match archived {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!("Archiving failed, keeping the folder: {:#}", e);
            return Deliverable::Directory(board_dir);
        }
    };
    let archive = outcome.path().to_path_buf();
    match outcome {
        ArchiveOutcome::Archived { size, .. } => {
            info!(
                archive = %archive.display(),
                size = %format!("{:.2} MB", size as f64 / (1024.0 * 1024.0)),
                "Archive created, folder removed"
            );
            Deliverable::Archive(archive)
        }
        ArchiveOutcome::CleanupFailed { error, .. } => {
            warn!(
                archive = %archive.display(),
                dir = %board_dir.display(),
                "Archive created but the folder could not be removed: {}",
                error
            );
            Deliverable::ArchiveWithLeftovers {
                archive,
                dir: board_dir,
            }
        }
    }
}
