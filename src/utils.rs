use crate::cookies::CredentialSources;
use std::path::PathBuf;
use std::time::Duration;

/// Browser-like client identifier sent with every attachment request.
pub const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Configuration required to run the export process.
/// This decouples the logic from how the arguments were parsed (CLI/Config file).
#[derive(Clone, Debug)]
pub struct ExportConfig {
    pub input: PathBuf,
    pub output_root: PathBuf,
    pub sources: CredentialSources,
    pub jobs: usize,
    pub timeout: Duration,
    pub archive: bool,
}

/// Counters accumulated while fetching attachments.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FetchSummary {
    pub downloaded: usize,
    pub failed: usize,
    pub skipped_cards: usize,
    pub bytes: u64,
}

impl FetchSummary {
    pub fn record(&mut self, outcome: Option<u64>) {
        match outcome {
            Some(bytes) => {
                self.downloaded += 1;
                self.bytes += bytes;
            }
            None => self.failed += 1,
        }
    }
}

/// Turn a user-entered title into a path component.
///
/// Keeps alphanumerics, spaces, `.`, `-` and `_`, drops everything else, trims the
/// ends and turns the remaining spaces into hyphens. `"Task #1"` becomes `"Task-1"`.
pub fn sanitize(value: &str) -> String {
    let kept: String = value
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '.' | '-' | '_'))
        .collect();
    kept.trim().replace(' ', "-")
}

/// Human readable size in KiB, as shown next to each downloaded file.
pub fn kib(bytes: u64) -> String {
    format!("{:.1} KB", bytes as f64 / 1024.0)
}
