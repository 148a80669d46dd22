//! Attachment downloads.
//!
//! Every attachment is a single GET with the session cookies attached. The body is
//! streamed to disk in fixed-size chunks. Failures are returned as values; the
//! callers log them and move on to the next attachment.

use crate::cookies::CredentialSet;
use crate::importer::Card;
use crate::utils::{USER_AGENT, kib, sanitize};
use eyre::{Context, Result};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{COOKIE, HeaderMap, HeaderValue};
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

const CHUNK_SIZE: usize = 8192;

/// Default connect/response timeout of a single download.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("invalid URL {url:?}: {source}")]
    InvalidUrl {
        url: String,
        source: url::ParseError,
    },

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("server answered {0}")]
    Status(StatusCode),

    #[error("connection dropped while reading the body: {0}")]
    Transfer(#[source] io::Error),

    #[error("failed to write {}: {source}", .path.display())]
    Write { path: PathBuf, source: io::Error },
}

/// One attachment, resolved to its destination on disk.
#[derive(Debug, Clone)]
pub struct DownloadJob {
    pub card: String,
    pub url: String,
    pub file_name: String,
    pub dest: PathBuf,
}

/// `sanitize("{board}-{card}-{attachment}")`: unique across the board as long as
/// card names are.
pub fn attachment_file_name(board: &str, card: &str, attachment: &str) -> String {
    sanitize(&format!("{board}-{card}-{attachment}"))
}

/// The downloads of one card, in document order.
pub fn card_jobs(board_name: &str, card: &Card, dir: &Path) -> Vec<DownloadJob> {
    card.attachments
        .iter()
        .map(|attachment| {
            let file_name = attachment_file_name(board_name, &card.name, &attachment.name);
            DownloadJob {
                card: card.name.clone(),
                url: attachment.url.clone(),
                dest: dir.join(&file_name),
                file_name,
            }
        })
        .collect()
}

/// HTTP client carrying the resolved session cookies.
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    pub fn new(cookies: &CredentialSet, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if !cookies.is_empty() {
            let header = cookies
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; ");
            let mut value =
                HeaderValue::from_str(&header).wrap_err("Cookie value is not a valid header")?;
            value.set_sensitive(true);
            headers.insert(COOKIE, value);
        }

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .wrap_err("Failed to build HTTP client")?;
        Ok(Self { client })
    }

    /// Download `url` into `dest`, returning the number of bytes written.
    ///
    /// A partially written file is left in place when the transfer fails.
    pub fn fetch(&self, url: &str, dest: &Path) -> Result<u64, DownloadError> {
        let url = url::Url::parse(url).map_err(|source| DownloadError::InvalidUrl {
            url: url.to_string(),
            source,
        })?;
        let mut response = self.client.get(url).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Status(status));
        }

        let write_err = |source: io::Error| DownloadError::Write {
            path: dest.to_path_buf(),
            source,
        };
        let mut writer = BufWriter::new(File::create(dest).map_err(write_err)?);
        let mut buffer = [0u8; CHUNK_SIZE];
        let mut written = 0u64;
        loop {
            let read = response.read(&mut buffer).map_err(DownloadError::Transfer)?;
            if read == 0 {
                break;
            }
            writer.write_all(&buffer[..read]).map_err(write_err)?;
            written += read as u64;
        }
        writer.flush().map_err(write_err)?;
        Ok(written)
    }

    /// Fetch one job and narrate the outcome. Returns the byte count on success.
    pub fn run_job(&self, job: &DownloadJob) -> Option<u64> {
        match self.fetch(&job.url, &job.dest) {
            Ok(bytes) => {
                info!(card = %job.card, size = %kib(bytes), "Downloaded {}", job.file_name);
                Some(bytes)
            }
            Err(e) => {
                warn!(card = %job.card, url = %job.url, "Download of {} failed: {}", job.file_name, e);
                None
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::importer::Attachment;
    use std::net::TcpListener;
    use std::sync::{Arc, Mutex};
    use std::thread;
    use tempfile::TempDir;

    /// Serve fixed `(path, status, body)` routes; records the `Cookie` header of each request.
    pub(crate) fn serve(
        routes: Vec<(&'static str, u16, Vec<u8>)>,
    ) -> (String, Arc<Mutex<Vec<Option<String>>>>) {
        let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
        let base = format!("http://{}", server.server_addr().to_ip().unwrap());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        thread::spawn(move || {
            for request in server.incoming_requests() {
                let cookie = request
                    .headers()
                    .iter()
                    .find(|h| h.field.equiv("Cookie"))
                    .map(|h| h.value.as_str().to_string());
                log.lock().unwrap().push(cookie);
                let response = match routes.iter().find(|(path, _, _)| *path == request.url()) {
                    Some((_, status, body)) => {
                        tiny_http::Response::from_data(body.clone()).with_status_code(*status)
                    }
                    None => tiny_http::Response::from_data(b"not found".to_vec())
                        .with_status_code(404),
                };
                let _ = request.respond(response);
            }
        });
        (base, seen)
    }

    fn cookies() -> CredentialSet {
        let mut cookies = CredentialSet::new();
        cookies.insert("dsc".into(), "abc".into());
        cookies.insert("idMember".into(), "42".into());
        cookies
    }

    #[test]
    fn file_name_combines_board_card_and_attachment() {
        assert_eq!(
            attachment_file_name("My Board!", "Task #1", "a.png"),
            "My-Board-Task-1-a.png"
        );
    }

    #[test]
    fn card_jobs_keep_document_order() {
        let card = Card {
            name: "Card".into(),
            id_list: "L1".into(),
            attachments: vec![
                Attachment {
                    url: "http://x/2".into(),
                    name: "second.txt".into(),
                },
                Attachment {
                    url: "http://x/1".into(),
                    name: "first.txt".into(),
                },
            ],
        };
        let jobs = card_jobs("B", &card, Path::new("out/B/L"));
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].file_name, "B-Card-second.txt");
        assert_eq!(jobs[0].dest, Path::new("out/B/L/B-Card-second.txt"));
        assert_eq!(jobs[1].url, "http://x/1");
    }

    #[test]
    fn streams_body_to_disk_with_cookies() {
        let body: Vec<u8> = (0..50_000u32).map(|i| (i % 251) as u8).collect();
        let (base, seen) = serve(vec![("/a.png", 200, body.clone())]);
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("a.png");

        let fetcher = Fetcher::new(&cookies(), DEFAULT_TIMEOUT).unwrap();
        let bytes = fetcher.fetch(&format!("{base}/a.png"), &dest).unwrap();

        assert_eq!(bytes, body.len() as u64);
        assert_eq!(std::fs::read(&dest).unwrap(), body);
        assert_eq!(
            seen.lock().unwrap()[0].as_deref(),
            Some("dsc=abc; idMember=42")
        );
    }

    #[test]
    fn non_success_status_is_a_failure() {
        let (base, _) = serve(vec![("/gone", 403, b"denied".to_vec())]);
        let dir = TempDir::new().unwrap();
        let fetcher = Fetcher::new(&cookies(), DEFAULT_TIMEOUT).unwrap();

        let err = fetcher
            .fetch(&format!("{base}/gone"), &dir.path().join("gone"))
            .unwrap_err();
        assert!(matches!(err, DownloadError::Status(s) if s == StatusCode::FORBIDDEN));
    }

    #[test]
    fn refused_connection_is_a_request_failure() {
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let dir = TempDir::new().unwrap();
        let fetcher = Fetcher::new(&cookies(), Duration::from_secs(2)).unwrap();

        let err = fetcher
            .fetch(&format!("http://127.0.0.1:{port}/a"), &dir.path().join("a"))
            .unwrap_err();
        assert!(matches!(err, DownloadError::Request(_)));
    }

    #[test]
    fn unwritable_destination_is_a_write_failure() {
        let (base, _) = serve(vec![("/a", 200, b"data".to_vec())]);
        let dir = TempDir::new().unwrap();
        let fetcher = Fetcher::new(&cookies(), DEFAULT_TIMEOUT).unwrap();

        let err = fetcher
            .fetch(&format!("{base}/a"), &dir.path().join("missing/sub/a"))
            .unwrap_err();
        assert!(matches!(err, DownloadError::Write { .. }));
    }

    #[test]
    fn malformed_url_is_rejected_before_any_request() {
        let dir = TempDir::new().unwrap();
        let fetcher = Fetcher::new(&CredentialSet::new(), DEFAULT_TIMEOUT).unwrap();
        let err = fetcher.fetch("not a url", &dir.path().join("x")).unwrap_err();
        assert!(matches!(err, DownloadError::InvalidUrl { .. }));
    }
}
