use std::fs::{self, File};
use std::io::Read;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tempfile::TempDir;
use trello_export::cookies::{CredentialSet, CredentialSource, CredentialSources};
use trello_export::export::{self, Deliverable};
use trello_export::utils::ExportConfig;

type SeenCookies = Arc<Mutex<Vec<Option<String>>>>;

fn serve(routes: Vec<(&'static str, Vec<u8>)>) -> (String, SeenCookies) {
    let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
    let base = format!("http://{}", server.server_addr().to_ip().unwrap());
    let seen: SeenCookies = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);
    thread::spawn(move || {
        for request in server.incoming_requests() {
            let cookie = request
                .headers()
                .iter()
                .find(|h| h.field.equiv("Cookie"))
                .map(|h| h.value.as_str().to_string());
            log.lock().unwrap().push(cookie);
            let response = match routes.iter().find(|(path, _)| *path == request.url()) {
                Some((_, body)) => tiny_http::Response::from_data(body.clone()),
                None => tiny_http::Response::from_data(b"not found".to_vec()).with_status_code(404),
            };
            let _ = request.respond(response);
        }
    });
    (base, seen)
}

fn write_export(dir: &Path, base: &str) -> std::path::PathBuf {
    let path = dir.join("import_export.json");
    let json = serde_json::json!({
        "name": "My Board!",
        "lists": [{"id": "L1", "name": "To Do"}, {"id": "L2", "name": "Done"}],
        "cards": [
            {"name": "Task #1", "idList": "L1",
             "attachments": [{"url": format!("{base}/a.png"), "name": "a.png"}]},
            {"name": "Lost", "idList": "L999",
             "attachments": [{"url": format!("{base}/a.png"), "name": "lost.png"}]},
            {"name": "Broken link", "idList": "L2",
             "attachments": [{"url": format!("{base}/expired"), "name": "old.pdf"}]},
            {"name": "Plain", "idList": "L2"}
        ]
    });
    fs::write(&path, serde_json::to_vec_pretty(&json).unwrap()).unwrap();
    path
}

fn config(work: &Path, input: std::path::PathBuf, jobs: usize, archive: bool) -> ExportConfig {
    let mut overrides = CredentialSet::new();
    overrides.insert("cloud.session.token".into(), "secret".into());
    ExportConfig {
        input,
        output_root: work.join("Output"),
        sources: CredentialSources {
            domain: "trello".into(),
            stores: Vec::new(),
            overrides,
        },
        jobs,
        timeout: Duration::from_secs(5),
        archive,
    }
}

#[test]
fn exports_board_into_archive() {
    let (base, seen) = serve(vec![("/a.png", b"PNGDATA".to_vec())]);
    let work = TempDir::new().unwrap();
    let input = write_export(work.path(), &base);

    let report = export::run(&config(work.path(), input, 1, true)).unwrap();

    assert_eq!(report.source, CredentialSource::Overrides);
    assert_eq!(report.summary.downloaded, 1);
    assert_eq!(report.summary.failed, 1);
    assert_eq!(report.summary.skipped_cards, 1);

    let zip_path = work.path().join("Output/My-Board.zip");
    match &report.deliverable {
        Deliverable::Archive(path) => assert_eq!(path, &zip_path),
        other => panic!("unexpected deliverable: {other:?}"),
    }
    assert!(!work.path().join("Output/My-Board").exists());

    let mut archive = zip::ZipArchive::new(File::open(&zip_path).unwrap()).unwrap();
    let mut content = Vec::new();
    archive
        .by_name("My-Board/To-Do/My-Board-Task-1-a.png")
        .unwrap()
        .read_to_end(&mut content)
        .unwrap();
    assert_eq!(content, b"PNGDATA");
    assert!(archive.by_name("My-Board/Done/").is_ok());

    // Two requests (Task #1 and the expired link); the card on the unknown list never fetched.
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert!(seen.iter().all(|c| c.as_deref() == Some("cloud.session.token=secret")));
}

#[test]
fn parallel_run_without_archive_keeps_the_tree() {
    let (base, _) = serve(vec![("/a.png", b"PNGDATA".to_vec())]);
    let work = TempDir::new().unwrap();
    let input = write_export(work.path(), &base);

    let report = export::run(&config(work.path(), input, 4, false)).unwrap();

    assert_eq!(report.summary.downloaded, 1);
    assert_eq!(report.summary.skipped_cards, 1);
    let board_dir = work.path().join("Output/My-Board");
    match &report.deliverable {
        Deliverable::Directory(dir) => assert_eq!(dir, &board_dir),
        other => panic!("unexpected deliverable: {other:?}"),
    }
    assert_eq!(
        fs::read(board_dir.join("To-Do/My-Board-Task-1-a.png")).unwrap(),
        b"PNGDATA"
    );
    assert!(!work.path().join("Output/My-Board.zip").exists());
}

#[test]
fn missing_credentials_abort_before_touching_the_output() {
    let work = TempDir::new().unwrap();
    let input = write_export(work.path(), "http://127.0.0.1:9");
    let mut cfg = config(work.path(), input, 1, true);
    cfg.sources.overrides.clear();

    let err = export::run(&cfg).unwrap_err();
    assert!(err.to_string().contains("No cookies found"));
    assert!(!work.path().join("Output").exists());
}

#[test]
fn invalid_export_is_fatal() {
    let work = TempDir::new().unwrap();
    let input = work.path().join("import_export.json");
    fs::write(&input, "not json").unwrap();

    let err = export::run(&config(work.path(), input, 1, true)).unwrap_err();
    assert!(format!("{err:#}").contains("Invalid JSON"));

    let missing = work.path().join("absent.json");
    let err = export::run(&config(work.path(), missing, 1, true)).unwrap_err();
    assert!(err.to_string().contains("Export file not found"));
}
