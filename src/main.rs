use clap::Parser;
use eyre::Result;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use trello_export::config::{
    default_config_path, default_credential_paths, load_file_config, load_overrides,
};
use trello_export::cookies::{BrowserStore, CredentialSource, CredentialSources, DEFAULT_DOMAIN};
use trello_export::export::{self, Deliverable, ExportReport};
use trello_export::fetcher::DEFAULT_TIMEOUT;
use trello_export::utils::{ExportConfig, kib};

/// Download all attachments of a Trello board export and pack them into a ZIP.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Trello board export (JSON).
    /// Defaults to ./import_export.json if not set in config.
    #[arg(value_name = "INPUT")]
    input: Option<PathBuf>,

    /// Directory that receives the board folder and archive.
    /// Defaults to ./Output if not set in config.
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Path to a specific configuration file.
    /// Defaults to $XDG_CONFIG_HOME/trello-export/config.toml
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// KEY=VALUE file with session cookies, used when no browser has any.
    #[arg(long, value_name = "PATH")]
    credentials: Option<PathBuf>,

    /// Cookie host pattern (matched as a substring).
    #[arg(long, value_name = "PATTERN")]
    domain: Option<String>,

    /// Do not look at browser cookie stores.
    #[arg(long)]
    no_browser: bool,

    /// Number of concurrent downloads.
    #[arg(short, long, value_name = "N")]
    jobs: Option<usize>,

    /// Connect/response timeout per download, in seconds.
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Keep the folder tree instead of packing it into a ZIP.
    #[arg(long)]
    no_archive: bool,

    /// Log every decision, not just the phases.
    #[arg(short, long)]
    verbose: bool,

    /// Only print warnings and the final summary.
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

fn init_logging(verbose: bool, quiet: bool) {
    let level = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("trello_export={level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

fn print_summary(report: &ExportReport) {
    let s = &report.summary;
    println!(
        "Done. {} file(s) downloaded ({}) from board '{}'.",
        s.downloaded,
        kib(s.bytes),
        report.board
    );
    if s.failed > 0 || s.skipped_cards > 0 {
        println!(
            "{} download(s) failed, {} card(s) skipped.",
            s.failed, s.skipped_cards
        );
    }
    if report.source == CredentialSource::Overrides {
        println!("Authenticated with cookies from the credentials file.");
    }

    let absolute = |p: &Path| std::path::absolute(p).unwrap_or_else(|_| p.to_path_buf());
    match &report.deliverable {
        Deliverable::Archive(zip) => println!("Archive: {}", absolute(zip).display()),
        Deliverable::ArchiveWithLeftovers { archive, dir } => {
            println!("Archive: {}", absolute(archive).display());
            println!("Leftover folder: {}", absolute(dir).display());
        }
        Deliverable::Directory(dir) => println!("Location: {}", absolute(dir).display()),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    // 1. Load config file (CLI path > default path)
    let file_cfg = load_file_config(cli.config.as_deref(), default_config_path())?;

    // 2. Resolve paths (CLI > Config > Default)
    let input = cli
        .input
        .or(file_cfg.input)
        .unwrap_or_else(|| PathBuf::from("import_export.json"));
    let output_root = cli
        .output
        .or(file_cfg.output)
        .unwrap_or_else(|| PathBuf::from("Output"));

    // 3. Credential sources: browsers in priority order, then the override table
    let overrides = load_overrides(
        cli.credentials.or(file_cfg.credentials),
        &default_credential_paths(),
    )?;
    let stores = if cli.no_browser {
        Vec::new()
    } else {
        BrowserStore::discover()
    };
    let sources = CredentialSources {
        domain: cli
            .domain
            .or(file_cfg.domain)
            .unwrap_or_else(|| DEFAULT_DOMAIN.to_string()),
        stores,
        overrides,
    };

    // 4. Build the Export Config
    let config = ExportConfig {
        input,
        output_root,
        sources,
        jobs: cli.jobs.or(file_cfg.jobs).unwrap_or(1).max(1),
        timeout: cli
            .timeout
            .or(file_cfg.timeout_secs)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TIMEOUT),
        archive: !cli.no_archive,
    };

    // 5. Run the Business Logic
    let report = export::run(&config)?;
    print_summary(&report);
    Ok(())
}
