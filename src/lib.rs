//! # trello-export
//!
//! A CLI tool that turns a [Trello](https://trello.com) board export into a folder of
//! the board's attachments, then packs it into a single ZIP archive.
//!
//! ## What it does
//!
//! A Trello JSON export only references attachments by URL, and those URLs need a
//! logged-in session. This tool reuses the session cookies of a browser you are
//! already logged in with (Chrome first, then Firefox), or cookies you paste into a
//! credentials file, and downloads every attachment:
//!
//! ```text
//! Output/<board>/<list>/<board>-<card>-<attachment>
//! ```
//!
//! The folder is then zipped to `Output/<board>.zip` and removed.
//!
//! Browser cookie databases are opened **read-only** and copied before querying.
//!
//! ## Usage
//!
//! ```sh
//! # Export import_export.json from the current directory into ./Output
//! trello-export
//!
//! # Explicit paths, four parallel downloads, keep the folder
//! trello-export board.json --output ~/backups/trello --jobs 4 --no-archive
//!
//! # No browser available: use cookies from a file
//! trello-export board.json --no-browser --credentials ./credentials.env
//! ```
//!
//! Preferences can be persisted in `~/.config/trello-export/config.toml`.
//!
//! ## Failure handling
//!
//! A missing or malformed export and the absence of any cookies abort the run.
//! Everything else is logged and skipped: cards pointing at unknown lists, failed
//! downloads, and a failed archive (the folder is kept instead).
pub mod archive;
pub mod config;
pub mod cookies;
pub mod export;
pub mod fetcher;
pub mod importer;
mod parallel;
pub mod planner;
mod sequential;
pub mod utils;
