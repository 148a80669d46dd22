//! Types for the subset of a Trello board export that is consumed here.
//!
//! A board export (`Menu → Print, export and share → Export as JSON`) carries far
//! more than this: actions, labels, checklists, members. Everything not listed
//! below is ignored during deserialization.

use eyre::{Context, Result, eyre};
use serde::Deserialize;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct Board {
    pub name: String,
    pub lists: Vec<List>,
    pub cards: Vec<Card>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct List {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Card {
    pub name: String,
    #[serde(rename = "idList")]
    pub id_list: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Attachment {
    pub url: String,
    pub name: String,
}

/// Read and parse a board export. Missing files and malformed JSON are both errors.
pub fn load_board(path: &Path) -> Result<Board> {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(eyre!("Export file not found: {}", path.display()));
        }
        Err(e) => {
            return Err(e).wrap_err_with(|| format!("Failed to read export: {}", path.display()));
        }
    };
    serde_json::from_str(&content)
        .wrap_err_with(|| format!("Invalid JSON in export file: {}", path.display()))
}
