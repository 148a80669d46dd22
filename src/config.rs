//! Settings persisted on disk: `config.toml` and the credentials file.
//!
//! An explicitly named file must exist. Files at the default locations are
//! optional and silently absent.

use crate::cookies::{CredentialSet, load_override_file};
use eyre::{Context, Result, eyre};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Deserialize, Default)]
pub struct FileConfig {
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub credentials: Option<PathBuf>,
    pub domain: Option<String>,
    pub jobs: Option<usize>,
    pub timeout_secs: Option<u64>,
}

/// `$XDG_CONFIG_HOME/trello-export/config.toml` (or the platform equivalent).
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("trello-export/config.toml"))
}

/// Places searched for a credentials file when none is named, in order.
pub fn default_credential_paths() -> Vec<PathBuf> {
    std::iter::once(PathBuf::from("credentials.env"))
        .chain(dirs::config_dir().map(|d| d.join("trello-export/credentials.env")))
        .collect()
}

pub fn load_file_config(
    explicit_path: Option<&Path>,
    default_path: Option<PathBuf>,
) -> Result<FileConfig> {
    let path = if let Some(p) = explicit_path {
        if !p.exists() {
            return Err(eyre!("Config file not found: {}", p.display()));
        }
        Some(p.to_path_buf())
    } else {
        default_path.filter(|p| p.exists())
    };

    match path {
        None => Ok(FileConfig::default()),
        Some(p) => {
            let content = fs::read_to_string(&p)
                .wrap_err_with(|| format!("Failed to read config: {}", p.display()))?;
            toml::from_str(&content)
                .wrap_err_with(|| format!("Failed to parse config: {}", p.display()))
        }
    }
}

/// Build the override table from the named credentials file, or from the first
/// existing file in `search`.
pub fn load_overrides(
    explicit_path: Option<PathBuf>,
    search: &[PathBuf],
) -> Result<CredentialSet> {
    if let Some(p) = explicit_path {
        if !p.exists() {
            return Err(eyre!("Credentials file not found: {}", p.display()));
        }
        debug!(path = %p.display(), "Reading credentials file");
        return load_override_file(&p);
    }

    let Some(p) = search.iter().find(|p| p.exists()) else {
        return Ok(CredentialSet::new());
    };
    debug!(path = %p.display(), "Reading credentials file");
    match load_override_file(p) {
        Ok(cookies) => Ok(cookies),
        Err(e) => {
            warn!("Ignoring credentials file: {:#}", e);
            Ok(CredentialSet::new())
        }
    }
}
