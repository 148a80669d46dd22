//! Session cookie resolution.
//!
//! Cookies are taken from exactly one source: the first browser store that yields
//! cookies for the target domain, or otherwise the operator's override table.
//! Sources are never merged.

use eyre::{Context, Result, eyre};
use rusqlite::{Connection, OpenFlags, backup::Backup};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Cookie name → cookie value.
pub type CredentialSet = BTreeMap<String, String>;

/// Domain pattern matched against cookie hosts when nothing else is configured.
pub const DEFAULT_DOMAIN: &str = "trello";

/// Keys accepted in the override file and the cookie each one fills in.
pub const OVERRIDE_KEYS: &[(&str, &str)] = &[
    ("CLOUD_SESSION_TOKEN", "cloud.session.token"),
    ("DSC", "dsc"),
    ("AA_ID", "aaId"),
    ("ID_MEMBER", "idMember"),
    ("ATL_BSC_CONSENT_TOKEN", "atl-bsc-consent-token"),
];

const PLACEHOLDER: &str = "YOUR_TOKEN_HERE";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Browser {
    Chrome,
    Firefox,
}

impl Browser {
    /// Lookup order. The first browser with cookies wins.
    pub const PRIORITY: [Browser; 2] = [Browser::Chrome, Browser::Firefox];

    fn cookie_query(self) -> &'static str {
        match self {
            Browser::Chrome => "SELECT name, value FROM cookies WHERE host_key LIKE ?1",
            Browser::Firefox => "SELECT name, value FROM moz_cookies WHERE host LIKE ?1",
        }
    }
}

impl fmt::Display for Browser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Browser::Chrome => write!(f, "Chrome"),
            Browser::Firefox => write!(f, "Firefox"),
        }
    }
}

/// A browser together with the location of its cookie database, if one was found.
#[derive(Clone, Debug)]
pub struct BrowserStore {
    pub browser: Browser,
    pub path: Option<PathBuf>,
}

impl BrowserStore {
    /// Locate the cookie stores of all supported browsers, in priority order.
    pub fn discover() -> Vec<BrowserStore> {
        Browser::PRIORITY
            .iter()
            .map(|&browser| BrowserStore {
                browser,
                path: match browser {
                    Browser::Chrome => chrome_cookie_file(),
                    Browser::Firefox => firefox_profile_roots()
                        .iter()
                        .find_map(|root| firefox_cookie_file(root)),
                },
            })
            .collect()
    }
}

/// Everything the resolver may draw cookies from.
#[derive(Clone, Debug, Default)]
pub struct CredentialSources {
    pub domain: String,
    pub stores: Vec<BrowserStore>,
    pub overrides: CredentialSet,
}

/// Result of querying a single browser store.
#[derive(Debug)]
pub enum StoreLookup {
    Found(CredentialSet),
    Empty,
    Missing,
    Failed(eyre::Report),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CredentialSource {
    Browser(Browser),
    Overrides,
}

#[derive(Clone, Debug)]
pub struct ResolvedCredentials {
    pub source: CredentialSource,
    pub cookies: CredentialSet,
}

/// Pick the cookie set for the target service, or fail when no source has any.
pub fn resolve_credentials(sources: &CredentialSources) -> Result<ResolvedCredentials> {
    for store in &sources.stores {
        info!(browser = %store.browser, "Reading browser cookies");
        match lookup_store(store, &sources.domain) {
            StoreLookup::Found(cookies) => {
                info!(browser = %store.browser, count = cookies.len(), "Found session cookies");
                return Ok(ResolvedCredentials {
                    source: CredentialSource::Browser(store.browser),
                    cookies,
                });
            }
            StoreLookup::Empty => {
                info!(browser = %store.browser, domain = %sources.domain, "No matching cookies")
            }
            StoreLookup::Missing => debug!(browser = %store.browser, "Cookie store not found"),
            StoreLookup::Failed(e) => {
                warn!(browser = %store.browser, "Could not read cookie store: {:#}", e)
            }
        }
    }

    if !sources.overrides.is_empty() {
        info!(count = sources.overrides.len(), "Using cookies from the credentials file");
        return Ok(ResolvedCredentials {
            source: CredentialSource::Overrides,
            cookies: sources.overrides.clone(),
        });
    }

    let keys: Vec<&str> = OVERRIDE_KEYS.iter().map(|(key, _)| *key).collect();
    Err(eyre!(
        "No cookies found for '{}'.\n\
         Log in to Trello with Chrome or Firefox and rerun (close the browser if its cookie store is locked),\n\
         or put your session cookies into a credentials file (--credentials) using the keys: {}",
        sources.domain,
        keys.join(", ")
    ))
}

/// Query one browser store for cookies whose host contains `domain`.
pub fn lookup_store(store: &BrowserStore, domain: &str) -> StoreLookup {
    let Some(path) = store.path.as_deref().filter(|p| p.exists()) else {
        return StoreLookup::Missing;
    };
    match read_cookie_store(store.browser, path, domain) {
        Ok(cookies) if cookies.is_empty() => StoreLookup::Empty,
        Ok(cookies) => StoreLookup::Found(cookies),
        Err(e) => StoreLookup::Failed(e),
    }
}

fn read_cookie_store(browser: Browser, path: &Path, domain: &str) -> Result<CredentialSet> {
    let snapshot = snapshot_store(path)?;
    let conn = Connection::open_with_flags(snapshot.path(), OpenFlags::SQLITE_OPEN_READ_ONLY)
        .wrap_err("Failed to open cookie snapshot")?;
    let mut stmt = conn
        .prepare(browser.cookie_query())
        .wrap_err("Unexpected cookie store schema")?;
    let rows = stmt
        .query_map([format!("%{domain}%")], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<String>>(1)?,
            ))
        })
        .wrap_err("Failed to query cookies")?;

    let mut cookies = CredentialSet::new();
    for row in rows {
        let (name, value) = row.wrap_err("Failed to read cookie row")?;
        // Chrome keeps most values only in `encrypted_value`; those rows are unusable here.
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            cookies.insert(name, value);
        }
    }
    Ok(cookies)
}

/// Copy a (possibly locked) cookie database into a temporary file.
fn snapshot_store(path: &Path) -> Result<NamedTempFile> {
    let src = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .wrap_err_with(|| format!("Failed to open cookie store: {}", path.display()))?;

    let tmp = NamedTempFile::new().wrap_err("Failed to create temporary file")?;
    let mut dst =
        Connection::open(tmp.path()).wrap_err("Failed to open snapshot database connection")?;

    {
        let backup = Backup::new(&src, &mut dst).wrap_err("Failed to initialize backup")?;
        backup
            .run_to_completion(1000, Duration::from_millis(5), None)
            .wrap_err("Cookie store is locked or unreadable")?;
    }

    Ok(tmp)
}

/// Read the operator's credentials file into an override table.
///
/// Only keys from [`OVERRIDE_KEYS`] are used. Unknown keys, lines that do not
/// parse, empty values and the `YOUR_TOKEN_HERE` placeholder are skipped. Only
/// failing to open the file is an error.
pub fn load_override_file(path: &Path) -> Result<CredentialSet> {
    let entries = dotenvy::from_path_iter(path)
        .wrap_err_with(|| format!("Failed to read credentials file: {}", path.display()))?;

    let mut cookies = CredentialSet::new();
    for entry in entries {
        let (key, value) = match entry {
            Ok(pair) => pair,
            Err(dotenvy::Error::LineParse(line, _)) => {
                let key = line.split('=').next().unwrap_or_default().trim();
                warn!(key = %key, "Skipping unparsable line in credentials file");
                continue;
            }
            Err(e) => {
                warn!(path = %path.display(), "Stopped reading credentials file: {}", e);
                break;
            }
        };
        let Some(cookie) = override_cookie_name(&key) else {
            debug!(key = %key, "Ignoring unrecognized credentials key");
            continue;
        };
        if value.is_empty() || value == PLACEHOLDER {
            continue;
        }
        cookies.insert(cookie.to_string(), value);
    }
    Ok(cookies)
}

fn override_cookie_name(key: &str) -> Option<&'static str> {
    OVERRIDE_KEYS
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, cookie)| *cookie)
}

// ── Store discovery ───────────────────────────────────────────────────────────

fn chrome_user_data_dir() -> Option<PathBuf> {
    if cfg!(target_os = "windows") {
        dirs::data_local_dir().map(|d| d.join("Google/Chrome/User Data"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir().map(|d| d.join("Google/Chrome"))
    } else {
        dirs::config_dir().map(|d| d.join("google-chrome"))
    }
}

fn chrome_cookie_file() -> Option<PathBuf> {
    let profile = chrome_user_data_dir()?.join("Default");
    ["Cookies", "Network/Cookies"]
        .iter()
        .map(|rel| profile.join(rel))
        .find(|p| p.exists())
}

fn firefox_profile_roots() -> Vec<PathBuf> {
    let root = if cfg!(target_os = "windows") {
        dirs::data_dir().map(|d| d.join("Mozilla/Firefox"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir().map(|d| d.join("Firefox"))
    } else {
        dirs::home_dir().map(|d| d.join(".mozilla/firefox"))
    };
    root.map(|r| vec![r.clone(), r.join("Profiles")])
        .unwrap_or_default()
}

/// Find `cookies.sqlite` of the default profile below a Firefox profile root.
/// `*.default-release` profiles are preferred over `*.default`.
pub fn firefox_cookie_file(root: &Path) -> Option<PathBuf> {
    let mut profiles: Vec<PathBuf> = fs::read_dir(root)
        .ok()?
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    profiles.sort();

    [".default-release", ".default"].iter().find_map(|suffix| {
        profiles
            .iter()
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with(suffix))
            })
            .map(|p| p.join("cookies.sqlite"))
            .find(|p| p.exists())
    })
}
