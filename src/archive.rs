//! Packing the finished board directory into `<board>.zip`.

use eyre::{Context, Result, eyre};
use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use tracing::info;
use walkdir::WalkDir;
use zip::{CompressionMethod, write::FileOptions};

/// What happened after the archive was written.
#[derive(Debug)]
pub enum ArchiveOutcome {
    /// Archive written and the source directory removed.
    Archived { path: PathBuf, size: u64 },
    /// Archive written, but the source directory could not be removed completely.
    CleanupFailed {
        path: PathBuf,
        size: u64,
        error: io::Error,
    },
}

impl ArchiveOutcome {
    pub fn path(&self) -> &Path {
        match self {
            ArchiveOutcome::Archived { path, .. } | ArchiveOutcome::CleanupFailed { path, .. } => {
                path
            }
        }
    }
}

/// Zip `dir` into a sibling `<dirname>.zip`, then delete `dir`.
///
/// Entries are stored relative to the parent of `dir`, so the archive unpacks to
/// a single `<dirname>/` folder. An existing archive of the same name is replaced.
/// On error no directory is touched and no partial archive is left behind.
pub fn archive_directory(dir: &Path) -> Result<ArchiveOutcome> {
    archive_directory_with(dir, |p| fs::remove_dir_all(p))
}

/// [`archive_directory`] with the final removal step supplied by the caller.
pub(crate) fn archive_directory_with(
    dir: &Path,
    remove: impl FnOnce(&Path) -> io::Result<()>,
) -> Result<ArchiveOutcome> {
    if !dir.is_dir() {
        return Err(eyre!("Directory not found: {}", dir.display()));
    }
    let name = dir
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| eyre!("Cannot derive an archive name from {}", dir.display()))?;
    let parent = dir.parent().unwrap_or_else(|| Path::new(""));
    let zip_path = parent.join(format!("{name}.zip"));

    info!(archive = %zip_path.display(), "Creating ZIP archive");
    if let Err(e) = write_zip(dir, parent, &zip_path) {
        let _ = fs::remove_file(&zip_path);
        return Err(e);
    }
    let size = fs::metadata(&zip_path)
        .map(|m| m.len())
        .wrap_err_with(|| format!("Archive missing after write: {}", zip_path.display()))?;

    match remove(dir) {
        Ok(()) => Ok(ArchiveOutcome::Archived {
            path: zip_path,
            size,
        }),
        Err(error) => Ok(ArchiveOutcome::CleanupFailed {
            path: zip_path,
            size,
            error,
        }),
    }
}

fn write_zip(dir: &Path, base: &Path, zip_path: &Path) -> Result<()> {
    let file = File::create(zip_path)
        .wrap_err_with(|| format!("Failed to create archive {}", zip_path.display()))?;
    let mut zip = zip::ZipWriter::new(BufWriter::new(file));
    let options: FileOptions<'_, ()> =
        FileOptions::default().compression_method(CompressionMethod::Deflated);

    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.wrap_err("Failed to walk the board directory")?;
        let relative = entry
            .path()
            .strip_prefix(base)
            .wrap_err("Entry outside of the archive root")?;
        // Zip entry names always use forward slashes.
        let entry_name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if entry.file_type().is_dir() {
            zip.add_directory(format!("{entry_name}/"), options)
                .wrap_err_with(|| format!("Failed to add directory {entry_name}"))?;
            continue;
        }

        let large = entry.metadata().map(|m| m.len() >= u32::MAX as u64).unwrap_or(false);
        zip.start_file(entry_name.clone(), options.large_file(large))
            .wrap_err_with(|| format!("Failed to add file {entry_name} to archive"))?;
        let mut reader = File::open(entry.path())
            .wrap_err_with(|| format!("Failed to read {}", entry.path().display()))?;
        io::copy(&mut reader, &mut zip)
            .wrap_err_with(|| format!("Failed to write {entry_name} into archive"))?;
    }

    zip.finish().wrap_err("Failed to finalize archive")?;
    Ok(())
}
