use crate::importer::Board;
use crate::utils::sanitize;
use eyre::{Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Directories realized for one board.
#[derive(Debug, Clone)]
pub struct BoardLayout {
    pub board_dir: PathBuf,
    pub list_dirs: HashMap<String, PathBuf>,
}

impl BoardLayout {
    pub fn dir_for(&self, list_id: &str) -> Option<&Path> {
        self.list_dirs.get(list_id).map(PathBuf::as_path)
    }
}

/// Create `<output_root>/<board>/<list>/` for every list, reusing existing directories.
pub fn plan_directories(output_root: &Path, board: &Board) -> Result<BoardLayout> {
    let board_dir = output_root.join(component_name(&board.name, || "board".to_string()));
    fs::create_dir_all(&board_dir)
        .wrap_err_with(|| format!("Failed to create board directory: {}", board_dir.display()))?;
    info!(path = %board_dir.display(), "Board directory ready");

    let mut list_dirs = HashMap::with_capacity(board.lists.len());
    for list in &board.lists {
        let dir = board_dir.join(component_name(&list.name, || {
            format!("list-{}", sanitize(&list.id))
        }));
        fs::create_dir_all(&dir)
            .wrap_err_with(|| format!("Failed to create list directory: {}", dir.display()))?;
        info!(path = %dir.display(), "List directory ready");
        list_dirs.insert(list.id.clone(), dir);
    }

    Ok(BoardLayout {
        board_dir,
        list_dirs,
    })
}

// A sanitized name can still be empty or `..`; neither may become a path component.
fn component_name(raw: &str, fallback: impl FnOnce() -> String) -> String {
    let name = sanitize(raw);
    if name.chars().all(|c| c == '.') {
        fallback()
    } else {
        name
    }
}
