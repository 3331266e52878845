//! Project file discovery for weatherdeck
//!
//! Stacks are declared in a `deck.kdl` file. This crate knows where to look
//! for it and where per-project state lives.

pub mod error;

pub use error::*;

use std::path::{Path, PathBuf};

/// Environment variable that points directly at a stack file
pub const CONFIG_PATH_ENV: &str = "DECK_CONFIG_PATH";

/// Project-local directory holding state files and optional stack files
pub const PROJECT_DIR: &str = ".weatherdeck";

const CANDIDATES: [&str; 4] = ["deck.local.kdl", ".deck.local.kdl", "deck.kdl", ".deck.kdl"];

/// Global configuration directory (`~/.config/weatherdeck`), created on demand
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("weatherdeck");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

/// Directory holding the state of every stack of a project
pub fn state_dir(project_root: impl AsRef<Path>) -> PathBuf {
    project_root.as_ref().join(PROJECT_DIR)
}

/// Find the project's stack file, starting from the current directory
///
/// Search order:
/// 1. `DECK_CONFIG_PATH`
/// 2. current directory: deck.local.kdl, .deck.local.kdl, deck.kdl, .deck.kdl
/// 3. `./.weatherdeck/`, same order
/// 4. `~/.config/weatherdeck/deck.kdl`
pub fn find_stack_file() -> Result<PathBuf> {
    let current_dir = std::env::current_dir()?;
    find_stack_file_from(&current_dir)
}

/// Same as [`find_stack_file`] with an explicit starting directory
pub fn find_stack_file_from(dir: &Path) -> Result<PathBuf> {
    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(&config_path);
        if path.is_file() {
            return Ok(path);
        }
        return Err(ConfigError::ConfigPathMissing(config_path));
    }

    if let Some(path) = first_existing(dir) {
        return Ok(path);
    }

    let project_dir = dir.join(PROJECT_DIR);
    if project_dir.is_dir()
        && let Some(path) = first_existing(&project_dir)
    {
        return Ok(path);
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global = config_dir.join("weatherdeck").join("deck.kdl");
        if global.is_file() {
            return Ok(global);
        }
    }

    Err(ConfigError::StackFileNotFound)
}

/// Project root for a stack file: the directory above `.weatherdeck/` when
/// the file lives there, otherwise the file's own directory
pub fn project_root(stack_file: &Path) -> PathBuf {
    let parent = stack_file.parent().unwrap_or_else(|| Path::new("."));
    if parent.file_name().is_some_and(|name| name == PROJECT_DIR) {
        parent.parent().unwrap_or(parent).to_path_buf()
    } else {
        parent.to_path_buf()
    }
}

fn first_existing(dir: &Path) -> Option<PathBuf> {
    CANDIDATES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}
