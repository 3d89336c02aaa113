//! Unified path management for campus configuration files.
//!
//! ```text
//! ~/.config/campus/            # Config directory
//! ├── config.toml              # Backend endpoint, realtime and log settings
//! └── session.json             # Persisted auth session (tokens)
//! ```

use std::path::PathBuf;

/// Errors that can occur during path resolution.
#[derive(Debug)]
pub enum PathError {
    /// Home directory could not be determined.
    HomeDirNotFound,
}

impl std::fmt::Display for PathError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathError::HomeDirNotFound => write!(f, "Cannot find home directory"),
        }
    }
}

impl std::error::Error for PathError {}

impl From<PathError> for campus_core::CampusError {
    fn from(err: PathError) -> Self {
        campus_core::CampusError::config(err.to_string())
    }
}

pub struct CampusPaths;

impl CampusPaths {
    const APP_DIR: &'static str = "campus";

    /// Returns the campus configuration directory (e.g. `~/.config/campus/`).
    pub fn config_dir() -> Result<PathBuf, PathError> {
        dirs::config_dir()
            .map(|dir| dir.join(Self::APP_DIR))
            .ok_or(PathError::HomeDirNotFound)
    }

    pub fn config_file() -> Result<PathBuf, PathError> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Returns the path to the persisted auth session.
    ///
    /// The file holds bearer tokens; it is written with mode 600 on Unix.
    pub fn session_file() -> Result<PathBuf, PathError> {
        Ok(Self::config_dir()?.join("session.json"))
    }
}
