//! Persisted auth session (`~/.config/campus/session.json`).
//!
//! The hosted backend issues bearer tokens on sign-in; they are kept here so a
//! later process can restore the session without asking for credentials.

use crate::paths::CampusPaths;
use campus_core::Result;
use campus_core::auth::Identity;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Tokens and identity of a signed-in account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSession {
    pub access_token: String,
    pub refresh_token: String,
    /// Unix timestamp (seconds) after which `access_token` is stale.
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub identity: Identity,
}

impl StoredSession {
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Storage for `session.json`.
///
/// # Security Note
///
/// Tokens are stored as plaintext JSON. On Unix the file is written with mode
/// 600 so only the owner can read it.
#[derive(Debug, Clone)]
pub struct SessionFile {
    path: PathBuf,
}

impl SessionFile {
    /// Uses the default path under the campus config directory.
    pub fn new() -> Result<Self> {
        Ok(Self::with_path(CampusPaths::session_file()?))
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the stored session. A missing file is `None`.
    ///
    /// An unreadable or corrupt file is treated as signed out; the error is
    /// logged rather than returned.
    pub fn load(&self) -> Option<StoredSession> {
        if !self.path.exists() {
            return None;
        }

        let parsed = fs::read_to_string(&self.path)
            .map_err(|e| e.to_string())
            .and_then(|content| serde_json::from_str(&content).map_err(|e| e.to_string()));

        match parsed {
            Ok(session) => Some(session),
            Err(e) => {
                tracing::warn!(
                    "[SessionFile] Ignoring unreadable session at {}: {}",
                    self.path.display(),
                    e
                );
                None
            }
        }
    }

    pub fn save(&self, session: &StoredSession) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(session)?)?;
        restrict_permissions(&self.path)?;
        tracing::debug!("[SessionFile] Saved session for {}", session.identity.id);
        Ok(())
    }

    /// Removes the stored session. Removing a missing file is not an error.
    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}
