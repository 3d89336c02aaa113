//! Configuration service implementation.
//!
//! Loads the portal configuration from `~/.config/campus/config.toml`, writing
//! the defaults there on first run, then layers environment overrides on top.

use crate::paths::CampusPaths;
use campus_core::config::PortalConfig;
use campus_core::{CampusError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

/// Environment variable overriding `backend.url`.
pub const ENV_BACKEND_URL: &str = "CAMPUS_BACKEND_URL";
/// Environment variable overriding `backend.anon_key`.
pub const ENV_ANON_KEY: &str = "CAMPUS_ANON_KEY";
/// Environment variable overriding `log.level`.
pub const ENV_LOG_LEVEL: &str = "CAMPUS_LOG_LEVEL";

/// Loads and caches the portal configuration.
#[derive(Debug, Clone)]
pub struct ConfigService {
    path: PathBuf,
    /// Cached configuration, filled on first access.
    config: Arc<RwLock<Option<PortalConfig>>>,
}

impl ConfigService {
    /// Creates a service reading the default config file.
    pub fn new() -> Result<Self> {
        Ok(Self::with_path(CampusPaths::config_file()?))
    }

    /// Creates a service reading `path` (for testing or `--config`).
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            config: Arc::new(RwLock::new(None)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the configuration with environment overrides applied.
    pub fn get_config(&self) -> Result<PortalConfig> {
        {
            let read_lock = self.config.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(ref cached) = *read_lock {
                return Ok(cached.clone());
            }
        }

        let mut loaded = self.load_or_create()?;
        apply_env_overrides(&mut loaded, |key| std::env::var(key).ok());

        let mut write_lock = self.config.write().unwrap_or_else(PoisonError::into_inner);
        *write_lock = Some(loaded.clone());
        Ok(loaded)
    }

    /// Invalidates the cache, forcing a reload on next access.
    pub fn invalidate_cache(&self) {
        let mut write_lock = self.config.write().unwrap_or_else(PoisonError::into_inner);
        *write_lock = None;
    }

    fn load_or_create(&self) -> Result<PortalConfig> {
        if !self.path.exists() {
            let defaults = PortalConfig::default();
            if let Some(parent) = self.path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&self.path, toml::to_string_pretty(&defaults)?)?;
            tracing::info!(
                "[ConfigService] Wrote default config to {}",
                self.path.display()
            );
            return Ok(defaults);
        }

        let content = fs::read_to_string(&self.path)?;
        toml::from_str(&content).map_err(|e| {
            CampusError::config(format!("invalid {}: {}", self.path.display(), e))
        })
    }
}

/// Applies the `CAMPUS_*` overrides found through `lookup`. Empty values are ignored.
pub fn apply_env_overrides(config: &mut PortalConfig, lookup: impl Fn(&str) -> Option<String>) {
    let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(url) = lookup(ENV_BACKEND_URL) {
        config.backend.url = url;
    }
    if let Some(key) = lookup(ENV_ANON_KEY) {
        config.backend.anon_key = key;
    }
    if let Some(level) = lookup(ENV_LOG_LEVEL) {
        config.log.level = level;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use campus_core::config::DEFAULT_BACKEND_URL;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_created_with_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");
        let service = ConfigService::with_path(path.clone());

        let config = service.load_or_create().unwrap();

        assert_eq!(config.backend.url, DEFAULT_BACKEND_URL);
        assert!(path.exists());
        let reread: PortalConfig = toml::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(reread, config);
    }

    #[test]
    fn test_existing_file_is_read() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(
            &path,
            "[backend]\nurl = \"https://abc.supabase.co\"\nanon_key = \"anon\"\n",
        )
        .unwrap();

        let config = ConfigService::with_path(path).load_or_create().unwrap();

        assert_eq!(config.backend.url, "https://abc.supabase.co");
        assert_eq!(config.backend.anon_key, "anon");
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "[backend\nurl = ").unwrap();

        let err = ConfigService::with_path(path).load_or_create().unwrap_err();

        assert!(matches!(err, CampusError::Config(_)));
    }

    #[test]
    fn test_env_overrides_skip_empty_values() {
        let mut config = PortalConfig::default();

        apply_env_overrides(&mut config, |key| match key {
            ENV_BACKEND_URL => Some("https://env.example".to_string()),
            ENV_ANON_KEY => Some("  ".to_string()),
            ENV_LOG_LEVEL => Some("debug".to_string()),
            _ => None,
        });

        assert_eq!(config.backend.url, "https://env.example");
        assert_eq!(config.backend.anon_key, "");
        assert_eq!(config.log.level, "debug");
    }
}
