//! Wiring from config to a ready session.

use anyhow::{Context, Result};
use campus_core::auth::{Identity, SessionStore};
use campus_core::config::PortalConfig;
use campus_core::gateway::Gateway;
use campus_infrastructure::{ConfigService, SessionFile, SupabaseGateway};
use std::path::Path;
use std::sync::Arc;

pub fn load_config(path: Option<&Path>) -> Result<PortalConfig> {
    let service = match path {
        Some(path) => ConfigService::with_path(path),
        None => ConfigService::new()?,
    };
    service
        .get_config()
        .with_context(|| format!("Failed to load {}", service.path().display()))
}

/// A gateway plus the session store restored from it.
pub struct Portal {
    pub gateway: Arc<dyn Gateway>,
    pub session: SessionStore,
}

impl Portal {
    /// Connects to the configured backend and restores any stored session.
    pub async fn connect(config: &PortalConfig) -> Result<Self> {
        let gateway = SupabaseGateway::new(config, SessionFile::new()?)
            .context("Failed to set up the backend gateway")?;
        Ok(Self::start(Arc::new(gateway)).await)
    }

    pub async fn start(gateway: Arc<dyn Gateway>) -> Self {
        let session = SessionStore::new(gateway.clone());
        session.load_user().await;
        if let Some(err) = session.last_error() {
            tracing::warn!("[Portal] Session restored with error: {}", err);
        }
        Self { gateway, session }
    }

    pub fn require_user(&self) -> Result<Identity> {
        self.session
            .identity()
            .context("Not signed in. Run `campus sign-in` first.")
    }
}
