//! Gateway backed by a hosted Supabase project.
//!
//! # Module Structure
//!
//! - `auth`: GoTrue password auth (`/auth/v1`) and session persistence
//! - `rest`: PostgREST table access (`/rest/v1`)
//! - `realtime`: Phoenix channel client for insert change-feeds

mod auth;
mod realtime;
mod rest;

pub use realtime::RealtimeClient;

use campus_core::config::PortalConfig;
use campus_core::{CampusError, Result};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::storage::{SessionFile, StoredSession};

/// `Gateway` implementation speaking to the hosted backend over HTTP and WebSocket.
pub struct SupabaseGateway {
    client: Client,
    base_url: String,
    anon_key: String,
    session_file: SessionFile,
    session: RwLock<Option<StoredSession>>,
    realtime: RealtimeClient,
}

impl SupabaseGateway {
    /// Creates a gateway for the configured project, restoring any session
    /// persisted in `session_file`.
    pub fn new(config: &PortalConfig, session_file: SessionFile) -> Result<Self> {
        if config.backend.anon_key.trim().is_empty() {
            return Err(CampusError::config(
                "backend.anon_key is not set (config.toml or CAMPUS_ANON_KEY)",
            ));
        }

        let restored = session_file.load();
        tracing::info!(
            "[SupabaseGateway] Initialized with URL: {}, stored session: {}",
            config.backend.url,
            if restored.is_some() { "present" } else { "none" }
        );

        Ok(Self {
            client: Client::new(),
            base_url: config.backend.url.trim_end_matches('/').to_string(),
            anon_key: config.backend.anon_key.clone(),
            session_file,
            session: RwLock::new(restored),
            realtime: RealtimeClient::new(&config.backend, &config.realtime),
        })
    }

    fn endpoint(&self, service: &str, path: &str) -> String {
        format!("{}/{}/v1/{}", self.base_url, service, path)
    }

    /// The signed-in user's access token, or the anon key when signed out.
    async fn bearer_token(&self) -> String {
        self.session
            .read()
            .await
            .as_ref()
            .map(|s| s.access_token.clone())
            .unwrap_or_else(|| self.anon_key.clone())
    }

    /// Attaches the project key and bearer token every backend call needs.
    async fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let token = self.bearer_token().await;
        request.header("apikey", &self.anon_key).bearer_auth(token)
    }
}

/// Human-readable message from a failed response body.
///
/// Auth responses use `msg` or `error_description`, table responses use
/// `message`. Falls back to the raw body, then to the status line.
fn error_message(status: StatusCode, body: &str) -> String {
    let parsed = serde_json::from_str::<Value>(body).ok().and_then(|v| {
        ["msg", "message", "error_description", "error"]
            .iter()
            .find_map(|key| v.get(*key).and_then(Value::as_str).map(str::to_string))
    });

    match parsed {
        Some(message) => message,
        None if !body.trim().is_empty() => body.trim().to_string(),
        None => status.to_string(),
    }
}

async fn failure_message(response: Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    error_message(status, &body)
}

/// Transport failures (DNS, refused connection, TLS) mean the backend is unreachable.
fn transport_error(err: reqwest::Error) -> CampusError {
    CampusError::connectivity(err.to_string())
}
