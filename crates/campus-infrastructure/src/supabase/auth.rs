//! Password auth against the backend's GoTrue service.

use async_trait::async_trait;
use campus_core::auth::Identity;
use campus_core::gateway::AuthGateway;
use campus_core::{CampusError, Result};
use serde::Deserialize;
use serde_json::{Value, json};

use super::{SupabaseGateway, failure_message, transport_error};
use crate::storage::StoredSession;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: UserResponse,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

impl UserResponse {
    fn into_identity(self, fallback_email: &str) -> Identity {
        let email = self.email.unwrap_or_else(|| fallback_email.to_string());
        Identity::new(self.id, email)
    }
}

impl SupabaseGateway {
    /// POSTs to an auth endpoint; any non-2xx response becomes an `Auth` error.
    async fn auth_post(&self, path: &str, body: Value) -> Result<Value> {
        let response = self
            .client
            .post(self.endpoint("auth", path))
            .header("apikey", &self.anon_key)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(CampusError::auth(failure_message(response).await));
        }
        response
            .json()
            .await
            .map_err(|e| CampusError::auth(format!("unexpected auth response: {}", e)))
    }

    /// Stores a freshly issued token pair in memory and on disk.
    async fn remember(&self, token: TokenResponse, fallback_email: &str) -> Result<Identity> {
        let identity = token.user.into_identity(fallback_email);
        let expires_at = token.expires_at.or_else(|| {
            token
                .expires_in
                .map(|secs| chrono::Utc::now().timestamp() + secs)
        });
        let stored = StoredSession {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at,
            identity: identity.clone(),
        };

        if let Err(e) = self.session_file.save(&stored) {
            // The session still works for this process.
            tracing::warn!("[SupabaseGateway] Failed to persist session: {}", e);
        }
        *self.session.write().await = Some(stored);
        Ok(identity)
    }

    async fn forget(&self) {
        *self.session.write().await = None;
        if let Err(e) = self.session_file.clear() {
            tracing::warn!("[SupabaseGateway] Failed to remove stored session: {}", e);
        }
    }

    async fn refresh(&self, stored: &StoredSession) -> Result<Identity> {
        tracing::debug!("[SupabaseGateway] Refreshing expired access token");
        let body = self
            .auth_post(
                "token?grant_type=refresh_token",
                json!({ "refresh_token": stored.refresh_token }),
            )
            .await?;
        let token: TokenResponse = serde_json::from_value(body)?;
        self.remember(token, &stored.identity.email).await
    }
}

#[async_trait]
impl AuthGateway for SupabaseGateway {
    async fn sign_up(&self, email: &str, password: &str, metadata: Value) -> Result<Identity> {
        let body = self
            .auth_post(
                "signup",
                json!({ "email": email, "password": password, "data": metadata }),
            )
            .await?;

        // A session is issued only when email confirmation is disabled;
        // otherwise the body is the bare user record.
        if body.get("access_token").is_some() {
            let token: TokenResponse = serde_json::from_value(body)?;
            return self.remember(token, email).await;
        }

        let user_json = body.get("user").cloned().unwrap_or(body);
        let user: UserResponse = serde_json::from_value(user_json)?;
        tracing::info!(
            "[SupabaseGateway] Account {} created, awaiting email confirmation",
            user.id
        );
        Ok(user.into_identity(email))
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity> {
        let body = self
            .auth_post(
                "token?grant_type=password",
                json!({ "email": email, "password": password }),
            )
            .await?;
        let token: TokenResponse = serde_json::from_value(body)?;
        self.remember(token, email).await
    }

    async fn sign_out(&self) -> Result<()> {
        let Some(stored) = self.session.read().await.clone() else {
            return Ok(());
        };

        let result = self
            .client
            .post(self.endpoint("auth", "logout"))
            .header("apikey", &self.anon_key)
            .bearer_auth(&stored.access_token)
            .send()
            .await
            .map_err(transport_error);

        // Local credentials are dropped whatever the backend answered.
        self.forget().await;

        let response = result?;
        if !response.status().is_success() {
            return Err(CampusError::auth(failure_message(response).await));
        }
        Ok(())
    }

    async fn get_session(&self) -> Result<Option<Identity>> {
        let Some(stored) = self.session.read().await.clone() else {
            return Ok(None);
        };
        if !stored.is_expired(chrono::Utc::now().timestamp()) {
            return Ok(Some(stored.identity));
        }

        match self.refresh(&stored).await {
            Ok(identity) => Ok(Some(identity)),
            Err(e) if e.is_auth() => {
                tracing::warn!("[SupabaseGateway] Stored session rejected: {}", e);
                self.forget().await;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}
