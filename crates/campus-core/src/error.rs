//! Error types for the campus portal client.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A shared error type for the entire campus client.
///
/// Every Gateway call, store operation and service action reports failures
/// through this type so callers (and the session store's `last_error` mirror)
/// see one consistent taxonomy.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CampusError {
    /// Authentication rejected (bad credentials, duplicate account, no session).
    #[error("Authentication error: {0}")]
    Auth(String),

    /// The profile row could not be written after the account was created.
    ///
    /// The account exists server-side at this point.
    #[error("Profile write error: {0}")]
    ProfileWrite(String),

    /// Gateway read failure
    #[error("Read error: {0}")]
    Read(String),

    /// Gateway write failure (insert, update, delete)
    #[error("Write error: {0}")]
    Write(String),

    /// A change-feed subscription could not be established
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    /// Caller supplied input the operation refuses to send
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error (file system operations)
    #[error("IO error: {message}")]
    Io { message: String },

    /// Serialization/deserialization error
    #[error("Serialization error: {format} - {message}")]
    Serialization {
        format: String, // "TOML", "JSON", etc.
        message: String,
    },

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CampusError {
    // ============================================================================
    // Constructor helpers
    // ============================================================================

    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(message.into())
    }

    pub fn profile_write(message: impl Into<String>) -> Self {
        Self::ProfileWrite(message.into())
    }

    pub fn read(message: impl Into<String>) -> Self {
        Self::Read(message.into())
    }

    pub fn write(message: impl Into<String>) -> Self {
        Self::Write(message.into())
    }

    pub fn connectivity(message: impl Into<String>) -> Self {
        Self::Connectivity(message.into())
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    // ============================================================================
    // Type checking methods
    // ============================================================================

    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }

    pub fn is_profile_write(&self) -> bool {
        matches!(self, Self::ProfileWrite(_))
    }

    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connectivity(_))
    }

    /// Returns the bare message without the variant prefix.
    ///
    /// This is what the session store mirrors into `last_error` for banners.
    pub fn message(&self) -> String {
        match self {
            Self::Auth(m)
            | Self::ProfileWrite(m)
            | Self::Read(m)
            | Self::Write(m)
            | Self::Connectivity(m)
            | Self::InvalidInput(m)
            | Self::Config(m)
            | Self::Internal(m) => m.clone(),
            Self::Io { message } => message.clone(),
            Self::Serialization { message, .. } => message.clone(),
        }
    }
}

// ============================================================================
// From implementations for automatic conversion
// ============================================================================

impl From<std::io::Error> for CampusError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: format!("{} (kind: {:?})", err, err.kind()),
        }
    }
}

impl From<serde_json::Error> for CampusError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            format: "JSON".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for CampusError {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::ser::Error> for CampusError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

/// A type alias for `Result<T, CampusError>`.
pub type Result<T> = std::result::Result<T, CampusError>;
