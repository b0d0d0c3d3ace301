//! Error types for the OAuth state store.
//!
//! Uses `thiserror` for structured error handling with automatic `From` implementations.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Errors from validating a state token received on callback.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// Token was never issued, was already consumed, or its record was lost.
    #[error("Invalid or unknown OAuth state")]
    InvalidState,

    /// Token was found but is past its TTL. The entry has been removed.
    #[error("OAuth state expired at {expired_at}")]
    ExpiredState {
        /// When the token stopped being valid
        expired_at: DateTime<Utc>,
    },
}

impl StateError {
    /// Convert to a user-facing message for the callback page.
    #[must_use]
    pub fn to_user_message(&self) -> String {
        match self {
            Self::InvalidState => "This authorization link is invalid or has already been used. \
                 Please restart the authorization flow from the beginning."
                .to_string(),
            Self::ExpiredState { .. } => "This authorization request has expired. \
                 Please restart the authorization flow from the beginning."
                .to_string(),
        }
    }
}

/// Errors from the durable state mirror.
///
/// These never fail a store operation; the store logs them and carries on
/// with its in-memory table.
#[derive(thiserror::Error, Debug)]
pub enum PersistenceError {
    /// State file exists but could not be read
    #[error("Failed to read state file {}: {source}", .path.display())]
    Read {
        /// File that failed
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// State file content is not a valid state table
    #[error("Malformed state file {}: {source}", .path.display())]
    Malformed {
        /// File that failed
        path: PathBuf,
        /// Parse error
        source: serde_json::Error,
    },

    /// State file could not be written (disk full, permissions)
    #[error("Failed to write state file {}: {source}", .path.display())]
    Write {
        /// File that failed
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// State table could not be serialized
    #[error("Failed to encode state table: {0}")]
    Encode(#[from] serde_json::Error),
}

impl PersistenceError {
    /// Returns true if this error happened while loading.
    #[must_use]
    pub const fn is_load_failure(&self) -> bool {
        matches!(self, Self::Read { .. } | Self::Malformed { .. })
    }

    /// Returns true if this error happened while saving.
    #[must_use]
    pub const fn is_write_failure(&self) -> bool {
        matches!(self, Self::Write { .. } | Self::Encode(_))
    }
}

/// Errors from handling an authorization callback.
#[derive(thiserror::Error, Debug)]
pub enum CallbackError {
    /// Pasted callback URL could not be parsed
    #[error("Invalid callback URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// A required query parameter is absent
    #[error("Callback is missing the '{0}' parameter")]
    MissingParameter(&'static str),

    /// The identity provider reported an error instead of a code
    #[error("Authorization denied: {error}")]
    Denied {
        /// OAuth error code (e.g. `access_denied`)
        error: String,
        /// Optional human-readable description
        description: Option<String>,
    },

    /// State validation failed
    #[error(transparent)]
    State(#[from] StateError),
}

impl CallbackError {
    /// Convert to a user-facing message for the callback page.
    #[must_use]
    pub fn to_user_message(&self) -> String {
        match self {
            Self::State(err) => err.to_user_message(),
            Self::Denied { error, description } => match description {
                Some(description) => format!(
                    "Authorization was not granted ({error}: {description}). \
                     Please restart the authorization flow from the beginning."
                ),
                None => format!(
                    "Authorization was not granted ({error}). \
                     Please restart the authorization flow from the beginning."
                ),
            },
            Self::MissingParameter(name) => {
                format!("The callback is missing '{name}'. Please restart the authorization flow.")
            }
            Self::InvalidUrl(_) => self.to_string(),
        }
    }
}

/// Invalid configuration.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// TTL is zero or longer than `config::oauth::MAX_STATE_TTL`
    #[error("State TTL must be between 1 second and one year, got {ttl:?}")]
    InvalidTtl {
        /// Rejected TTL
        ttl: Duration,
    },

    /// Neither HOME nor USERPROFILE is set
    #[error("Cannot determine home directory for the state file; set WORKSPACE_MCP_STATE_FILE")]
    NoHomeDirectory,
}

/// Result type alias for state validation.
pub type StateResult<T> = Result<T, StateError>;

/// Result type alias for persistence operations.
pub type PersistenceResult<T> = Result<T, PersistenceError>;
