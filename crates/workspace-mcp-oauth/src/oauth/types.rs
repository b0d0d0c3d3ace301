//! OAuth state types.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Caller context needed to resume an authorization flow.
pub type StateMetadata = serde_json::Map<String, serde_json::Value>;

/// Token → entry table, the shape of both the in-memory store and the file.
pub type StateTable = HashMap<String, OAuthStateEntry>;

/// A pending authorization request, keyed by its state token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuthStateEntry {
    /// The token itself. On disk this is the object key, not a field.
    #[serde(skip)]
    pub state: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: StateMetadata,
}

impl OAuthStateEntry {
    /// Check if the entry is past its TTL at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// State plus PKCE challenge for an authorization URL.
#[derive(Debug, Clone, Serialize)]
pub struct PendingAuthorization {
    pub state: String,
    pub code_challenge: String,
    pub code_challenge_method: &'static str,
}

/// A validated callback ready for the token exchange.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationGrant {
    pub code: String,
    pub state: String,
    pub metadata: StateMetadata,
}

impl AuthorizationGrant {
    /// PKCE verifier stored at issuance, if any.
    pub fn code_verifier(&self) -> Option<&str> {
        self.metadata.get(super::pkce::VERIFIER_KEY).and_then(serde_json::Value::as_str)
    }
}

/// Shorten a token for log output.
pub fn state_prefix(state: &str) -> &str {
    state.get(..8).unwrap_or(state)
}
