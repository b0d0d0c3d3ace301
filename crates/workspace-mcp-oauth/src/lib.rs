//! Google Workspace MCP OAuth State
//!
//! Durable, single-use OAuth `state` tokens for the Google Workspace MCP
//! server's authorization-code flow. Tokens survive process restarts, so a
//! browser redirect that arrives after the server was restarted still
//! validates.
//!
//! # Features
//!
//! - **Single-use**: a token validates at most once; replays are rejected
//! - **Durable**: mirrored to `~/.google_workspace_mcp/oauth_states.json`
//! - **TTL**: tokens expire 10 minutes after issuance by default
//! - **Recovery**: a pasted redirect URL goes through the same validation as the listener
//!
//! # Example
//!
//! ```no_run
//! use workspace_mcp_oauth::{config::Config, oauth::{OAuthStateStore, StateMetadata}};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let store = OAuthStateStore::open(&config).await?;
//!
//!     let mut metadata = StateMetadata::new();
//!     metadata.insert("scope".into(), "calendar.readonly".into());
//!     let state = store.store_oauth_state(metadata).await;
//!
//!     // ...later, on callback
//!     let metadata = store.validate_and_consume_oauth_state(&state).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod oauth;
pub mod server;

pub use config::Config;
pub use error::{CallbackError, PersistenceError, StateError};
pub use oauth::OAuthStateStore;
