//! OAuth authorization state for the Google Workspace MCP server.
//!
//! Issues one-time `state` tokens for outbound authorization requests,
//! mirrors them to disk so they survive restarts, and consumes them exactly
//! once when the provider redirects back.
//!
//! ## Standards
//! - RFC 6749 §10.12: CSRF protection via the `state` parameter
//! - RFC 7636: PKCE (S256)

pub mod callback;
pub mod persist;
pub mod pkce;
pub mod store;
pub mod types;

pub use callback::{CallbackParams, complete_authorization};
pub use persist::{JsonFilePersistence, MemoryPersistence, StatePersistence};
pub use store::OAuthStateStore;
pub use types::{AuthorizationGrant, OAuthStateEntry, PendingAuthorization, StateMetadata};
