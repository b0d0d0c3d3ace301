//! Configuration and store construction tests.
//!
//! Tests actual behavior, not constants.

use std::time::Duration;

use workspace_mcp_oauth::config::{Config, oauth};
use workspace_mcp_oauth::error::ConfigError;
use workspace_mcp_oauth::oauth::OAuthStateStore;

// =============================================================================
// Config Behavior Tests
// =============================================================================

#[test]
fn test_config_default_ttl_is_ten_minutes() {
    let config = Config::default();
    assert_eq!(config.state_ttl, Duration::from_secs(600));
    assert!(config.validate().is_ok());
}

#[test]
fn test_for_testing_is_persistent() {
    let config = Config::for_testing("/tmp/states.json");
    assert!(config.is_persistent());
    assert_eq!(config.state_file.as_deref(), Some(std::path::Path::new("/tmp/states.json")));
}

#[test]
fn test_redirect_uri_uses_callback_path() {
    let mut config = Config::default();
    config.port = 9123;
    assert_eq!(config.redirect_uri(), format!("http://localhost:9123{}", oauth::CALLBACK_PATH));
}

// =============================================================================
// Store Construction Tests
// =============================================================================

#[tokio::test]
async fn test_open_rejects_zero_ttl() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::for_testing(dir.path().join("oauth_states.json"));
    config.state_ttl = Duration::ZERO;

    let result = OAuthStateStore::open(&config).await;
    assert!(matches!(result, Err(ConfigError::InvalidTtl { .. })));
}

#[tokio::test]
async fn test_in_memory_store_without_state_file() {
    let store = OAuthStateStore::open(&Config::default()).await.unwrap();
    assert_eq!(store.location(), "memory");

    let state = store.store_oauth_state(Default::default()).await;
    assert!(store.validate_and_consume_oauth_state(&state).await.is_ok());
}

#[tokio::test]
async fn test_store_debug_shows_location() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("oauth_states.json");
    let store = OAuthStateStore::open(&Config::for_testing(&path)).await.unwrap();

    let debug = format!("{store:?}");
    assert!(debug.contains("oauth_states.json"));
}
