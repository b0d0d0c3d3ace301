//! Configuration for the OAuth state store and callback listener.

use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// OAuth state configuration constants.
pub mod oauth {
    use std::time::Duration;

    /// State token lifetime (10 minutes).
    pub const STATE_TTL: Duration = Duration::from_secs(600);

    /// Longest accepted state token lifetime (one year).
    pub const MAX_STATE_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

    /// Directory under the user's home that holds persisted state.
    pub const STATE_DIR_NAME: &str = ".google_workspace_mcp";

    /// File name of the persisted state table.
    pub const STATE_FILE_NAME: &str = "oauth_states.json";

    /// Path the identity provider redirects back to.
    pub const CALLBACK_PATH: &str = "/oauth2callback";

    /// Default callback listener port.
    pub const DEFAULT_PORT: u16 = 8000;

    /// Default base URI used to build the redirect URI.
    pub const DEFAULT_BASE_URI: &str = "http://localhost";
}

/// Environment variable names.
pub mod env {
    pub const STATE_FILE: &str = "WORKSPACE_MCP_STATE_FILE";
    pub const STATE_TTL_SECS: &str = "WORKSPACE_MCP_STATE_TTL_SECS";
    pub const BASE_URI: &str = "WORKSPACE_MCP_BASE_URI";
    pub const PORT: &str = "WORKSPACE_MCP_PORT";
}

/// Store and listener configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Location of the persisted state table. `None` keeps state in memory only.
    pub state_file: Option<PathBuf>,

    /// Lifetime of an issued state token.
    pub state_ttl: Duration,

    /// Base URI (scheme and host) of the callback listener.
    pub base_uri: String,

    /// Callback listener port.
    pub port: u16,
}

impl Config {
    /// Create a configuration persisting to `state_file`.
    #[must_use]
    pub fn new(state_file: Option<PathBuf>) -> Self {
        Self {
            state_file,
            state_ttl: oauth::STATE_TTL,
            base_uri: oauth::DEFAULT_BASE_URI.to_string(),
            port: oauth::DEFAULT_PORT,
        }
    }

    /// Create a test configuration with a short TTL and an explicit state file.
    #[must_use]
    pub fn for_testing(state_file: impl Into<PathBuf>) -> Self {
        Self {
            state_file: Some(state_file.into()),
            state_ttl: Duration::from_secs(60),
            base_uri: oauth::DEFAULT_BASE_URI.to_string(),
            port: 0,
        }
    }

    /// Create configuration from environment variables.
    ///
    /// Falls back to `~/.google_workspace_mcp/oauth_states.json` when no
    /// state file is given.
    ///
    /// # Errors
    ///
    /// Returns error if environment variables are invalid or no home
    /// directory can be determined.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_env_with_state_file(None)
    }

    /// Like [`Config::from_env`], with an explicit state file that takes
    /// precedence over the environment.
    ///
    /// The home directory is only consulted when neither is given.
    ///
    /// # Errors
    ///
    /// Returns error if environment variables are invalid or no state file
    /// location can be determined.
    pub fn from_env_with_state_file(state_file: Option<PathBuf>) -> anyhow::Result<Self> {
        let state_file =
            resolve_state_file(state_file, std::env::var_os(env::STATE_FILE), default_state_file)?;

        let mut config = Self::new(Some(state_file));

        if let Ok(raw) = std::env::var(env::STATE_TTL_SECS) {
            let secs: u64 = raw.trim().parse().map_err(|e| {
                anyhow::anyhow!("{} must be a whole number of seconds: {e}", env::STATE_TTL_SECS)
            })?;
            config.state_ttl = Duration::from_secs(secs);
        }
        if let Ok(base_uri) = std::env::var(env::BASE_URI) {
            config.base_uri = base_uri;
        }
        if let Ok(raw) = std::env::var(env::PORT) {
            config.port = raw
                .trim()
                .parse()
                .map_err(|e| anyhow::anyhow!("{} must be a port number: {e}", env::PORT))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Redirect URI registered with the identity provider.
    #[must_use]
    pub fn redirect_uri(&self) -> String {
        format!("{}:{}{}", self.base_uri.trim_end_matches('/'), self.port, oauth::CALLBACK_PATH)
    }

    /// Check that the TTL is usable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidTtl`] for a zero TTL or one longer than
    /// [`oauth::MAX_STATE_TTL`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.state_ttl.is_zero() || self.state_ttl > oauth::MAX_STATE_TTL {
            return Err(ConfigError::InvalidTtl { ttl: self.state_ttl });
        }
        Ok(())
    }

    /// Check if state survives restarts.
    #[must_use]
    pub const fn is_persistent(&self) -> bool {
        self.state_file.is_some()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Explicit path, then the environment, then the home-directory default.
fn resolve_state_file(
    explicit: Option<PathBuf>,
    from_env: Option<OsString>,
    default: impl FnOnce() -> Result<PathBuf, ConfigError>,
) -> Result<PathBuf, ConfigError> {
    match (explicit, from_env) {
        (Some(path), _) => Ok(path),
        (None, Some(path)) if !path.is_empty() => Ok(PathBuf::from(path)),
        _ => default(),
    }
}

/// `~/.google_workspace_mcp/oauth_states.json`.
///
/// # Errors
///
/// Returns [`ConfigError::NoHomeDirectory`] when neither `HOME` nor
/// `USERPROFILE` is set.
pub fn default_state_file() -> Result<PathBuf, ConfigError> {
    let home = std::env::var_os("HOME")
        .filter(|h| !h.is_empty())
        .or_else(|| std::env::var_os("USERPROFILE").filter(|h| !h.is_empty()))
        .ok_or(ConfigError::NoHomeDirectory)?;

    Ok(PathBuf::from(home).join(oauth::STATE_DIR_NAME).join(oauth::STATE_FILE_NAME))
}
