//! Google Workspace MCP OAuth State - Entry Point
//!
//! Issues and consumes OAuth state tokens, runs the callback listener, and
//! completes authorizations from a pasted redirect URL.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use workspace_mcp_oauth::{
    config::{self, Config},
    oauth::{
        AuthorizationGrant, CallbackParams, OAuthStateStore, StateMetadata, complete_authorization,
    },
    server::CallbackServer,
};

#[derive(Parser, Debug)]
#[command(name = "workspace-mcp-oauth")]
#[command(about = "OAuth state store for the Google Workspace MCP server")]
#[command(version)]
struct Cli {
    /// State file (overrides WORKSPACE_MCP_STATE_FILE)
    #[arg(long, global = true)]
    state_file: Option<PathBuf>,

    /// State token lifetime in seconds (overrides WORKSPACE_MCP_STATE_TTL_SECS)
    #[arg(long, global = true)]
    state_ttl_secs: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Issue a state token for a new authorization request
    Issue {
        /// Requested scope (repeatable)
        #[arg(long = "scope")]
        scopes: Vec<String>,

        /// Extra metadata as a JSON object
        #[arg(long)]
        metadata: Option<String>,

        /// Also generate a PKCE verifier and print its challenge
        #[arg(long)]
        pkce: bool,
    },
    /// Validate and consume a state token, printing its metadata
    Consume {
        /// State token from the callback
        state: String,
    },
    /// Complete an authorization from a pasted redirect URL
    Recover {
        /// Full redirect URL from the browser address bar
        url: String,
    },
    /// Run the callback listener
    Serve {
        /// Listener port
        #[arg(long, env = config::env::PORT)]
        port: Option<u16>,
    },
    /// Remove expired state tokens
    Purge,
    /// Show pending token count and state file location
    Status,
}

fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    // stdout carries command output
    if json {
        subscriber.with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)).init();
    } else {
        subscriber
            .with(tracing_subscriber::fmt::layer().compact().with_writer(std::io::stderr))
            .init();
    }
}

fn build_metadata(
    config: &Config,
    scopes: Vec<String>,
    raw: Option<&str>,
) -> anyhow::Result<StateMetadata> {
    let mut metadata = match raw {
        Some(raw) => match serde_json::from_str::<serde_json::Value>(raw)? {
            serde_json::Value::Object(map) => map,
            other => anyhow::bail!("--metadata must be a JSON object, got {other}"),
        },
        None => StateMetadata::new(),
    };

    if !scopes.is_empty() {
        metadata.insert("scopes".into(), scopes.into());
    }
    metadata.entry("redirect_uri").or_insert_with(|| config.redirect_uri().into());

    Ok(metadata)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    init_tracing(&cli.log_level, cli.json_logs);

    let mut config = Config::from_env_with_state_file(cli.state_file)?;
    if let Some(secs) = cli.state_ttl_secs {
        config.state_ttl = Duration::from_secs(secs);
    }

    tracing::debug!(
        version = env!("CARGO_PKG_VERSION"),
        command = ?cli.command,
        "Starting workspace-mcp-oauth"
    );

    let store = OAuthStateStore::open(&config).await?;

    match cli.command {
        Command::Issue { scopes, metadata, pkce } => {
            let metadata = build_metadata(&config, scopes, metadata.as_deref())?;
            let output = if pkce {
                serde_json::to_value(store.store_oauth_state_with_pkce(metadata).await)?
            } else {
                serde_json::json!({ "state": store.store_oauth_state(metadata).await })
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Command::Consume { state } => {
            let metadata = store
                .validate_and_consume_oauth_state(&state)
                .await
                .map_err(|e| anyhow::anyhow!(e.to_user_message()))?;
            println!("{}", serde_json::to_string_pretty(&metadata)?);
        }
        Command::Recover { url } => {
            let params = CallbackParams::from_url(&url)?;
            let grant = complete_authorization(&store, params)
                .await
                .map_err(|e| anyhow::anyhow!(e.to_user_message()))?;
            println!("{}", serde_json::to_string_pretty(&grant)?);
        }
        Command::Serve { port } => {
            if let Some(port) = port {
                config.port = port;
            }
            let (tx, mut rx) = mpsc::channel::<AuthorizationGrant>(16);

            tokio::spawn(async move {
                while let Some(grant) = rx.recv().await {
                    let keys: Vec<&String> = grant.metadata.keys().collect();
                    tracing::info!(
                        code_len = grant.code.len(),
                        has_verifier = grant.code_verifier().is_some(),
                        metadata = ?keys,
                        "Authorization grant ready for token exchange"
                    );
                }
            });

            tracing::info!(redirect_uri = %config.redirect_uri(), "Register this redirect URI");
            CallbackServer::new(store).run(config.port, tx).await?;
        }
        Command::Purge => {
            let removed = store.purge_expired().await;
            println!("{}", serde_json::json!({ "removed": removed }));
        }
        Command::Status => {
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "pending": store.pending_count().await,
                    "location": store.location(),
                    "ttl_secs": config.state_ttl.as_secs(),
                    "redirect_uri": config.redirect_uri(),
                }))?
            );
        }
    }

    Ok(())
}
