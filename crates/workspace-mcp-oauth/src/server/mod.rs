//! Local HTTP listener for the provider's authorization redirect.
//!
//! Only validates `state` and forwards the authorization code; the token
//! exchange happens wherever the grant receiver lives.

pub mod handlers;
pub mod pages;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Router, routing::get};
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;

use crate::config::oauth::CALLBACK_PATH;
use crate::oauth::{AuthorizationGrant, OAuthStateStore};
use handlers::HttpState;

/// Create the callback router.
pub fn create_router(store: OAuthStateStore, grants: mpsc::Sender<AuthorizationGrant>) -> Router {
    let state = Arc::new(HttpState { store, grants });

    Router::new()
        .route("/health", get(handlers::handle_health))
        .route(CALLBACK_PATH, get(handlers::handle_oauth_callback))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Callback listener bound to a store.
pub struct CallbackServer {
    store: OAuthStateStore,
}

impl CallbackServer {
    #[must_use]
    pub fn new(store: OAuthStateStore) -> Self {
        Self { store }
    }

    /// Serve until Ctrl-C.
    ///
    /// # Errors
    ///
    /// Returns error on bind or server failure.
    pub async fn run(self, port: u16, grants: mpsc::Sender<AuthorizationGrant>) -> anyhow::Result<()> {
        let router = create_router(self.store, grants);
        let addr = SocketAddr::from(([127, 0, 0, 1], port));

        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Callback listener on http://{}{}", listener.local_addr()?, CALLBACK_PATH);

        axum::serve(listener, router).with_graceful_shutdown(shutdown_signal()).await?;

        tracing::info!("Callback listener shut down");
        Ok(())
    }
}

impl std::fmt::Debug for CallbackServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackServer").field("store", &self.store).finish()
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install CTRL+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Received shutdown signal");
}
