//! HTTP handlers for the authorization callback listener.

use std::sync::Arc;

use axum::{
    Json,
    extract::{RawQuery, State},
    http::{HeaderValue, StatusCode, header},
    response::{Html, IntoResponse, Response},
};
use tokio::sync::mpsc;

use super::pages;
use crate::oauth::{AuthorizationGrant, CallbackParams, OAuthStateStore, complete_authorization};

/// Shared state for HTTP handlers.
pub struct HttpState {
    pub store: OAuthStateStore,
    /// Receives validated grants for the token exchange.
    pub grants: mpsc::Sender<AuthorizationGrant>,
}

/// `GET /health`
pub async fn handle_health(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "workspace-mcp-oauth",
        "version": env!("CARGO_PKG_VERSION"),
        "pending_states": state.store.pending_count().await
    }))
}

/// `GET /oauth2callback`
///
/// Validates and consumes the `state`, then hands the authorization code to
/// whoever holds the grant receiver.
pub async fn handle_oauth_callback(
    State(state): State<Arc<HttpState>>,
    RawQuery(query): RawQuery,
) -> Response {
    let params = CallbackParams::from_query(query.as_deref().unwrap_or_default());
    match complete_authorization(&state.store, params).await {
        Ok(grant) => {
            if state.grants.send(grant).await.is_err() {
                tracing::error!("Grant receiver dropped; authorization code discarded");
                return html_response(
                    StatusCode::SERVICE_UNAVAILABLE,
                    pages::render_error_page(
                        "The server is shutting down. Please restart the authorization flow.",
                    ),
                );
            }
            tracing::info!("Authorization callback accepted");
            html_response(StatusCode::OK, pages::render_success_page())
        }
        Err(e) => {
            tracing::warn!(error = %e, "Authorization callback rejected");
            html_response(StatusCode::BAD_REQUEST, pages::render_error_page(&e.to_user_message()))
        }
    }
}

/// Callback pages carry one-time material; keep them out of caches.
fn html_response(status: StatusCode, body: String) -> Response {
    let mut response = (status, Html(body)).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    response
}
