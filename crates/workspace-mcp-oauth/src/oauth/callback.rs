//! Authorization callback parameters.
//!
//! The listener receives these as a query string. When the listener is gone
//! (the process exited before the browser redirected), the user can paste the
//! redirect URL from the address bar and it goes through the same path.

use std::borrow::Cow;

use url::Url;

use super::store::OAuthStateStore;
use super::types::AuthorizationGrant;
use crate::error::CallbackError;

/// Query parameters of an authorization redirect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl CallbackParams {
    /// Parse a pasted redirect URL.
    ///
    /// Accepts a full URL, or just its query (`?code=..&state=..` or `code=..&state=..`).
    pub fn from_url(raw: &str) -> Result<Self, CallbackError> {
        let raw = raw.trim();

        match Url::parse(raw) {
            Ok(url) => Ok(Self::from_pairs(url.query_pairs())),
            // No scheme: a bare query, possibly carrying URLs in its values
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let query = raw.split_once('?').map_or(raw, |(_, query)| query);
                Ok(Self::from_query(query))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Parse a raw query string (without the leading `?`).
    ///
    /// Repeated keys keep their first non-empty value; unknown keys are ignored.
    #[must_use]
    pub fn from_query(query: &str) -> Self {
        Self::from_pairs(url::form_urlencoded::parse(query.as_bytes()))
    }

    fn from_pairs<'a>(pairs: impl Iterator<Item = (Cow<'a, str>, Cow<'a, str>)>) -> Self {
        let mut params = Self::default();
        for (key, value) in pairs {
            let slot = match key.as_ref() {
                "code" => &mut params.code,
                "state" => &mut params.state,
                "error" => &mut params.error,
                "error_description" => &mut params.error_description,
                _ => continue,
            };
            if slot.is_none() && !value.is_empty() {
                *slot = Some(value.into_owned());
            }
        }
        params
    }
}

/// Validate callback parameters against the store.
///
/// The state is consumed even when the provider reports an error, so a
/// denied request cannot be replayed with a forged code.
pub async fn complete_authorization(
    store: &OAuthStateStore,
    params: CallbackParams,
) -> Result<AuthorizationGrant, CallbackError> {
    let state = params
        .state
        .filter(|s| !s.is_empty())
        .ok_or(CallbackError::MissingParameter("state"))?;

    if let Some(error) = params.error {
        if let Err(e) = store.validate_and_consume_oauth_state(&state).await {
            tracing::debug!(error = %e, "Provider error carried an unusable state");
        }
        tracing::warn!(error = %error, "Identity provider denied authorization");
        return Err(CallbackError::Denied { error, description: params.error_description });
    }

    let code =
        params.code.filter(|c| !c.is_empty()).ok_or(CallbackError::MissingParameter("code"))?;
    let metadata = store.validate_and_consume_oauth_state(&state).await?;

    Ok(AuthorizationGrant { code, state, metadata })
}
