//! Authorization-code login: `start` sends the browser to Google, `callback`
//! trades the returned code for tokens and opens a session.

use super::{OAuthError, TokenRecord};
use crate::error::ApiError;
use crate::session;
use crate::store::TokenStore;
use crate::AppState;
use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

pub const AUTH_MESSAGE_TYPE: &str = "cloudassistant:gauth";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowStage {
    PendingProvider,
    CallbackReceived,
    TokenExchanged,
    SessionEstablished,
}

impl FlowStage {
    pub fn as_str(self) -> &'static str {
        match self {
            FlowStage::PendingProvider => "pending_provider",
            FlowStage::CallbackReceived => "callback_received",
            FlowStage::TokenExchanged => "token_exchanged",
            FlowStage::SessionEstablished => "session_established",
        }
    }
}

/// Stored under `oauth_state:{nonce}` until the callback consumes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingAuthorization {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CallbackOutcome {
    pub email: String,
    pub session_id: String,
}

pub async fn start(state: &AppState) -> Result<Url, ApiError> {
    let nonce = state.nonces.generate();
    let ttl = state.config.security.state_ttl();

    state
        .store
        .put_json(
            &TokenStore::state_key(&nonce),
            &PendingAuthorization {
                created_at: Utc::now(),
            },
            Some(ttl),
        )
        .await?;

    let url = state
        .oauth_client
        .authorize_url(&state.config.server.callback_url(), &nonce);

    tracing::info!(stage = FlowStage::PendingProvider.as_str(), "redirecting to provider");
    Ok(url)
}

pub async fn callback(
    state: &AppState,
    code: Option<&str>,
    csrf_state: Option<&str>,
) -> Result<CallbackOutcome, ApiError> {
    let code = code
        .filter(|code| !code.is_empty())
        .ok_or(ApiError::MissingCode)?;

    if state.config.security.validate_state {
        let nonce = csrf_state
            .filter(|nonce| !nonce.is_empty())
            .ok_or(ApiError::InvalidState)?;
        let pending: Option<PendingAuthorization> = state
            .store
            .take_json(&TokenStore::state_key(nonce))
            .await?;
        if pending.is_none() {
            return Err(ApiError::InvalidState);
        }
    }
    tracing::info!(stage = FlowStage::CallbackReceived.as_str(), "authorization code received");

    let redirect_uri = state.config.server.callback_url();
    let grant = state
        .oauth_client
        .exchange_code(code, &redirect_uri)
        .await
        .map_err(|err| match err {
            OAuthError::Provider(body) => ApiError::TokenExchange(body),
            other => ApiError::Unhandled(anyhow!(other).context("token exchange failed")),
        })?;
    tracing::info!(
        stage = FlowStage::TokenExchanged.as_str(),
        has_refresh_token = grant.refresh_token.is_some(),
        "authorization code exchanged"
    );

    let profile = state
        .oauth_client
        .fetch_profile(&grant.access_token)
        .await
        .map_err(|err| ApiError::Unhandled(anyhow!(err).context("profile lookup failed")))?;
    let email = profile.identity();

    let record = TokenRecord::from_grant(email.clone(), grant);
    state
        .store
        .put_json(&TokenStore::token_key(&email), &record, None)
        .await?;

    let ttl = state.config.security.session_ttl();
    let session_id =
        session::create_session(&state.store, state.nonces.as_ref(), &email, ttl).await?;

    tracing::info!(
        stage = FlowStage::SessionEstablished.as_str(),
        email = %email,
        "sign-in complete"
    );

    Ok(CallbackOutcome { email, session_id })
}

/// Page shown in the sign-in popup. It notifies the opener window and closes
/// itself.
pub fn completion_page(email: &str) -> String {
    let email_literal = js_string_literal(email);
    let message_type = js_string_literal(AUTH_MESSAGE_TYPE);

    format!(
        r#"<!doctype html><html><head><meta charset="utf-8"><title>Auth complete</title></head><body>
<script>
  var email = {email_literal};
  try {{
    window.opener.postMessage({{ type: {message_type}, email: email }}, '*');
  }} catch (e) {{}}
  document.body.appendChild(document.createTextNode('Authentication successful for ' + email + '. You can close this window.'));
  setTimeout(function () {{ window.close(); }}, 1200);
</script>
</body></html>"#
    )
}

// JSON string with `<`, `>` and `&` escaped so it cannot close the script
// element.
fn js_string_literal(value: &str) -> String {
    serde_json::Value::String(value.to_owned())
        .to_string()
        .replace('<', "\\u003c")
        .replace('>', "\\u003e")
        .replace('&', "\\u0026")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_page_posts_tagged_message() {
        let page = completion_page("a@example.com");
        assert!(page.contains(r#"var email = "a@example.com";"#));
        assert!(page.contains(r#"type: "cloudassistant:gauth""#));
        assert!(page.contains("window.close()"));
    }

    #[test]
    fn completion_page_escapes_script_breakouts() {
        let page = completion_page("</script><script>alert(1)</script>");
        assert!(!page.contains("</script><script>alert"));
        assert!(page.contains("\\u003c/script\\u003e"));
    }
}
