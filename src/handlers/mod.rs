use crate::drive::DownstreamResponse;
use crate::error::ApiError;
use crate::oauth::flow;
use crate::session;
use crate::AppState;
use axum::body::Bytes;
use axum::extract::Query;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::{Extension, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/ping", get(ping))
        .route("/auth/google/start", get(auth_start))
        .route("/auth/google/callback", get(auth_callback))
        .route("/api/drive/list", get(drive_list))
        .route("/api/chat/gemini", post(chat_gemini))
        .fallback(not_found)
        .layer(Extension(state))
}

async fn ping() -> impl IntoResponse {
    Json(json!({ "ok": true, "now": Utc::now().timestamp_millis() }))
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not found")
}

async fn auth_start(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let url = flow::start(&state).await?;
    Ok((StatusCode::FOUND, [(header::LOCATION, url.to_string())]))
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    state: Option<String>,
}

async fn auth_callback(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<CallbackQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = flow::callback(&state, query.code.as_deref(), query.state.as_deref()).await?;
    let cookie = session::session_cookie(&outcome.session_id, state.config.security.session_max_age());

    Ok((
        [(header::SET_COOKIE, cookie)],
        Html(flow::completion_page(&outcome.email)),
    ))
}

#[derive(Debug, Deserialize)]
struct DriveListQuery {
    #[serde(default)]
    email: Option<String>,
}

async fn drive_list(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<DriveListQuery>,
) -> Result<Response, ApiError> {
    let email = match session::resolve_session(&state.store, &headers).await? {
        Some(email) => email,
        None => fallback_email(&state, query.email)?,
    };

    let listing = crate::proxy::list_files(&state, &email).await?;
    Ok(json_passthrough(listing))
}

// Unauthenticated identification kept for older clients that pass `?email=`.
fn fallback_email(state: &AppState, email: Option<String>) -> Result<String, ApiError> {
    let email = email
        .filter(|email| !email.trim().is_empty())
        .filter(|_| state.config.security.allow_email_fallback)
        .ok_or_else(|| ApiError::unauthenticated("Missing authenticated session or email param"))?;

    tracing::warn!(email = %email, "drive listing identified by query parameter, not session");
    Ok(email)
}

#[derive(Debug, Default, Deserialize)]
struct ChatRequest {
    #[serde(default)]
    prompt: Value,
}

impl ChatRequest {
    /// `null`, `false`, `0` and `""` mean no prompt. Any other value is
    /// forwarded as its JSON text.
    fn prompt_text(&self) -> String {
        match &self.prompt {
            Value::String(text) => text.clone(),
            Value::Null | Value::Bool(false) => String::new(),
            Value::Number(number) if number.as_f64() == Some(0.0) => String::new(),
            other => other.to_string(),
        }
    }
}

async fn chat_gemini(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request: ChatRequest = serde_json::from_slice(&body).unwrap_or_default();
    let prompt = request.prompt_text();

    let email = session::resolve_session(&state.store, &headers).await?;
    let reply = crate::proxy::chat(&state, email.as_deref(), &prompt).await?;
    Ok(json_passthrough(reply))
}

fn json_passthrough(reply: DownstreamResponse) -> Response {
    (
        reply.status,
        [(header::CONTENT_TYPE, "application/json")],
        reply.body,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompt_of(body: &str) -> String {
        serde_json::from_str::<ChatRequest>(body)
            .unwrap_or_default()
            .prompt_text()
    }

    #[test]
    fn chat_prompt_accepts_any_json_value() {
        assert_eq!(prompt_of(r#"{"prompt":"hi"}"#), "hi");
        assert_eq!(prompt_of(r#"{"prompt":42}"#), "42");
        assert_eq!(prompt_of(r#"{"prompt":true}"#), "true");
        assert_eq!(prompt_of(r#"{"prompt":["a",1]}"#), r#"["a",1]"#);
        assert_eq!(prompt_of(r#"{"prompt":null}"#), "");
        assert_eq!(prompt_of(r#"{"prompt":false}"#), "");
        assert_eq!(prompt_of(r#"{"prompt":0}"#), "");
        assert_eq!(prompt_of(r#"{}"#), "");
        assert_eq!(prompt_of("not json"), "");
    }
}
