//! Calls Google Drive and the completion endpoint on behalf of a signed-in
//! identity.

use crate::drive::{DownstreamResponse, DriveFile};
use crate::error::ApiError;
use crate::oauth::TokenRecord;
use crate::store::TokenStore;
use crate::AppState;
use anyhow::Result;
use reqwest::StatusCode;

const ENRICHMENT_FILE_LIMIT: u32 = 5;
const SNIPPET_FILE_LIMIT: usize = 2;
const SNIPPET_CHAR_LIMIT: usize = 800;

async fn load_token(state: &AppState, email: &str) -> Result<Option<TokenRecord>> {
    state.store.get_json(&TokenStore::token_key(email)).await
}

/// Lists Drive files. A 401 triggers one refresh and one retry; whatever the
/// retry returns is handed back.
pub async fn list_files(state: &AppState, email: &str) -> Result<DownstreamResponse, ApiError> {
    let mut token = load_token(state, email)
        .await?
        .ok_or_else(|| ApiError::unauthenticated("No tokens for this user. Authenticate first."))?;

    let first = state.drive.list_files_raw(&token.access_token).await?;
    if first.status != StatusCode::UNAUTHORIZED {
        return Ok(first);
    }

    let Some(refresh_token) = token.refresh_token.clone() else {
        tracing::warn!(email = %email, "access token rejected and no refresh token stored");
        return Ok(first);
    };

    tracing::info!(email = %email, "access token rejected, refreshing");
    let refreshed = state
        .oauth_client
        .refresh_access_token(&refresh_token)
        .await
        .map_err(|err| ApiError::Refresh(err.to_string()))?;

    token.apply_refresh(refreshed);
    state
        .store
        .put_json(&TokenStore::token_key(email), &token, None)
        .await?;

    let retried = state.drive.list_files_raw(&token.access_token).await?;
    if !retried.status.is_success() {
        tracing::warn!(email = %email, status = %retried.status, "listing failed after refresh");
    }
    Ok(retried)
}

/// Forwards a chat prompt, enriched with Drive context when the caller is
/// signed in.
pub async fn chat(
    state: &AppState,
    email: Option<&str>,
    prompt: &str,
) -> Result<DownstreamResponse, ApiError> {
    state.gemini.ensure_configured()?;

    let enrichment = match email {
        Some(email) => enrich(state, email).await,
        None => String::new(),
    };

    state.gemini.complete(&format!("{prompt}{enrichment}")).await
}

async fn enrich(state: &AppState, email: &str) -> String {
    match try_enrich(state, email).await {
        Ok(enrichment) => enrichment,
        Err(err) => {
            tracing::debug!(email = %email, error = %err, "prompt enrichment skipped");
            String::new()
        }
    }
}

async fn try_enrich(state: &AppState, email: &str) -> Result<String> {
    let Some(token) = load_token(state, email).await? else {
        return Ok(String::new());
    };

    let files = state
        .drive
        .list_file_metadata(&token.access_token, ENRICHMENT_FILE_LIMIT)
        .await?;

    let mut snippets = Vec::new();
    for file in files.iter().take(SNIPPET_FILE_LIMIT) {
        match state.drive.fetch_content(&token.access_token, file).await {
            Ok(text) if !text.is_empty() => {
                snippets.push((file.name.as_str(), truncate_chars(&text, SNIPPET_CHAR_LIMIT)));
            }
            Ok(_) => {}
            Err(err) => {
                tracing::debug!(file_id = %file.id, error = %err, "snippet fetch failed");
            }
        }
    }

    let mut enrichment = render_file_list(&files);
    enrichment.push_str(&render_snippets(&snippets));
    Ok(enrichment)
}

fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((end, _)) => text[..end].to_owned(),
        None => text.to_owned(),
    }
}

fn render_file_list(files: &[DriveFile]) -> String {
    let list = files
        .iter()
        .map(|file| format!("- {} ({})", file.name, file.mime_type))
        .collect::<Vec<_>>()
        .join("\n");
    format!("\n\n[User Drive files]\n{list}")
}

fn render_snippets(snippets: &[(&str, String)]) -> String {
    if snippets.is_empty() {
        return String::new();
    }

    let body = snippets
        .iter()
        .map(|(name, text)| format!("--- {name} ---\n{text}\n"))
        .collect::<Vec<_>>()
        .join("\n");
    format!("\n\n[File snippets]\n{body}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_counts_characters() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("short", 800), "short");
        assert_eq!(truncate_chars(&"x".repeat(900), 800).len(), 800);
    }

    #[test]
    fn enrichment_layout() {
        let files = vec![
            DriveFile {
                id: "1".into(),
                name: "Plan".into(),
                mime_type: "application/vnd.google-apps.document".into(),
            },
            DriveFile {
                id: "2".into(),
                name: "notes.txt".into(),
                mime_type: "text/plain".into(),
            },
        ];

        assert_eq!(
            render_file_list(&files),
            "\n\n[User Drive files]\n- Plan (application/vnd.google-apps.document)\n- notes.txt (text/plain)"
        );
        assert_eq!(
            render_snippets(&[("Plan", "step one".to_owned()), ("notes.txt", "buy milk".to_owned())]),
            "\n\n[File snippets]\n--- Plan ---\nstep one\n\n--- notes.txt ---\nbuy milk\n"
        );
        assert!(render_snippets(&[]).is_empty());
    }
}
