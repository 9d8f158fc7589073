use crate::nonce::NonceSource;
use crate::store::TokenStore;
use anyhow::Result;
use axum::http::{header::COOKIE, HeaderMap};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub const SESSION_COOKIE: &str = "ca_session";

/// Stored under `session:{id}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionRecord {
    pub email: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

/// Finds the `ca_session` value in a raw `Cookie` header.
pub fn session_id_from_cookie_header(raw: &str) -> Option<&str> {
    raw.split(';').find_map(|pair| {
        let (name, value) = pair.trim_start().split_once('=')?;
        (name == SESSION_COOKIE && !value.is_empty()).then_some(value)
    })
}

pub fn session_id_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(session_id_from_cookie_header)
        .map(str::to_owned)
}

/// Maps the request's session cookie to the email it was issued for.
///
/// A record that does not decode as a [`SessionRecord`] counts as no session;
/// only store failures are errors.
pub async fn resolve_session(store: &TokenStore, headers: &HeaderMap) -> Result<Option<String>> {
    let Some(session_id) = session_id_from_headers(headers) else {
        return Ok(None);
    };

    let Some(raw) = store
        .get_raw(&TokenStore::session_key(&session_id))
        .await?
    else {
        tracing::debug!("session cookie did not match a live session");
        return Ok(None);
    };

    match serde_json::from_str::<SessionRecord>(&raw) {
        Ok(record) => Ok(Some(record.email)),
        Err(err) => {
            tracing::warn!(error = %err, "ignoring undecodable session record");
            Ok(None)
        }
    }
}

pub async fn create_session(
    store: &TokenStore,
    nonces: &dyn NonceSource,
    email: &str,
    ttl: Duration,
) -> Result<String> {
    let session_id = nonces.generate();
    let record = SessionRecord {
        email: email.to_owned(),
        created_at: Utc::now(),
    };

    store
        .put_json(&TokenStore::session_key(&session_id), &record, Some(ttl))
        .await?;

    Ok(session_id)
}

pub fn session_cookie(session_id: &str, max_age_secs: u64) -> String {
    format!(
        "{SESSION_COOKIE}={session_id}; Path=/; Secure; HttpOnly; SameSite=Lax; Max-Age={max_age_secs}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nonce::RandomNonceSource;
    use crate::store::{InMemoryKvStore, KvStore};
    use axum::http::HeaderValue;
    use std::sync::Arc;

    #[test]
    fn cookie_scan_finds_session() {
        assert_eq!(session_id_from_cookie_header("ca_session=abc"), Some("abc"));
        assert_eq!(
            session_id_from_cookie_header("theme=dark; ca_session=abc; other=1"),
            Some("abc")
        );
        assert_eq!(session_id_from_cookie_header("theme=dark"), None);
        assert_eq!(session_id_from_cookie_header("ca_session="), None);
        assert_eq!(session_id_from_cookie_header("xca_session=abc"), None);
        assert_eq!(session_id_from_cookie_header(""), None);
    }

    #[test]
    fn cookie_contract() {
        assert_eq!(
            session_cookie("s1", 2_592_000),
            "ca_session=s1; Path=/; Secure; HttpOnly; SameSite=Lax; Max-Age=2592000"
        );
    }

    #[tokio::test]
    async fn resolves_only_the_issuing_email() {
        let store = TokenStore::new(Arc::new(InMemoryKvStore::new()));
        let first = create_session(&store, &RandomNonceSource, "a@example.com", Duration::days(30))
            .await
            .unwrap();
        let second = create_session(&store, &RandomNonceSource, "b@example.com", Duration::days(30))
            .await
            .unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_str(&format!("lang=en; ca_session={first}")).unwrap(),
        );
        assert_eq!(
            resolve_session(&store, &headers).await.unwrap().as_deref(),
            Some("a@example.com")
        );

        headers.insert(
            COOKIE,
            HeaderValue::from_str(&format!("ca_session={second}")).unwrap(),
        );
        assert_eq!(
            resolve_session(&store, &headers).await.unwrap().as_deref(),
            Some("b@example.com")
        );
    }

    #[tokio::test]
    async fn unknown_or_absent_cookie_resolves_to_none() {
        let store = TokenStore::new(Arc::new(InMemoryKvStore::new()));

        assert!(resolve_session(&store, &HeaderMap::new())
            .await
            .unwrap()
            .is_none());

        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("ca_session=forged"));
        assert!(resolve_session(&store, &headers).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn undecodable_session_record_resolves_to_none() {
        let kv = Arc::new(InMemoryKvStore::new());
        kv.put("session:s1", "a@example.com".into(), None).await.unwrap();
        kv.put("session:s2", r#"{"email":42}"#.into(), None)
            .await
            .unwrap();
        let store = TokenStore::new(kv);

        for id in ["s1", "s2"] {
            let mut headers = HeaderMap::new();
            headers.insert(
                COOKIE,
                HeaderValue::from_str(&format!("ca_session={id}")).unwrap(),
            );
            assert!(resolve_session(&store, &headers).await.unwrap().is_none());
        }
    }

    #[tokio::test]
    async fn expired_session_resolves_to_none() {
        let store = TokenStore::new(Arc::new(InMemoryKvStore::new()));
        let id = create_session(&store, &RandomNonceSource, "a@example.com", Duration::seconds(-1))
            .await
            .unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_str(&format!("ca_session={id}")).unwrap(),
        );
        assert!(resolve_session(&store, &headers).await.unwrap().is_none());
    }
}
