//! Typed access to the key-value store shared by every request handler.
//!
//! Keys:
//! - `google:{email}` holds a [`TokenRecord`](crate::oauth::TokenRecord)
//! - `session:{id}` holds a [`SessionRecord`](crate::session::SessionRecord)
//! - `oauth_state:{nonce}` holds a pending authorization attempt

pub mod kv;

pub use kv::{FileKvStore, InMemoryKvStore, KvStore};

use anyhow::{Context, Result};
use chrono::Duration;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

#[derive(Clone)]
pub struct TokenStore {
    kv: Arc<dyn KvStore>,
}

impl TokenStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    pub fn token_key(email: &str) -> String {
        format!("google:{email}")
    }

    pub fn session_key(session_id: &str) -> String {
        format!("session:{session_id}")
    }

    pub fn state_key(nonce: &str) -> String {
        format!("oauth_state:{nonce}")
    }

    pub async fn get_raw(&self, key: &str) -> Result<Option<String>> {
        self.kv.get(key).await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let Some(raw) = self.get_raw(key).await? else {
            return Ok(None);
        };
        let value = serde_json::from_str(&raw)
            .with_context(|| format!("corrupt record under key '{key}'"))?;
        Ok(Some(value))
    }

    pub async fn put_json<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.kv.put(key, raw, ttl).await
    }

    pub async fn take_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let Some(raw) = self.kv.take(key).await? else {
            return Ok(None);
        };
        let value = serde_json::from_str(&raw)
            .with_context(|| format!("corrupt record under key '{key}'"))?;
        Ok(Some(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Sample {
        name: String,
    }

    #[tokio::test]
    async fn json_records_roundtrip_through_kv() {
        let store = TokenStore::new(Arc::new(InMemoryKvStore::new()));
        let key = TokenStore::token_key("a@example.com");
        assert_eq!(key, "google:a@example.com");

        store
            .put_json(&key, &Sample { name: "a".into() }, None)
            .await
            .unwrap();
        let loaded: Option<Sample> = store.get_json(&key).await.unwrap();
        assert_eq!(loaded, Some(Sample { name: "a".into() }));
    }

    #[tokio::test]
    async fn corrupt_records_are_errors() {
        let kv = Arc::new(InMemoryKvStore::new());
        kv.put("session:bad", "not json".into(), None).await.unwrap();
        let store = TokenStore::new(kv);

        let result: Result<Option<Sample>> = store.get_json("session:bad").await;
        assert!(result.is_err());
    }
}
