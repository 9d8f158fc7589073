use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tokio::task;

/// String key-value persistence. Writes are last-write-wins per key; no
/// cross-key transactions.
#[async_trait]
pub trait KvStore: Send + Sync + 'static {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn put(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()>;
    /// Removes the entry and returns its value if it was still live.
    async fn take(&self, key: &str) -> Result<Option<String>>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Entry {
    value: String,
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    expires_at: Option<DateTime<Utc>>,
}

impl Entry {
    fn new(value: String, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|ttl| {
                Utc::now()
                    .checked_add_signed(ttl)
                    .unwrap_or(DateTime::<Utc>::MAX_UTC)
            }),
        }
    }

    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(true, |expiry| expiry > now)
    }
}

fn purge_expired(entries: &mut HashMap<String, Entry>) {
    let now = Utc::now();
    entries.retain(|_, entry| entry.is_live(now));
}

#[derive(Debug, Default)]
pub struct InMemoryKvStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for InMemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.read();
        Ok(entries
            .get(key)
            .filter(|entry| entry.is_live(Utc::now()))
            .map(|entry| entry.value.clone()))
    }

    async fn put(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()> {
        let mut entries = self.entries.write();
        purge_expired(&mut entries);
        entries.insert(key.to_owned(), Entry::new(value, ttl));
        Ok(())
    }

    async fn take(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.entries.write();
        Ok(entries
            .remove(key)
            .filter(|entry| entry.is_live(Utc::now()))
            .map(|entry| entry.value))
    }
}

/// Keeps every entry in memory and rewrites the whole JSON document on each
/// mutation. Flushes run one at a time and replace the file by rename.
#[derive(Debug)]
pub struct FileKvStore {
    path: PathBuf,
    cache: RwLock<HashMap<String, Entry>>,
    flush_lock: Mutex<()>,
}

impl FileKvStore {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut cache = if path.exists() {
            let data = fs::read_to_string(&path)?;
            if data.trim().is_empty() {
                HashMap::new()
            } else {
                serde_json::from_str::<HashMap<String, Entry>>(&data)?
            }
        } else {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            HashMap::new()
        };
        purge_expired(&mut cache);

        tracing::debug!(path = %path.display(), entries = cache.len(), "loaded key-value store");

        Ok(Self {
            path,
            cache: RwLock::new(cache),
            flush_lock: Mutex::new(()),
        })
    }

    // The snapshot is taken under the lock, so the last flush to finish
    // always carries the newest cache contents.
    async fn flush(&self) -> Result<()> {
        let _guard = self.flush_lock.lock().await;
        let snapshot = { self.cache.read().clone() };
        let path = self.path.clone();

        task::spawn_blocking(move || -> Result<()> {
            let body = serde_json::to_string_pretty(&snapshot)?;
            let temp_path = path.with_extension("json.tmp");
            fs::write(&temp_path, body)?;
            fs::rename(&temp_path, &path)?;
            Ok(())
        })
        .await?
    }
}

#[async_trait]
impl KvStore for FileKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let cache = self.cache.read();
        Ok(cache
            .get(key)
            .filter(|entry| entry.is_live(Utc::now()))
            .map(|entry| entry.value.clone()))
    }

    async fn put(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()> {
        {
            let mut cache = self.cache.write();
            purge_expired(&mut cache);
            cache.insert(key.to_owned(), Entry::new(value, ttl));
        }

        self.flush().await
    }

    async fn take(&self, key: &str) -> Result<Option<String>> {
        let removed = { self.cache.write().remove(key) };
        let Some(entry) = removed else {
            return Ok(None);
        };

        self.flush().await?;
        let live = entry.is_live(Utc::now());
        Ok(live.then_some(entry.value))
    }
}
