pub mod config;
pub mod drive;
pub mod error;
pub mod gemini;
pub mod handlers;
pub mod nonce;
pub mod oauth;
pub mod proxy;
pub mod session;
pub mod store;

use anyhow::Result;
use config::AppConfig;
use drive::DriveClient;
use gemini::GeminiClient;
use nonce::{NonceSource, RandomNonceSource};
use oauth::GoogleOAuthClient;
use std::{sync::Arc, time::Duration};
use store::{KvStore, TokenStore};

/// Per-process handles shared by every request. Holds no per-request state;
/// anything that must outlive a request goes through `store`.
pub struct AppState {
    pub config: AppConfig,
    pub oauth_client: GoogleOAuthClient,
    pub drive: DriveClient,
    pub gemini: GeminiClient,
    pub store: TokenStore,
    pub nonces: Arc<dyn NonceSource>,
}

impl AppState {
    pub fn new(config: AppConfig, kv: Arc<dyn KvStore>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("cloudassistant-gateway/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.http.timeout_secs))
            .connect_timeout(Duration::from_secs(config.http.connect_timeout_secs))
            .build()?;

        let oauth_client = GoogleOAuthClient::from_config(&config.oauth, http.clone())?;
        let drive = DriveClient::new(http.clone(), &config.google.drive_api_base)?;
        let gemini = GeminiClient::new(http, &config.gemini);

        Ok(Self {
            config,
            oauth_client,
            drive,
            gemini,
            store: TokenStore::new(kv),
            nonces: Arc::new(RandomNonceSource),
        })
    }

    pub fn with_nonce_source(mut self, nonces: Arc<dyn NonceSource>) -> Self {
        self.nonces = nonces;
        self
    }
}
