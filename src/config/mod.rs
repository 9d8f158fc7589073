use anyhow::Result;
use chrono::Duration;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub oauth: OAuthConfig,
    #[serde(default)]
    pub google: GoogleConfig,
    #[serde(default)]
    pub gemini: GeminiConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "ServerConfig::default_bind_address")]
    pub bind_address: String,
    /// Origin the browser reaches this service on. The OAuth redirect URI is
    /// derived from it.
    #[serde(default = "ServerConfig::default_public_url")]
    pub public_url: String,
}

impl ServerConfig {
    fn default_bind_address() -> String {
        "127.0.0.1:8080".to_owned()
    }

    fn default_public_url() -> String {
        "http://localhost:8080".to_owned()
    }

    pub fn callback_url(&self) -> String {
        format!(
            "{}/auth/google/callback",
            self.public_url.trim_end_matches('/')
        )
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: Self::default_bind_address(),
            public_url: Self::default_public_url(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "OAuthConfig::default_auth_url")]
    pub auth_url: String,
    #[serde(default = "OAuthConfig::default_token_url")]
    pub token_url: String,
    #[serde(default = "OAuthConfig::default_userinfo_url")]
    pub userinfo_url: String,
    #[serde(default = "OAuthConfig::default_scopes")]
    pub scopes: Vec<String>,
}

impl OAuthConfig {
    pub fn default_auth_url() -> String {
        "https://accounts.google.com/o/oauth2/v2/auth".to_owned()
    }

    pub fn default_token_url() -> String {
        "https://oauth2.googleapis.com/token".to_owned()
    }

    pub fn default_userinfo_url() -> String {
        "https://www.googleapis.com/oauth2/v3/userinfo".to_owned()
    }

    pub fn default_scopes() -> Vec<String> {
        vec![
            "openid".to_owned(),
            "email".to_owned(),
            "profile".to_owned(),
            "https://www.googleapis.com/auth/drive.readonly".to_owned(),
        ]
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GoogleConfig {
    #[serde(default = "GoogleConfig::default_drive_api_base")]
    pub drive_api_base: String,
}

impl GoogleConfig {
    pub fn default_drive_api_base() -> String {
        "https://www.googleapis.com/drive/v3".to_owned()
    }
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            drive_api_base: Self::default_drive_api_base(),
        }
    }
}

/// Downstream completion endpoint. Both values are secrets supplied by the
/// deployment; chat requests fail while either is missing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GeminiConfig {
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    #[serde(default = "SecurityConfig::default_token_store_path")]
    pub token_store_path: String,
    #[serde(default)]
    pub use_in_memory: bool,
    #[serde(default = "SecurityConfig::default_session_ttl_secs")]
    pub session_ttl_secs: u64,
    #[serde(default = "SecurityConfig::default_state_ttl_secs")]
    pub state_ttl_secs: u64,
    #[serde(default = "SecurityConfig::default_true")]
    pub validate_state: bool,
    #[serde(default = "SecurityConfig::default_true")]
    pub allow_email_fallback: bool,
}

impl SecurityConfig {
    fn default_token_store_path() -> String {
        "config/tokens.json".to_owned()
    }

    pub fn default_session_ttl_secs() -> u64 {
        60 * 60 * 24 * 30
    }

    pub fn default_state_ttl_secs() -> u64 {
        600
    }

    fn default_true() -> bool {
        true
    }

    /// Upper bound applied to both configured lifetimes.
    pub const MAX_TTL_SECS: u64 = 60 * 60 * 24 * 365 * 10;

    /// Session lifetime in seconds, used for the cookie `Max-Age` and the
    /// stored record.
    pub fn session_max_age(&self) -> u64 {
        self.session_ttl_secs.min(Self::MAX_TTL_SECS)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::seconds(self.session_max_age() as i64)
    }

    pub fn state_ttl(&self) -> Duration {
        Duration::seconds(self.state_ttl_secs.min(Self::MAX_TTL_SECS) as i64)
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            token_store_path: Self::default_token_store_path(),
            use_in_memory: false,
            session_ttl_secs: Self::default_session_ttl_secs(),
            state_ttl_secs: Self::default_state_ttl_secs(),
            validate_state: true,
            allow_email_fallback: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "HttpConfig::default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "HttpConfig::default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl HttpConfig {
    fn default_timeout_secs() -> u64 {
        30
    }

    fn default_connect_timeout_secs() -> u64 {
        10
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: Self::default_timeout_secs(),
            connect_timeout_secs: Self::default_connect_timeout_secs(),
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let builder = Config::builder()
            .add_source(File::with_name("config/config").required(false))
            .add_source(File::with_name("config/config.local").required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .list_separator(" ")
                    .with_list_parse_key("oauth.scopes")
                    .try_parsing(true),
            );

        let cfg = builder.build()?;
        cfg.try_deserialize().map_err(|err: ConfigError| err.into())
    }
}
