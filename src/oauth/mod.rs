pub mod flow;

use crate::config::OAuthConfig;
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum OAuthError {
    /// The token endpoint answered with an `error` field. The body is kept
    /// as received.
    #[error("provider returned an error: {0}")]
    Provider(Value),
    #[error("provider request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected provider response: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Persisted credentials for one Google identity, stored under
/// `google:{email}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenRecord {
    pub email: String,
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub obtained_at: DateTime<Utc>,
}

impl TokenRecord {
    pub fn from_grant(email: impl Into<String>, grant: TokenGrant) -> Self {
        Self {
            email: email.into(),
            access_token: grant.access_token,
            refresh_token: grant.refresh_token,
            scope: grant.scope,
            expires_in: grant.expires_in,
            obtained_at: Utc::now(),
        }
    }

    /// Email and scope stay; the access token is replaced wholesale.
    pub fn apply_refresh(&mut self, refreshed: RefreshedToken) {
        self.access_token = refreshed.access_token;
        self.expires_in = refreshed.expires_in;
        self.obtained_at = refreshed.obtained_at;
        self.refresh_token = Some(refreshed.refresh_token);
    }
}

/// Successful token endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshedToken {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: Option<i64>,
    pub obtained_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub sub: Option<String>,
}

impl UserProfile {
    /// Email when present, otherwise the subject id, otherwise `"unknown"`.
    pub fn identity(&self) -> String {
        self.email
            .as_deref()
            .filter(|email| !email.is_empty())
            .or(self.sub.as_deref().filter(|sub| !sub.is_empty()))
            .unwrap_or("unknown")
            .to_owned()
    }
}

#[derive(Clone)]
pub struct GoogleOAuthClient {
    http: Client,
    client_id: String,
    client_secret: String,
    auth_url: Url,
    token_url: Url,
    userinfo_url: Url,
    scopes: Vec<String>,
}

impl GoogleOAuthClient {
    pub fn from_config(config: &OAuthConfig, http: Client) -> Result<Self> {
        let auth_url =
            Url::parse(&config.auth_url).map_err(|e| anyhow!("invalid auth url: {e}"))?;
        let token_url =
            Url::parse(&config.token_url).map_err(|e| anyhow!("invalid token url: {e}"))?;
        let userinfo_url = Url::parse(&config.userinfo_url)
            .map_err(|e| anyhow!("invalid userinfo url: {e}"))?;

        Ok(Self {
            http,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            auth_url,
            token_url,
            userinfo_url,
            scopes: config.scopes.clone(),
        })
    }

    pub fn authorize_url(&self, redirect_uri: &str, state: &str) -> Url {
        let mut url = self.auth_url.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &self.scopes.join(" "))
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent")
            .append_pair("state", state);
        url
    }

    pub async fn exchange_code(
        &self,
        authorization_code: &str,
        redirect_uri: &str,
    ) -> Result<TokenGrant, OAuthError> {
        let form = [
            ("code", authorization_code),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("redirect_uri", redirect_uri),
            ("grant_type", "authorization_code"),
        ];

        self.token_request(&form).await
    }

    /// Trades a refresh token for a new access token. Never retries.
    pub async fn refresh_access_token(
        &self,
        refresh_token: &str,
    ) -> Result<RefreshedToken, OAuthError> {
        let form = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        let grant = self.token_request(&form).await?;

        Ok(RefreshedToken {
            access_token: grant.access_token,
            refresh_token: grant
                .refresh_token
                .unwrap_or_else(|| refresh_token.to_owned()),
            expires_in: grant.expires_in,
            obtained_at: Utc::now(),
        })
    }

    pub async fn fetch_profile(&self, access_token: &str) -> Result<UserProfile, OAuthError> {
        let profile = self
            .http
            .get(self.userinfo_url.clone())
            .bearer_auth(access_token)
            .send()
            .await?
            .json::<UserProfile>()
            .await?;
        Ok(profile)
    }

    // Google reports failures in the body; the HTTP status is not consulted.
    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenGrant, OAuthError> {
        let body = self
            .http
            .post(self.token_url.clone())
            .form(form)
            .send()
            .await?
            .text()
            .await?;

        let value: Value = serde_json::from_str(&body)?;
        if value.get("error").is_some_and(|error| !error.is_null()) {
            return Err(OAuthError::Provider(value));
        }

        Ok(serde_json::from_value(value)?)
    }
}
