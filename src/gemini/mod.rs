use crate::config::GeminiConfig;
use crate::drive::DownstreamResponse;
use crate::error::ApiError;
use reqwest::Client;
use serde_json::json;

#[derive(Clone)]
pub struct GeminiClient {
    http: Client,
    api_url: Option<String>,
    api_key: Option<String>,
}

impl GeminiClient {
    pub fn new(http: Client, config: &GeminiConfig) -> Self {
        let non_empty = |value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_owned)
        };

        Self {
            http,
            api_url: non_empty(&config.api_url),
            api_key: non_empty(&config.api_key),
        }
    }

    pub fn ensure_configured(&self) -> Result<(), ApiError> {
        self.endpoint().map(|_| ())
    }

    fn endpoint(&self) -> Result<(&str, &str), ApiError> {
        match (self.api_url.as_deref(), self.api_key.as_deref()) {
            (Some(url), Some(key)) => Ok((url, key)),
            _ => Err(ApiError::NotConfigured(
                "Gemini API not configured (set APP__GEMINI__API_URL and APP__GEMINI__API_KEY)"
                    .to_owned(),
            )),
        }
    }

    /// Forwards the prompt and hands back the reply body untouched.
    pub async fn complete(&self, prompt: &str) -> Result<DownstreamResponse, ApiError> {
        let (url, key) = self.endpoint()?;

        let response = self
            .http
            .post(url)
            .bearer_auth(key)
            .json(&json!({ "prompt": prompt }))
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;
        tracing::debug!(status = %status, bytes = body.len(), "completion proxied");

        Ok(DownstreamResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_configuration_is_reported() {
        let client = GeminiClient::new(
            Client::new(),
            &GeminiConfig {
                api_url: Some("https://ai.example.com/v1/complete".into()),
                api_key: Some("  ".into()),
            },
        );

        assert!(client.ensure_configured().is_err());
        let err = client.complete("hi").await.unwrap_err();
        assert!(matches!(err, ApiError::NotConfigured(_)));
    }
}
