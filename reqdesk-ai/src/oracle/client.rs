//! OpenAI-compatible chat completion client

use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::time::Duration;
use reqdesk_common::config::OracleConfig;

use super::{Oracle, OracleError, StructuredPrompt};

const USER_AGENT: &str = concat!("reqdesk/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// HTTP oracle backed by a chat completion endpoint
///
/// Outbound calls are paced by a direct `governor` limiter; each call carries
/// the configured timeout.
pub struct ChatCompletionClient {
    client: Client,
    endpoint: String,
    model: String,
    temperature: f32,
    api_key: String,
    rate_limiter: RateLimiter<
        governor::state::direct::NotKeyed,
        governor::state::InMemoryState,
        governor::clock::DefaultClock,
    >,
}

impl ChatCompletionClient {
    /// Build a client from configuration
    ///
    /// Fails if no API key is configured or the pacing quota is zero.
    pub fn from_config(config: &OracleConfig) -> Result<Self, OracleError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| OracleError::Config("Oracle API key is not configured".to_string()))?;

        let per_second = NonZeroU32::new(config.requests_per_second).ok_or_else(|| {
            OracleError::Config("oracle.requests_per_second must be at least 1".to_string())
        })?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| OracleError::Config(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            temperature: config.temperature,
            api_key,
            rate_limiter: RateLimiter::direct(Quota::per_second(per_second)),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Oracle for ChatCompletionClient {
    async fn complete(&self, prompt: &StructuredPrompt) -> Result<String, OracleError> {
        self.rate_limiter.until_ready().await;

        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &prompt.system,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            temperature: self.temperature,
        };

        tracing::debug!(endpoint = %self.endpoint, model = %self.model, "Calling oracle");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| OracleError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "Oracle returned error status");
            return Err(OracleError::Unavailable {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| OracleError::Network(format!("Unreadable oracle response: {}", e)))?;

        Ok(parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_key() -> OracleConfig {
        OracleConfig {
            api_key: Some("sk-test".to_string()),
            ..OracleConfig::default()
        }
    }

    #[test]
    fn test_missing_key_is_config_error() {
        let err = ChatCompletionClient::from_config(&OracleConfig::default()).err().unwrap();
        assert!(matches!(err, OracleError::Config(_)));
    }

    #[test]
    fn test_zero_rate_is_config_error() {
        let config = OracleConfig {
            requests_per_second: 0,
            ..config_with_key()
        };
        assert!(ChatCompletionClient::from_config(&config).is_err());
    }

    #[test]
    fn test_endpoint_joins_base_url() {
        let config = OracleConfig {
            base_url: "http://localhost:9000/v1/".to_string(),
            ..config_with_key()
        };
        let client = ChatCompletionClient::from_config(&config).unwrap();
        assert_eq!(client.endpoint(), "http://localhost:9000/v1/chat/completions");
    }

    #[test]
    fn test_empty_choices_deserialize() {
        let parsed: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(parsed.choices.is_empty());

        let parsed: ChatResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"content":"education, travel"}}]}"#)
                .unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("education, travel"));
    }
}
