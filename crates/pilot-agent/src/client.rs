//! HTTP client for OpenAI-compatible chat completion endpoints
//!
//! Each call sends exactly one user message. Rate limits (429) and server
//! errors (5xx) are retried with doubling backoff; everything else fails fast.

use crate::auth::OracleCredentials;
use crate::types::{ChatMessage, ChatRequest, ChatResponse};
use crate::Oracle;
use async_trait::async_trait;
use pilot_core::{OracleSettings, PilotError, Result};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use std::time::Duration;

const MAX_BACKOFF_SECS: u64 = 60;

/// Oracle backed by a chat completions API
#[derive(Debug, Clone)]
pub struct OracleClient {
    http: reqwest::Client,
    credentials: OracleCredentials,
    max_tokens: Option<usize>,
    max_retries: u32,
    initial_backoff: Duration,
}

impl OracleClient {
    pub fn new(credentials: OracleCredentials, settings: &OracleSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .map_err(|e| PilotError::Oracle(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            credentials,
            max_tokens: settings.max_tokens,
            max_retries: settings.max_retries,
            initial_backoff: Duration::from_secs(settings.initial_backoff_secs),
        })
    }

    /// Resolve credentials from the environment and build a client
    pub fn from_settings(settings: &OracleSettings) -> Result<Self> {
        let credentials = OracleCredentials::from_env(settings)?;
        Self::new(credentials, settings)
    }

    pub fn model(&self) -> &str {
        &self.credentials.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.credentials.base_url.trim_end_matches('/')
        )
    }

    fn request(&self, prompt: &str) -> ChatRequest {
        ChatRequest {
            model: self.credentials.model.clone(),
            messages: vec![ChatMessage::user(prompt)],
            max_tokens: self.max_tokens,
        }
    }
}

#[async_trait]
impl Oracle for OracleClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let endpoint = self.endpoint();
        let request = self.request(prompt);

        let mut retries = 0;
        let mut backoff = self.initial_backoff;

        loop {
            tracing::debug!(
                "Sending prompt to {} ({} chars, attempt {})",
                self.credentials.model,
                prompt.len(),
                retries + 1
            );

            let response = self
                .http
                .post(&endpoint)
                .bearer_auth(&self.credentials.api_key)
                .json(&request)
                .send()
                .await
                .map_err(classify_send_error)?;

            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                if retries >= self.max_retries {
                    let error_text = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "Unknown".to_string());
                    let message = format!(
                        "{} after {} retries. Last error: {}",
                        status, self.max_retries, error_text
                    );
                    return Err(if status == StatusCode::TOO_MANY_REQUESTS {
                        PilotError::OracleLimit(message)
                    } else {
                        PilotError::Oracle(message)
                    });
                }

                retries += 1;
                let wait = retry_after(response.headers()).unwrap_or(backoff);
                tracing::warn!(
                    "Oracle returned {}. Waiting {:?} before retry {}/{}",
                    status,
                    wait,
                    retries,
                    self.max_retries
                );
                tokio::time::sleep(wait).await;
                backoff = (backoff * 2).min(Duration::from_secs(MAX_BACKOFF_SECS));
                continue;
            }

            if !status.is_success() {
                let error_text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown".to_string());
                return Err(PilotError::Oracle(format!(
                    "Oracle API error {}: {}",
                    status, error_text
                )));
            }

            let body: ChatResponse = response
                .json()
                .await
                .map_err(|e| PilotError::Oracle(format!("Failed to parse response: {}", e)))?;

            let output = body
                .first_content()
                .ok_or_else(|| PilotError::Oracle("No content in response".to_string()))?
                .to_string();

            match body.usage {
                Some(usage) => tracing::info!(
                    "Oracle answered ({} chars, {} prompt tokens, {} completion tokens)",
                    output.len(),
                    usage.prompt_tokens,
                    usage.completion_tokens
                ),
                None => tracing::info!("Oracle answered ({} chars)", output.len()),
            }

            return Ok(output);
        }
    }
}

fn classify_send_error(e: reqwest::Error) -> PilotError {
    if e.is_timeout() {
        PilotError::Timeout(format!("Oracle request timed out: {}", e))
    } else if e.is_connect() {
        PilotError::Connection(format!("Failed to reach oracle: {}", e))
    } else {
        PilotError::Network(format!("Failed to send request: {}", e))
    }
}

/// Seconds from a `retry-after` header, if present and numeric
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn client(base_url: &str) -> OracleClient {
        let credentials = OracleCredentials {
            api_key: "sk-test".to_string(),
            base_url: base_url.to_string(),
            model: "gpt-4o-mini".to_string(),
        };
        let settings = OracleSettings {
            max_tokens: Some(512),
            ..OracleSettings::default()
        };
        OracleClient::new(credentials, &settings).unwrap()
    }

    #[test]
    fn test_endpoint_joins_base_url() {
        assert_eq!(
            client("https://api.openai.com/v1").endpoint(),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            client("http://localhost:11434/v1/").endpoint(),
            "http://localhost:11434/v1/chat/completions"
        );
    }

    #[test]
    fn test_request_is_single_user_message() {
        let request = client("https://api.openai.com/v1").request("next action?");
        assert_eq!(request.model, "gpt-4o-mini");
        assert_eq!(request.messages, vec![ChatMessage::user("next action?")]);
        assert_eq!(request.max_tokens, Some(512));
    }

    #[test]
    fn test_retry_after_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(retry_after(&headers), None);

        headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(7)));

        headers.insert(RETRY_AFTER, HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"));
        assert_eq!(retry_after(&headers), None);
    }
}
