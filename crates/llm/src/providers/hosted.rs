//! Hosted text-generation provider.
//!
//! Talks to a `generateContent`-style HTTPS API authenticated with an API
//! key header. Responses carry a list of candidates, each with content
//! parts and a finish reason.

use crate::client::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
use crate::error::LlmError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default API base URL.
pub const DEFAULT_HOSTED_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

/// Hosted generation client.
pub struct HostedClient {
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
    client: reqwest::Client,
}

impl HostedClient {
    /// Create a client against the default endpoint.
    pub fn new(api_key: Option<String>, timeout: Duration) -> Self {
        Self::with_base_url(DEFAULT_HOSTED_ENDPOINT, api_key, timeout)
    }

    /// Create a client against a custom base URL.
    pub fn with_base_url(base_url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            timeout,
            client,
        }
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.base_url, model)
    }

    fn to_generate_request(request: &LlmRequest) -> GenerateRequest {
        GenerateRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: request.prompt.clone(),
                }],
            }],
            system_instruction: request.system.as_ref().map(|system| Content {
                role: None,
                parts: vec![Part {
                    text: system.clone(),
                }],
            }),
            generation_config: GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_tokens,
            },
        }
    }

    async fn send(&self, request: &LlmRequest, api_key: &str) -> Result<LlmResponse, LlmError> {
        let response = self
            .client
            .post(self.endpoint(&request.model))
            .header(API_KEY_HEADER, api_key)
            .json(&Self::to_generate_request(request))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout {
                        model: request.model.clone(),
                        secs: self.timeout.as_secs(),
                    }
                } else {
                    LlmError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::Transport(format!("Failed to read response body: {}", e)))?;

        if !status.is_success() {
            return Err(LlmError::from_status(status.as_u16(), &body, &request.model));
        }

        parse_response(&body, &request.model)
    }
}

/// Decode a successful response body.
pub(crate) fn parse_response(body: &str, model: &str) -> Result<LlmResponse, LlmError> {
    let parsed: GenerateResponse = serde_json::from_str(body)
        .map_err(|e| LlmError::MalformedResponse(format!("Failed to parse response: {}", e)))?;

    let candidate = parsed.candidates.into_iter().next().ok_or(LlmError::EmptyResponse)?;

    match candidate.finish_reason.as_deref() {
        None | Some("STOP") => {}
        Some("MAX_TOKENS") => {
            tracing::warn!("Model {} stopped at the token limit; answer may be truncated", model);
        }
        Some(other) => return Err(LlmError::UnexpectedFinish(other.to_string())),
    }

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().map(|p| p.text).collect::<Vec<_>>().join(""))
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(LlmError::EmptyResponse);
    }

    let usage = parsed
        .usage_metadata
        .map(|u| LlmUsage::new(u.prompt_token_count, u.candidates_token_count))
        .unwrap_or_default();

    Ok(LlmResponse {
        content: text,
        model: model.to_string(),
        usage,
    })
}

#[async_trait::async_trait]
impl LlmClient for HostedClient {
    fn provider_name(&self) -> &str {
        "hosted"
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| LlmError::NotConfigured("no API key configured".to_string()))?;

        tracing::debug!("Sending completion request to hosted model {}", request.model);

        match tokio::time::timeout(self.timeout, self.send(request, api_key)).await {
            Ok(result) => result,
            Err(_) => Err(LlmError::Timeout {
                model: request.model.clone(),
                secs: self.timeout.as_secs(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unconfigured_without_key() {
        let client = HostedClient::new(None, Duration::from_secs(5));
        assert!(!client.is_configured());

        let blank = HostedClient::new(Some("  ".to_string()), Duration::from_secs(5));
        assert!(!blank.is_configured());

        let keyed = HostedClient::new(Some("secret".to_string()), Duration::from_secs(5));
        assert!(keyed.is_configured());
        assert_eq!(keyed.provider_name(), "hosted");
    }

    #[test]
    fn test_endpoint_format() {
        let client = HostedClient::with_base_url("http://localhost:9000/", None, Duration::from_secs(5));
        assert_eq!(
            client.endpoint("m1"),
            "http://localhost:9000/models/m1:generateContent"
        );
    }

    #[test]
    fn test_request_serialization() {
        let request = LlmRequest::new("What is the refund policy?", "m1")
            .with_system("Only use context")
            .with_temperature(0.3);
        let json = serde_json::to_value(HostedClient::to_generate_request(&request)).unwrap();

        assert_eq!(json["contents"][0]["parts"][0]["text"], "What is the refund policy?");
        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "Only use context");
        assert!(json["generationConfig"]["maxOutputTokens"].is_null());
    }

    #[test]
    fn test_parse_success() {
        let body = r#"{
            "candidates": [{"content": {"parts": [{"text": "Refunds take "}, {"text": "5 days."}]}, "finishReason": "STOP"}],
            "usageMetadata": {"promptTokenCount": 12, "candidatesTokenCount": 4}
        }"#;
        let response = parse_response(body, "m1").unwrap();
        assert_eq!(response.content, "Refunds take 5 days.");
        assert_eq!(response.usage.total_tokens, 16);
        assert_eq!(response.model, "m1");
    }

    #[test]
    fn test_parse_empty_candidates() {
        assert_eq!(
            parse_response(r#"{"candidates": []}"#, "m1").unwrap_err(),
            LlmError::EmptyResponse
        );
    }

    #[test]
    fn test_parse_unexpected_finish() {
        let body = r#"{"candidates": [{"content": {"parts": [{"text": "x"}]}, "finishReason": "SAFETY"}]}"#;
        assert_eq!(
            parse_response(body, "m1").unwrap_err(),
            LlmError::UnexpectedFinish("SAFETY".to_string())
        );
    }

    #[test]
    fn test_parse_malformed() {
        assert!(matches!(
            parse_response("<html>", "m1"),
            Err(LlmError::MalformedResponse(_))
        ));
    }
}
