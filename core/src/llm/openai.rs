//! OpenAI-compatible chat completions provider

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::error::{parse_http_error, LlmError, LlmResult};
use super::provider::LlmProvider;
use crate::config::LlmSettings;

const PROVIDER: &str = "openai";

pub struct OpenAiProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl OpenAiProvider {
    pub fn new(settings: &LlmSettings) -> LlmResult<Self> {
        let api_key = settings
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| LlmError::MissingApiKey {
                provider: PROVIDER.to_string(),
            })?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| LlmError::Other {
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", settings.base_url.trim_end_matches('/')),
            api_key,
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> LlmResult<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(parse_http_error(status.as_u16(), &text, PROVIDER));
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| LlmError::MalformedResponse {
                message: "response has no message content".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings_for(server: &MockServer) -> LlmSettings {
        LlmSettings {
            base_url: format!("{}/v1", server.uri()),
            api_key: Some("sk-test".to_string()),
            model: "gpt-test".to_string(),
            ..LlmSettings::default()
        }
    }

    #[test]
    fn test_missing_key_is_rejected() {
        let settings = LlmSettings {
            api_key: Some("  ".to_string()),
            ..LlmSettings::default()
        };
        match OpenAiProvider::new(&settings) {
            Err(LlmError::MissingApiKey { provider }) => assert_eq!(provider, "openai"),
            Err(other) => panic!("Expected MissingApiKey, got {:?}", other),
            Ok(_) => panic!("Expected MissingApiKey"),
        }
    }

    #[tokio::test]
    async fn test_completion_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "gpt-test",
                "messages": [{ "role": "user", "content": "classify this" }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "chatcmpl-1",
                "choices": [{
                    "index": 0,
                    "message": { "role": "assistant", "content": "chart" },
                    "finish_reason": "stop"
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = OpenAiProvider::new(&settings_for(&server)).unwrap();
        assert_eq!(provider.complete("classify this").await.unwrap(), "chart");
    }

    #[tokio::test]
    async fn test_http_errors_are_mapped() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let provider = OpenAiProvider::new(&settings_for(&server)).unwrap();
        match provider.complete("hi").await {
            Err(LlmError::RateLimited { message }) => assert_eq!(message, "slow down"),
            other => panic!("Expected RateLimited, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_choices_are_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
            .mount(&server)
            .await;

        let provider = OpenAiProvider::new(&settings_for(&server)).unwrap();
        assert!(matches!(
            provider.complete("hi").await,
            Err(LlmError::MalformedResponse { .. })
        ));
    }
}
