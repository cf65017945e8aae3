use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url, header};
use tracing::{debug, warn};

use crate::config::Config;

use super::models::{
    ChatMessage, ChatRequest, DEFAULT_DEVELOPER_PROMPT, ResponseFormat, extract_assistant_text,
};
use super::{GenerationBackend, GenerationError, GenerationRequest};

/// 生成クライアントの接続設定と既定パラメータ。
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSettings {
    pub url: String,
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub user: String,
    pub connect_timeout: Duration,
    pub timeout: Duration,
}

impl GenerationSettings {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            url: config.generation_base_url().to_string(),
            api_key: config.generation_api_key().to_string(),
            model: config.generation_model().to_string(),
            max_tokens: config.generation_max_tokens(),
            temperature: config.generation_temperature(),
            user: config.generation_user().to_string(),
            connect_timeout: config.generation_connect_timeout(),
            timeout: config.generation_timeout(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenerationClient {
    client: Client,
    url: Url,
    settings: GenerationSettings,
}

impl GenerationClient {
    /// # Errors
    /// HTTP クライアントの構築または URL のパースに失敗した場合はエラーを返す。
    pub fn new(settings: GenerationSettings) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.timeout)
            .build()
            .context("failed to build generation client")?;

        let url = Url::parse(&settings.url).context("invalid generation backend URL")?;

        Ok(Self {
            client,
            url,
            settings,
        })
    }

    /// Schema-free completion.
    ///
    /// # Errors
    /// Transport failures, timeouts and non-success statuses are returned as [`GenerationError`].
    pub async fn chat(
        &self,
        developer_prompt: Option<&str>,
        content: &str,
    ) -> Result<String, GenerationError> {
        self.generate(GenerationRequest::chat(developer_prompt, content))
            .await
    }

    async fn send(&self, request: GenerationRequest<'_>) -> Result<String, GenerationError> {
        let developer_prompt = request
            .developer_prompt
            .filter(|p| !p.trim().is_empty())
            .unwrap_or(DEFAULT_DEVELOPER_PROMPT);
        let payload = ChatRequest {
            model: &self.settings.model,
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
            user: &self.settings.user,
            messages: [
                ChatMessage::developer(developer_prompt),
                ChatMessage::user(request.content),
            ],
            response_format: request
                .schema
                .map(|s| ResponseFormat::json_schema(s.name, s.schema)),
        };

        debug!(
            model = %self.settings.model,
            schema = ?request.schema.map(|s| s.name),
            content_chars = request.content.chars().count(),
            "sending generation request"
        );

        let response = self
            .client
            .post(self.url.clone())
            .header(header::ACCEPT, "application/json")
            .bearer_auth(&self.settings.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|error| self.classify(error))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "generation backend returned error status");
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await.map_err(|error| self.classify(error))?;
        Ok(extract_assistant_text(&body))
    }

    fn classify(&self, error: reqwest::Error) -> GenerationError {
        if error.is_timeout() {
            GenerationError::Timeout(self.settings.timeout)
        } else {
            GenerationError::Transport(error)
        }
    }
}

#[async_trait]
impl GenerationBackend for GenerationClient {
    async fn generate(&self, request: GenerationRequest<'_>) -> Result<String, GenerationError> {
        self.send(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings(base: &str) -> GenerationSettings {
        GenerationSettings {
            url: format!("{base}/v1/chat/completions"),
            api_key: "secret".to_string(),
            model: "gpt-4o-mini".to_string(),
            max_tokens: 1500,
            temperature: 0.2,
            user: "service:parsing".to_string(),
            connect_timeout: Duration::from_secs(1),
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn generate_sends_schema_and_extracts_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer secret"))
            .and(body_partial_json(json!({
                "model": "gpt-4o-mini",
                "max_tokens": 1500,
                "user": "service:parsing",
                "messages": [
                    {"role": "developer", "content": "extract"},
                    {"role": "user", "content": "Hello\nworld"}
                ],
                "response_format": {
                    "type": "json_schema",
                    "json_schema": {"name": "ParsingResponse"}
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "{\"words\":[]}"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = GenerationClient::new(settings(&server.uri())).expect("client");
        let schema = json!({"type": "object"});
        let text = client
            .generate(GenerationRequest::with_schema(
                Some("extract"),
                "Hello\nworld",
                "ParsingResponse",
                &schema,
            ))
            .await
            .expect("generation succeeds");

        assert_eq!(text, "{\"words\":[]}");
    }

    #[tokio::test]
    async fn chat_uses_default_prompt_and_omits_response_format() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_partial_json(json!({
                "messages": [{"role": "developer", "content": "You are a helpful assistant."}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "output_text": "plain answer"
            })))
            .mount(&server)
            .await;

        let client = GenerationClient::new(settings(&server.uri())).expect("client");
        let text = client.chat(None, "hi").await.expect("chat succeeds");

        assert_eq!(text, "plain answer");
        let requests = server.received_requests().await.expect("recorded");
        let body: serde_json::Value = requests[0].body_json().expect("json body");
        assert!(body.get("response_format").is_none());
    }

    #[tokio::test]
    async fn error_status_carries_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let client = GenerationClient::new(settings(&server.uri())).expect("client");
        let error = client
            .chat(Some("x"), "y")
            .await
            .expect_err("429 should fail");

        match error {
            GenerationError::Status { status, body } => {
                assert_eq!(status, 429);
                assert_eq!(body, "rate limited");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn error_display_truncates_large_bodies() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("x".repeat(10_000)))
            .mount(&server)
            .await;

        let client = GenerationClient::new(settings(&server.uri())).expect("client");
        let error = client.chat(None, "y").await.expect_err("500 should fail");

        let message = error.to_string();
        assert!(message.contains("truncated, 10000 chars"));
        assert!(message.len() < 1_000);
    }

    #[tokio::test]
    async fn slow_backend_maps_to_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"output_text": "late"}))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let mut settings = settings(&server.uri());
        settings.timeout = Duration::from_millis(50);
        let client = GenerationClient::new(settings).expect("client");

        let error = client.chat(None, "y").await.expect_err("should time out");
        assert!(matches!(error, GenerationError::Timeout(_)));
    }

    #[test]
    fn new_rejects_invalid_url() {
        let mut settings = settings("http://localhost");
        settings.url = "not a url".to_string();
        assert!(GenerationClient::new(settings).is_err());
    }
}
