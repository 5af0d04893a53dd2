use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use warden_core::{LlmConfig, ReviewFinding, ReviewerGateway, Service, WardenError};

use crate::prompt;

const DEFAULT_BASE_URL: &str = "https://api.x.ai";

/// A message in a chat conversation with the LLM.
///
/// # Examples
///
/// ```
/// use warden_review::llm::{ChatMessage, Role};
///
/// let msg = ChatMessage {
///     role: Role::User,
///     content: "Review this change".into(),
/// };
/// assert!(matches!(msg.role, Role::User));
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// Role in the chat conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// OpenAI-compatible chat completions client used as the AI reviewer.
///
/// Works with any provider exposing `/v1/chat/completions`: xAI by default,
/// OpenAI, Ollama, vLLM, LiteLLM, etc.
///
/// # Examples
///
/// ```
/// use warden_core::LlmConfig;
/// use warden_review::llm::LlmClient;
///
/// let config = LlmConfig {
///     api_key: Some("test-key".into()),
///     ..LlmConfig::default()
/// };
/// let client = LlmClient::new(&config).unwrap();
/// assert_eq!(client.model(), "grok-4");
/// ```
pub struct LlmClient {
    client: reqwest::Client,
    config: LlmConfig,
}

impl LlmClient {
    /// Create a new LLM client from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`WardenError::Config`] if the HTTP client cannot be built.
    pub fn new(config: &LlmConfig) -> Result<Self, WardenError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| WardenError::Config(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Send a chat completion request and return the text response.
    ///
    /// Builds a request to `{base_url}/v1/chat/completions` with the given
    /// messages, temperature 0.1, and JSON response format.
    ///
    /// # Errors
    ///
    /// Returns [`WardenError::Unavailable`] on transport failures,
    /// [`WardenError::Api`] on non-success statuses, and
    /// [`WardenError::Review`] if the response has no message content.
    pub async fn chat(&self, messages: Vec<ChatMessage>) -> Result<String, WardenError> {
        let base_url = self
            .config
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/');
        let url = format!("{base_url}/v1/chat/completions");

        let body = serde_json::json!({
            "model": self.config.model,
            "messages": messages,
            "temperature": 0.1,
            "response_format": { "type": "json_object" },
        });

        let mut request = self.client.post(&url);
        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request
            .json(&body)
            .send()
            .await
            .map_err(|e| WardenError::unavailable(Service::Reviewer, format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(WardenError::api(Service::Reviewer, status.as_u16(), body_text));
        }

        let response_body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| WardenError::Review(format!("failed to parse response: {e}")))?;

        let content = response_body
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .ok_or_else(|| {
                WardenError::Review(format!("unexpected response structure: {response_body}"))
            })?;

        Ok(content.to_string())
    }
}

#[async_trait]
impl ReviewerGateway for LlmClient {
    async fn review_diff(&self, prompt_text: &str) -> Result<ReviewFinding, WardenError> {
        if self.config.api_key.is_none() {
            return Err(WardenError::Config(
                "reviewer API key missing: set llm.api_key or XAI_API_KEY".into(),
            ));
        }

        let messages = vec![
            ChatMessage {
                role: Role::System,
                content: prompt::build_system_prompt(),
            },
            ChatMessage {
                role: Role::User,
                content: prompt_text.to_string(),
            },
        ];
        let answer = self.chat(messages).await?;
        let finding = prompt::parse_finding(&answer)?;
        tracing::debug!(
            model = %self.config.model,
            critical = finding.has_critical_issues,
            severity = %finding.severity,
            "reviewer answered"
        );
        Ok(finding)
    }
}
