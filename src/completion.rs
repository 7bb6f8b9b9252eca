//! Client for OpenAI-compatible chat-completion endpoints.

use crate::config::{Config, Secret};
use crate::error::ProviderError;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

const PROVIDER: &str = "completion";
const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Chat-completion client bound to one model.
#[derive(Clone)]
pub struct CompletionClient {
    client: Client,
    base_url: String,
    api_key: Secret,
    model: String,
    timeout: Duration,
}

impl CompletionClient {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        api_key: Secret,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
            timeout,
        }
    }

    pub fn from_config(client: Client, config: &Config) -> Self {
        if config.openai_api_host == "https://api.openai.com/v1" {
            info!("Using default OpenAI API host");
        } else {
            info!("Using custom OpenAI API host: {}", config.openai_api_host);
        }
        Self::new(
            client,
            &config.openai_api_host,
            config.openai_api_key.clone(),
            &config.model,
            config.completion_timeout,
        )
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send a chat completion and return the first choice's text.
    ///
    /// A response with no content yields an empty string; callers decide
    /// what an empty answer means.
    pub async fn chat(&self, messages: Vec<Message>) -> Result<String, ProviderError> {
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages,
            temperature: DEFAULT_TEMPERATURE,
        };
        let secs = self.timeout.as_secs();

        debug!("Sending chat completion: model={}", request.model);

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose())
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(PROVIDER, secs, e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ProviderError::status(PROVIDER, status.as_u16(), &error_text));
        }

        let raw = response
            .text()
            .await
            .map_err(|e| ProviderError::from_reqwest(PROVIDER, secs, e))?;
        let response: ChatCompletionResponse =
            serde_json::from_str(&raw).map_err(|e| ProviderError::Malformed {
                provider: PROVIDER,
                detail: e.to_string(),
            })?;

        if let Some(usage) = &response.usage {
            info!(
                "Completion usage: {} tokens (prompt: {}, completion: {})",
                usage.total_tokens, usage.prompt_tokens, usage.completion_tokens
            );
        }

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Malformed {
                provider: PROVIDER,
                detail: "response contained no choices".to_string(),
            })?;

        Ok(choice.message.content.unwrap_or_default())
    }
}

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

// ============================================================================
// Message types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}
