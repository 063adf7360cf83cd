use crate::config::Llm;
use anyhow::Result;
use std::time::Duration;

/// A single call to the language model.
#[serenity::async_trait]
pub trait Generate: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        system_prompt: &str,
    ) -> std::result::Result<String, UpstreamError>;
}

/// Ways a call to the language model can fail
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpstreamError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    ConnectionFailure(String),
    #[error("API returned HTTP {status}: {message}")]
    Api { status: u16, message: String },
    #[error("request could not be built: {0}")]
    InvalidRequest(String),
    #[error("response could not be understood: {0}")]
    InvalidResponse(String),
}

impl UpstreamError {
    /// Timeouts, dropped connections, throttling and server-side errors may succeed on a later
    /// attempt.  Authorization failures and malformed requests never will.
    pub fn is_retryable(&self) -> bool {
        match self {
            UpstreamError::Timeout | UpstreamError::ConnectionFailure(_) => true,
            UpstreamError::Api { status, .. } => *status == 429 || *status >= 500,
            UpstreamError::InvalidRequest(_) | UpstreamError::InvalidResponse(_) => false,
        }
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            UpstreamError::Timeout
        } else if e.is_builder() {
            UpstreamError::InvalidRequest(e.to_string())
        } else if e.is_decode() {
            UpstreamError::InvalidResponse(e.to_string())
        } else if let Some(status) = e.status() {
            UpstreamError::Api {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else {
            UpstreamError::ConnectionFailure(e.to_string())
        }
    }
}

#[derive(serde::Serialize)]
struct LlmChatRequest<'a> {
    /// LLM model name
    model: &'a str,
    /// Chat conversation to continue.
    messages: Vec<ChatMessage<'a>>,
}

#[derive(serde::Serialize)]
struct ChatMessage<'a> {
    role: ChatMessageRole,
    content: &'a str,
}

#[allow(non_camel_case_types)] // Serialized literally; case matters
#[derive(serde::Serialize)]
enum ChatMessageRole {
    system,
    user,
}

#[derive(serde::Deserialize)]
struct LlmChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(serde::Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(serde::Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

impl<'a> LlmChatRequest<'a> {
    fn new(model: &'a str, prompt: &'a str, system_prompt: &'a str) -> Self {
        Self {
            model,
            messages: vec![
                ChatMessage {
                    role: ChatMessageRole::system,
                    content: system_prompt,
                },
                ChatMessage {
                    role: ChatMessageRole::user,
                    content: prompt,
                },
            ],
        }
    }
}

impl LlmChatResponse {
    fn into_content(self) -> std::result::Result<String, UpstreamError> {
        self.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_owned())
            .ok_or(UpstreamError::InvalidResponse(
                "response contained no message content".to_owned(),
            ))
    }
}

/// Client for an OpenAI-compatible chat completions endpoint
pub struct OpenAiClient {
    client: reqwest::Client,
    chat_url: String,
    api_key: String,
    model_name: String,
}

impl OpenAiClient {
    pub fn new(cfg: &Llm) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            chat_url: cfg.chat_url.clone(),
            api_key: cfg.api_key.clone(),
            model_name: cfg.model_name.clone(),
        })
    }
}

#[serenity::async_trait]
impl Generate for OpenAiClient {
    async fn generate(
        &self,
        prompt: &str,
        system_prompt: &str,
    ) -> std::result::Result<String, UpstreamError> {
        let request = LlmChatRequest::new(&self.model_name, prompt, system_prompt);

        tracing::debug!(url = %self.chat_url, model = %self.model_name, "sending chat request");
        let response = self
            .client
            .post(&self.chat_url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Api {
                status: status.as_u16(),
                message,
            });
        }

        response.json::<LlmChatResponse>().await?.into_content()
    }
}
