use std::time::Duration;

use serde_json::{json, Value};

/// Errors from the text-transformation service.
#[derive(thiserror::Error, Debug, Clone)]
pub enum LlmError {
    #[error("LLM client not configured: missing API key")]
    NotConfigured,
    #[error("Network error: {0}")]
    Network(String),
    #[error("Request timed out: {0}")]
    Timeout(String),
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("Service returned no text")]
    EmptyResponse,
    #[error("Malformed reply: {0}")]
    MalformedReply(String),
}

impl LlmError {
    /// Whether another attempt could succeed.
    ///
    /// Only a missing configuration is permanent.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, LlmError::NotConfigured)
    }
}

/// One system-instruction + user-text exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub system: String,
    pub user: String,
    /// Ask the service for a strict JSON object reply.
    pub json_mode: bool,
}

impl ChatRequest {
    /// Free-form text request.
    pub fn text(model: &str, system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            model: model.to_string(),
            system: system.into(),
            user: user.into(),
            json_mode: false,
        }
    }

    /// Request whose reply must be a JSON object.
    pub fn structured(model: &str, system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            json_mode: true,
            ..Self::text(model, system, user)
        }
    }
}

/// A chat-completion style text service.
pub trait TextService: Send + Sync {
    /// Send one request and return the reply text.
    fn complete(&self, request: &ChatRequest) -> Result<String, LlmError>;

    /// Whether the service is configured well enough to accept requests.
    fn is_ready(&self) -> bool {
        true
    }
}

/// Connection and sampling settings for [`ChatClient`].
#[derive(Debug, Clone)]
pub struct ChatClientConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
}

impl Default for ChatClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            timeout: Duration::from_secs(60),
            temperature: 0.7,
            max_tokens: 4096,
            top_p: 0.95,
        }
    }
}

/// Blocking client for OpenAI-compatible `/chat/completions` endpoints.
pub struct ChatClient {
    config: ChatClientConfig,
    agent: ureq::Agent,
}

impl ChatClient {
    pub fn new(config: ChatClientConfig) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(config.timeout).build();
        Self { config, agent }
    }

    fn api_key(&self) -> Option<&str> {
        self.config.api_key.as_deref().filter(|key| !key.trim().is_empty())
    }

    fn request_body(&self, request: &ChatRequest) -> Value {
        let mut body = json!({
            "model": request.model,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.user },
            ],
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
            "top_p": self.config.top_p,
            "stream": false,
        });
        if request.json_mode {
            body["response_format"] = json!({ "type": "json_object" });
        }
        body
    }
}

impl TextService for ChatClient {
    fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
        let api_key = self.api_key().ok_or(LlmError::NotConfigured)?;
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let body = self.request_body(request);

        log::debug!("Chat request to {} (model {}, json={})", url, request.model, request.json_mode);

        let response = self
            .agent
            .post(&url)
            .set("Content-Type", "application/json")
            .set("Authorization", &format!("Bearer {}", api_key))
            .send_json(body);

        match response {
            Ok(resp) => {
                let reply: Value = resp
                    .into_json()
                    .map_err(|e| LlmError::MalformedReply(e.to_string()))?;
                extract_content(&reply)
            }
            Err(ureq::Error::Status(status, resp)) => {
                let message = resp.into_string().unwrap_or_default();
                Err(LlmError::Api { status, message })
            }
            Err(ureq::Error::Transport(transport)) => {
                let message = transport.to_string();
                if message.contains("timed out") {
                    Err(LlmError::Timeout(message))
                } else {
                    Err(LlmError::Network(message))
                }
            }
        }
    }

    fn is_ready(&self) -> bool {
        self.api_key().is_some()
    }
}

/// Pull `choices[0].message.content` out of a completion reply.
fn extract_content(reply: &Value) -> Result<String, LlmError> {
    let content = reply["choices"][0]["message"]["content"]
        .as_str()
        .ok_or_else(|| LlmError::MalformedReply("missing choices[0].message.content".to_string()))?;
    if content.trim().is_empty() {
        return Err(LlmError::EmptyResponse);
    }
    Ok(content.to_string())
}
