use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::round::error::AutofillError;

pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-4";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// One prompt exchange with the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    pub system: String,
    pub prompt: String,
}

impl ModelRequest {
    pub fn new(system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            prompt: prompt.into(),
        }
    }
}

/// Something that can turn a prompt into model text.
///
/// The HTTP client is the production implementation; tests substitute
/// scripted fakes.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn complete(&self, request: &ModelRequest, credential: &str) -> Result<String, AutofillError>;
}

/// The models listing that sits beside a chat completions endpoint.
///
/// `https://host/v1/chat/completions` becomes `https://host/v1/models`; any
/// other URL gets `/models` appended.
pub fn models_endpoint_for(chat_endpoint: &str) -> String {
    let trimmed = chat_endpoint.trim().trim_end_matches('/');
    let base = trimmed.strip_suffix("/chat/completions").unwrap_or(trimmed);
    format!("{}/models", base)
}

// ============================================================================
// OpenAI-compatible chat completions client
// ============================================================================

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

pub struct OpenAiClient {
    endpoint: String,
    models_endpoint: String,
    model: String,
    temperature: f32,
    json_mode: bool,
    http: reqwest::Client,
}

impl Default for OpenAiClient {
    fn default() -> Self {
        Self::new(DEFAULT_ENDPOINT, DEFAULT_MODEL)
    }
}

impl OpenAiClient {
    pub fn new(endpoint: &str, model: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            models_endpoint: models_endpoint_for(endpoint),
            model: model.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            json_mode: false,
            http: reqwest::Client::new(),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Ask the service for structured JSON output.
    pub fn with_json_mode(mut self, enabled: bool) -> Self {
        self.json_mode = enabled;
        self
    }

    pub fn with_models_endpoint(mut self, endpoint: &str) -> Self {
        self.models_endpoint = endpoint.to_string();
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn models_endpoint(&self) -> &str {
        &self.models_endpoint
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request<'a>(&'a self, request: &'a ModelRequest) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
            temperature: self.temperature,
            response_format: self.json_mode.then_some(ResponseFormat {
                kind: "json_object",
            }),
        }
    }

    /// Check a key against the models listing before storing it.
    pub async fn validate_credential(&self, credential: &str) -> Result<(), AutofillError> {
        if credential.trim().is_empty() {
            return Err(AutofillError::MissingCredential);
        }

        let response = self
            .http
            .get(&self.models_endpoint)
            .bearer_auth(credential.trim())
            .send()
            .await
            .map_err(|e| AutofillError::TransportFailure(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(AutofillError::UpstreamError {
            status: status.as_u16(),
            message: upstream_message(&body),
        })
    }
}

#[async_trait]
impl ModelClient for OpenAiClient {
    async fn complete(&self, request: &ModelRequest, credential: &str) -> Result<String, AutofillError> {
        if credential.trim().is_empty() {
            return Err(AutofillError::MissingCredential);
        }

        let body = self.build_request(request);
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(credential.trim())
            .json(&body)
            .send()
            .await
            .map_err(|e| AutofillError::TransportFailure(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AutofillError::TransportFailure(e.to_string()))?;

        if !status.is_success() {
            return Err(AutofillError::UpstreamError {
                status: status.as_u16(),
                message: upstream_message(&text),
            });
        }

        let parsed: ChatResponse = serde_json::from_str(&text).map_err(|e| {
            AutofillError::TransportFailure(format!("unreadable completion body: {}", e))
        })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                AutofillError::TransportFailure("completion contained no choices".into())
            })?;

        debug!(chars = content.len(), "model answered");
        Ok(content)
    }
}

/// The service's own error message when the body carries one.
fn upstream_message(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => parsed.error.message,
        Err(_) if body.trim().is_empty() => "request failed".to_string(),
        Err(_) => body.trim().to_string(),
    }
}
