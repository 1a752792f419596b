use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{
    is_context_length_error, parse_json_reply, sanitize_llm_output, ChatOutcome, ChatReply,
    ChatRequest, LlmClient, LlmError, ReplyBody, ResponseFormat,
};
use crate::models::ChatRole;
use crate::settings::ChatDeployment;

/// Request timeout for chat completions.
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Which request dialect a deployment speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFamily {
    /// System message, sampling parameters, `max_tokens`, response format.
    Chat,
    /// No system message or sampling parameters; `max_completion_tokens`.
    /// System text is folded into the user prompt.
    Reasoning,
}

/// Azure OpenAI chat-completions client for one deployment.
pub struct AzureOpenAiClient {
    deployment: ChatDeployment,
    family: ModelFamily,
    client: reqwest::Client,
    timeout_secs: u64,
}

impl AzureOpenAiClient {
    pub fn new(deployment: ChatDeployment, family: ModelFamily) -> Result<Self, LlmError> {
        Self::with_timeout(deployment, family, DEFAULT_TIMEOUT_SECS)
    }

    pub fn with_timeout(
        deployment: ChatDeployment,
        family: ModelFamily,
        timeout_secs: u64,
    ) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| LlmError::HttpClient(e.to_string()))?;

        Ok(Self {
            deployment,
            family,
            client,
            timeout_secs,
        })
    }

    pub fn family(&self) -> ModelFamily {
        self.family
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.deployment.endpoint.trim_end_matches('/'),
            self.deployment.deployment,
            self.deployment.api_version
        )
    }

    /// Build the wire request body for `request`.
    pub(crate) async fn build_body(&self, request: &ChatRequest) -> Result<Value, LlmError> {
        let mut messages: Vec<Value> = Vec::new();

        let history_system = request
            .history
            .messages()
            .first()
            .filter(|m| m.role == ChatRole::System)
            .map(|m| m.content.as_str());
        let system = history_system.or(request.system.as_deref());

        if self.family == ModelFamily::Chat && history_system.is_none() {
            if let Some(system) = system {
                messages.push(json!({"role": "system", "content": system}));
            }
        }

        for message in request.history.messages() {
            if self.family == ModelFamily::Reasoning && message.role == ChatRole::System {
                continue;
            }
            messages.push(json!({"role": message.role.as_str(), "content": message.content}));
        }

        // Reasoning deployments reject the system role.
        let prompt = match (self.family, system) {
            (ModelFamily::Reasoning, Some(system)) => format!("{system}\n\n{}", request.prompt),
            _ => request.prompt.clone(),
        };
        messages.push(json!({"role": "user", "content": user_content(prompt, &request.images).await}));

        let settings = &request.settings;
        let body = match self.family {
            ModelFamily::Chat => {
                let mut body = json!({
                    "messages": messages,
                    "max_tokens": settings.max_tokens,
                    "temperature": settings.temperature,
                    "top_p": settings.top_p,
                    "frequency_penalty": settings.frequency_penalty,
                    "presence_penalty": settings.presence_penalty,
                    "response_format": {"type": match request.format {
                        ResponseFormat::Text => "text",
                        ResponseFormat::Json => "json_object",
                    }},
                });
                if let Some(seed) = settings.seed {
                    body["seed"] = json!(seed);
                }
                body
            }
            ModelFamily::Reasoning => json!({
                "messages": messages,
                "max_completion_tokens": settings.max_tokens,
            }),
        };

        Ok(body)
    }
}

/// User turn content: plain text, or text plus inline base64 images.
/// Unreadable images are logged and left out.
async fn user_content(prompt: String, images: &[PathBuf]) -> Value {
    let mut parts = Vec::with_capacity(images.len() + 1);
    for path in images {
        match image_data_url(path).await {
            Ok(url) => parts.push(json!({"type": "image_url", "image_url": {"url": url}})),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable image");
            }
        }
    }

    if parts.is_empty() {
        return Value::String(prompt);
    }
    parts.insert(0, json!({"type": "text", "text": prompt}));
    Value::Array(parts)
}

async fn image_data_url(path: &Path) -> Result<String, LlmError> {
    let bytes = tokio::fs::read(path).await.map_err(|source| LlmError::Image {
        path: path.display().to_string(),
        source,
    })?;
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    Ok(format!("data:{mime};base64,{encoded}"))
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize, Serialize)]
struct CompletionMessage {
    content: Option<String>,
}

/// Decode a successful completion body into its message text.
fn completion_text(body: &str) -> Result<String, LlmError> {
    let parsed: CompletionResponse =
        serde_json::from_str(body).map_err(|e| LlmError::ResponseParsing(e.to_string()))?;
    let content = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or(LlmError::EmptyResponse)?;
    let content = sanitize_llm_output(&content);
    if content.is_empty() {
        return Err(LlmError::EmptyResponse);
    }
    Ok(content)
}

#[async_trait]
impl LlmClient for AzureOpenAiClient {
    fn model_name(&self) -> &str {
        &self.deployment.deployment
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatOutcome, LlmError> {
        let body = self.build_body(&request).await?;

        let response = self
            .client
            .post(self.completions_url())
            .header("api-key", &self.deployment.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    LlmError::Connection(self.deployment.endpoint.clone())
                } else if e.is_timeout() {
                    LlmError::HttpClient(format!(
                        "Request timed out after {}s",
                        self.timeout_secs
                    ))
                } else {
                    LlmError::HttpClient(e.to_string())
                }
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| LlmError::ResponseParsing(e.to_string()))?;

        if !status.is_success() {
            if status.as_u16() == 400 && is_context_length_error(&text) {
                tracing::warn!(
                    model = %self.deployment.deployment,
                    "Chat request exceeded the model context window"
                );
                return Ok(ChatOutcome::ContextLengthExceeded);
            }
            return Err(LlmError::Api {
                status: status.as_u16(),
                body: text,
            });
        }

        let content = completion_text(&text)?;
        let history = request.history_with_reply(&content);
        let body = match request.format {
            ResponseFormat::Text => ReplyBody::Text(content),
            ResponseFormat::Json => ReplyBody::Json(parse_json_reply(&content)?),
        };

        Ok(ChatOutcome::Completed(ChatReply {
            body,
            history,
            model: self.deployment.deployment.clone(),
        }))
    }
}
