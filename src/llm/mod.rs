pub mod azure;
pub mod json;
pub mod mock;

pub use azure::*;
pub use json::*;
pub use mock::*;

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::models::{ChatMessage, ConversationHistory};
use crate::settings::CompletionSettings;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Chat endpoint unreachable at {0}")]
    Connection(String),

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Chat endpoint returned error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Response parsing error: {0}")]
    ResponseParsing(String),

    #[error("Model did not return valid JSON: {0}")]
    MalformedJson(String),

    #[error("Model returned an empty response")]
    EmptyResponse,

    #[error("Input exceeds the model context window")]
    ContextLengthExceeded,

    #[error("Failed to read image {path}: {source}")]
    Image {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Scripted(String),
}

/// Requested shape of the model reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    Text,
    Json,
}

/// One chat completion call.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub prompt: String,
    pub system: Option<String>,
    /// Images attached to the new user turn only.
    pub images: Vec<PathBuf>,
    pub history: ConversationHistory,
    pub format: ResponseFormat,
    pub settings: CompletionSettings,
}

impl ChatRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system: None,
            images: Vec::new(),
            history: ConversationHistory::new(),
            format: ResponseFormat::Text,
            settings: CompletionSettings::default(),
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_images(mut self, images: Vec<PathBuf>) -> Self {
        self.images = images;
        self
    }

    pub fn with_history(mut self, history: ConversationHistory) -> Self {
        self.history = history;
        self
    }

    pub fn json(mut self) -> Self {
        self.format = ResponseFormat::Json;
        self
    }

    pub fn with_settings(mut self, settings: CompletionSettings) -> Self {
        self.settings = settings;
        self
    }

    /// History as it stands after this exchange: prior turns, the system
    /// message (if any and not already present), the user prompt and the
    /// assistant reply.
    pub fn history_with_reply(&self, assistant: &str) -> ConversationHistory {
        let mut history = self.history.clone();
        if let Some(system) = &self.system {
            history.ensure_system(system);
        }
        history.push(ChatMessage::user(self.prompt.clone()));
        history.push(ChatMessage::assistant(assistant));
        history
    }
}

/// Reply content, parsed according to the requested format.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyBody {
    Text(String),
    Json(Value),
}

impl ReplyBody {
    /// Reply as plain text (JSON bodies are re-serialized).
    pub fn text(&self) -> String {
        match self {
            ReplyBody::Text(text) => text.clone(),
            ReplyBody::Json(value) => value.to_string(),
        }
    }

    /// Reply as JSON. Text bodies are parsed leniently.
    pub fn into_json(self) -> Result<Value, LlmError> {
        match self {
            ReplyBody::Json(value) => Ok(value),
            ReplyBody::Text(text) => parse_json_reply(&text),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatReply {
    pub body: ReplyBody,
    pub history: ConversationHistory,
    pub model: String,
}

/// Result of a chat call. Context overflow is reported as a distinct
/// outcome so callers can shorten their input instead of retrying blindly.
#[derive(Debug, Clone)]
pub enum ChatOutcome {
    Completed(ChatReply),
    ContextLengthExceeded,
}

impl ChatOutcome {
    /// Collapse the overflow outcome into an error, for callers that have
    /// no way to shorten their input.
    pub fn into_reply(self) -> Result<ChatReply, LlmError> {
        match self {
            ChatOutcome::Completed(reply) => Ok(reply),
            ChatOutcome::ContextLengthExceeded => Err(LlmError::ContextLengthExceeded),
        }
    }
}

/// Chat completion backend.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Deployment or model name, recorded alongside results.
    fn model_name(&self) -> &str;

    async fn chat(&self, request: ChatRequest) -> Result<ChatOutcome, LlmError>;
}

/// Whether an error message from the chat service reports context overflow.
pub fn is_context_length_error(message: &str) -> bool {
    message.contains("context_length_exceeded") || message.contains("maximum context length")
}
