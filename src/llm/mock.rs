use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use super::{ChatOutcome, ChatReply, ChatRequest, LlmClient, LlmError, ReplyBody, ResponseFormat};

type Script = dyn Fn(&ChatRequest, usize) -> Result<ChatOutcome, LlmError> + Send + Sync;

/// Scripted LLM client for testing: a closure decides each reply from the
/// request and the zero-based call index. Every request is recorded.
pub struct ScriptedLlmClient {
    model: String,
    script: Box<Script>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedLlmClient {
    pub fn new<F>(model: &str, script: F) -> Self
    where
        F: Fn(&ChatRequest, usize) -> Result<ChatOutcome, LlmError> + Send + Sync + 'static,
    {
        Self {
            model: model.to_string(),
            script: Box::new(script),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Always answer with the same text.
    pub fn replying_text(model: &str, text: &str) -> Self {
        let text = text.to_string();
        let name = model.to_string();
        Self::new(model, move |req, _| Ok(completed(req, &name, ReplyBody::Text(text.clone()))))
    }

    /// Always answer with the same JSON value.
    pub fn replying_json(model: &str, value: Value) -> Self {
        let name = model.to_string();
        Self::new(model, move |req, _| Ok(completed(req, &name, ReplyBody::Json(value.clone()))))
    }

    /// Always fail.
    pub fn failing(model: &str, message: &str) -> Self {
        let message = message.to_string();
        Self::new(model, move |_, _| Err(LlmError::Scripted(message.clone())))
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

/// Build a completed outcome for `request`, as a real backend would.
pub fn completed(request: &ChatRequest, model: &str, body: ReplyBody) -> ChatOutcome {
    let body = match (request.format, body) {
        (ResponseFormat::Json, ReplyBody::Text(text)) => match super::parse_json_reply(&text) {
            Ok(value) => ReplyBody::Json(value),
            Err(_) => ReplyBody::Text(text),
        },
        (_, body) => body,
    };
    ChatOutcome::Completed(ChatReply {
        history: request.history_with_reply(&body.text()),
        body,
        model: model.to_string(),
    })
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatOutcome, LlmError> {
        let index = match self.requests.lock() {
            Ok(mut requests) => {
                requests.push(request.clone());
                requests.len() - 1
            }
            Err(_) => return Err(LlmError::Scripted("request log poisoned".into())),
        };
        (self.script)(&request, index)
    }
}
