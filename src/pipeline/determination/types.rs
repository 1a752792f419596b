use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::llm::LlmError;
use crate::models::ConversationHistory;

/// Shortens a policy text that overflowed the model context. Called with
/// the full policy text, returns the text to use instead.
pub type PolicySummarizer =
    dyn Fn(String) -> BoxFuture<'static, Result<String, LlmError>> + Send + Sync;

/// Final decision text and the exchange that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeterminationResult {
    pub text: String,
    pub conversation_history: ConversationHistory,
    /// Model that produced `text`.
    pub model: String,
    /// Summary substituted for the policy text, if overflow forced one.
    pub policy_summary: Option<String>,
}
