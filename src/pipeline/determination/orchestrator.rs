use std::sync::Arc;

use super::types::{DeterminationResult, PolicySummarizer};
use super::DeterminationError;
use crate::llm::{ChatOutcome, ChatReply, ChatRequest, LlmClient};
use crate::models::{ClinicalRecord, PatientRecord, PhysicianRecord};
use crate::pipeline::prompts::{build_determination_prompt, DETERMINATION_SYSTEM};
use crate::settings::PipelineSettings;

/// Case data the decision prompt is built from.
struct CaseInputs<'a> {
    patient: &'a PatientRecord,
    physician: &'a PhysicianRecord,
    clinical: &'a ClinicalRecord,
}

/// Produces the final prior-authorization decision.
///
/// The reasoning model, when requested and configured, gets one try. The
/// chat model then gets `max_attempts` tries. A context overflow on either
/// model summarizes the policy and retries the same model once without
/// consuming an attempt. The summary is computed at most once per run.
pub struct AutoDeterminator {
    llm: Arc<dyn LlmClient>,
    reasoning_llm: Option<Arc<dyn LlmClient>>,
    settings: Arc<PipelineSettings>,
    case_id: String,
}

impl AutoDeterminator {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        reasoning_llm: Option<Arc<dyn LlmClient>>,
        settings: Arc<PipelineSettings>,
        case_id: &str,
    ) -> Self {
        Self {
            llm,
            reasoning_llm,
            settings,
            case_id: case_id.to_string(),
        }
    }

    /// Fails only when the last chat-model attempt fails.
    pub async fn run(
        &self,
        patient: &PatientRecord,
        physician: &PhysicianRecord,
        clinical: &ClinicalRecord,
        policy_text: &str,
        summarize: &PolicySummarizer,
        use_reasoning_model: bool,
    ) -> Result<DeterminationResult, DeterminationError> {
        let inputs = CaseInputs {
            patient,
            physician,
            clinical,
        };
        let mut summary: Option<String> = None;

        if use_reasoning_model {
            match &self.reasoning_llm {
                Some(reasoning) => {
                    tracing::info!(
                        case_id = %self.case_id,
                        model = reasoning.model_name(),
                        "Determining with reasoning model"
                    );
                    match self
                        .attempt(reasoning.as_ref(), true, &inputs, policy_text, summarize, &mut summary)
                        .await
                    {
                        Ok(reply) => return Ok(self.finish(reply, summary)),
                        Err(e) => {
                            tracing::warn!(
                                case_id = %self.case_id,
                                error = %e,
                                "Reasoning model failed, falling back to chat model"
                            );
                        }
                    }
                }
                None => {
                    tracing::warn!(
                        case_id = %self.case_id,
                        "Reasoning model requested but not configured, using chat model"
                    );
                }
            }
        }

        let max_attempts = self.settings.determination.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            tracing::info!(
                case_id = %self.case_id,
                model = self.llm.model_name(),
                attempt,
                max_attempts,
                "Determining with chat model"
            );
            match self
                .attempt(self.llm.as_ref(), false, &inputs, policy_text, summarize, &mut summary)
                .await
            {
                Ok(reply) => return Ok(self.finish(reply, summary)),
                Err(e) if attempt < max_attempts => {
                    tracing::warn!(
                        case_id = %self.case_id,
                        attempt,
                        max_attempts,
                        error = %e,
                        "Determination attempt failed, retrying"
                    );
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!(
                        case_id = %self.case_id,
                        max_attempts,
                        error = %e,
                        "All determination attempts failed"
                    );
                    return Err(e);
                }
            }
        }
    }

    fn finish(&self, reply: ChatReply, summary: Option<String>) -> DeterminationResult {
        let text = reply.body.text();
        tracing::info!(
            case_id = %self.case_id,
            model = %reply.model,
            summarized = summary.is_some(),
            chars = text.len(),
            "Determination produced"
        );
        DeterminationResult {
            text,
            conversation_history: reply.history,
            model: reply.model,
            policy_summary: summary,
        }
    }

    fn request(&self, inputs: &CaseInputs<'_>, policy_text: &str, reasoning: bool) -> ChatRequest {
        let prompt = build_determination_prompt(
            inputs.patient,
            inputs.physician,
            inputs.clinical,
            policy_text,
            reasoning,
        );
        let determination = &self.settings.determination;
        if reasoning {
            ChatRequest::new(prompt).with_settings(
                determination
                    .completion
                    .clone()
                    .with_max_tokens(determination.reasoning_max_completion_tokens),
            )
        } else {
            ChatRequest::new(prompt)
                .with_system(DETERMINATION_SYSTEM)
                .with_settings(determination.completion.clone())
        }
    }

    /// One attempt against `client`, including the overflow sub-retry.
    async fn attempt(
        &self,
        client: &dyn LlmClient,
        reasoning: bool,
        inputs: &CaseInputs<'_>,
        policy_text: &str,
        summarize: &PolicySummarizer,
        summary: &mut Option<String>,
    ) -> Result<ChatReply, DeterminationError> {
        let outcome = client.chat(self.request(inputs, policy_text, reasoning)).await?;
        if let ChatOutcome::Completed(reply) = outcome {
            return Ok(reply);
        }

        tracing::warn!(
            case_id = %self.case_id,
            model = client.model_name(),
            policy_chars = policy_text.len(),
            "Context length exceeded, summarizing policy"
        );
        let shortened = if let Some(cached) = summary.as_ref() {
            cached.clone()
        } else {
            let fresh = summarize(policy_text.to_string())
                .await
                .map_err(DeterminationError::Summarization)?;
            summary.insert(fresh).clone()
        };

        let reply = client
            .chat(self.request(inputs, &shortened, reasoning))
            .await?
            .into_reply()?;
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{completed, LlmError, ReplyBody, ScriptedLlmClient};
    use futures_util::future::{BoxFuture, FutureExt};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const POLICY: &str = "FULL POLICY: adalimumab is covered after failure of two conventional agents.";
    const SUMMARY: &str = "SHORT POLICY: covered after two failures.";

    fn counting_summarizer(
        count: Arc<AtomicUsize>,
    ) -> impl Fn(String) -> BoxFuture<'static, Result<String, LlmError>> + Send + Sync {
        move |_text| {
            count.fetch_add(1, Ordering::SeqCst);
            async { Ok(SUMMARY.to_string()) }.boxed()
        }
    }

    fn approving(model: &'static str) -> Arc<ScriptedLlmClient> {
        Arc::new(ScriptedLlmClient::replying_text(
            model,
            "Criteria met.\nFinal Determination: APPROVED",
        ))
    }

    fn determinator(
        llm: Arc<ScriptedLlmClient>,
        reasoning: Option<Arc<ScriptedLlmClient>>,
    ) -> AutoDeterminator {
        AutoDeterminator::new(
            llm,
            reasoning.map(|r| r as Arc<dyn LlmClient>),
            Arc::new(PipelineSettings::default()),
            "abc12345",
        )
    }

    async fn decide(
        determinator: &AutoDeterminator,
        summarize: &PolicySummarizer,
        use_reasoning_model: bool,
    ) -> Result<DeterminationResult, DeterminationError> {
        determinator
            .run(
                &PatientRecord::default(),
                &PhysicianRecord::default(),
                &ClinicalRecord::default(),
                POLICY,
                summarize,
                use_reasoning_model,
            )
            .await
    }

    #[tokio::test]
    async fn failing_reasoning_model_falls_back_to_chat_model() {
        let chat = approving("gpt-4o");
        let reasoning = Arc::new(ScriptedLlmClient::failing("o1", "deployment unavailable"));
        let d = determinator(chat.clone(), Some(reasoning.clone()));
        let calls = Arc::new(AtomicUsize::new(0));

        let result = decide(&d, &counting_summarizer(calls.clone()), true).await.unwrap();

        assert!(result.text.contains("APPROVED"));
        assert_eq!(result.model, "gpt-4o");
        assert_eq!(reasoning.call_count(), 1);
        assert_eq!(chat.call_count(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn overflow_summarizes_once_and_retries_with_summary() {
        let chat = Arc::new(ScriptedLlmClient::new("gpt-4o", |req, n| {
            if n == 0 {
                Ok(ChatOutcome::ContextLengthExceeded)
            } else {
                Ok(completed(req, "gpt-4o", ReplyBody::Text("Final Determination: APPROVED".into())))
            }
        }));
        let d = determinator(chat.clone(), None);
        let calls = Arc::new(AtomicUsize::new(0));

        let result = decide(&d, &counting_summarizer(calls.clone()), false).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(chat.call_count(), 2);
        let requests = chat.requests();
        assert!(requests[0].prompt.contains(POLICY));
        assert!(requests[1].prompt.contains(SUMMARY));
        assert!(!requests[1].prompt.contains(POLICY));
        assert_eq!(result.policy_summary.as_deref(), Some(SUMMARY));
    }

    #[tokio::test]
    async fn final_attempt_failure_propagates() {
        let chat = Arc::new(ScriptedLlmClient::failing("gpt-4o", "503 service unavailable"));
        let d = determinator(chat.clone(), None);
        let calls = Arc::new(AtomicUsize::new(0));

        let err = decide(&d, &counting_summarizer(calls), false).await.unwrap_err();

        assert!(matches!(err, DeterminationError::Llm(LlmError::Scripted(_))));
        assert_eq!(chat.call_count(), 2);
    }

    #[tokio::test]
    async fn second_attempt_recovers_from_transient_failure() {
        let chat = Arc::new(ScriptedLlmClient::new("gpt-4o", |req, n| {
            if n == 0 {
                Err(LlmError::Connection("aoai.example.com".into()))
            } else {
                Ok(completed(req, "gpt-4o", ReplyBody::Text("Final Determination: DENIED".into())))
            }
        }));
        let d = determinator(chat.clone(), None);
        let result = decide(&d, &counting_summarizer(Arc::new(AtomicUsize::new(0))), false)
            .await
            .unwrap();
        assert!(result.text.contains("DENIED"));
        assert_eq!(chat.call_count(), 2);
    }

    #[tokio::test]
    async fn overflow_sub_retry_does_not_consume_an_attempt() {
        // Attempt 1: overflow then failure. Attempt 2: success.
        let chat = Arc::new(ScriptedLlmClient::new("gpt-4o", |req, n| match n {
            0 => Ok(ChatOutcome::ContextLengthExceeded),
            1 => Err(LlmError::EmptyResponse),
            _ => Ok(completed(req, "gpt-4o", ReplyBody::Text("APPROVED".into()))),
        }));
        let d = determinator(chat.clone(), None);
        let calls = Arc::new(AtomicUsize::new(0));

        let result = decide(&d, &counting_summarizer(calls.clone()), false).await.unwrap();

        assert_eq!(result.text, "APPROVED");
        assert_eq!(chat.call_count(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reasoning_request_has_no_system_and_large_budget() {
        let chat = approving("gpt-4o");
        let reasoning = approving("o1");
        let d = determinator(chat.clone(), Some(reasoning.clone()));

        let result = decide(&d, &counting_summarizer(Arc::new(AtomicUsize::new(0))), true)
            .await
            .unwrap();

        assert_eq!(result.model, "o1");
        assert_eq!(chat.call_count(), 0);
        let request = &reasoning.requests()[0];
        assert!(request.system.is_none());
        assert_eq!(request.settings.max_tokens, 15000);
        assert!(request.history.is_empty());
    }

    #[tokio::test]
    async fn summary_is_reused_after_reasoning_fallback() {
        let reasoning = Arc::new(ScriptedLlmClient::new("o1", |_, n| {
            if n == 0 {
                Ok(ChatOutcome::ContextLengthExceeded)
            } else {
                Err(LlmError::Api {
                    status: 500,
                    body: "internal".into(),
                })
            }
        }));
        let chat = Arc::new(ScriptedLlmClient::new("gpt-4o", |req, n| {
            if n == 0 {
                Ok(ChatOutcome::ContextLengthExceeded)
            } else {
                Ok(completed(req, "gpt-4o", ReplyBody::Text("APPROVED".into())))
            }
        }));
        let d = determinator(chat.clone(), Some(reasoning.clone()));
        let calls = Arc::new(AtomicUsize::new(0));

        let result = decide(&d, &counting_summarizer(calls.clone()), true).await.unwrap();

        assert_eq!(result.model, "gpt-4o");
        assert_eq!(reasoning.call_count(), 2);
        assert_eq!(chat.call_count(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn summarization_failure_fails_the_attempt() {
        let chat = Arc::new(ScriptedLlmClient::new("gpt-4o", |_, _| {
            Ok(ChatOutcome::ContextLengthExceeded)
        }));
        let d = determinator(chat.clone(), None);
        let summarize = |_text: String| -> BoxFuture<'static, Result<String, LlmError>> {
            async { Err(LlmError::EmptyResponse) }.boxed()
        };

        let err = decide(&d, &summarize, false).await.unwrap_err();

        assert!(matches!(err, DeterminationError::Summarization(_)));
        assert_eq!(chat.call_count(), 2);
    }

    #[tokio::test]
    async fn missing_reasoning_client_uses_chat_model() {
        let chat = approving("gpt-4o");
        let d = determinator(chat.clone(), None);
        let result = decide(&d, &counting_summarizer(Arc::new(AtomicUsize::new(0))), true)
            .await
            .unwrap();
        assert_eq!(result.model, "gpt-4o");
        assert_eq!(chat.requests()[0].system.as_deref(), Some(DETERMINATION_SYSTEM));
    }
}
