use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Evaluator verdict on one set of search results.
///
/// Invariants after [`PolicyEvaluation::from_value`]: `policies` holds no
/// duplicates, `reasoning` has one entry per policy, and `retry` is true
/// whenever `policies` is empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyEvaluation {
    pub policies: Vec<String>,
    pub reasoning: Vec<String>,
    pub retry: bool,
}

impl Default for PolicyEvaluation {
    /// Verdict used when the evaluator reply cannot be read.
    fn default() -> Self {
        Self {
            policies: Vec::new(),
            reasoning: Vec::new(),
            retry: true,
        }
    }
}

fn string_items(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .collect(),
        Some(Value::String(s)) => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}

impl PolicyEvaluation {
    /// Read an evaluator reply leniently. Anything unreadable falls back to
    /// the retry verdict.
    pub fn from_value(value: &Value) -> Self {
        let Some(object) = value.as_object() else {
            return Self::default();
        };

        let raw_policies = string_items(object.get("policies"));
        let raw_reasoning = string_items(object.get("reasoning"));

        let mut policies: Vec<String> = Vec::with_capacity(raw_policies.len());
        let mut reasoning: Vec<String> = Vec::with_capacity(raw_policies.len());
        for (i, policy) in raw_policies.into_iter().enumerate() {
            if policy.is_empty() || policies.contains(&policy) {
                continue;
            }
            reasoning.push(raw_reasoning.get(i).cloned().unwrap_or_default());
            policies.push(policy);
        }

        let retry = match object.get("retry") {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => !s.trim().eq_ignore_ascii_case("false"),
            _ => true,
        };

        Self {
            retry: retry || policies.is_empty(),
            policies,
            reasoning,
        }
    }
}

/// Result of the retrieval loop. All fields empty when every attempt was
/// used up without an accepted evaluation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RagOutcome {
    pub query: Option<String>,
    pub policies: Vec<String>,
    pub evaluation: Option<PolicyEvaluation>,
}

impl RagOutcome {
    pub fn exhausted() -> Self {
        Self::default()
    }

    /// Top-ranked policy reference, if any.
    pub fn top_policy(&self) -> Option<&str> {
        self.policies.first().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_well_formed_verdict() {
        let eval = PolicyEvaluation::from_value(&json!({
            "policies": ["p1.pdf", "p2.pdf"],
            "reasoning": ["r1", "r2"],
            "retry": false
        }));
        assert_eq!(eval.policies, vec!["p1.pdf", "p2.pdf"]);
        assert_eq!(eval.reasoning, vec!["r1", "r2"]);
        assert!(!eval.retry);
    }

    #[test]
    fn empty_policies_force_retry() {
        let eval = PolicyEvaluation::from_value(&json!({"policies": [], "retry": false}));
        assert!(eval.retry);
    }

    #[test]
    fn duplicates_removed_and_reasoning_aligned() {
        let eval = PolicyEvaluation::from_value(&json!({
            "policies": ["p1.pdf", "p1.pdf", "p2.pdf"],
            "reasoning": ["first"],
            "retry": false
        }));
        assert_eq!(eval.policies, vec!["p1.pdf", "p2.pdf"]);
        assert_eq!(eval.reasoning.len(), eval.policies.len());
        assert_eq!(eval.reasoning[0], "first");
        assert_eq!(eval.reasoning[1], "");
    }

    #[test]
    fn missing_retry_defaults_to_true() {
        let eval = PolicyEvaluation::from_value(&json!({"policies": ["p1.pdf"]}));
        assert!(eval.retry);
    }

    #[test]
    fn string_retry_is_understood() {
        let eval = PolicyEvaluation::from_value(&json!({"policies": ["p"], "retry": "false"}));
        assert!(!eval.retry);
    }

    #[test]
    fn non_object_is_default_retry() {
        assert_eq!(PolicyEvaluation::from_value(&json!([1, 2])), PolicyEvaluation::default());
        assert!(PolicyEvaluation::default().retry);
    }

    #[test]
    fn exhausted_outcome_is_empty() {
        let outcome = RagOutcome::exhausted();
        assert!(outcome.query.is_none());
        assert!(outcome.policies.is_empty());
        assert!(outcome.evaluation.is_none());
        assert!(outcome.top_policy().is_none());
    }
}
