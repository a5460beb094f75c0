use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::{field_value, EngineCore};
use crate::llm::ModelTarget;
use crate::prompts::PromptCategory;
use crate::tree::{Decision, DecisionKind};

/// Default number of evaluation attempts before falling back.
pub const DEFAULT_DECISION_RETRIES: u32 = 3;

/// Default delay between evaluation attempts.
pub const DEFAULT_DECISION_RETRY_DELAY_MS: u64 = 1000;

/// Decides how a node's subtree continues.
///
/// Never fails: nodes at or past the layer limit are COMPLETE without a
/// model call, and exhausted retries resolve to [`Decision::fallback`].
#[derive(Clone)]
pub struct DecisionController {
    core: EngineCore,
    target: ModelTarget,
    max_retries: u32,
    retry_delay: Duration,
}

impl DecisionController {
    pub fn new(core: EngineCore, target: ModelTarget) -> Self {
        Self {
            core,
            target,
            max_retries: DEFAULT_DECISION_RETRIES,
            retry_delay: Duration::from_millis(DEFAULT_DECISION_RETRY_DELAY_MS),
        }
    }

    /// Override the retry policy
    pub fn with_retries(mut self, max_retries: u32, retry_delay_ms: u64) -> Self {
        self.max_retries = max_retries.max(1);
        self.retry_delay = Duration::from_millis(retry_delay_ms);
        self
    }

    /// Evaluate a node summary at `current_layer`.
    pub async fn decide(
        &self,
        content: &str,
        original_query: &str,
        further_query: Option<&str>,
        current_layer: u32,
        max_layer: u32,
    ) -> Decision {
        info!(layer = current_layer, max_layer, "Evaluating node");

        if current_layer >= max_layer {
            info!(
                layer = current_layer,
                max_layer, "Layer limit reached, completing"
            );
            return Decision::new(DecisionKind::Complete, current_layer);
        }

        let vars = [
            ("original_query", original_query.to_string()),
            ("further_query", further_query.unwrap_or("None").to_string()),
            ("current_layer", current_layer.to_string()),
            ("max_layer", max_layer.to_string()),
            ("content", content.to_string()),
        ];

        for attempt in 1..=self.max_retries {
            debug!(attempt, max_retries = self.max_retries, "Evaluation attempt");

            let outcome = self
                .core
                .process_with_prompts(
                    &self.target,
                    PromptCategory::EngineController,
                    "evaluate/system",
                    "evaluate/user",
                    &vars,
                )
                .await
                .map_err(|e| e.to_string())
                .and_then(|response| parse_decision(&response, current_layer));

            match outcome {
                Ok(decision) => {
                    info!(
                        layer = current_layer,
                        decision = %decision.kind,
                        questions = decision.questions.len(),
                        "Decision made"
                    );
                    return decision;
                }
                Err(e) => {
                    warn!(
                        attempt,
                        max_retries = self.max_retries,
                        error = %e,
                        "Evaluation attempt failed"
                    );
                    if attempt < self.max_retries {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }

        error!(
            layer = current_layer,
            max_retries = self.max_retries,
            "All evaluation attempts failed, using fallback decision"
        );
        Decision::fallback(current_layer)
    }
}

/// Parse the line-oriented controller response.
///
/// `Decision:` is required and must name a known decision; `Questions:`
/// collects the `- ` bullets that follow it; `Analysis Focus:` is optional.
pub fn parse_decision(response: &str, current_layer: u32) -> Result<Decision, String> {
    #[derive(PartialEq)]
    enum Section {
        None,
        Questions,
        Other,
    }

    let mut kind = None;
    let mut questions = Vec::new();
    let mut analysis_focus = None;
    let mut section = Section::None;

    for line in response.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some(value) = field_value(line, "Decision") {
            kind = Some(value.parse::<DecisionKind>()?);
            section = Section::Other;
        } else if line.starts_with("Questions:") {
            section = Section::Questions;
        } else if let Some(value) = field_value(line, "Analysis Focus") {
            analysis_focus = Some(value.to_string()).filter(|v| !v.is_empty());
            section = Section::Other;
        } else if section == Section::Questions {
            if let Some(question) = line.strip_prefix("- ") {
                questions.push(question.trim().to_string());
            }
        }
    }

    let kind = kind.ok_or_else(|| "Missing fields: decision".to_string())?;
    Ok(Decision {
        kind,
        layer: current_layer,
        questions,
        analysis_focus,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::llm::{MockLlmTransport, Platform};
    use crate::prompts::PromptStore;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn controller(mock: MockLlmTransport) -> DecisionController {
        let core = EngineCore::new(Arc::new(mock), Arc::new(PromptStore::new()));
        DecisionController::new(core, ModelTarget::new(Platform::OpenAi, "gpt-4o"))
            .with_retries(3, 0)
    }

    // ========================================================================
    // Parsing
    // ========================================================================

    #[test]
    fn test_parse_full_response() {
        let response = "Decision: DEPTH\nQuestions:\n- Why now?\n- Who gains?\nAnalysis Focus: supply chains";
        let decision = parse_decision(response, 2).unwrap();

        assert_eq!(
            decision,
            Decision {
                kind: DecisionKind::Depth,
                layer: 2,
                questions: vec!["Why now?".to_string(), "Who gains?".to_string()],
                analysis_focus: Some("supply chains".to_string()),
            }
        );
    }

    #[test]
    fn test_parse_without_focus_or_questions() {
        let decision = parse_decision("Decision: COMPLETE", 1).unwrap();
        assert_eq!(decision.kind, DecisionKind::Complete);
        assert!(decision.questions.is_empty());
        assert!(decision.analysis_focus.is_none());
    }

    #[test]
    fn test_parse_ignores_bullets_outside_questions() {
        let response = "- stray\nDecision: BREADTH\n- also stray";
        let decision = parse_decision(response, 1).unwrap();
        assert!(decision.questions.is_empty());
    }

    #[test]
    fn test_parse_rejects_unknown_decision() {
        assert!(parse_decision("Decision: SIDEWAYS", 1).is_err());
    }

    #[test]
    fn test_parse_rejects_missing_decision() {
        assert!(parse_decision("Questions:\n- what?", 1).is_err());
    }

    // ========================================================================
    // Decide
    // ========================================================================

    #[tokio::test]
    async fn test_layer_limit_completes_without_calls() {
        let mut mock = MockLlmTransport::new();
        mock.expect_chat().times(0);
        let controller = controller(mock);

        for (layer, max) in [(3, 3), (4, 3), (1, 1)] {
            let decision = controller.decide("summary", "q", None, layer, max).await;
            assert_eq!(decision, Decision::new(DecisionKind::Complete, layer));
        }
    }

    #[tokio::test]
    async fn test_exhausted_retries_fall_back() {
        let mut mock = MockLlmTransport::new();
        mock.expect_chat()
            .times(3)
            .returning(|_| Ok("I cannot decide".to_string()));
        let controller = controller(mock);

        let decision = controller.decide("summary", "q", Some("fq"), 1, 3).await;
        assert_eq!(decision, Decision::fallback(1));
    }

    #[tokio::test]
    async fn test_transport_errors_count_as_failed_attempts() {
        let mut mock = MockLlmTransport::new();
        let mut calls = 0;
        mock.expect_chat().times(2).returning(move |_| {
            calls += 1;
            if calls == 1 {
                Err(LlmError::Timeout { timeout_ms: 10 })
            } else {
                Ok("Decision: DEPTH\nQuestions:\n- next?".to_string())
            }
        });
        let controller = controller(mock);

        let decision = controller.decide("summary", "q", None, 2, 3).await;
        assert_eq!(decision.kind, DecisionKind::Depth);
        assert_eq!(decision.layer, 2);
        assert_eq!(decision.questions, vec!["next?".to_string()]);
    }

    #[tokio::test]
    async fn test_prompt_receives_layer_context() {
        let mut mock = MockLlmTransport::new();
        mock.expect_chat()
            .withf(|req| {
                req.user_prompt.contains("Layer: 1 of 4")
                    && req.user_prompt.contains("Current query: None")
            })
            .times(1)
            .returning(|_| Ok("Decision: BREADTH".to_string()));
        let controller = controller(mock);

        let decision = controller.decide("summary", "q", None, 1, 4).await;
        assert_eq!(decision.kind, DecisionKind::Breadth);
    }
}
