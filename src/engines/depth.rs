use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{field_value, EngineCore};
use crate::llm::ModelTarget;
use crate::prompts::PromptCategory;

/// Follow-up used when the model response carries no `Question:` line.
pub const FALLBACK_QUESTION: &str = "What are the primary factors influencing this situation?";

/// The query for a BREADTH-typed follow-up child.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowUp {
    pub question: String,
}

/// Drills a node summary into one follow-up question.
#[derive(Clone)]
pub struct DepthEngine {
    core: EngineCore,
    target: ModelTarget,
}

impl DepthEngine {
    pub fn new(core: EngineCore, target: ModelTarget) -> Self {
        Self { core, target }
    }

    /// Derive a follow-up question.
    ///
    /// Returns `None` only when the model call itself fails; a response
    /// without a question yields [`FALLBACK_QUESTION`].
    pub async fn expand(&self, content: &str, original_query: &str) -> Option<FollowUp> {
        match self
            .core
            .process_with_prompts(
                &self.target,
                PromptCategory::DepthAnalysis,
                "generate/system",
                "generate/user",
                &[
                    ("content", content.to_string()),
                    ("original_query", original_query.to_string()),
                ],
            )
            .await
        {
            Ok(response) => {
                let follow_up = parse_question(&response);
                info!(question = %follow_up.question, "Generated follow-up question");
                Some(follow_up)
            }
            Err(e) => {
                warn!(error = %e, "Depth analysis call failed");
                None
            }
        }
    }
}

/// Read the `Question:` line, falling back to [`FALLBACK_QUESTION`].
pub fn parse_question(response: &str) -> FollowUp {
    let question = response
        .lines()
        .filter_map(|line| field_value(line, "Question"))
        .filter(|q| !q.is_empty())
        .last()
        .map(str::to_string)
        .unwrap_or_else(|| {
            warn!("Response is missing required question field");
            FALLBACK_QUESTION.to_string()
        });
    FollowUp { question }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::llm::{MockLlmTransport, Platform};
    use crate::prompts::PromptStore;
    use std::sync::Arc;

    fn engine(mock: MockLlmTransport) -> DepthEngine {
        let core = EngineCore::new(Arc::new(mock), Arc::new(PromptStore::new()));
        DepthEngine::new(core, ModelTarget::new(Platform::OpenAi, "gpt-4o"))
    }

    #[test]
    fn test_parse_question() {
        let follow_up = parse_question("Reasoning first.\nQuestion: Who benefits most?");
        assert_eq!(follow_up.question, "Who benefits most?");
    }

    #[test]
    fn test_missing_question_uses_fallback() {
        assert_eq!(parse_question("No question here").question, FALLBACK_QUESTION);
        assert_eq!(parse_question("Question:   ").question, FALLBACK_QUESTION);
    }

    #[tokio::test]
    async fn test_expand_without_question_line() {
        let mut mock = MockLlmTransport::new();
        mock.expect_chat()
            .times(1)
            .returning(|_| Ok("I would look at incentives.".to_string()));

        let follow_up = engine(mock).expand("summary", "q").await.unwrap();
        assert_eq!(follow_up.question, FALLBACK_QUESTION);
    }

    #[tokio::test]
    async fn test_expand_transport_failure() {
        let mut mock = MockLlmTransport::new();
        mock.expect_chat()
            .times(1)
            .returning(|_| Err(LlmError::Timeout { timeout_ms: 5 }));

        assert!(engine(mock).expand("summary", "q").await.is_none());
    }
}
