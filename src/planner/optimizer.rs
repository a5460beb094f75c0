use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::engines::{extract_json_from_completion, EngineCore};
use crate::llm::ModelTarget;
use crate::prompts::PromptCategory;

/// Result of rewriting the user's query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizedQuery {
    pub optimized_query: String,
    pub original_query: String,
    #[serde(default)]
    pub modifications: Vec<String>,
    /// Set when the first optimization attempt failed and was repaired.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_handling: Option<String>,
}

impl OptimizedQuery {
    /// Use the query unchanged
    pub fn passthrough(query: &str) -> Self {
        Self {
            optimized_query: query.to_string(),
            original_query: query.to_string(),
            modifications: Vec::new(),
            error_handling: None,
        }
    }

    fn validate(self) -> Result<Self, String> {
        if self.optimized_query.trim().is_empty() {
            return Err("optimized_query is empty".to_string());
        }
        if self.original_query.trim().is_empty() {
            return Err("original_query is empty".to_string());
        }
        Ok(self)
    }
}

fn parse_optimization(response: &str) -> Result<OptimizedQuery, String> {
    let json = extract_json_from_completion(response)?;
    serde_json::from_str::<OptimizedQuery>(json)
        .map_err(|e| format!("Invalid optimization JSON: {}", e))?
        .validate()
}

/// Rewrites the user query before the root node is built.
#[derive(Clone)]
pub struct QueryOptimizer {
    core: EngineCore,
    target: ModelTarget,
}

impl QueryOptimizer {
    pub fn new(core: EngineCore, target: ModelTarget) -> Self {
        Self { core, target }
    }

    /// Optimize `query`, never failing.
    ///
    /// A failed attempt gets one repair call; if that fails too the query is
    /// used unchanged.
    pub async fn optimize(&self, query: &str) -> OptimizedQuery {
        info!("Starting input optimization");

        let first = self
            .core
            .process_with_prompts(
                &self.target,
                PromptCategory::BasePrompter,
                "input_optimization/system",
                "input_optimization/user",
                &[("input", query.to_string())],
            )
            .await
            .map_err(|e| e.to_string())
            .and_then(|r| parse_optimization(&r));

        let error = match first {
            Ok(result) => {
                info!(
                    modifications = result.modifications.len(),
                    "Input optimization completed"
                );
                return result;
            }
            Err(e) => e,
        };

        warn!(error = %error, "Input optimization failed, attempting repair");
        let repaired = self
            .core
            .process_with_prompts(
                &self.target,
                PromptCategory::BasePrompter,
                "error_handling/system",
                "error_handling/user",
                &[
                    ("original_query", query.to_string()),
                    ("error", error.clone()),
                ],
            )
            .await
            .map_err(|e| e.to_string())
            .and_then(|r| parse_optimization(&r));

        match repaired {
            Ok(mut result) => {
                result.error_handling.get_or_insert(error);
                result
            }
            Err(e) => {
                warn!(error = %e, "Query repair failed, using original query");
                OptimizedQuery::passthrough(query)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::llm::{MockLlmTransport, Platform};
    use crate::prompts::PromptStore;
    use std::sync::Arc;

    fn optimizer(mock: MockLlmTransport) -> QueryOptimizer {
        let core = EngineCore::new(Arc::new(mock), Arc::new(PromptStore::new()));
        QueryOptimizer::new(core, ModelTarget::new(Platform::OpenAi, "gpt-4o"))
    }

    #[tokio::test]
    async fn test_optimize_success() {
        let mut mock = MockLlmTransport::new();
        mock.expect_chat().times(1).returning(|_| {
            Ok(r#"{"optimized_query": "Impact of AI on jobs in 2024", "original_query": "ai jobs", "modifications": ["added year"]}"#.to_string())
        });

        let result = optimizer(mock).optimize("ai jobs").await;
        assert_eq!(result.optimized_query, "Impact of AI on jobs in 2024");
        assert_eq!(result.original_query, "ai jobs");
        assert_eq!(result.modifications, vec!["added year".to_string()]);
        assert!(result.error_handling.is_none());
    }

    #[tokio::test]
    async fn test_optimize_repairs_after_bad_json() {
        let mut mock = MockLlmTransport::new();
        mock.expect_chat()
            .withf(|req| req.label == "base_prompter/input_optimization/user")
            .times(1)
            .returning(|_| Ok("not json".to_string()));
        mock.expect_chat()
            .withf(|req| req.label == "base_prompter/error_handling/user")
            .times(1)
            .returning(|_| {
                Ok(r#"{"optimized_query": "AI and jobs", "original_query": "ai jobs", "modifications": []}"#.to_string())
            });

        let result = optimizer(mock).optimize("ai jobs").await;
        assert_eq!(result.optimized_query, "AI and jobs");
        assert!(result.error_handling.is_some());
    }

    #[tokio::test]
    async fn test_optimize_falls_back_to_original() {
        let mut mock = MockLlmTransport::new();
        mock.expect_chat()
            .times(2)
            .returning(|_| Err(LlmError::Timeout { timeout_ms: 1 }));

        let result = optimizer(mock).optimize("ai jobs").await;
        assert_eq!(result, OptimizedQuery::passthrough("ai jobs"));
    }

    #[tokio::test]
    async fn test_empty_optimized_query_is_rejected() {
        let mut mock = MockLlmTransport::new();
        mock.expect_chat().times(2).returning(|_| {
            Ok(r#"{"optimized_query": " ", "original_query": "q", "modifications": []}"#.to_string())
        });

        let result = optimizer(mock).optimize("q").await;
        assert_eq!(result.optimized_query, "q");
    }
}
