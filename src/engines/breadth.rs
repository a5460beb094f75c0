use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{field_value, EngineCore};
use crate::llm::ModelTarget;
use crate::prompts::PromptCategory;

/// Default upper bound on aspects per breadth expansion.
pub const DEFAULT_MAX_ASPECTS: usize = 3;

/// One sub-aspect of a topic, the query for a DEPTH-typed child.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aspect {
    pub name: String,
    pub query: String,
}

/// Fans a node summary out into named sub-aspects.
#[derive(Clone)]
pub struct BreadthEngine {
    core: EngineCore,
    target: ModelTarget,
    max_aspects: usize,
}

impl BreadthEngine {
    pub fn new(core: EngineCore, target: ModelTarget) -> Self {
        Self {
            core,
            target,
            max_aspects: DEFAULT_MAX_ASPECTS,
        }
    }

    pub fn with_max_aspects(mut self, max_aspects: usize) -> Self {
        self.max_aspects = max_aspects;
        self
    }

    /// Derive up to `max_aspects` aspects.
    ///
    /// An empty list means "no further breadth expansion"; transport failures
    /// are logged and reported the same way.
    pub async fn expand(&self, node_summary: &str, original_query: &str) -> Vec<Aspect> {
        let response = match self
            .core
            .process_with_prompts(
                &self.target,
                PromptCategory::BreadthAnalysis,
                "analyze/system",
                "analyze/user",
                &[
                    ("content", node_summary.to_string()),
                    ("original_query", original_query.to_string()),
                    ("max_aspects", self.max_aspects.to_string()),
                ],
            )
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Breadth analysis call failed");
                return Vec::new();
            }
        };

        let mut aspects = parse_aspects(&response);
        aspects.truncate(self.max_aspects);
        info!(aspects = aspects.len(), "Identified impact aspects");
        aspects
    }
}

/// Parse `Aspect:` / `Query:` blocks separated by lines that are blank
/// after trimming, so CRLF responses split the same way.
///
/// Blocks missing either field are skipped.
pub fn parse_aspects(response: &str) -> Vec<Aspect> {
    let mut blocks: Vec<Vec<&str>> = vec![Vec::new()];
    for line in response.lines() {
        if line.trim().is_empty() {
            blocks.push(Vec::new());
        } else if let Some(block) = blocks.last_mut() {
            block.push(line);
        }
    }

    let aspects: Vec<Aspect> = blocks
        .into_iter()
        .filter(|block| !block.is_empty())
        .filter_map(|block| {
            let mut name = None;
            let mut query = None;
            for line in block {
                if let Some(value) = field_value(line, "Aspect") {
                    name = Some(value.to_string());
                } else if let Some(value) = field_value(line, "Query") {
                    query = Some(value.to_string());
                }
            }
            match (name, query) {
                (Some(name), Some(query)) if !query.is_empty() => Some(Aspect { name, query }),
                _ => None,
            }
        })
        .collect();

    if aspects.is_empty() {
        warn!("No valid aspects found in response");
    }
    aspects
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::llm::{MockLlmTransport, Platform};
    use crate::prompts::PromptStore;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn engine(mock: MockLlmTransport) -> BreadthEngine {
        let core = EngineCore::new(Arc::new(mock), Arc::new(PromptStore::new()));
        BreadthEngine::new(core, ModelTarget::new(Platform::OpenAi, "gpt-4o"))
    }

    #[test]
    fn test_malformed_block_is_skipped() {
        let response = "Aspect: Economy\nQuery: How are prices affected?\n\n\
                        Aspect: Politics\n\n\
                        Aspect: Environment\nQuery: What are the emissions effects?";
        let aspects = parse_aspects(response);

        assert_eq!(
            aspects,
            vec![
                Aspect {
                    name: "Economy".to_string(),
                    query: "How are prices affected?".to_string(),
                },
                Aspect {
                    name: "Environment".to_string(),
                    query: "What are the emissions effects?".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_crlf_and_whitespace_separators() {
        let response = "Aspect: Economy\r\nQuery: Prices?\r\n\r\n\
                        Aspect: Politics\r\nQuery: Elections?\r\n  \r\n\
                        Aspect: Health\r\nQuery: Hospitals?\r\n";
        let aspects = parse_aspects(response);

        let names: Vec<_> = aspects.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["Economy", "Politics", "Health"]);
        assert_eq!(aspects[1].query, "Elections?");
    }

    #[test]
    fn test_unparseable_response_is_empty() {
        assert!(parse_aspects("nothing useful").is_empty());
        assert!(parse_aspects("").is_empty());
    }

    #[tokio::test]
    async fn test_expand_truncates_to_max_aspects() {
        let mut mock = MockLlmTransport::new();
        mock.expect_chat()
            .withf(|req| req.system_prompt.contains("at most 2 aspects"))
            .times(1)
            .returning(|_| {
                Ok("Aspect: A\nQuery: a?\n\nAspect: B\nQuery: b?\n\nAspect: C\nQuery: c?".to_string())
            });

        let aspects = engine(mock).with_max_aspects(2).expand("summary", "q").await;
        assert_eq!(aspects.len(), 2);
        assert_eq!(aspects[1].name, "B");
    }

    #[tokio::test]
    async fn test_expand_transport_failure_is_empty() {
        let mut mock = MockLlmTransport::new();
        mock.expect_chat()
            .times(1)
            .returning(|_| Err(LlmError::Timeout { timeout_ms: 5 }));

        assert!(engine(mock).expand("summary", "q").await.is_empty());
    }
}
