use tracing::{debug, error, info, warn};

use super::summary::{NodeSummary, SummarySnapshot};
use crate::engines::EngineCore;
use crate::error::{AnalysisError, AnalysisResult, AppError};
use crate::llm::ModelTarget;
use crate::prompts::PromptCategory;

/// Attempts before giving up on fitting the summaries into the context.
pub const MAX_SYNTHESIS_ATTEMPTS: usize = 5;

/// Returned when the summaries never fit the model's context.
pub const CONTEXT_EXHAUSTED_RESPONSE: &str = "I apologize, but your query resulted in a very comprehensive analysis that exceeds my processing limits. Please try a more specific query or break your question into smaller parts.";

/// Render summaries as `--- Node ... ---` blocks for the final prompt.
pub fn format_node_summaries(summaries: &[NodeSummary]) -> String {
    summaries
        .iter()
        .filter(|s| !s.content.trim().is_empty())
        .map(|s| {
            format!(
                "--- Node {} (Layer {}, Type: {}) ---\n{}\n",
                s.node_id,
                s.layer,
                s.node_type,
                s.content.trim()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Writes the final answer from the stored node summaries.
#[derive(Clone)]
pub struct ResponseSynthesizer {
    core: EngineCore,
    target: ModelTarget,
}

impl ResponseSynthesizer {
    pub fn new(core: EngineCore, target: ModelTarget) -> Self {
        Self { core, target }
    }

    /// Synthesize the final response.
    ///
    /// A context-length failure drops the last summary (keeping at least one)
    /// and retries; after [`MAX_SYNTHESIS_ATTEMPTS`] such failures the fixed
    /// [`CONTEXT_EXHAUSTED_RESPONSE`] is returned. Any other failure is an error.
    pub async fn synthesize(
        &self,
        original_query: &str,
        snapshot: &SummarySnapshot,
    ) -> AnalysisResult<String> {
        let summaries = &snapshot.node_summaries;
        let stats = &snapshot.stats;
        let mut nodes_to_use = summaries.len();

        for attempt in 1..=MAX_SYNTHESIS_ATTEMPTS {
            debug!(
                attempt,
                nodes = nodes_to_use,
                total = summaries.len(),
                "Synthesizing final response"
            );

            let vars = [
                ("original_query", original_query.to_string()),
                (
                    "node_summaries",
                    format_node_summaries(&summaries[..nodes_to_use.min(summaries.len())]),
                ),
                ("total_nodes", stats.total_nodes.to_string()),
                ("max_depth", stats.max_depth.to_string()),
                ("breadth_analyses", stats.breadth_analyses.to_string()),
                ("depth_analyses", stats.depth_analyses.to_string()),
            ];

            match self
                .core
                .process_with_prompts(
                    &self.target,
                    PromptCategory::Response,
                    "final_response/system",
                    "final_response/user",
                    &vars,
                )
                .await
            {
                Ok(response) => {
                    info!(nodes = nodes_to_use, "Final response generated");
                    return Ok(response);
                }
                Err(AppError::Llm(e)) if e.is_context_length_exceeded() => {
                    warn!(
                        attempt,
                        nodes = nodes_to_use,
                        error = %e,
                        "Context length exceeded, dropping one node summary"
                    );
                    nodes_to_use = nodes_to_use.saturating_sub(1).max(1);
                }
                Err(e) => {
                    error!(error = %e, "Failed to generate final response");
                    return Err(AnalysisError::Synthesis {
                        message: e.to_string(),
                    });
                }
            }
        }

        error!("Could not generate response within context limits");
        Ok(CONTEXT_EXHAUSTED_RESPONSE.to_string())
    }
}
