use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::builder::BuiltNode;
use crate::engines::EngineCore;
use crate::llm::ModelTarget;
use crate::prompts::PromptCategory;

const SECTION_START: &str = "[SUMMARY VALIDATION]";
const SECTION_END: &str = "[END SUMMARY VALIDATION]";

/// Status reported when no parseable verdict could be obtained.
pub const FAILED_STATUS: &str = "FAILED";

/// Fact-check verdict for one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationVerdict {
    /// `VALID`, `INVALID`, or [`FAILED_STATUS`].
    pub status: String,
    pub issues: Vec<String>,
    pub evidence: Vec<String>,
    pub error: Option<String>,
}

impl ValidationVerdict {
    /// Only an explicit `VALID` passes.
    pub fn passed(&self) -> bool {
        self.status.eq_ignore_ascii_case("VALID")
    }

    fn failed(error: impl Into<String>) -> Self {
        Self {
            status: FAILED_STATUS.to_string(),
            issues: Vec::new(),
            evidence: Vec::new(),
            error: Some(error.into()),
        }
    }
}

/// Parse the `[SUMMARY VALIDATION]` section of a fact-check response.
///
/// Returns `None` when the section markers are missing. A section without a
/// `STATUS:` line is INVALID.
pub fn parse_verdict(response: &str) -> Option<ValidationVerdict> {
    let start = response.find(SECTION_START)? + SECTION_START.len();
    let end = start + response[start..].find(SECTION_END)?;

    let mut verdict = ValidationVerdict {
        status: "INVALID".to_string(),
        issues: Vec::new(),
        evidence: Vec::new(),
        error: None,
    };

    enum List {
        Issues,
        Evidence,
    }
    let mut current = None;

    for line in response[start..end].lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some(status) = line.strip_prefix("STATUS:") {
            verdict.status = status.trim().to_uppercase();
        } else if line.starts_with("ISSUES:") {
            current = Some(List::Issues);
        } else if line.starts_with("EVIDENCE:") {
            current = Some(List::Evidence);
        } else if let Some(item) = line.strip_prefix('-') {
            match current {
                Some(List::Issues) => verdict.issues.push(item.trim().to_string()),
                Some(List::Evidence) => verdict.evidence.push(item.trim().to_string()),
                None => {}
            }
        }
    }

    Some(verdict)
}

/// Fact-checks node summaries against an online model.
#[derive(Clone)]
pub struct ValidationService {
    core: EngineCore,
    target: ModelTarget,
    max_retries: u32,
    retry_delay: Duration,
}

impl ValidationService {
    pub fn new(core: EngineCore, target: ModelTarget) -> Self {
        Self {
            core,
            target,
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
        }
    }

    pub fn with_retries(mut self, max_retries: u32, retry_delay_ms: u64) -> Self {
        self.max_retries = max_retries.max(1);
        self.retry_delay = Duration::from_millis(retry_delay_ms);
        self
    }

    /// Check a built node. Exhausted retries give a [`FAILED_STATUS`] verdict.
    pub async fn validate(&self, node: &BuiltNode) -> ValidationVerdict {
        let content = format!(
            "[CONTENT TO VALIDATE]\nDETAILED RESULTS:\n{}\n\nLAYER SUMMARY:\n{}\n[END CONTENT TO VALIDATE]",
            node.detailed_results(),
            node.summary
        );
        let vars = [
            ("current_date", Utc::now().format("%Y-%m-%d").to_string()),
            ("summary", content),
        ];

        let request = match self.core.build_request(
            &self.target,
            PromptCategory::Validation,
            "fact_check/system",
            "fact_check/user",
            &vars,
        ) {
            Ok(request) => request,
            Err(e) => {
                error!(node_id = %node.node_id, error = %e, "Validation prompt unavailable");
                return ValidationVerdict::failed(e.to_string());
            }
        };

        for attempt in 1..=self.max_retries {
            match self.core.transport().chat(&request).await {
                Ok(response) => {
                    debug!(node_id = %node.node_id, response = %response, "Validation response");
                    if let Some(verdict) = parse_verdict(&response) {
                        info!(
                            node_id = %node.node_id,
                            status = %verdict.status,
                            issues = verdict.issues.len(),
                            "Validation completed"
                        );
                        return verdict;
                    }
                    warn!(node_id = %node.node_id, attempt, "Failed to parse validation response");
                }
                Err(e) => {
                    warn!(node_id = %node.node_id, attempt, error = %e, "Validation call failed");
                }
            }
            if attempt < self.max_retries {
                tokio::time::sleep(self.retry_delay).await;
            }
        }

        error!(node_id = %node.node_id, "All validation attempts failed");
        ValidationVerdict::failed("Failed to get valid response after all retries")
    }
}
