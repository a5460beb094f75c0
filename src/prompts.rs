//! Prompt templates for every analysis stage.
//!
//! Templates are addressed by a [`PromptCategory`] plus a slash-separated path
//! (e.g. `evaluate/system`). Built-in templates ship with the binary; a JSON
//! file of the shape `{"category": {"path": "template"}}` may override any of
//! them. Placeholders are written `{name}` and filled by [`PromptStore::get`].

use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, info};

use crate::error::{PromptError, PromptResult};

/// Prompt namespaces, one per pipeline stage or capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptCategory {
    BasePrompter,
    Planner,
    Reasoning,
    InfoSearch,
    NewsSearch,
    EventExtractor,
    HistoryAnalyzer,
    Validation,
    EngineController,
    BreadthAnalysis,
    DepthAnalysis,
    Response,
}

impl PromptCategory {
    /// Every category, in declaration order.
    pub const ALL: [PromptCategory; 12] = [
        PromptCategory::BasePrompter,
        PromptCategory::Planner,
        PromptCategory::Reasoning,
        PromptCategory::InfoSearch,
        PromptCategory::NewsSearch,
        PromptCategory::EventExtractor,
        PromptCategory::HistoryAnalyzer,
        PromptCategory::Validation,
        PromptCategory::EngineController,
        PromptCategory::BreadthAnalysis,
        PromptCategory::DepthAnalysis,
        PromptCategory::Response,
    ];

    /// Get the category name as used in override files
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptCategory::BasePrompter => "base_prompter",
            PromptCategory::Planner => "planner",
            PromptCategory::Reasoning => "reasoning",
            PromptCategory::InfoSearch => "info_search",
            PromptCategory::NewsSearch => "news_search",
            PromptCategory::EventExtractor => "event_extractor",
            PromptCategory::HistoryAnalyzer => "history_analyzer",
            PromptCategory::Validation => "validation",
            PromptCategory::EngineController => "engine_controller",
            PromptCategory::BreadthAnalysis => "breadth_analysis",
            PromptCategory::DepthAnalysis => "depth_analysis",
            PromptCategory::Response => "response",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }
}

impl std::fmt::Display for PromptCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Built-in templates
// ============================================================================

/// Query optimizer system prompt.
pub const INPUT_OPTIMIZATION_SYSTEM: &str = r#"You are a query optimization assistant. Rewrite the user's question so it is specific, self-contained and well suited to multi-step research.

Your response MUST be valid JSON in this exact format:
{
  "optimized_query": "the rewritten query",
  "original_query": "the query exactly as given",
  "modifications": ["short description of each change"]
}

Always respond with valid JSON only, no other text."#;

pub const INPUT_OPTIMIZATION_USER: &str = "Optimize this query:\n{input}";

pub const ERROR_HANDLING_SYSTEM: &str = r#"You are a query repair assistant. The previous optimization attempt failed. Produce a conservative, minimally changed version of the query.

Your response MUST be valid JSON in this exact format:
{
  "optimized_query": "the repaired query",
  "original_query": "the query exactly as given",
  "modifications": ["short description of each change"],
  "error_handling": "what went wrong and how it was handled"
}

Always respond with valid JSON only, no other text."#;

pub const ERROR_HANDLING_USER: &str = "Query: {original_query}\nError: {error}";

/// Task decomposition system prompt.
pub const TASK_DECOMPOSITION_SYSTEM: &str = r#"You are a research planner. Break the query into a short ordered list of tasks. Each task is routed to exactly one agent:

- reasoning: logical analysis and inference
- info_search: factual lookup of current information
- news_search: recent news; input may end with ", N" to request N articles
- event_extractor: extraction of events, actors and dates from text
- history_analyzer: comparison with historical precedents

Your response MUST be a valid JSON array in this exact format:
[
  {"id": 1, "name": "info_search", "input": "what to look up"}
]

Keep the plan complete and free of redundant tasks. Respond with JSON only."#;

pub const TASK_DECOMPOSITION_USER: &str = "Query: {input}";

pub const PLAN_VALIDATOR_SYSTEM: &str = r#"You review research plans. Check that the plan fully covers the query and that no two tasks duplicate each other.

If the plan is acceptable, answer with exactly:
The plan satisfies completeness and non-redundancy.

Otherwise explain concisely what is missing or redundant."#;

pub const PLAN_VALIDATOR_USER: &str = "Query: {query}\n\nPlan:\n{task_plan}";

pub const RETRY_SYSTEM: &str = r#"You are a research planner revising a rejected plan. Apply the reviewer feedback and return the corrected plan.

Your response MUST be a valid JSON array of objects with "id", "name" and "input" fields. Respond with JSON only."#;

pub const RETRY_USER: &str =
    "Query: {query}\n\nReviewer feedback:\n{feedback}\n\nPrevious plan:\n{original_response}";

pub const REASON_SYSTEM: &str = "You are an analytical reasoning agent. Work through the question step by step and state your conclusions plainly.";

pub const REASON_USER: &str = "{query}";

pub const INFO_SEARCH_SYSTEM: &str = "You are a research assistant with web access. Answer with current, verifiable facts and cite sources where possible.";

pub const INFO_SEARCH_USER: &str = "Today is {date}.\n\nFind information about: {query}";

pub const NEWS_SEARCH_SYSTEM: &str = "You are a news research assistant with web access. Report recent, relevant news items with dates and sources.";

pub const NEWS_SEARCH_USER: &str =
    "Today is {date}.\n\nFind the {needed_count} most relevant recent news items about: {query}";

pub const EVENT_EXTRACT_SYSTEM: &str = "You extract events from text. List each event with its date, actors and a one-sentence description.";

pub const EVENT_EXTRACT_USER: &str = "{query}";

pub const HISTORY_ANALYZE_SYSTEM: &str = "You are a historian. Compare the situation with relevant historical precedents and explain what they suggest.";

pub const HISTORY_ANALYZE_USER: &str = "{query}";

pub const FACT_CHECK_SYSTEM: &str = r#"You are a fact checker with web access. Today is {current_date}. Verify the summary against current sources.

Respond in exactly this format:
[SUMMARY VALIDATION]
STATUS: VALID or INVALID
ISSUES:
- issue found, or "- None"
EVIDENCE:
- supporting or contradicting source
[END SUMMARY VALIDATION]"#;

pub const FACT_CHECK_USER: &str = "{summary}";

/// Decision controller system prompt.
pub const EVALUATE_SYSTEM: &str = r#"You steer a recursive analysis. Given the current node summary, choose how to continue:

- BREADTH: the topic has several distinct aspects worth exploring separately
- DEPTH: one thread deserves a more detailed follow-up
- COMPLETE: the analysis already answers the query

Respond in exactly this format:
Decision: BREADTH, DEPTH or COMPLETE
Questions:
- follow-up question
Analysis Focus: one sentence"#;

pub const EVALUATE_USER: &str = "Original query: {original_query}\nCurrent query: {further_query}\nLayer: {current_layer} of {max_layer}\n\nNode summary:\n{content}";

pub const BREADTH_ANALYZE_SYSTEM: &str = r#"You identify the distinct impact aspects of a topic. Return at most {max_aspects} aspects, separated by blank lines, each in exactly this format:

Aspect: short name
Query: a focused research question for this aspect"#;

pub const BREADTH_ANALYZE_USER: &str =
    "Original query: {original_query}\nMaximum aspects: {max_aspects}\n\nCurrent analysis:\n{content}";

pub const DEPTH_GENERATE_SYSTEM: &str = r#"You deepen an analysis. Propose the single most valuable follow-up question.

Respond in exactly this format:
Question: the follow-up question"#;

pub const DEPTH_GENERATE_USER: &str = "Original query: {original_query}\n\nCurrent analysis:\n{content}";

pub const FINAL_RESPONSE_SYSTEM: &str = "You write the final answer of a multi-node research analysis. Synthesize the node summaries into a clear, well-structured response to the original query.";

pub const FINAL_RESPONSE_USER: &str = r#"Original query: {original_query}

Analysis statistics:
- Total nodes: {total_nodes}
- Max depth: {max_depth}
- Breadth analyses: {breadth_analyses}
- Depth analyses: {depth_analyses}

Node summaries:
{node_summaries}"#;

/// Look up a built-in template.
pub fn builtin(category: PromptCategory, path: &str) -> Option<&'static str> {
    use PromptCategory::*;
    let template = match (category, path) {
        (BasePrompter, "input_optimization/system") => INPUT_OPTIMIZATION_SYSTEM,
        (BasePrompter, "input_optimization/user") => INPUT_OPTIMIZATION_USER,
        (BasePrompter, "error_handling/system") => ERROR_HANDLING_SYSTEM,
        (BasePrompter, "error_handling/user") => ERROR_HANDLING_USER,
        (Planner, "task_decomposition/system") => TASK_DECOMPOSITION_SYSTEM,
        (Planner, "task_decomposition/user") => TASK_DECOMPOSITION_USER,
        (Planner, "plan_validator/system") => PLAN_VALIDATOR_SYSTEM,
        (Planner, "plan_validator/user") => PLAN_VALIDATOR_USER,
        (Planner, "retry/system") => RETRY_SYSTEM,
        (Planner, "retry/user") => RETRY_USER,
        (Reasoning, "reason/system") => REASON_SYSTEM,
        (Reasoning, "reason/user") => REASON_USER,
        (InfoSearch, "search/system") => INFO_SEARCH_SYSTEM,
        (InfoSearch, "search/user") => INFO_SEARCH_USER,
        (NewsSearch, "search/system") => NEWS_SEARCH_SYSTEM,
        (NewsSearch, "search/user") => NEWS_SEARCH_USER,
        (EventExtractor, "extract/system") => EVENT_EXTRACT_SYSTEM,
        (EventExtractor, "extract/user") => EVENT_EXTRACT_USER,
        (HistoryAnalyzer, "analyze/system") => HISTORY_ANALYZE_SYSTEM,
        (HistoryAnalyzer, "analyze/user") => HISTORY_ANALYZE_USER,
        (Validation, "fact_check/system") => FACT_CHECK_SYSTEM,
        (Validation, "fact_check/user") => FACT_CHECK_USER,
        (EngineController, "evaluate/system") => EVALUATE_SYSTEM,
        (EngineController, "evaluate/user") => EVALUATE_USER,
        (BreadthAnalysis, "analyze/system") => BREADTH_ANALYZE_SYSTEM,
        (BreadthAnalysis, "analyze/user") => BREADTH_ANALYZE_USER,
        (DepthAnalysis, "generate/system") => DEPTH_GENERATE_SYSTEM,
        (DepthAnalysis, "generate/user") => DEPTH_GENERATE_USER,
        (Response, "final_response/system") => FINAL_RESPONSE_SYSTEM,
        (Response, "final_response/user") => FINAL_RESPONSE_USER,
        _ => return None,
    };
    Some(template)
}

// ============================================================================
// Store
// ============================================================================

/// Template lookup with `{name}` substitution and optional file overrides.
#[derive(Debug, Clone, Default)]
pub struct PromptStore {
    overrides: HashMap<(PromptCategory, String), String>,
}

impl PromptStore {
    /// Store backed only by the built-in templates
    pub fn new() -> Self {
        Self::default()
    }

    /// Load overrides from a JSON file (`{"category": {"path": "template"}}`)
    pub fn from_file(path: &Path) -> PromptResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| PromptError::Load {
            message: format!("{}: {}", path.display(), e),
        })?;
        let store = Self::from_json(&raw)?;
        info!(
            path = %path.display(),
            overrides = store.overrides.len(),
            "Loaded prompt overrides"
        );
        Ok(store)
    }

    /// Parse overrides from a JSON document
    pub fn from_json(raw: &str) -> PromptResult<Self> {
        let parsed: HashMap<String, HashMap<String, String>> =
            serde_json::from_str(raw).map_err(|e| PromptError::Load {
                message: e.to_string(),
            })?;

        let mut overrides = HashMap::new();
        for (category_name, templates) in parsed {
            let category =
                PromptCategory::from_name(&category_name).ok_or_else(|| PromptError::Load {
                    message: format!("Unknown prompt category: {}", category_name),
                })?;
            for (path, template) in templates {
                overrides.insert((category, path), template);
            }
        }
        Ok(Self { overrides })
    }

    /// Replace a single template
    pub fn with_override(
        mut self,
        category: PromptCategory,
        path: impl Into<String>,
        template: impl Into<String>,
    ) -> Self {
        self.overrides
            .insert((category, path.into()), template.into());
        self
    }

    /// Fetch a template and fill its `{name}` placeholders.
    ///
    /// Placeholders without a matching variable are left as-is, so literal
    /// JSON braces in templates survive rendering.
    pub fn get(
        &self,
        category: PromptCategory,
        path: &str,
        vars: &[(&str, String)],
    ) -> PromptResult<String> {
        let template = self
            .overrides
            .get(&(category, path.to_string()))
            .map(String::as_str)
            .or_else(|| builtin(category, path))
            .ok_or_else(|| PromptError::NotFound {
                category: category.to_string(),
                path: path.to_string(),
            })?;

        debug!(category = %category, path = %path, "Rendering prompt");
        Ok(render(template, vars))
    }
}

/// Single pass over the template: `{name}` tokens with a value are replaced,
/// everything else (including inserted values) is copied unchanged.
fn render(template: &str, vars: &[(&str, String)]) -> String {
    let lookup: HashMap<&str, &str> = vars
        .iter()
        .map(|(name, value)| (*name, value.as_str()))
        .collect();

    let mut output = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        output.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let token = after
            .find('}')
            .map(|close| &after[..close])
            .filter(|name| !name.contains('{'))
            .and_then(|name| lookup.get(name).map(|value| (name.len(), *value)));

        match token {
            Some((len, value)) => {
                output.push_str(value);
                rest = &after[len + 1..];
            }
            None => {
                output.push('{');
                rest = after;
            }
        }
    }
    output.push_str(rest);
    output
}
