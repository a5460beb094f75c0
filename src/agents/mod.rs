//! Capability router.
//!
//! A task names one [`Capability`]; the [`CapabilityRouter`] renders that
//! capability's prompt pair and sends it to the capability's model. Search
//! capabilities go to the online (Perplexity) model, everything else to the
//! engine model.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::ModelConfig;
use crate::engines::EngineCore;
use crate::error::CapabilityError;
use crate::llm::{ModelTarget, Platform};
use crate::prompts::PromptCategory;

/// Article count used when a news task does not specify one.
pub const DEFAULT_NEWS_COUNT: u32 = 3;

/// The closed set of analysis capabilities a task may name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Reasoning,
    InfoSearch,
    NewsSearch,
    EventExtractor,
    HistoryAnalyzer,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Reasoning => "reasoning",
            Capability::InfoSearch => "info_search",
            Capability::NewsSearch => "news_search",
            Capability::EventExtractor => "event_extractor",
            Capability::HistoryAnalyzer => "history_analyzer",
        }
    }

    fn prompt_paths(&self) -> (PromptCategory, &'static str, &'static str) {
        match self {
            Capability::Reasoning => (PromptCategory::Reasoning, "reason/system", "reason/user"),
            Capability::InfoSearch => (PromptCategory::InfoSearch, "search/system", "search/user"),
            Capability::NewsSearch => (PromptCategory::NewsSearch, "search/system", "search/user"),
            Capability::EventExtractor => (
                PromptCategory::EventExtractor,
                "extract/system",
                "extract/user",
            ),
            Capability::HistoryAnalyzer => (
                PromptCategory::HistoryAnalyzer,
                "analyze/system",
                "analyze/user",
            ),
        }
    }

    fn is_search(&self) -> bool {
        matches!(self, Capability::InfoSearch | Capability::NewsSearch)
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Capability {
    type Err = CapabilityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "reasoning" => Ok(Capability::Reasoning),
            "info_search" => Ok(Capability::InfoSearch),
            "news_search" => Ok(Capability::NewsSearch),
            "event_extractor" => Ok(Capability::EventExtractor),
            "history_analyzer" => Ok(Capability::HistoryAnalyzer),
            _ => Err(CapabilityError::UnknownCapability {
                name: s.to_string(),
            }),
        }
    }
}

/// Split a news task input into its topic and requested article count.
///
/// `"topic, 5"` yields `("topic", 5)`. When the text after the last comma is
/// not an integer, the whole input is the topic and the count is
/// [`DEFAULT_NEWS_COUNT`].
pub fn parse_news_input(input: &str) -> (String, u32) {
    if let Some((topic, count)) = input.rsplit_once(',') {
        if let Ok(count) = count.trim().parse::<u32>() {
            return (topic.trim().to_string(), count);
        }
    }
    (input.trim().to_string(), DEFAULT_NEWS_COUNT)
}

/// Dispatches tasks to capabilities.
#[derive(Clone)]
pub struct CapabilityRouter {
    core: EngineCore,
    engine_target: ModelTarget,
    search_target: ModelTarget,
}

impl CapabilityRouter {
    pub fn new(core: EngineCore, models: &ModelConfig) -> Self {
        Self {
            core,
            engine_target: ModelTarget::new(Platform::OpenAi, models.engine_model.clone()),
            search_target: ModelTarget::new(Platform::Perplexity, models.search_model.clone()),
        }
    }

    /// Model a capability's calls are sent to
    pub fn target(&self, capability: Capability) -> &ModelTarget {
        if capability.is_search() {
            &self.search_target
        } else {
            &self.engine_target
        }
    }

    /// Run one capability on `input`.
    pub async fn route(&self, capability: Capability, input: &str) -> Result<String, CapabilityError> {
        let (category, system_path, user_path) = capability.prompt_paths();
        let today = Utc::now().format("%Y-%m-%d").to_string();

        let vars = match capability {
            Capability::InfoSearch => vec![("date", today), ("query", input.trim().to_string())],
            Capability::NewsSearch => {
                let (query, count) = parse_news_input(input);
                vec![
                    ("date", today),
                    ("query", query),
                    ("needed_count", count.to_string()),
                ]
            }
            _ => vec![("query", input.to_string())],
        };

        let request = self.core.build_request(
            self.target(capability),
            category,
            system_path,
            user_path,
            &vars,
        )?;
        debug!(capability = %capability, "Invoking capability");
        Ok(self.core.transport().chat(&request).await?)
    }

    /// Run the capability named `name`, rendering any failure as an
    /// `Error: ...` string instead of returning it.
    pub async fn invoke(&self, name: &str, input: &str) -> String {
        let result = match name.parse::<Capability>() {
            Ok(capability) => self.route(capability, input).await,
            Err(e) => Err(e),
        };
        result.unwrap_or_else(|e| {
            warn!(capability = %name, error = %e, "Capability invocation failed");
            format!("Error: {}", e)
        })
    }
}
