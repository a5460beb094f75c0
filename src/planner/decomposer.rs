use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::agents::Capability;
use crate::engines::{extract_json_from_completion, EngineCore};
use crate::error::{AnalysisError, AnalysisResult};
use crate::llm::ModelTarget;
use crate::prompts::PromptCategory;

/// Substring the plan validator emits when it accepts a plan.
pub const PLAN_ACCEPTANCE_PHRASE: &str = "The plan satisfies completeness and non-redundancy.";

/// One unit of work for a node: a capability name plus its input.
///
/// `name` is kept as written by the planner; unknown names fail at routing
/// time as a single failed task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub name: String,
    pub input: String,
}

/// Planner output entry: either a full task object or a bare input string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawTask {
    Plain(String),
    Structured {
        #[serde(default)]
        id: Option<serde_json::Value>,
        #[serde(default)]
        name: String,
        #[serde(default)]
        input: String,
    },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawPlan {
    List(Vec<RawTask>),
    Wrapped { tasks: Vec<RawTask> },
}

/// Parse a planner completion into tasks.
///
/// Bare strings become `info_search` tasks. Missing ids are numbered from 1.
pub fn parse_tasks(completion: &str) -> Result<Vec<Task>, String> {
    let json = extract_json_from_completion(completion)?;
    let plan: RawPlan =
        serde_json::from_str(json).map_err(|e| format!("Invalid task plan JSON: {}", e))?;
    let raw = match plan {
        RawPlan::List(tasks) | RawPlan::Wrapped { tasks } => tasks,
    };

    Ok(raw
        .into_iter()
        .enumerate()
        .map(|(i, task)| {
            let fallback_id = format!("task_{}", i + 1);
            match task {
                RawTask::Plain(input) => Task {
                    id: fallback_id,
                    name: Capability::InfoSearch.as_str().to_string(),
                    input,
                },
                RawTask::Structured { id, name, input } => Task {
                    id: match id {
                        Some(serde_json::Value::String(s)) => s,
                        Some(serde_json::Value::Null) | None => fallback_id,
                        Some(other) => other.to_string(),
                    },
                    name: name.trim().to_lowercase(),
                    input,
                },
            }
        })
        .collect())
}

/// Turns a query into a validated task plan.
#[derive(Clone)]
pub struct TaskDecomposer {
    core: EngineCore,
    target: ModelTarget,
}

impl TaskDecomposer {
    pub fn new(core: EngineCore, target: ModelTarget) -> Self {
        Self { core, target }
    }

    /// Generate a plan, have it reviewed, and regenerate once with the
    /// reviewer's feedback if it is rejected.
    ///
    /// The regenerated plan is returned without a second review.
    pub async fn decompose(&self, query: &str) -> AnalysisResult<Vec<Task>> {
        info!("Decomposing query into tasks");

        let plan = self.generate(query).await?;
        let plan_json = plan_to_json(&plan);

        let verdict = self
            .call(
                "plan_validator/system",
                "plan_validator/user",
                &[
                    ("query", query.to_string()),
                    ("task_plan", plan_json.clone()),
                ],
            )
            .await?;

        if verdict.contains(PLAN_ACCEPTANCE_PHRASE) {
            debug!(tasks = plan.len(), "Plan accepted");
            return Ok(plan);
        }

        warn!("Plan rejected, retrying with feedback");
        let response = self
            .call(
                "retry/system",
                "retry/user",
                &[
                    ("query", query.to_string()),
                    ("feedback", verdict),
                    ("original_response", plan_json),
                ],
            )
            .await?;
        let plan = parse_tasks(&response).map_err(decomposition_error)?;
        info!(tasks = plan.len(), "Revised plan generated");
        Ok(plan)
    }

    async fn generate(&self, query: &str) -> AnalysisResult<Vec<Task>> {
        let response = self
            .call(
                "task_decomposition/system",
                "task_decomposition/user",
                &[("input", query.to_string())],
            )
            .await?;
        let plan = parse_tasks(&response).map_err(decomposition_error)?;
        debug!(tasks = plan.len(), "Task decomposition generated");
        Ok(plan)
    }

    async fn call(
        &self,
        system_path: &str,
        user_path: &str,
        vars: &[(&str, String)],
    ) -> AnalysisResult<String> {
        self.core
            .process_with_prompts(&self.target, PromptCategory::Planner, system_path, user_path, vars)
            .await
            .map_err(decomposition_error)
    }
}

fn plan_to_json(plan: &[Task]) -> String {
    serde_json::to_string_pretty(plan).unwrap_or_else(|_| "[]".to_string())
}

fn decomposition_error(e: impl std::fmt::Display) -> AnalysisError {
    AnalysisError::Decomposition {
        message: e.to_string(),
    }
}
