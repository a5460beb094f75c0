//! Scripted language-model transport for end-to-end tests.
//!
//! Replies are chosen by request label (`{category}/{user prompt path}`).
//! Controller decisions come from a function of the evaluated layer, and any
//! label can be overridden with a custom handler.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use deot::error::{LlmError, LlmResult};
use deot::llm::{ChatRequest, LlmTransport};
use deot::planner::PLAN_ACCEPTANCE_PHRASE;

pub const OPTIMIZED_QUERY: &str = "Optimized question about X";
pub const FINAL_RESPONSE: &str = "Final synthesized answer.";

type Handler = Box<dyn Fn(&ChatRequest) -> LlmResult<String> + Send + Sync>;

pub struct ScriptedTransport {
    decide: fn(u32) -> &'static str,
    aspects: String,
    overrides: HashMap<String, Handler>,
    calls: Mutex<Vec<ChatRequest>>,
}

impl ScriptedTransport {
    /// Every controller call returns `decision`.
    pub fn new(decision: &'static str) -> Self {
        fn breadth(_: u32) -> &'static str {
            "BREADTH"
        }
        fn depth(_: u32) -> &'static str {
            "DEPTH"
        }
        fn complete(_: u32) -> &'static str {
            "COMPLETE"
        }
        let decide = match decision {
            "DEPTH" => depth,
            "COMPLETE" => complete,
            _ => breadth,
        };
        Self::with_decisions(decide)
    }

    pub fn with_decisions(decide: fn(u32) -> &'static str) -> Self {
        Self {
            decide,
            aspects: aspects(2),
            overrides: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Breadth expansion returns `n` aspects.
    pub fn with_aspects(mut self, n: usize) -> Self {
        self.aspects = aspects(n);
        self
    }

    pub fn with_override(
        mut self,
        label: &str,
        handler: impl Fn(&ChatRequest) -> LlmResult<String> + Send + Sync + 'static,
    ) -> Self {
        self.overrides.insert(label.to_string(), Box::new(handler));
        self
    }

    pub fn calls(&self) -> Vec<ChatRequest> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn count(&self, label: &str) -> usize {
        self.calls().iter().filter(|r| r.label == label).count()
    }

    fn reply(&self, request: &ChatRequest) -> LlmResult<String> {
        if let Some(handler) = self.overrides.get(&request.label) {
            return handler(request);
        }

        let reply = match request.label.as_str() {
            "base_prompter/input_optimization/user" => format!(
                r#"{{"optimized_query": "{}", "original_query": "X", "modifications": ["added scope"]}}"#,
                OPTIMIZED_QUERY
            ),
            "planner/task_decomposition/user" => r#"[
                {"id": 1, "name": "reasoning", "input": "analyze the drivers"},
                {"id": 2, "name": "news_search", "input": "recent developments, 2"}
            ]"#
            .to_string(),
            "planner/plan_validator/user" => PLAN_ACCEPTANCE_PHRASE.to_string(),
            "reasoning/reason/user" => "Demand is rising. Supply is flat. Prices follow.".to_string(),
            "news_search/search/user" => "Two reports confirm the trend. Analysts agree.".to_string(),
            "engine_controller/evaluate/user" => {
                let layer = evaluated_layer(&request.user_prompt);
                format!(
                    "Decision: {}\nQuestions:\n- What next?\nAnalysis Focus: drivers",
                    (self.decide)(layer)
                )
            }
            "breadth_analysis/analyze/user" => self.aspects.clone(),
            "depth_analysis/generate/user" => "Question: What drives the strongest effect?".to_string(),
            "validation/fact_check/user" => {
                "[SUMMARY VALIDATION]\nSTATUS: VALID\nISSUES:\n- None\nEVIDENCE:\n- source\n[END SUMMARY VALIDATION]"
                    .to_string()
            }
            "response/final_response/user" => FINAL_RESPONSE.to_string(),
            other => {
                return Err(LlmError::InvalidResponse {
                    message: format!("no scripted reply for {}", other),
                })
            }
        };
        Ok(reply)
    }
}

#[async_trait]
impl LlmTransport for ScriptedTransport {
    async fn chat(&self, request: &ChatRequest) -> LlmResult<String> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(request.clone());
        }
        self.reply(request)
    }
}

fn aspects(n: usize) -> String {
    (1..=n)
        .map(|i| format!("Aspect: Aspect {}\nQuery: What is the effect on area {}?", i, i))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Layer number from the controller prompt's `Layer: {n} of {m}` line.
fn evaluated_layer(prompt: &str) -> u32 {
    prompt
        .lines()
        .find_map(|line| line.strip_prefix("Layer: "))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|n| n.parse().ok())
        .unwrap_or(0)
}
