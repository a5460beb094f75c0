//! Core infrastructure shared by the engines, the planner and the capabilities.

use std::sync::Arc;

use tracing::debug;

use crate::error::AppResult;
use crate::llm::{ChatRequest, LlmTransport, ModelTarget};
use crate::prompts::{PromptCategory, PromptStore};

/// Transport and prompt store shared by every LLM-backed component.
///
/// Cloning is cheap; all clones talk to the same transport.
#[derive(Clone)]
pub struct EngineCore {
    transport: Arc<dyn LlmTransport>,
    prompts: Arc<PromptStore>,
}

impl EngineCore {
    pub fn new(transport: Arc<dyn LlmTransport>, prompts: Arc<PromptStore>) -> Self {
        Self { transport, prompts }
    }

    #[inline]
    pub fn transport(&self) -> &Arc<dyn LlmTransport> {
        &self.transport
    }

    #[inline]
    pub fn prompts(&self) -> &PromptStore {
        &self.prompts
    }

    /// Render a system/user prompt pair into a labelled request for `target`.
    ///
    /// Both templates receive the same variables.
    pub fn build_request(
        &self,
        target: &ModelTarget,
        category: PromptCategory,
        system_path: &str,
        user_path: &str,
        vars: &[(&str, String)],
    ) -> crate::error::PromptResult<ChatRequest> {
        let system_prompt = self.prompts.get(category, system_path, vars)?;
        let user_prompt = self.prompts.get(category, user_path, vars)?;
        Ok(target
            .request(system_prompt, user_prompt)
            .with_label(format!("{}/{}", category, user_path)))
    }

    /// Render a prompt pair and run it through the transport.
    pub async fn process_with_prompts(
        &self,
        target: &ModelTarget,
        category: PromptCategory,
        system_path: &str,
        user_path: &str,
        vars: &[(&str, String)],
    ) -> AppResult<String> {
        let request = self.build_request(target, category, system_path, user_path, vars)?;
        debug!(
            label = %request.label,
            model = %request.model,
            "Processing prompt pair"
        );
        Ok(self.transport.chat(&request).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{MockLlmTransport, Platform};

    #[tokio::test]
    async fn test_process_with_prompts_labels_and_renders() {
        let mut mock = MockLlmTransport::new();
        mock.expect_chat()
            .withf(|req| {
                req.label == "depth_analysis/generate/user"
                    && req.user_prompt.contains("Original query: energy")
                    && req.model == "gpt-4o"
            })
            .times(1)
            .returning(|_| Ok("Question: why?".to_string()));

        let core = EngineCore::new(Arc::new(mock), Arc::new(PromptStore::new()));
        let target = ModelTarget::new(Platform::OpenAi, "gpt-4o");
        let out = core
            .process_with_prompts(
                &target,
                PromptCategory::DepthAnalysis,
                "generate/system",
                "generate/user",
                &[
                    ("original_query", "energy".to_string()),
                    ("content", "summary".to_string()),
                ],
            )
            .await
            .unwrap();

        assert_eq!(out, "Question: why?");
    }

    #[tokio::test]
    async fn test_missing_prompt_makes_no_call() {
        let mut mock = MockLlmTransport::new();
        mock.expect_chat().times(0);

        let core = EngineCore::new(Arc::new(mock), Arc::new(PromptStore::new()));
        let target = ModelTarget::new(Platform::OpenAi, "gpt-4o");
        let result = core
            .process_with_prompts(&target, PromptCategory::Response, "nope", "nope", &[])
            .await;

        assert!(matches!(result, Err(crate::error::AppError::Prompt(_))));
    }
}
