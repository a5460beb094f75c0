use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{BuiltNode, NodeBuilder, ResourceBudget, SummaryAggregator, SummarySnapshot, ValidationService};
use crate::config::InvalidNodePolicy;
use crate::engines::{BreadthEngine, DecisionController, DepthEngine};
use crate::error::AnalysisResult;
use crate::tree::{
    AnalysisNode, AnalysisTree, DecisionKind, NodeIndex, NodeKind, NodeStatus, ValidationStatus,
};

/// What one run of the executor produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub tree: AnalysisTree,
    /// Nodes counted against the budget.
    pub nodes_created: u32,
    pub max_depth: u32,
    pub summaries: SummarySnapshot,
}

/// How a node ended up after build, validation and decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Settled {
    Decided,
    Invalid,
    Excluded,
}

/// Mutable state threaded through one run's recursion.
struct RunContext<'q> {
    original_query: &'q str,
    budget: ResourceBudget,
    tree: AnalysisTree,
}

/// Builds an analysis tree depth-first under a [`ResourceBudget`].
///
/// Each node goes through build, optional validation, decision and summary
/// storage; it is counted against the budget before its own children are
/// expanded, and attached to its parent once its subtree is done.
#[derive(Clone)]
pub struct TreeExecutor {
    builder: NodeBuilder,
    controller: DecisionController,
    breadth: BreadthEngine,
    depth: DepthEngine,
    summaries: SummaryAggregator,
    validator: Option<ValidationService>,
    validation_attempts: u32,
    invalid_node_policy: InvalidNodePolicy,
}

impl TreeExecutor {
    pub fn new(
        builder: NodeBuilder,
        controller: DecisionController,
        breadth: BreadthEngine,
        depth: DepthEngine,
        summaries: SummaryAggregator,
    ) -> Self {
        Self {
            builder,
            controller,
            breadth,
            depth,
            summaries,
            validator: None,
            validation_attempts: 3,
            invalid_node_policy: InvalidNodePolicy::Keep,
        }
    }

    /// Fact-check every node, regenerating up to `attempts` times in total.
    pub fn with_validation(mut self, validator: ValidationService, attempts: u32) -> Self {
        self.validator = Some(validator);
        self.validation_attempts = attempts.max(1);
        self
    }

    pub fn with_invalid_node_policy(mut self, policy: InvalidNodePolicy) -> Self {
        self.invalid_node_policy = policy;
        self
    }

    pub fn summaries(&self) -> &SummaryAggregator {
        &self.summaries
    }

    pub fn validation_enabled(&self) -> bool {
        self.validator.is_some()
    }

    /// Run one analysis.
    ///
    /// Fails only when the root node cannot be built.
    pub async fn execute(
        &self,
        analysis_id: &str,
        original_query: &str,
        optimized_query: &str,
        max_layer: u32,
        max_nodes: u32,
    ) -> AnalysisResult<ExecutionOutcome> {
        let mut ctx = RunContext {
            original_query,
            budget: ResourceBudget::new(max_nodes, max_layer),
            tree: AnalysisTree::new(analysis_id),
        };
        self.summaries.start(analysis_id).await;

        let mut root = AnalysisNode::root(ctx.tree.root_id(), optimized_query);
        info!(node_id = %root.id, "Processing root node");
        self.settle(&ctx, &mut root, optimized_query, InvalidNodePolicy::Keep)
            .await?;

        let root_index = ctx.tree.insert(root);
        ctx.budget.increment();
        info!(
            current_nodes = ctx.budget.current_nodes(),
            max_nodes, "Root node created"
        );

        self.expand_children(&mut ctx, root_index).await;

        let max_depth = ctx.tree.max_depth();
        info!(
            analysis_id = %analysis_id,
            nodes = ctx.budget.current_nodes(),
            max_depth,
            "Analysis tree completed"
        );

        let summaries = self
            .summaries
            .get(analysis_id)
            .await
            .unwrap_or_else(|| SummarySnapshot {
                analysis_id: analysis_id.to_string(),
                node_summaries: Vec::new(),
                stats: Default::default(),
            });

        Ok(ExecutionOutcome {
            nodes_created: ctx.budget.current_nodes(),
            max_depth,
            tree: ctx.tree,
            summaries,
        })
    }

    /// Build, validate, decide and store one node.
    async fn settle(
        &self,
        ctx: &RunContext<'_>,
        node: &mut AnalysisNode,
        further_query: &str,
        policy: InvalidNodePolicy,
    ) -> AnalysisResult<Settled> {
        let (built, status) = self.build_validated(node).await?;
        node.summary = Some(built.summary.clone());

        if status == ValidationStatus::Invalid {
            if policy == InvalidNodePolicy::Exclude {
                return Ok(Settled::Excluded);
            }
            node.status = NodeStatus::Invalid;
            self.summaries
                .add(&ctx.tree.analysis_id, &built.summary, node, status)
                .await;
            return Ok(Settled::Invalid);
        }

        let decision = self
            .controller
            .decide(
                &built.summary,
                ctx.original_query,
                Some(further_query),
                node.layer,
                ctx.budget.max_layer(),
            )
            .await;
        node.decision = Some(decision);
        self.summaries
            .add(&ctx.tree.analysis_id, &built.summary, node, status)
            .await;
        Ok(Settled::Decided)
    }

    /// Build the node and, when validation is on, fact-check it up to
    /// `validation_attempts` times. A failed rebuild keeps the previous
    /// content for the next attempt.
    async fn build_validated(
        &self,
        node: &AnalysisNode,
    ) -> AnalysisResult<(BuiltNode, ValidationStatus)> {
        let mut built = self
            .builder
            .build(&node.query, &node.id, node.layer, node.kind)
            .await?;

        let Some(validator) = &self.validator else {
            return Ok((built, ValidationStatus::Valid));
        };

        for attempt in 1..=self.validation_attempts {
            let verdict = validator.validate(&built).await;
            if verdict.passed() {
                info!(node_id = %node.id, attempt, "Node validation successful");
                return Ok((built, ValidationStatus::Valid));
            }
            warn!(
                node_id = %node.id,
                attempt,
                max_attempts = self.validation_attempts,
                issues = ?verdict.issues,
                "Node validation failed"
            );

            if attempt < self.validation_attempts {
                info!(node_id = %node.id, "Regenerating node content");
                match self
                    .builder
                    .build(&node.query, &node.id, node.layer, node.kind)
                    .await
                {
                    Ok(rebuilt) => built = rebuilt,
                    Err(e) => {
                        warn!(
                            node_id = %node.id,
                            error = %e,
                            "Failed to regenerate node content, revalidating previous content"
                        );
                    }
                }
            }
        }

        warn!(node_id = %node.id, "Node marked invalid");
        Ok((built, ValidationStatus::Invalid))
    }

    /// Expand a node's children according to its decision.
    fn expand_children<'a>(
        &'a self,
        ctx: &'a mut RunContext<'_>,
        index: NodeIndex,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            let Some(node) = ctx.tree.get(index) else {
                return;
            };
            let layer = node.layer;
            let summary = node.summary.clone().unwrap_or_default();
            let node_id = node.id.clone();
            let decision = node.decision.as_ref().map(|d| d.kind);
            let expandable = node.is_expandable();

            if layer >= ctx.budget.max_layer() {
                debug!(node_id = %node_id, layer, "Reached max layer, stopping");
                return;
            }
            if !ctx.budget.can_add_node(layer) {
                debug!(
                    node_id = %node_id,
                    current_nodes = ctx.budget.current_nodes(),
                    max_nodes = ctx.budget.max_nodes(),
                    "Reached node limit, stopping"
                );
                return;
            }
            if !expandable {
                debug!(node_id = %node_id, "Node is a leaf");
                return;
            }

            match decision {
                Some(DecisionKind::Breadth) => {
                    let aspects = self.breadth.expand(&summary, ctx.original_query).await;
                    info!(node_id = %node_id, aspects = aspects.len(), "Breadth expansion");
                    for (i, aspect) in aspects.into_iter().enumerate() {
                        if !ctx.budget.can_add_node(layer + 1) {
                            debug!(
                                node_id = %node_id,
                                current_nodes = ctx.budget.current_nodes(),
                                "Reached node limit, skipping remaining aspects"
                            );
                            return;
                        }
                        self.grow_child(ctx, index, NodeKind::Depth, i + 1, aspect.query)
                            .await;
                    }
                }
                Some(DecisionKind::Depth) => {
                    if !ctx.budget.can_add_node(layer + 1) {
                        return;
                    }
                    if let Some(follow_up) = self.depth.expand(&summary, ctx.original_query).await
                    {
                        info!(node_id = %node_id, question = %follow_up.question, "Depth expansion");
                        self.grow_child(ctx, index, NodeKind::Breadth, 1, follow_up.question)
                            .await;
                    }
                }
                Some(DecisionKind::Complete) | None => {}
            }
        })
    }

    /// Create, settle, count, expand and attach one child.
    async fn grow_child(
        &self,
        ctx: &mut RunContext<'_>,
        parent: NodeIndex,
        kind: NodeKind,
        ordinal: usize,
        query: String,
    ) {
        let Some(parent_node) = ctx.tree.get(parent) else {
            return;
        };
        let mut child = AnalysisNode::child(
            &parent_node.id,
            parent,
            parent_node.layer,
            kind,
            ordinal,
            query.clone(),
        );
        debug!(node_id = %child.id, layer = child.layer, kind = %kind, "Creating node");

        match self
            .settle(ctx, &mut child, &query, self.invalid_node_policy)
            .await
        {
            Ok(Settled::Excluded) => {
                warn!(node_id = %child.id, "Excluding invalid node");
                return;
            }
            Ok(Settled::Decided) | Ok(Settled::Invalid) => {}
            Err(e) => {
                warn!(node_id = %child.id, error = %e, "Node build failed, not expanding");
                child.status = NodeStatus::BuildFailed;
                child.error = Some(e.to_string());
            }
        }

        let index = ctx.tree.insert(child);
        ctx.budget.increment();
        debug!(
            current_nodes = ctx.budget.current_nodes(),
            max_nodes = ctx.budget.max_nodes(),
            "Node counted"
        );

        self.expand_children(ctx, index).await;
        ctx.tree.attach(parent, index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::CapabilityRouter;
    use crate::config::ModelConfig;
    use crate::engines::EngineCore;
    use crate::error::{LlmError, LlmResult};
    use crate::llm::{ChatRequest, MockLlmTransport, ModelTarget, Platform};
    use crate::planner::{TaskDecomposer, PLAN_ACCEPTANCE_PHRASE};
    use crate::prompts::PromptStore;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const PLAN: &str = r#"[{"id": 1, "name": "reasoning", "input": "think"}]"#;
    const ASPECTS: &str = "Aspect: Alpha\nQuery: qa\n\nAspect: Beta\nQuery: qb";
    const INVALID: &str =
        "[SUMMARY VALIDATION]\nSTATUS: INVALID\nISSUES:\n- wrong\n[END SUMMARY VALIDATION]";
    const VALID: &str = "[SUMMARY VALIDATION]\nSTATUS: VALID\n[END SUMMARY VALIDATION]";

    /// Answers every prompt by label with one canned decision.
    fn respond(request: &ChatRequest, decision: &str) -> LlmResult<String> {
        let reply = match request.label.as_str() {
            "planner/task_decomposition/user" => PLAN.to_string(),
            "planner/plan_validator/user" => PLAN_ACCEPTANCE_PHRASE.to_string(),
            "reasoning/reason/user" => "Finding one. Finding two. Finding three.".to_string(),
            "engine_controller/evaluate/user" => format!("Decision: {}", decision),
            "breadth_analysis/analyze/user" => ASPECTS.to_string(),
            "depth_analysis/generate/user" => "Question: deeper?".to_string(),
            "validation/fact_check/user" => VALID.to_string(),
            other => {
                return Err(LlmError::InvalidResponse {
                    message: format!("unexpected prompt {}", other),
                })
            }
        };
        Ok(reply)
    }

    fn core(mock: MockLlmTransport) -> EngineCore {
        EngineCore::new(Arc::new(mock), Arc::new(PromptStore::new()))
    }

    fn executor(core: EngineCore) -> TreeExecutor {
        let target = ModelTarget::new(Platform::OpenAi, "gpt-4o");
        let builder = NodeBuilder::new(
            TaskDecomposer::new(core.clone(), target.clone()),
            CapabilityRouter::new(core.clone(), &ModelConfig::default()),
        );
        TreeExecutor::new(
            builder,
            DecisionController::new(core.clone(), target.clone()).with_retries(1, 0),
            BreadthEngine::new(core.clone(), target.clone()).with_max_aspects(2),
            DepthEngine::new(core, target),
            SummaryAggregator::new(),
        )
    }

    fn validator(core: EngineCore) -> ValidationService {
        ValidationService::new(core, ModelTarget::new(Platform::Perplexity, "sonar-pro"))
            .with_retries(1, 0)
    }

    fn ids(tree: &AnalysisTree) -> Vec<String> {
        tree.walk()
            .into_iter()
            .filter_map(|i| tree.get(i))
            .map(|n| n.id.clone())
            .collect()
    }

    // ========================================================================
    // Expansion
    // ========================================================================

    #[tokio::test]
    async fn test_breadth_expansion_stops_at_layer_limit() {
        let mut mock = MockLlmTransport::new();
        mock.expect_chat().returning(|req| respond(req, "BREADTH"));

        let outcome = executor(core(mock))
            .execute("a", "original", "root question", 2, 5)
            .await
            .unwrap();

        assert_eq!(outcome.nodes_created, 3);
        assert_eq!(outcome.max_depth, 2);
        assert_eq!(
            ids(&outcome.tree),
            vec!["a_root", "a_root_breadth_1", "a_root_breadth_2"]
        );

        let child = outcome.tree.find("a_root_breadth_1").unwrap();
        assert_eq!(child.kind, NodeKind::Depth);
        assert_eq!(child.query, "qa");
        assert_eq!(
            child.decision.as_ref().map(|d| d.kind),
            Some(DecisionKind::Complete)
        );

        assert_eq!(outcome.summaries.node_summaries.len(), 3);
        assert_eq!(outcome.summaries.stats.breadth_analyses, 1);
    }

    #[tokio::test]
    async fn test_single_node_budget_builds_root_only() {
        let expansions = Arc::new(AtomicUsize::new(0));
        let counter = expansions.clone();

        let mut mock = MockLlmTransport::new();
        mock.expect_chat().returning(move |req| {
            if req.label.starts_with("breadth_analysis") || req.label.starts_with("depth_analysis") {
                counter.fetch_add(1, Ordering::SeqCst);
            }
            respond(req, "BREADTH")
        });

        let outcome = executor(core(mock))
            .execute("a", "original", "root question", 3, 1)
            .await
            .unwrap();

        assert_eq!(outcome.nodes_created, 1);
        assert_eq!(ids(&outcome.tree), vec!["a_root"]);
        assert_eq!(expansions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_node_budget_cuts_remaining_aspects() {
        let mut mock = MockLlmTransport::new();
        mock.expect_chat().returning(|req| respond(req, "BREADTH"));

        let outcome = executor(core(mock))
            .execute("a", "original", "root question", 3, 2)
            .await
            .unwrap();

        assert_eq!(outcome.nodes_created, 2);
        assert_eq!(ids(&outcome.tree), vec!["a_root", "a_root_breadth_1"]);
    }

    #[tokio::test]
    async fn test_depth_chain() {
        let mut mock = MockLlmTransport::new();
        mock.expect_chat().returning(|req| respond(req, "DEPTH"));

        let outcome = executor(core(mock))
            .execute("a", "original", "root question", 3, 10)
            .await
            .unwrap();

        assert_eq!(
            ids(&outcome.tree),
            vec!["a_root", "a_root_depth_1", "a_root_depth_1_depth_1"]
        );
        let deepest = outcome.tree.find("a_root_depth_1_depth_1").unwrap();
        assert_eq!(deepest.kind, NodeKind::Breadth);
        assert_eq!(deepest.layer, 3);
        assert_eq!(deepest.query, "deeper?");
        assert_eq!(outcome.summaries.stats.depth_analyses, 2);
    }

    // ========================================================================
    // Failures
    // ========================================================================

    #[tokio::test]
    async fn test_child_build_failure_is_a_counted_leaf() {
        let mut mock = MockLlmTransport::new();
        mock.expect_chat().returning(|req| {
            if req.label == "planner/task_decomposition/user" && req.user_prompt.contains("qb") {
                return Ok("no plan here".to_string());
            }
            respond(req, "BREADTH")
        });

        let outcome = executor(core(mock))
            .execute("a", "original", "root question", 3, 10)
            .await
            .unwrap();

        let failed = outcome.tree.find("a_root_breadth_2").unwrap();
        assert_eq!(failed.status, NodeStatus::BuildFailed);
        assert!(failed.decision.is_none());
        assert!(failed.error.is_some());
        assert!(failed.children.is_empty());

        // every "qb" node fails, at layer 2 and under "qa" at layer 3
        assert_eq!(outcome.nodes_created, 5);
        assert_eq!(outcome.summaries.node_summaries.len(), 3);
        assert_eq!(
            outcome.tree.find("a_root_breadth_1_breadth_2").map(|n| n.status),
            Some(NodeStatus::BuildFailed)
        );
    }

    #[tokio::test]
    async fn test_root_build_failure_aborts() {
        let mut mock = MockLlmTransport::new();
        mock.expect_chat().returning(|_| {
            Err(LlmError::Api {
                status: 500,
                message: "down".to_string(),
            })
        });

        let result = executor(core(mock))
            .execute("a", "original", "root question", 3, 10)
            .await;

        assert!(matches!(result, Err(crate::error::AnalysisError::NodeBuild { .. })));
    }

    // ========================================================================
    // Validation
    // ========================================================================

    #[tokio::test]
    async fn test_invalid_root_is_kept_as_leaf() {
        let validations = Arc::new(AtomicUsize::new(0));
        let counter = validations.clone();

        let mut mock = MockLlmTransport::new();
        mock.expect_chat().returning(move |req| {
            if req.label == "engine_controller/evaluate/user" {
                panic!("invalid node must not be evaluated");
            }
            if req.label == "validation/fact_check/user" {
                counter.fetch_add(1, Ordering::SeqCst);
                return Ok(INVALID.to_string());
            }
            respond(req, "BREADTH")
        });

        let core = core(mock);
        let outcome = executor(core.clone())
            .with_validation(validator(core), 2)
            .execute("a", "original", "root question", 3, 10)
            .await
            .unwrap();

        assert_eq!(validations.load(Ordering::SeqCst), 2);
        let root = outcome.tree.root().unwrap();
        assert_eq!(root.status, NodeStatus::Invalid);
        assert!(root.children.is_empty());
        assert_eq!(outcome.summaries.stats.validation_failed, 1);
    }

    #[tokio::test]
    async fn test_exclude_policy_drops_invalid_children() {
        let mut mock = MockLlmTransport::new();
        mock.expect_chat().returning(|req| {
            if req.label == "validation/fact_check/user" && req.user_prompt.contains("'qa'") {
                return Ok(INVALID.to_string());
            }
            respond(req, "BREADTH")
        });

        let core = core(mock);
        let outcome = executor(core.clone())
            .with_validation(validator(core), 1)
            .with_invalid_node_policy(InvalidNodePolicy::Exclude)
            .execute("a", "original", "root question", 2, 10)
            .await
            .unwrap();

        assert_eq!(ids(&outcome.tree), vec!["a_root", "a_root_breadth_2"]);
        assert_eq!(outcome.nodes_created, 2);
        assert_eq!(outcome.summaries.stats.validation_failed, 0);
        assert_eq!(outcome.summaries.stats.validation_passed, 2);
    }

    #[tokio::test]
    async fn test_failed_regeneration_revalidates_previous_content() {
        let builds = Arc::new(AtomicUsize::new(0));
        let validations = Arc::new(AtomicUsize::new(0));
        let (build_counter, validation_counter) = (builds.clone(), validations.clone());

        let mut mock = MockLlmTransport::new();
        mock.expect_chat().returning(move |req| {
            if req.label == "planner/task_decomposition/user"
                && build_counter.fetch_add(1, Ordering::SeqCst) > 0
            {
                return Err(LlmError::InvalidResponse {
                    message: "planner down".to_string(),
                });
            }
            if req.label == "validation/fact_check/user" {
                let attempt = validation_counter.fetch_add(1, Ordering::SeqCst);
                return Ok(if attempt == 0 { INVALID } else { VALID }.to_string());
            }
            respond(req, "COMPLETE")
        });

        let core = core(mock);
        let outcome = executor(core.clone())
            .with_validation(validator(core), 3)
            .execute("a", "original", "root question", 1, 10)
            .await
            .unwrap();

        assert_eq!(builds.load(Ordering::SeqCst), 2);
        assert_eq!(validations.load(Ordering::SeqCst), 2);
        let root = outcome.tree.root().unwrap();
        assert_eq!(root.status, NodeStatus::Built);
        assert!(root.summary.is_some());
        assert_eq!(outcome.summaries.stats.validation_passed, 1);
        assert_eq!(outcome.summaries.stats.validation_failed, 0);
    }
}
