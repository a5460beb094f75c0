//! Top-level analysis façade.
//!
//! [`DualEngineAnalyzer`] wires the planner, engines and executor together
//! for one run: optimize the query, grow the tree, synthesize the final
//! response, render the diagram and persist the record.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::agents::CapabilityRouter;
use crate::config::{AnalysisConfig, Config, ModelConfig};
use crate::engines::{BreadthEngine, DecisionController, DepthEngine, EngineCore};
use crate::error::{AppError, AppResult};
use crate::executor::{
    AnalysisStats, ExecutionOutcome, NodeBuilder, NodeSummary, ResponseSynthesizer,
    SummaryAggregator, TreeExecutor, ValidationService,
};
use crate::llm::{LlmClient, LlmTransport, ModelTarget, Platform};
use crate::planner::{OptimizedQuery, QueryOptimizer, TaskDecomposer};
use crate::prompts::PromptStore;
use crate::storage::{AnalysisRecord, AnalysisStatus, ExecutionInfo, SqliteStorage, Storage};
use crate::tree::{AnalysisTree, TreeStats};
use crate::visualization::{DiagramRenderer, MermaidRenderer};

/// Per-run parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    pub max_layer: u32,
    pub max_nodes: u32,
    /// Platform for the final response.
    pub platform: Platform,
    /// Model for the final response.
    pub model: String,
    pub temperature: f64,
    pub enable_validation: bool,
    pub generate_visualization: bool,
}

impl RunOptions {
    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self {
            max_layer: config.max_layer,
            max_nodes: config.max_nodes,
            platform: config.platform,
            model: config.model.clone(),
            temperature: config.temperature,
            enable_validation: config.enable_validation,
            generate_visualization: config.generate_visualization,
        }
    }

    fn execution_info(&self) -> ExecutionInfo {
        ExecutionInfo {
            platform: self.platform.to_string(),
            model: self.model.clone(),
            temperature: self.temperature,
            max_layer: self.max_layer,
            max_nodes: self.max_nodes,
            validation_enabled: self.enable_validation,
        }
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::from_config(&AnalysisConfig::default())
    }
}

/// Everything one run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisOutcome {
    pub analysis_id: String,
    pub status: AnalysisStatus,
    pub original_query: String,
    pub optimized_query: Option<OptimizedQuery>,
    pub final_response: String,
    pub stats: AnalysisStats,
    pub tree_stats: TreeStats,
    pub visualization_ref: Option<String>,
    pub tree: Option<AnalysisTree>,
    pub node_summaries: Vec<NodeSummary>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl AnalysisOutcome {
    pub fn is_success(&self) -> bool {
        self.status == AnalysisStatus::Completed
    }

    /// Persistable form of this outcome
    pub fn to_record(&self, options: &RunOptions) -> AnalysisRecord {
        AnalysisRecord {
            id: self.analysis_id.clone(),
            query: self.original_query.clone(),
            optimized_query: self
                .optimized_query
                .as_ref()
                .map(|q| q.optimized_query.clone()),
            final_response: Some(self.final_response.clone()),
            status: self.status,
            error: self.error.clone(),
            stats: self.stats.clone(),
            tree_stats: self.tree_stats.clone(),
            visualization_ref: self.visualization_ref.clone(),
            execution: options.execution_info(),
            started_at: self.started_at,
            completed_at: Some(self.completed_at),
        }
    }
}

struct RunParts {
    optimized: OptimizedQuery,
    execution: ExecutionOutcome,
    final_response: String,
}

/// Runs analyses end to end.
pub struct DualEngineAnalyzer {
    core: EngineCore,
    models: ModelConfig,
    settings: AnalysisConfig,
    summaries: SummaryAggregator,
    storage: Option<Arc<dyn Storage>>,
    renderer: Option<Arc<dyn DiagramRenderer>>,
}

impl DualEngineAnalyzer {
    pub fn new(
        transport: Arc<dyn LlmTransport>,
        prompts: PromptStore,
        models: ModelConfig,
        settings: AnalysisConfig,
    ) -> Self {
        Self {
            core: EngineCore::new(transport, Arc::new(prompts)),
            models,
            settings,
            summaries: SummaryAggregator::new(),
            storage: None,
            renderer: None,
        }
    }

    pub fn with_storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn DiagramRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Build the production analyzer: HTTP transport, SQLite history and
    /// Mermaid diagrams under the configured output directory.
    pub async fn from_config(config: &Config) -> AppResult<Self> {
        let client = LlmClient::new(&config.llm, config.request.clone())?;
        let prompts = match &config.prompts.prompt_file {
            Some(path) => PromptStore::from_file(path)?,
            None => PromptStore::new(),
        };
        let storage = SqliteStorage::new(&config.database).await?;
        info!(path = %config.database.path.display(), "Database initialized");

        Ok(Self::new(
            Arc::new(client),
            prompts,
            config.models.clone(),
            config.analysis.clone(),
        )
        .with_storage(Arc::new(storage))
        .with_renderer(Arc::new(MermaidRenderer::new(
            config.analysis.output_dir.clone(),
        ))))
    }

    pub fn summaries(&self) -> &SummaryAggregator {
        &self.summaries
    }

    fn engine_target(&self) -> ModelTarget {
        ModelTarget::new(Platform::OpenAi, self.models.engine_model.clone())
    }

    fn executor(&self, enable_validation: bool) -> TreeExecutor {
        let target = self.engine_target();
        let builder = NodeBuilder::new(
            TaskDecomposer::new(self.core.clone(), target.clone()),
            CapabilityRouter::new(self.core.clone(), &self.models),
        );

        let executor = TreeExecutor::new(
            builder,
            DecisionController::new(self.core.clone(), target.clone()).with_retries(
                self.settings.decision_max_retries,
                self.settings.decision_retry_delay_ms,
            ),
            BreadthEngine::new(self.core.clone(), target.clone())
                .with_max_aspects(self.settings.max_aspects),
            DepthEngine::new(self.core.clone(), target),
            self.summaries.clone(),
        )
        .with_invalid_node_policy(self.settings.invalid_node_policy);

        if !enable_validation {
            return executor;
        }
        let validator = ValidationService::new(
            self.core.clone(),
            ModelTarget::new(Platform::Perplexity, self.models.validation_model.clone()),
        );
        executor.with_validation(validator, self.settings.validation_attempts)
    }

    /// Run one analysis.
    ///
    /// Never fails: errors are reported through a `Failed` outcome whose
    /// final response tells the user what went wrong. The outcome is
    /// persisted when storage is configured.
    pub async fn run_analysis(&self, query: &str, options: &RunOptions) -> AnalysisOutcome {
        let started_at = Utc::now();
        let analysis_id = new_analysis_id(started_at);
        info!(
            analysis_id = %analysis_id,
            max_layer = options.max_layer,
            max_nodes = options.max_nodes,
            validation = options.enable_validation,
            "Starting analysis"
        );

        let outcome = match self.execute(&analysis_id, query, options).await {
            Ok(parts) => self.completed(analysis_id, query, options, parts, started_at),
            Err(e) => {
                error!(analysis_id = %analysis_id, error = %e, "Analysis failed");
                AnalysisOutcome {
                    analysis_id,
                    status: AnalysisStatus::Failed,
                    original_query: query.to_string(),
                    optimized_query: None,
                    final_response: format!(
                        "An error occurred during analysis. Please try your query again. Error details: {}",
                        e
                    ),
                    stats: AnalysisStats::default(),
                    tree_stats: TreeStats::default(),
                    visualization_ref: None,
                    tree: None,
                    node_summaries: Vec::new(),
                    error: Some(e.to_string()),
                    started_at,
                    completed_at: Utc::now(),
                }
            }
        };

        self.summaries.clear(&outcome.analysis_id).await;

        if let Some(storage) = &self.storage {
            if let Err(e) = storage.save_analysis(&outcome.to_record(options)).await {
                warn!(analysis_id = %outcome.analysis_id, error = %e, "Failed to persist analysis");
            }
        }

        info!(
            analysis_id = %outcome.analysis_id,
            status = %outcome.status,
            nodes = outcome.tree_stats.total_nodes,
            "Analysis finished"
        );
        outcome
    }

    async fn execute(
        &self,
        analysis_id: &str,
        query: &str,
        options: &RunOptions,
    ) -> AppResult<RunParts> {
        if options.max_layer == 0 || options.max_nodes == 0 {
            return Err(AppError::Config {
                message: "max_layer and max_nodes must be at least 1".to_string(),
            });
        }

        let optimized = QueryOptimizer::new(self.core.clone(), self.engine_target())
            .optimize(query)
            .await;

        let execution = self
            .executor(options.enable_validation)
            .execute(
                analysis_id,
                query,
                &optimized.optimized_query,
                options.max_layer,
                options.max_nodes,
            )
            .await?;

        let target = ModelTarget::new(options.platform, options.model.clone())
            .with_temperature(options.temperature);
        let final_response = ResponseSynthesizer::new(self.core.clone(), target)
            .synthesize(query, &execution.summaries)
            .await?;

        Ok(RunParts {
            optimized,
            execution,
            final_response,
        })
    }

    fn completed(
        &self,
        analysis_id: String,
        query: &str,
        options: &RunOptions,
        parts: RunParts,
        started_at: DateTime<Utc>,
    ) -> AnalysisOutcome {
        let RunParts {
            optimized,
            execution,
            final_response,
        } = parts;

        let visualization_ref = match (&self.renderer, options.generate_visualization) {
            (Some(renderer), true) => {
                let data = execution.tree.to_visualization(Some(query));
                match renderer.render(&data, &analysis_id) {
                    Ok(artifact) => Some(artifact.diagram_file.display().to_string()),
                    Err(e) => {
                        warn!(analysis_id = %analysis_id, error = %e, "Visualization failed");
                        None
                    }
                }
            }
            _ => None,
        };

        AnalysisOutcome {
            analysis_id,
            status: AnalysisStatus::Completed,
            original_query: query.to_string(),
            optimized_query: Some(optimized),
            final_response,
            stats: execution.summaries.stats.clone(),
            tree_stats: execution.tree.stats(),
            visualization_ref,
            node_summaries: execution.summaries.node_summaries,
            tree: Some(execution.tree),
            error: None,
            started_at,
            completed_at: Utc::now(),
        }
    }

    /// Most recent persisted analyses
    pub async fn history(&self, limit: u32) -> AppResult<Vec<AnalysisRecord>> {
        match &self.storage {
            Some(storage) => Ok(storage.list_analyses(limit).await?),
            None => Ok(Vec::new()),
        }
    }

    /// One persisted analysis by id
    pub async fn get(&self, analysis_id: &str) -> AppResult<Option<AnalysisRecord>> {
        match &self.storage {
            Some(storage) => Ok(storage.get_analysis(analysis_id).await?),
            None => Ok(None),
        }
    }
}

/// `analysis_{YYYYmmdd_HHMMSS}_{8 hex}`; the suffix keeps runs started in
/// the same second apart.
fn new_analysis_id(at: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("analysis_{}_{}", at.format("%Y%m%d_%H%M%S"), &suffix[..8])
}
