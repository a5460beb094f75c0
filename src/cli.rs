//! `deot` subcommands and their text output.

use clap::Subcommand;

use crate::analyzer::{AnalysisOutcome, DualEngineAnalyzer, RunOptions};
use crate::config::AnalysisConfig;
use crate::llm::Platform;
use crate::storage::AnalysisRecord;

const RULE: &str = "═══════════════════════════════════════════════════════════════════════════════";

/// CLI subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run a new analysis
    Analyze {
        /// Question to analyze
        query: String,

        /// Maximum tree depth (root is layer 1)
        #[arg(long)]
        max_layer: Option<u32>,

        /// Maximum number of nodes in the tree
        #[arg(long)]
        max_nodes: Option<u32>,

        /// Platform for the final response: openai or perplexity
        #[arg(long)]
        platform: Option<Platform>,

        /// Model for the final response
        #[arg(long)]
        model: Option<String>,

        /// Sampling temperature for the final response
        #[arg(long)]
        temperature: Option<f64>,

        /// Fact-check every node summary
        #[arg(long)]
        enable_validation: bool,

        /// Skip writing the Mermaid diagram
        #[arg(long)]
        no_visualization: bool,
    },

    /// List recent analyses
    List {
        /// Maximum number of analyses to show
        #[arg(long, default_value = "10")]
        limit: u32,
    },

    /// Show one stored analysis
    View {
        /// Analysis identifier
        analysis_id: String,
    },
}

/// Result of CLI command execution.
pub struct CliResult {
    /// Exit code (0 = success)
    pub exit_code: i32,
    pub message: String,
}

impl CliResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            exit_code: 1,
            message: message.into(),
        }
    }
}

/// Run options for `analyze`: configured defaults overridden by flags.
#[allow(clippy::too_many_arguments)]
pub fn run_options(
    defaults: &AnalysisConfig,
    max_layer: Option<u32>,
    max_nodes: Option<u32>,
    platform: Option<Platform>,
    model: Option<String>,
    temperature: Option<f64>,
    enable_validation: bool,
    no_visualization: bool,
) -> RunOptions {
    let base = RunOptions::from_config(defaults);
    RunOptions {
        max_layer: max_layer.unwrap_or(base.max_layer),
        max_nodes: max_nodes.unwrap_or(base.max_nodes),
        platform: platform.unwrap_or(base.platform),
        model: model.unwrap_or(base.model),
        temperature: temperature.unwrap_or(base.temperature),
        enable_validation: enable_validation || base.enable_validation,
        generate_visualization: base.generate_visualization && !no_visualization,
    }
}

/// Execute a CLI command.
pub async fn execute_command(
    command: Commands,
    analyzer: &DualEngineAnalyzer,
    defaults: &AnalysisConfig,
) -> CliResult {
    match command {
        Commands::Analyze {
            query,
            max_layer,
            max_nodes,
            platform,
            model,
            temperature,
            enable_validation,
            no_visualization,
        } => {
            let options = run_options(
                defaults,
                max_layer,
                max_nodes,
                platform,
                model,
                temperature,
                enable_validation,
                no_visualization,
            );
            let outcome = analyzer.run_analysis(&query, &options).await;
            let message = format_outcome(&outcome, options.enable_validation);
            if outcome.is_success() {
                CliResult::success(message)
            } else {
                CliResult::error(message)
            }
        }
        Commands::List { limit } => match analyzer.history(limit).await {
            Ok(records) => CliResult::success(format_history(&records)),
            Err(e) => CliResult::error(format!("Failed to list analyses: {}", e)),
        },
        Commands::View { analysis_id } => match analyzer.get(&analysis_id).await {
            Ok(Some(record)) => CliResult::success(format_record(&record)),
            Ok(None) => CliResult::error(format!("Analysis not found: {}", analysis_id)),
            Err(e) => CliResult::error(format!("Failed to load analysis: {}", e)),
        },
    }
}

/// Text report for a finished run.
pub fn format_outcome(outcome: &AnalysisOutcome, validation: bool) -> String {
    let mut output = String::new();
    output.push_str(&format!("\nAnalysis {} [{}]\n{}\n\n", outcome.analysis_id, outcome.status, RULE));

    if let Some(optimized) = &outcome.optimized_query {
        if optimized.optimized_query != outcome.original_query {
            output.push_str(&format!("Optimized query: {}\n\n", optimized.optimized_query));
        }
    }

    output.push_str(&outcome.final_response);
    output.push_str("\n\n");

    let stats = &outcome.stats;
    output.push_str(&format!(
        "Nodes: {}  Max depth: {}  Breadth: {}  Depth: {}\n",
        outcome.tree_stats.total_nodes, outcome.tree_stats.max_depth, stats.breadth_analyses, stats.depth_analyses
    ));

    if validation {
        let checked = stats.validation_passed + stats.validation_failed;
        let rate = if checked == 0 {
            0.0
        } else {
            f64::from(stats.validation_passed) * 100.0 / f64::from(checked)
        };
        output.push_str(&format!(
            "Validation: {} passed, {} failed ({:.1}% success)\n",
            stats.validation_passed, stats.validation_failed, rate
        ));
    }

    if let Some(path) = &outcome.visualization_ref {
        output.push_str(&format!("Diagram: {}\n", path));
    }
    output
}

/// One line per stored analysis.
pub fn format_history(records: &[AnalysisRecord]) -> String {
    if records.is_empty() {
        return "No analyses found.".to_string();
    }
    records
        .iter()
        .map(|r| {
            format!(
                "{}  {:<9}  {}  {}",
                r.id,
                r.status.as_str(),
                r.started_at.format("%Y-%m-%d %H:%M:%S"),
                truncate(&r.query, 60)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Full text of one stored analysis.
pub fn format_record(record: &AnalysisRecord) -> String {
    let mut output = String::new();
    output.push_str(&format!("\nAnalysis {} [{}]\n{}\n", record.id, record.status, RULE));
    output.push_str(&format!("Query: {}\n", record.query));
    if let Some(optimized) = &record.optimized_query {
        output.push_str(&format!("Optimized query: {}\n", optimized));
    }
    output.push_str(&format!(
        "Model: {}/{}  max_layer={} max_nodes={} validation={}\n",
        record.execution.platform,
        record.execution.model,
        record.execution.max_layer,
        record.execution.max_nodes,
        record.execution.validation_enabled
    ));
    output.push_str(&format!(
        "Nodes: {}  Max depth: {}\n",
        record.tree_stats.total_nodes, record.tree_stats.max_depth
    ));
    if let Some(ms) = record.duration_ms() {
        output.push_str(&format!("Duration: {:.1}s\n", ms as f64 / 1000.0));
    }
    if let Some(path) = &record.visualization_ref {
        output.push_str(&format!("Diagram: {}\n", path));
    }
    if let Some(error) = &record.error {
        output.push_str(&format!("Error: {}\n", error));
    }
    if let Some(response) = &record.final_response {
        output.push('\n');
        output.push_str(response);
        output.push('\n');
    }
    output
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", cut)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{AnalysisStatus, ExecutionInfo};

    #[test]
    fn test_run_options_overrides() {
        let defaults = AnalysisConfig::default();
        let options = run_options(
            &defaults,
            Some(2),
            None,
            Some(Platform::Perplexity),
            None,
            Some(0.9),
            true,
            true,
        );
        assert_eq!(options.max_layer, 2);
        assert_eq!(options.max_nodes, defaults.max_nodes);
        assert_eq!(options.platform, Platform::Perplexity);
        assert_eq!(options.model, defaults.model);
        assert_eq!(options.temperature, 0.9);
        assert!(options.enable_validation);
        assert!(!options.generate_visualization);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghij", 6), "abc...");
    }

    #[test]
    fn test_format_history() {
        assert_eq!(format_history(&[]), "No analyses found.");

        let record = AnalysisRecord::new("analysis_1", "What changed?", ExecutionInfo::default())
            .complete("done");
        let text = format_history(&[record]);
        assert!(text.starts_with("analysis_1  completed"));
        assert!(text.ends_with("What changed?"));
    }

    #[test]
    fn test_format_record_shows_error() {
        let record = AnalysisRecord::new("analysis_2", "q", ExecutionInfo::default()).fail("boom");
        assert_eq!(record.status, AnalysisStatus::Failed);
        let text = format_record(&record);
        assert!(text.contains("Analysis analysis_2 [failed]"));
        assert!(text.contains("Error: boom"));
    }
}
