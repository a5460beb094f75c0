use std::env;
use std::path::PathBuf;

use crate::error::AppError;
use crate::llm::Platform;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub llm: LlmConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub request: RequestConfig,
    pub models: ModelConfig,
    pub analysis: AnalysisConfig,
    pub prompts: PromptConfig,
}

/// Provider credentials and endpoints
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub perplexity_api_key: Option<String>,
    pub perplexity_base_url: String,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// HTTP request configuration
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

/// Model names used by the engines, the search capabilities and validation
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// Model for planning, the controller, expanders and reasoning capabilities.
    pub engine_model: String,
    /// Online model for info/news search capabilities.
    pub search_model: String,
    /// Online model used to fact-check node summaries.
    pub validation_model: String,
}

/// What to do with a node whose summary failed every validation attempt
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InvalidNodePolicy {
    /// Keep the node as an INVALID leaf in the tree, stats and visualization.
    #[default]
    Keep,
    /// Detach the node from the tree and store no summary for it.
    Exclude,
}

impl std::str::FromStr for InvalidNodePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "keep" => Ok(InvalidNodePolicy::Keep),
            "exclude" => Ok(InvalidNodePolicy::Exclude),
            _ => Err(format!("Unknown invalid node policy: {}", s)),
        }
    }
}

/// Analysis run parameters
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub max_layer: u32,
    pub max_nodes: u32,
    /// Platform for the final response synthesis.
    pub platform: Platform,
    /// Model for the final response synthesis.
    pub model: String,
    pub temperature: f64,
    pub enable_validation: bool,
    pub max_aspects: usize,
    pub decision_max_retries: u32,
    pub decision_retry_delay_ms: u64,
    pub validation_attempts: u32,
    pub invalid_node_policy: InvalidNodePolicy,
    pub output_dir: PathBuf,
    pub generate_visualization: bool,
}

/// Prompt template source
#[derive(Debug, Clone, Default)]
pub struct PromptConfig {
    /// Optional JSON file overriding the built-in templates.
    pub prompt_file: Option<PathBuf>,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(v) => matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let llm = LlmConfig {
            openai_api_key: env::var("OPENAI_API_KEY").map_err(|_| AppError::Config {
                message: "OPENAI_API_KEY is required".to_string(),
            })?,
            openai_base_url: env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            perplexity_api_key: env::var("PERPLEXITY_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty()),
            perplexity_base_url: env::var("PERPLEXITY_BASE_URL")
                .unwrap_or_else(|_| "https://api.perplexity.ai".to_string()),
        };

        let database = DatabaseConfig {
            path: PathBuf::from(
                env::var("DATABASE_PATH").unwrap_or_else(|_| "./data/deot.db".to_string()),
            ),
            max_connections: env_or("DATABASE_MAX_CONNECTIONS", 5),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let request = RequestConfig {
            timeout_ms: env_or("REQUEST_TIMEOUT_MS", 60000),
            max_retries: env_or("MAX_RETRIES", 2),
            retry_delay_ms: env_or("RETRY_DELAY_MS", 1000),
        };

        let models = ModelConfig {
            engine_model: env::var("ENGINE_MODEL").unwrap_or_else(|_| "gpt-4o".to_string()),
            search_model: env::var("SEARCH_MODEL").unwrap_or_else(|_| "sonar".to_string()),
            validation_model: env::var("VALIDATION_MODEL")
                .unwrap_or_else(|_| "sonar-pro".to_string()),
        };

        let platform = match env::var("LLM_PLATFORM") {
            Ok(p) => p
                .parse::<Platform>()
                .map_err(|message| AppError::Config { message })?,
            Err(_) => Platform::OpenAi,
        };

        let invalid_node_policy = match env::var("INVALID_NODE_POLICY") {
            Ok(p) => p
                .parse::<InvalidNodePolicy>()
                .map_err(|message| AppError::Config { message })?,
            Err(_) => InvalidNodePolicy::Keep,
        };

        let analysis = AnalysisConfig {
            max_layer: env_or("MAX_LAYER", 3),
            max_nodes: env_or("MAX_NODES", 15),
            platform,
            model: env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4o".to_string()),
            temperature: env_or("LLM_TEMPERATURE", 0.3),
            enable_validation: env_flag("ENABLE_VALIDATION", false),
            max_aspects: env_or("MAX_ASPECTS", 3),
            decision_max_retries: env_or("DECISION_MAX_RETRIES", 3),
            decision_retry_delay_ms: env_or("DECISION_RETRY_DELAY_MS", 1000),
            validation_attempts: env_or("VALIDATION_ATTEMPTS", 3),
            invalid_node_policy,
            output_dir: PathBuf::from(env::var("OUTPUT_DIR").unwrap_or_else(|_| "output".to_string())),
            generate_visualization: true,
        };

        let prompts = PromptConfig {
            prompt_file: env::var("PROMPT_FILE").ok().map(PathBuf::from),
        };

        let config = Config {
            llm,
            database,
            logging,
            request,
            models,
            analysis,
            prompts,
        };
        config.analysis.validate()?;

        Ok(config)
    }
}

impl AnalysisConfig {
    /// Reject budgets that cannot build even a root node
    pub fn validate(&self) -> Result<(), AppError> {
        if self.max_layer == 0 {
            return Err(AppError::Config {
                message: "MAX_LAYER must be at least 1".to_string(),
            });
        }
        if self.max_nodes == 0 {
            return Err(AppError::Config {
                message: "MAX_NODES must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 60000,
            max_retries: 2,
            retry_delay_ms: 1000,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            engine_model: "gpt-4o".to_string(),
            search_model: "sonar".to_string(),
            validation_model: "sonar-pro".to_string(),
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_layer: 3,
            max_nodes: 15,
            platform: Platform::OpenAi,
            model: "gpt-4o".to_string(),
            temperature: 0.3,
            enable_validation: false,
            max_aspects: 3,
            decision_max_retries: 3,
            decision_retry_delay_ms: 1000,
            validation_attempts: 3,
            invalid_node_policy: InvalidNodePolicy::Keep,
            output_dir: PathBuf::from("output"),
            generate_visualization: true,
        }
    }
}
