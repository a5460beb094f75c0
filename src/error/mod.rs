use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Prompt error: {0}")]
    Prompt(#[from] PromptError),

    #[error("Analysis error: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("Visualization error: {0}")]
    Visualization(#[from] VisualizationError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Storage layer errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database connection failed: {message}")]
    Connection { message: String },

    #[error("Query failed: {message}")]
    Query { message: String },

    #[error("Analysis not found: {analysis_id}")]
    AnalysisNotFound { analysis_id: String },

    #[error("Migration failed: {message}")]
    Migration { message: String },

    #[error("Serialization failed: {message}")]
    Serialization { message: String },

    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Language-model transport errors
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM unavailable: {message} (retries: {retries})")]
    Unavailable { message: String, retries: u32 },

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Context length exceeded: {message}")]
    ContextLengthExceeded { message: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("No API key configured for platform {platform}")]
    MissingApiKey { platform: String },

    #[error("Unsupported platform: {platform}")]
    UnsupportedPlatform { platform: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl LlmError {
    /// Whether this failure means the prompt was too large for the model.
    ///
    /// Response synthesis shrinks its input and retries only on this category.
    pub fn is_context_length_exceeded(&self) -> bool {
        match self {
            LlmError::ContextLengthExceeded { .. } => true,
            LlmError::Api { message, .. } | LlmError::Unavailable { message, .. } => {
                message.to_lowercase().contains("context_length_exceeded")
            }
            _ => false,
        }
    }
}

/// Prompt template errors
#[derive(Debug, Error)]
pub enum PromptError {
    #[error("Prompt not found: category={category}, name={path}")]
    NotFound { category: String, path: String },

    #[error("Failed to load prompts: {message}")]
    Load { message: String },
}

/// Capability invocation errors (one failed task, never fatal to a node)
#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("Unknown agent type '{name}'")]
    UnknownCapability { name: String },

    #[error("{0}")]
    Prompt(#[from] PromptError),

    #[error("{0}")]
    Llm(#[from] LlmError),
}

/// Analysis pipeline errors
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Task decomposition failed: {message}")]
    Decomposition { message: String },

    #[error("Failed to build node {node_id}: {message}")]
    NodeBuild { node_id: String, message: String },

    #[error("Response synthesis failed: {message}")]
    Synthesis { message: String },
}

/// Diagram rendering errors
#[derive(Debug, Error)]
pub enum VisualizationError {
    #[error("Failed to write diagram artifact: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize diagram metadata: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for language-model calls
pub type LlmResult<T> = Result<T, LlmError>;

/// Result type alias for prompt lookups
pub type PromptResult<T> = Result<T, PromptError>;

/// Result type alias for analysis steps
pub type AnalysisResult<T> = Result<T, AnalysisError>;

/// Result type alias for diagram rendering
pub type VisualizationResult<T> = Result<T, VisualizationError>;
