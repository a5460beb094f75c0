use serde::{Deserialize, Serialize};

/// Hosted model platform reachable through the chat-completions API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// OpenAI chat completions.
    #[serde(rename = "openai")]
    OpenAi,
    /// Perplexity online (search-grounded) models.
    Perplexity,
}

impl Platform {
    /// Get the platform name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::OpenAi => "openai",
            Platform::Perplexity => "perplexity",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Platform::OpenAi),
            "perplexity" => Ok(Platform::Perplexity),
            _ => Err(format!("Unsupported platform: {}", s)),
        }
    }
}

/// Message in a chat conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

/// Message role
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl Message {
    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// One language-model call: a system/user prompt pair for a given model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub platform: Platform,
    pub model: String,
    pub temperature: f64,
    pub system_prompt: String,
    pub user_prompt: String,
    /// Prompt path that produced this call (e.g. `engine_controller/evaluate/user`), used for tracing.
    pub label: String,
}

impl ChatRequest {
    /// Create a new chat request at temperature 0
    pub fn new(
        platform: Platform,
        model: impl Into<String>,
        system_prompt: impl Into<String>,
        user_prompt: impl Into<String>,
    ) -> Self {
        Self {
            platform,
            model: model.into(),
            temperature: 0.0,
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            label: String::new(),
        }
    }

    /// Set the sampling temperature
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature.clamp(0.0, 2.0);
        self
    }

    /// Set the tracing label
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Build the wire body for the chat-completions endpoint
    pub fn to_completion_request(&self) -> CompletionRequest {
        CompletionRequest {
            model: self.model.clone(),
            messages: vec![
                Message::system(&self.system_prompt),
                Message::user(&self.user_prompt),
            ],
            temperature: self.temperature,
            stream: false,
        }
    }
}

/// Request body for `POST /chat/completions`
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub temperature: f64,
    /// Streaming is never used; responses are read whole.
    pub stream: bool,
}

/// Response body from `POST /chat/completions`
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionResponse {
    #[serde(default)]
    pub id: Option<String>,
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

/// One completion choice
#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    pub message: ChoiceMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Assistant message inside a choice
#[derive(Debug, Clone, Deserialize)]
pub struct ChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
}

/// Token usage information
#[derive(Debug, Clone, Deserialize)]
pub struct Usage {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

impl CompletionResponse {
    /// Text of the first choice, trimmed
    pub fn first_content(&self) -> Option<String> {
        self.choices
            .first()
            .and_then(|c| c.message.content.as_ref())
            .map(|c| c.trim().to_string())
    }
}

/// Where a pipeline stage sends its calls: platform, model and temperature.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelTarget {
    pub platform: Platform,
    pub model: String,
    pub temperature: f64,
}

impl ModelTarget {
    /// Create a target at temperature 0
    pub fn new(platform: Platform, model: impl Into<String>) -> Self {
        Self {
            platform,
            model: model.into(),
            temperature: 0.0,
        }
    }

    /// Set the sampling temperature
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    /// Build a chat request for this target
    pub fn request(
        &self,
        system_prompt: impl Into<String>,
        user_prompt: impl Into<String>,
    ) -> ChatRequest {
        ChatRequest::new(self.platform, self.model.clone(), system_prompt, user_prompt)
            .with_temperature(self.temperature)
    }
}
