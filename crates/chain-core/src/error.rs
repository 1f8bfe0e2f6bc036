//! Error Types

use std::time::Duration;

use thiserror::Error;

/// Result type alias for chain operations
pub type Result<T> = std::result::Result<T, ChainError>;

/// Chain, agent and provider error types
#[derive(Error, Debug)]
pub enum ChainError {
    /// A key the chain declares as input was not supplied
    #[error("invalid input values: missing key in input values: {0}")]
    MissingInput(String),

    /// The chain returned without a key it declares as output
    #[error("invalid output values: missing key in output values: {0}")]
    MissingOutput(String),

    /// `run` used on a chain that does not take exactly one input
    #[error("run not supported in chain with {0} inputs")]
    MultipleInputsInRun(usize),

    /// `run` used on a chain that does not produce exactly one output
    #[error("run not supported in chain with {0} outputs")]
    MultipleOutputsInRun(usize),

    /// `run` found a non-textual output value
    #[error("run not supported in chain that returns value that is not string")]
    WrongOutputTypeInRun,

    /// The chain behind an agent did not return text under the expected key
    #[error("agent chain did not return a string under key `{0}`")]
    InvalidChainReturnType(String),

    /// Model output matched neither the finish nor the action grammar
    #[error("unable to parse agent output: {0}")]
    UnparsableOutput(String),

    /// An agent produced a plan the executor cannot act on
    #[error("invalid plan: {0}")]
    InvalidPlan(String),

    /// Tool not found in registry
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    /// Two tools registered under one name
    #[error("duplicate tool name: {0}")]
    DuplicateTool(String),

    /// Tool execution failed
    #[error("tool execution error: {0}")]
    ToolExecution(String),

    /// Maximum iterations reached in the planning loop
    #[error("agent stopped after reaching the maximum of {0} iterations")]
    MaxIterations(usize),

    /// Execution time budget exhausted in the planning loop
    #[error("agent stopped after exceeding its execution time of {0:?}")]
    ExecutionTimeout(Duration),

    /// Caller cancelled the operation
    #[error("operation cancelled")]
    Cancelled,

    /// Caller deadline passed
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// LLM provider error
    #[error("provider error: {0}")]
    Provider(String),

    /// Provider returned no choices
    #[error("no response")]
    EmptyResponse,

    /// Batched response did not match the batch that was sent
    #[error("unexpected length of response: expected {expected}, got {actual}")]
    UnexpectedResponseLength { expected: usize, actual: usize },

    /// Embedding model is not one the provider accepts
    #[error("unexpected embedding model: {0}")]
    UnexpectedEmbeddingModel(String),

    /// Provider credentials are not configured
    #[error("missing API key, set it in the {0} environment variable")]
    MissingToken(String),

    /// HTTP status error from the provider
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Memory load or save failed
    #[error("memory error: {0}")]
    Memory(String),

    /// Prompt template could not be rendered
    #[error("template error: {0}")]
    Template(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other/unknown error
    #[error("{0}")]
    Other(String),
}

impl ChainError {
    /// True for caller-initiated stops, which callers usually should not log as failures
    pub fn is_cancellation(&self) -> bool {
        matches!(self, ChainError::Cancelled | ChainError::DeadlineExceeded)
    }

    /// Check if error is retryable by a caller wrapping the whole invocation
    pub fn is_retryable(&self) -> bool {
        match self {
            ChainError::Http { status, .. } => *status == 429 || *status >= 500,
            ChainError::EmptyResponse | ChainError::Io(_) => true,
            _ => false,
        }
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            ChainError::MissingInput(key) => format!("The input '{key}' is required."),
            ChainError::Provider(msg) => format!("The AI service encountered an error: {msg}"),
            ChainError::Http { status: 429, .. } => {
                "You've made too many requests. Please wait a moment.".into()
            }
            ChainError::Http { status: 401 | 403, .. } | ChainError::MissingToken(_) => {
                "Authentication failed. Please check your credentials.".into()
            }
            ChainError::ToolNotFound(name) => format!("The tool '{name}' is not available."),
            ChainError::UnparsableOutput(_) => {
                "The AI service returned a reply that could not be understood.".into()
            }
            ChainError::MaxIterations(_) | ChainError::ExecutionTimeout(_) => {
                "The request took too long to process. Please try a simpler query.".into()
            }
            ChainError::Cancelled | ChainError::DeadlineExceeded => "The request was cancelled.".into(),
            _ => "An unexpected error occurred.".into(),
        }
    }
}

impl From<anyhow::Error> for ChainError {
    fn from(err: anyhow::Error) -> Self {
        ChainError::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_kinds() {
        assert!(ChainError::Cancelled.is_cancellation());
        assert!(ChainError::DeadlineExceeded.is_cancellation());
        assert!(!ChainError::MaxIterations(3).is_cancellation());
        assert!(!ChainError::ExecutionTimeout(Duration::from_secs(1)).is_cancellation());
    }

    #[test]
    fn test_missing_input_names_key() {
        let err = ChainError::MissingInput("question".into());
        assert!(err.to_string().ends_with("question"));
    }

    #[test]
    fn test_retryable() {
        assert!(ChainError::Http { status: 503, body: String::new() }.is_retryable());
        assert!(!ChainError::Http { status: 400, body: String::new() }.is_retryable());
        assert!(!ChainError::UnparsableOutput("x".into()).is_retryable());
    }
}
