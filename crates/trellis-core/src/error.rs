use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrellisError {
    // Reasoning backend errors
    #[error("Backend request failed: {0}")]
    Backend(String),

    #[error("Backend response parse error: {0}")]
    BackendParse(String),

    #[error("Backend timeout after {timeout_secs}s")]
    BackendTimeout { timeout_secs: u64 },

    #[error("Backend provider not supported: {0}")]
    UnsupportedProvider(String),

    // Tool errors
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Tool execution failed: {tool}: {message}")]
    ToolExecution { tool: String, message: String },

    #[error("Tool timeout after {timeout_secs}s: {tool}")]
    ToolTimeout { tool: String, timeout_secs: u64 },

    #[error("Tool input validation failed: {0}")]
    ToolValidation(String),

    #[error("HTTP error: {0}")]
    Http(String),

    // Graph definition and routing errors
    #[error("Graph definition error: {0}")]
    GraphDefinition(String),

    #[error("Step '{0}' not found in graph")]
    UnknownStep(String),

    #[error("Router after '{step}' could not classify the state: {reason}")]
    UnroutableState { step: String, reason: String },

    #[error("Router after '{step}' returned undeclared target '{target}'")]
    UndeclaredRoute { step: String, target: String },

    #[error("Graph '{graph}' exceeded its step budget ({limit})")]
    StepBudgetExceeded { graph: String, limit: usize },

    #[error("Run cancelled")]
    Cancelled,

    // Interrupt protocol errors
    #[error("Interrupt response mismatch: expected {expected} responses, got {actual}")]
    InterruptMismatch { expected: usize, actual: usize },

    #[error("Response kind '{kind}' is not allowed for tool call {call_id}")]
    UnsupportedResponse { kind: String, call_id: String },

    #[error("Conversation {0} is not waiting for approval")]
    NotSuspended(String),

    #[error("Conversation {0} is waiting for approval; resume it first")]
    AwaitingApproval(String),

    // Context trimmer misuse
    #[error("Invalid trim request: {0}")]
    InvalidTrim(String),

    // Storage errors
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TrellisError {
    pub fn tool_execution(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolExecution {
            tool: tool.into(),
            message: message.into(),
        }
    }

    pub fn unroutable(step: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnroutableState {
            step: step.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error belongs to the interrupt protocol family.
    ///
    /// These leave a suspended conversation where it was so the caller can
    /// retry the resume with corrected responses.
    pub fn is_interrupt_violation(&self) -> bool {
        matches!(
            self,
            Self::InterruptMismatch { .. } | Self::UnsupportedResponse { .. }
        )
    }

    /// Transport-level failures (timeouts, HTTP, cancellation).
    ///
    /// A tool step never turns these into tool-result text; they fail the run.
    pub fn is_io_failure(&self) -> bool {
        matches!(
            self,
            Self::ToolTimeout { .. } | Self::Http(_) | Self::Cancelled
        )
    }
}

pub type Result<T> = std::result::Result<T, TrellisError>;
