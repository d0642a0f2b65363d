//! Agent runtime errors
//!
//! One `thiserror` enum covers the tape store, the model loop, and the
//! runtime glue. Each kind maps to a stable textual tag via
//! [`AgentError::tag`]; those tags are what tape events and CLI output
//! carry, so they never change shape.
//!
//! Recovery policy: tool failures become tool-result values and the loop
//! continues; tape and anchor lookups are fatal to the current input but
//! leave the session usable; timeouts surface as `timeout:<stage>`.

use thiserror::Error;

/// Result type for agent operations
pub type AgentResult<T> = std::result::Result<T, AgentError>;

/// Errors raised by the tape store and session runtime
#[derive(Debug, Error)]
pub enum AgentError {
    /// The tape id is not in the manifest
    #[error("tape not found: {0}")]
    TapeNotFound(String),

    /// The anchor name is not in the manifest
    #[error("anchor not found: {0}")]
    AnchorNotFound(String),

    /// The model loop ran out of steps without producing text
    #[error("max steps exceeded")]
    MaxStepsExceeded,

    /// A stage (model, tool, bus) exceeded its deadline
    #[error("timeout at stage {0}")]
    Timeout(String),

    /// A tool handler failed; rendered into the tool result, not fatal
    #[error("tool execution failed: {0}")]
    ToolFailed(String),

    /// The model provider reported an error
    #[error("model error: {0}")]
    Model(String),

    /// An in-flight input was cancelled
    #[error("cancelled")]
    Cancelled,

    /// Invalid argument combination (e.g. fork with both split selectors)
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration could not be loaded or parsed
    #[error("config error: {0}")]
    Config(String),

    /// Filesystem failure under the tape home
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A tape line or manifest entry failed to (de)serialize
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Bus-side failure surfaced through the bridge
    #[error("bus error: {0}")]
    Bus(#[from] bub_core::Error),
}

impl AgentError {
    /// Stable textual tag for events and CLI output
    pub fn tag(&self) -> String {
        match self {
            AgentError::TapeNotFound(_) => "tape_not_found".to_string(),
            AgentError::AnchorNotFound(_) => "anchor_not_found".to_string(),
            AgentError::MaxStepsExceeded => "max_steps_exceeded".to_string(),
            AgentError::Timeout(stage) => format!("timeout:{}", stage),
            AgentError::ToolFailed(_) => "tool_execution_failed".to_string(),
            AgentError::Model(_) => "model_error".to_string(),
            AgentError::Cancelled => "cancelled".to_string(),
            AgentError::InvalidArgument(_) => "invalid_argument".to_string(),
            AgentError::Config(_) => "config_error".to_string(),
            AgentError::Io(_) => "io_error".to_string(),
            AgentError::Serialization(_) => "serialization_error".to_string(),
            AgentError::Bus(e) => e.tag().to_string(),
        }
    }
}

impl From<serde_json::Error> for AgentError {
    fn from(e: serde_json::Error) -> Self {
        AgentError::Serialization(e.to_string())
    }
}
