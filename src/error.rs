//! Error types for troupe runs.

use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TroupeError>;

/// Failures that abort a run.
///
/// Unresolvable tool names are deliberately absent: the dispatcher recovers
/// from those locally by synthesizing an error tool message and moving on.
#[derive(Debug, Error)]
pub enum TroupeError {
    /// Error from the completion gateway (network, API rejection).
    #[error("completion gateway error: {0}")]
    Gateway(#[from] async_openai::error::OpenAIError),

    /// The gateway returned a response the runner cannot interpret.
    #[error("malformed completion: {0}")]
    MalformedCompletion(String),

    /// The model emitted a tool call whose argument payload is not valid JSON.
    #[error("malformed arguments for tool `{tool}`: {source} (raw: {arguments})")]
    MalformedArguments {
        tool: String,
        arguments: String,
        #[source]
        source: serde_json::Error,
    },

    /// A tool function failed while executing.
    #[error("tool `{tool}` failed: {message}")]
    ToolExecution { tool: String, message: String },

    /// A tool returned a value that cannot be rendered as a string.
    #[error("tool `{tool}` returned a value that cannot be rendered as a string: {source}")]
    NonStringifiableReturn {
        tool: String,
        #[source]
        source: serde_json::Error,
    },

    /// A handoff named an agent the registry does not know.
    #[error("unknown agent `{name}`")]
    UnknownAgent { name: String },

    /// Serialization/deserialization error outside of tool dispatch.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error (e.g. building a blocking runtime).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other errors.
    #[error("{0}")]
    Other(String),
}

impl TroupeError {
    /// Convenience constructor for tool execution failures.
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolExecution {
            tool: tool.into(),
            message: message.into(),
        }
    }
}
