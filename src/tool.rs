//! Tool system for agents.
//!
//! A tool is anything the model can invoke by name. Implementations return a
//! [`ToolReturn`], which normalizes the three things a tool is allowed to
//! hand back: a plain value for the model to read, a handoff to another
//! agent, or a full [`ToolResult`] controlling value, handoff, and context
//! updates at once.

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::agent::Agent;
use crate::context::ContextVariables;
use crate::error::{Result, TroupeError};
use crate::result::ToolResult;
use crate::schema;

/// Trait for all tools an agent can call.
#[async_trait]
pub trait Tool: Send + Sync + Debug {
    /// Name the model uses to address this tool.
    fn name(&self) -> &str;

    /// Free-text summary advertised to the model.
    fn description(&self) -> &str;

    /// JSON-schema object describing the parameters. May declare the
    /// reserved context parameter; it is stripped before the schema is
    /// advertised.
    fn parameters_schema(&self) -> Value;

    /// Whether the dispatcher should inject the run context into this tool's
    /// arguments under [`schema::CONTEXT_VARIABLES_PARAM`]. Defaults to
    /// whether the (un-stripped) schema declares that parameter.
    fn accepts_context(&self) -> bool {
        schema::declares_context(&self.parameters_schema())
    }

    /// Execute with parsed arguments. The current context is always passed;
    /// errors abort the run, so expected failure modes should be returned as
    /// values the model can read.
    async fn execute(&self, arguments: Value, context: &ContextVariables) -> Result<ToolReturn>;
}

/// What a tool hands back to the dispatcher.
#[derive(Debug, Clone)]
pub enum ToolReturn {
    /// A plain string value.
    Value(String),
    /// An arbitrary JSON value, coerced to its string representation.
    Json(Value),
    /// Hand control to another agent.
    Handoff(Agent),
    /// Full control over value, handoff, and context delta.
    Result(ToolResult),
}

impl ToolReturn {
    /// Coerce any serializable value. Serialization failure is a fatal,
    /// tool-identifying error per the tool contract.
    pub fn from_serialize<T: Serialize>(tool: &str, value: &T) -> Result<Self> {
        let value =
            serde_json::to_value(value).map_err(|source| TroupeError::NonStringifiableReturn {
                tool: tool.to_string(),
                source,
            })?;
        Ok(Self::Json(value))
    }

    /// Normalize into a [`ToolResult`].
    pub fn into_result(self) -> ToolResult {
        match self {
            Self::Value(value) => ToolResult::value(value),
            Self::Json(Value::String(text)) => ToolResult::value(text),
            Self::Json(value) => ToolResult::value(value.to_string()),
            Self::Handoff(agent) => ToolResult::handoff(agent),
            Self::Result(result) => result,
        }
    }
}

impl From<String> for ToolReturn {
    fn from(value: String) -> Self {
        Self::Value(value)
    }
}

impl From<&str> for ToolReturn {
    fn from(value: &str) -> Self {
        Self::Value(value.to_string())
    }
}

impl From<Agent> for ToolReturn {
    fn from(agent: Agent) -> Self {
        Self::Handoff(agent)
    }
}

impl From<ToolResult> for ToolReturn {
    fn from(result: ToolResult) -> Self {
        Self::Result(result)
    }
}

impl From<Value> for ToolReturn {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

type Handler = dyn Fn(Value, &ContextVariables) -> Result<ToolReturn> + Send + Sync;

/// A tool backed by a plain function.
#[derive(Clone)]
pub struct FunctionTool {
    name: String,
    description: String,
    parameters: Value,
    handler: Arc<Handler>,
}

impl Debug for FunctionTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionTool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("parameters", &self.parameters)
            .finish()
    }
}

impl FunctionTool {
    /// Create a tool from a raw handler and a hand-written parameter schema.
    pub fn new<F>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
        handler: F,
    ) -> Self
    where
        F: Fn(Value, &ContextVariables) -> Result<ToolReturn> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            handler: Arc::new(handler),
        }
    }
}

#[async_trait]
impl Tool for FunctionTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        self.parameters.clone()
    }

    async fn execute(&self, arguments: Value, context: &ContextVariables) -> Result<ToolReturn> {
        (self.handler)(arguments, context)
    }
}

/// Create a tool from a typed handler.
///
/// `A` is the argument struct (deserialized from the model's JSON, schema
/// derived via schemars) and the return type converts into [`ToolReturn`],
/// so handlers can return `String`, [`Agent`], [`ToolResult`], or a
/// `serde_json::Value`.
pub fn tool_typed<A, R, F>(
    name: impl Into<String>,
    description: impl Into<String>,
    handler: F,
) -> FunctionTool
where
    A: DeserializeOwned + JsonSchema + Send + 'static,
    R: Into<ToolReturn> + Send + 'static,
    F: Fn(A) -> Result<R> + Send + Sync + 'static,
{
    let name = name.into();
    let tool_name = name.clone();
    FunctionTool::new(
        name,
        description,
        schema::parameters_for::<A>(),
        move |raw, _context| {
            let args: A = parse_args(&tool_name, raw)?;
            handler(args).map(Into::into)
        },
    )
}

/// Like [`tool_typed`], but the handler also receives the run context.
pub fn tool_typed_ctx<A, R, F>(
    name: impl Into<String>,
    description: impl Into<String>,
    handler: F,
) -> FunctionTool
where
    A: DeserializeOwned + JsonSchema + Send + 'static,
    R: Into<ToolReturn> + Send + 'static,
    F: Fn(A, &ContextVariables) -> Result<R> + Send + Sync + 'static,
{
    let name = name.into();
    let tool_name = name.clone();
    FunctionTool::new(
        name,
        description,
        schema::parameters_for::<A>(),
        move |raw, context| {
            let args: A = parse_args(&tool_name, raw)?;
            handler(args, context).map(Into::into)
        },
    )
}

fn parse_args<A: DeserializeOwned>(tool: &str, raw: Value) -> Result<A> {
    let rendered = raw.to_string();
    serde_json::from_value(raw).map_err(|source| TroupeError::MalformedArguments {
        tool: tool.to_string(),
        arguments: rendered,
        source,
    })
}
