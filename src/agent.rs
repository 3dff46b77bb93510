//! Agent descriptors.
//!
//! An [`Agent`] bundles a name, a model identifier, instructions, and the
//! tools the model may call while that agent is active. Agents are plain
//! values: cheap to clone, built once by the application, and switched in and
//! out by the runner as handoffs occur. Instructions are either static text
//! or a function of the run context, resolved fresh before every model call
//! so a handed-off agent sees up-to-date context.
//!
//! ## Example
//!
//! ```rust
//! use troupe::{Agent, Instructions};
//!
//! let agent = Agent::new("Support", "You are a support agent.")
//!     .with_model("gpt-4o-mini");
//! assert_eq!(agent.name, "Support");
//!
//! let personalized = Agent::new(
//!     "Concierge",
//!     Instructions::dynamic(|ctx| {
//!         let user = ctx.get("user").and_then(|v| v.as_str()).unwrap_or("there");
//!         format!("Greet {user} by name.")
//!     }),
//! );
//! assert_eq!(personalized.name, "Concierge");
//! ```

use std::fmt;
use std::sync::Arc;

use crate::context::ContextVariables;
use crate::result::{Response, ToolResult};
use crate::tool::Tool;

/// System instructions: static text, or a pure function of the run context.
#[derive(Clone)]
pub enum Instructions {
    Static(String),
    Dynamic(Arc<dyn Fn(&ContextVariables) -> String + Send + Sync>),
}

impl Instructions {
    pub fn dynamic<F>(f: F) -> Self
    where
        F: Fn(&ContextVariables) -> String + Send + Sync + 'static,
    {
        Self::Dynamic(Arc::new(f))
    }

    /// Resolve against the current context.
    pub fn resolve(&self, context: &ContextVariables) -> String {
        match self {
            Self::Static(text) => text.clone(),
            Self::Dynamic(f) => f(context),
        }
    }
}

impl Default for Instructions {
    fn default() -> Self {
        Self::Static("You are a helpful agent.".to_string())
    }
}

impl From<&str> for Instructions {
    fn from(text: &str) -> Self {
        Self::Static(text.to_string())
    }
}

impl From<String> for Instructions {
    fn from(text: String) -> Self {
        Self::Static(text)
    }
}

impl fmt::Debug for Instructions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(text) => f.debug_tuple("Static").field(text).finish(),
            Self::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

/// Tool-choice policy forwarded to the completion gateway.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ToolChoice {
    /// The model decides whether to call a tool.
    #[default]
    Auto,
    /// The model must call at least one tool.
    Required,
    /// The model must not call tools.
    None,
}

/// Hook invoked at the end of every turn the agent was active for, whether or
/// not a tool call occurred. Receives the run so far with the candidate next
/// agent in `response.agent`; the returned result's context delta is merged
/// and its `agent` field replaces the next agent outright, so a hook can
/// force or cancel a handoff.
pub trait PostTurnHook: Send + Sync {
    fn on_turn_end(&self, turn: &Response) -> ToolResult;
}

impl<F> PostTurnHook for F
where
    F: Fn(&Response) -> ToolResult + Send + Sync,
{
    fn on_turn_end(&self, turn: &Response) -> ToolResult {
        self(turn)
    }
}

/// A named participant in a workflow.
#[derive(Clone)]
pub struct Agent {
    /// Display/identity key used for handoff bookkeeping and logging.
    /// Uniqueness is a caller convention, not enforced here.
    pub name: String,

    /// Model identifier passed to the completion gateway.
    pub model: String,

    /// System instructions, resolved before every model call.
    pub instructions: Instructions,

    /// Tools available while this agent is active. Order only affects schema
    /// listing order. May be extended after construction, e.g. to wire up
    /// handoff tools between sibling agents.
    pub functions: Vec<Arc<dyn Tool>>,

    /// Tool-choice policy forwarded to the gateway.
    pub tool_choice: ToolChoice,

    /// Whether the model may emit several tool calls in one turn.
    pub parallel_tool_calls: bool,

    /// Optional post-turn hook.
    pub post_turn: Option<Arc<dyn PostTurnHook>>,
}

impl Default for Agent {
    fn default() -> Self {
        Self {
            name: "Agent".to_string(),
            model: "gpt-4o".to_string(),
            instructions: Instructions::default(),
            functions: vec![],
            tool_choice: ToolChoice::default(),
            parallel_tool_calls: true,
            post_turn: None,
        }
    }
}

impl Agent {
    pub fn new(name: impl Into<String>, instructions: impl Into<Instructions>) -> Self {
        Self {
            name: name.into(),
            instructions: instructions.into(),
            ..Self::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.functions.push(tool);
        self
    }

    pub fn with_tools(mut self, tools: Vec<Arc<dyn Tool>>) -> Self {
        self.functions.extend(tools);
        self
    }

    pub fn with_tool_choice(mut self, tool_choice: ToolChoice) -> Self {
        self.tool_choice = tool_choice;
        self
    }

    pub fn with_parallel_tool_calls(mut self, enabled: bool) -> Self {
        self.parallel_tool_calls = enabled;
        self
    }

    pub fn with_post_turn(mut self, hook: Arc<dyn PostTurnHook>) -> Self {
        self.post_turn = Some(hook);
        self
    }

    /// Push a tool after construction (before a run starts).
    pub fn add_tool(&mut self, tool: Arc<dyn Tool>) {
        self.functions.push(tool);
    }

    pub fn has_tools(&self) -> bool {
        !self.functions.is_empty()
    }
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name)
            .field("model", &self.model)
            .field("tools", &self.functions.len())
            .field("tool_choice", &self.tool_choice)
            .finish()
    }
}
