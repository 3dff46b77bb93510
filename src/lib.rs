//! # troupe
//!
//! A lightweight orchestration layer for multi-agent conversational
//! workflows on top of an LLM chat-completion API. Define named agents
//! (instructions plus tool functions), run a conversation, and let the model
//! hand control between agents by returning an [`Agent`] from a tool —
//! while a shared [`ContextVariables`] map is threaded through instructions
//! and tool invocations across handoffs.
//!
//! ## Core concepts
//!
//! - **Agent**: a named bundle of model identifier, instructions, and tools.
//! - **Handoff**: a tool return value designating the next active agent.
//! - **Context variables**: a run-scoped key/value map visible to
//!   instruction functions and tools, never advertised to the model.
//! - **Turn**: one model call plus any resulting tool dispatch and handoff
//!   resolution.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use troupe::{tool_typed, Agent, Message, MockGateway, RunConfig, Runner};
//!
//! #[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
//! struct NoArgs {}
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> troupe::Result<()> {
//! let refunds = Agent::new("Refunds", "You process refunds.");
//!
//! let escalate = tool_typed("escalate", "Escalate to the refunds agent", {
//!     let refunds = refunds.clone();
//!     move |_: NoArgs| Ok(refunds.clone())
//! });
//! let triage = Agent::new("Triage", "Route the user.").with_tool(Arc::new(escalate));
//!
//! // A scripted gateway: first a tool call, then a plain answer.
//! let gateway = MockGateway::new()
//!     .with_tool_call("escalate", serde_json::json!({}))
//!     .with_message("Your refund is on its way.");
//!
//! let runner = Runner::new(Arc::new(gateway));
//! let response = runner
//!     .run(&triage, &[Message::user("I want my money back")], RunConfig::default())
//!     .await?;
//!
//! assert_eq!(response.agent.as_ref().unwrap().name, "Refunds");
//! assert_eq!(response.last_content(), Some("Your refund is on its way."));
//! # Ok(())
//! # }
//! ```
//!
//! For production use, `Runner::default()` talks to OpenAI via
//! [`OpenAIGateway`] (configured from `OPENAI_API_KEY`); any other backend
//! can be plugged in by implementing [`CompletionGateway`].

pub mod agent;
pub mod context;
pub mod error;
pub mod items;
pub mod model;
pub mod registry;
pub mod result;
pub mod runner;
pub mod schema;
pub mod streaming;
pub mod tool;
pub mod usage;

pub use agent::{Agent, Instructions, PostTurnHook, ToolChoice};
pub use context::ContextVariables;
pub use error::{Result, TroupeError};
pub use items::{Message, ModelResponse, Role, ToolCall};
pub use model::{CompletionGateway, CompletionRequest, DeltaStream, MockGateway, OpenAIGateway};
pub use registry::{handoff_to, AgentRegistry};
pub use result::{Response, ToolResult};
pub use runner::{RunConfig, Runner};
pub use schema::{strip_context_parameter, ToolSchema, CONTEXT_VARIABLES_PARAM};
pub use streaming::{MessageAccumulator, RunStream, StreamDelta, StreamEvent};
pub use tool::{tool_typed, tool_typed_ctx, FunctionTool, Tool, ToolReturn};
pub use usage::Usage;
