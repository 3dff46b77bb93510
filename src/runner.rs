//! The conversation loop and tool-call dispatcher.
//!
//! A run alternates completion calls and tool dispatch, switching the active
//! agent when a tool hands off, until a turn produces no next agent or the
//! turn budget runs out. The streaming and non-streaming paths share
//! everything downstream of message assembly ([`Runner::finish_turn`]), so
//! they are behaviorally identical by construction.
//!
//! ## Example
//!
//! ```rust,no_run
//! use troupe::{Agent, Message, RunConfig, Runner};
//!
//! # async fn example() -> troupe::Result<()> {
//! let agent = Agent::new("Assistant", "You are a helpful agent.");
//! let runner = Runner::default(); // OpenAI gateway from the environment
//! let response = runner
//!     .run(&agent, &[Message::user("Hello!")], RunConfig::default())
//!     .await?;
//! println!("{}", response.last_content().unwrap_or(""));
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{debug, info};

use crate::agent::Agent;
use crate::context::ContextVariables;
use crate::error::{Result, TroupeError};
use crate::items::{Message, ModelResponse, ToolCall};
use crate::model::{CompletionGateway, CompletionRequest, OpenAIGateway};
use crate::result::Response;
use crate::schema::{self, ToolSchema};
use crate::streaming::{MessageAccumulator, RunStream, StreamEvent};
use crate::tool::Tool;
use crate::usage::Usage;

/// Per-run settings.
#[derive(Clone)]
pub struct RunConfig {
    /// Initial context. Cloned at run start; the caller's map is never
    /// mutated.
    pub context_variables: ContextVariables,
    /// Model to use for every call in this run, overriding each agent's own.
    pub model_override: Option<String>,
    /// Turn budget. A turn is one orchestrator iteration (model call plus
    /// any dispatch), whether or not tools were called. `None` is unbounded.
    pub max_turns: Option<usize>,
    /// When `false`, tool calls are recorded in the history but not
    /// executed.
    pub execute_tools: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            context_variables: ContextVariables::new(),
            model_override: None,
            max_turns: None,
            execute_tools: true,
        }
    }
}

impl RunConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_context_variables(mut self, context_variables: ContextVariables) -> Self {
        self.context_variables = context_variables;
        self
    }

    pub fn with_model_override(mut self, model: impl Into<String>) -> Self {
        self.model_override = Some(model.into());
        self
    }

    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = Some(max_turns);
        self
    }

    pub fn with_execute_tools(mut self, execute_tools: bool) -> Self {
        self.execute_tools = execute_tools;
        self
    }
}

/// What one round of tool dispatch produced: the tool messages in call
/// order, the merged context delta, and the last handoff target seen.
#[derive(Debug, Default)]
struct DispatchOutcome {
    messages: Vec<Message>,
    context_variables: ContextVariables,
    agent: Option<Agent>,
}

/// Executes agents against a completion gateway.
pub struct Runner {
    gateway: Arc<dyn CompletionGateway>,
}

impl Default for Runner {
    /// A runner on the OpenAI gateway, configured from the environment.
    fn default() -> Self {
        Self::new(Arc::new(OpenAIGateway::new()))
    }
}

impl Runner {
    pub fn new(gateway: Arc<dyn CompletionGateway>) -> Self {
        Self { gateway }
    }

    /// Run a conversation to completion and return the appended messages,
    /// the agent active at termination, and the final context.
    pub async fn run(
        &self,
        agent: &Agent,
        messages: &[Message],
        config: RunConfig,
    ) -> Result<Response> {
        let mut active = agent.clone();
        let mut context = config.context_variables.clone();
        let mut history = messages.to_vec();
        let init_len = history.len();
        let max_turns = config.max_turns.unwrap_or(usize::MAX);
        let mut usage = Usage::empty();
        let mut turns_taken = 0;

        info!(agent = %active.name, "starting run");

        while turns_taken < max_turns {
            let request = build_request(&active, &context, &history, config.model_override.as_deref());
            debug!(turn = turns_taken, agent = %active.name, model = %request.model, "requesting completion");

            let (completion, call_usage) = self.gateway.complete(request).await?;
            usage.add_usage(&call_usage);

            let next = self
                .finish_turn(
                    &active,
                    completion,
                    &mut history,
                    &mut context,
                    init_len,
                    config.execute_tools,
                    &usage,
                )
                .await?;
            turns_taken += 1;

            match next {
                Some(next) => {
                    info!(from = %active.name, to = %next.name, "handoff");
                    active = next;
                }
                None => break,
            }
        }

        Ok(Response {
            messages: history.split_off(init_len),
            agent: Some(active),
            context_variables: context,
            usage,
        })
    }

    /// Blocking wrapper around [`Runner::run`] for hosts without a runtime.
    pub fn run_sync(
        &self,
        agent: &Agent,
        messages: &[Message],
        config: RunConfig,
    ) -> Result<Response> {
        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(self.run(agent, messages, config))
    }

    /// Run a conversation, surfacing gateway deltas as they arrive. The
    /// final event carries the same [`Response`] an equivalent
    /// non-streaming run would return.
    pub fn run_stream(&self, agent: &Agent, messages: &[Message], config: RunConfig) -> RunStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let gateway = Arc::clone(&self.gateway);
        let agent = agent.clone();
        let messages = messages.to_vec();

        tokio::spawn(async move {
            let runner = Runner { gateway };
            if let Err(e) = runner.stream_loop(agent, messages, config, &tx).await {
                let _ = tx.send(Err(e));
            }
        });

        RunStream::new(rx)
    }

    async fn stream_loop(
        &self,
        agent: Agent,
        messages: Vec<Message>,
        config: RunConfig,
        events: &UnboundedSender<Result<StreamEvent>>,
    ) -> Result<()> {
        let mut active = agent;
        let mut context = config.context_variables.clone();
        let mut history = messages;
        let init_len = history.len();
        let max_turns = config.max_turns.unwrap_or(usize::MAX);
        let mut usage = Usage::empty();
        let mut turns_taken = 0;

        info!(agent = %active.name, "starting streaming run");

        while turns_taken < max_turns {
            let request = build_request(&active, &context, &history, config.model_override.as_deref());
            let mut deltas = self.gateway.complete_stream(request).await?;

            let _ = events.send(Ok(StreamEvent::TurnStart {
                agent: active.name.clone(),
            }));

            // Forward each delta as it is merged; only the reconstruction is
            // buffered.
            let mut accumulator = MessageAccumulator::new();
            while let Some(delta) = deltas.next().await {
                let delta = delta?;
                accumulator.apply(&delta);
                let _ = events.send(Ok(StreamEvent::Delta(delta)));
            }
            let _ = events.send(Ok(StreamEvent::TurnEnd));

            let (completion, call_usage) = accumulator.finish();
            usage.add_usage(&call_usage);

            let next = self
                .finish_turn(
                    &active,
                    completion,
                    &mut history,
                    &mut context,
                    init_len,
                    config.execute_tools,
                    &usage,
                )
                .await?;
            turns_taken += 1;

            match next {
                Some(next) => {
                    info!(from = %active.name, to = %next.name, "handoff");
                    active = next;
                }
                None => break,
            }
        }

        let _ = events.send(Ok(StreamEvent::Completed(Response {
            messages: history.split_off(init_len),
            agent: Some(active),
            context_variables: context,
            usage,
        })));
        Ok(())
    }

    /// Everything after message assembly, shared by both execution paths:
    /// append the sender-tagged assistant message, dispatch tool calls,
    /// merge context, and resolve the next agent through the post-turn hook.
    async fn finish_turn(
        &self,
        active: &Agent,
        completion: ModelResponse,
        history: &mut Vec<Message>,
        context: &mut ContextVariables,
        init_len: usize,
        execute_tools: bool,
        usage_so_far: &Usage,
    ) -> Result<Option<Agent>> {
        let has_tool_calls = completion.has_tool_calls();
        history.push(completion.clone().into_message(&active.name));

        let mut next = None;
        if has_tool_calls && execute_tools {
            let outcome = self
                .handle_tool_calls(&completion.tool_calls, &active.functions, context)
                .await?;
            history.extend(outcome.messages);
            context.merge(outcome.context_variables);
            next = outcome.agent;
        } else if has_tool_calls {
            debug!(agent = %active.name, "tool execution skipped");
        }

        // The hook runs on the agent that was active this turn, regardless of
        // whether a tool call occurred, and its result replaces the next
        // agent outright.
        if let Some(hook) = &active.post_turn {
            let turn = Response {
                messages: history[init_len..].to_vec(),
                agent: next,
                context_variables: context.clone(),
                usage: usage_so_far.clone(),
            };
            let result = hook.on_turn_end(&turn);
            context.merge(result.context_variables);
            next = result.agent;
        }

        Ok(next)
    }

    /// Dispatch one turn's tool calls, in the order received.
    async fn handle_tool_calls(
        &self,
        tool_calls: &[ToolCall],
        functions: &[Arc<dyn Tool>],
        context: &ContextVariables,
    ) -> Result<DispatchOutcome> {
        let function_map: HashMap<&str, &Arc<dyn Tool>> =
            functions.iter().map(|tool| (tool.name(), tool)).collect();
        let mut outcome = DispatchOutcome::default();

        for call in tool_calls {
            let Some(tool) = function_map.get(call.name.as_str()) else {
                // One bad call must not abort the turn.
                debug!(tool = %call.name, "tool not found");
                outcome.messages.push(Message::tool(
                    format!("Error: Tool {} not found.", call.name),
                    &call.id,
                    &call.name,
                ));
                continue;
            };

            let mut arguments: serde_json::Value =
                serde_json::from_str(&call.arguments).map_err(|source| {
                    TroupeError::MalformedArguments {
                        tool: call.name.clone(),
                        arguments: call.arguments.clone(),
                        source,
                    }
                })?;

            if tool.accepts_context() {
                if let Some(object) = arguments.as_object_mut() {
                    object.insert(
                        schema::CONTEXT_VARIABLES_PARAM.to_string(),
                        context.as_value(),
                    );
                }
            }

            debug!(tool = %call.name, id = %call.id, "dispatching tool call");
            let result = tool.execute(arguments, context).await?.into_result();

            outcome
                .messages
                .push(Message::tool(result.value.clone(), &call.id, &call.name));
            outcome.context_variables.merge(result.context_variables);
            if result.agent.is_some() {
                // Last handoff processed this turn wins.
                outcome.agent = result.agent;
            }
        }

        Ok(outcome)
    }
}

fn build_request(
    agent: &Agent,
    context: &ContextVariables,
    history: &[Message],
    model_override: Option<&str>,
) -> CompletionRequest {
    CompletionRequest {
        model: model_override.unwrap_or(&agent.model).to_string(),
        instructions: agent.instructions.resolve(context),
        history: history.to_vec(),
        tools: agent
            .functions
            .iter()
            .map(|tool| ToolSchema::from_tool(tool.as_ref()))
            .collect(),
        tool_choice: agent.tool_choice,
        parallel_tool_calls: agent.parallel_tool_calls,
    }
}
