//! Normalized tool results and the run-level response.

use serde_json::json;

use crate::agent::Agent;
use crate::context::ContextVariables;
use crate::items::Message;
use crate::usage::Usage;

/// The normalized form of anything a tool may return: a string value for the
/// model, an optional next agent, and a context-variable delta.
#[derive(Debug, Clone, Default)]
pub struct ToolResult {
    pub value: String,
    pub agent: Option<Agent>,
    pub context_variables: ContextVariables,
}

impl ToolResult {
    /// A value-only result.
    pub fn value(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            ..Self::default()
        }
    }

    /// A handoff result; the value records the target so the model can see
    /// where the conversation went.
    pub fn handoff(agent: Agent) -> Self {
        Self {
            value: json!({ "agent": agent.name }).to_string(),
            agent: Some(agent),
            context_variables: ContextVariables::new(),
        }
    }

    pub fn with_agent(mut self, agent: Agent) -> Self {
        self.agent = Some(agent);
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.context_variables.insert(key, value);
        self
    }

    pub fn with_context_variables(mut self, context_variables: ContextVariables) -> Self {
        self.context_variables = context_variables;
        self
    }
}

/// The outcome of a run.
///
/// `messages` holds only the messages appended during the run (callers that
/// keep their own transcript concatenate it themselves), `agent` is the agent
/// active at termination, and `context_variables` is the final merged map.
/// While a run is in flight the same shape is passed to post-turn hooks, with
/// `agent` carrying the candidate next agent (`None` when no handoff is
/// pending).
#[derive(Debug, Clone, Default)]
pub struct Response {
    pub messages: Vec<Message>,
    pub agent: Option<Agent>,
    pub context_variables: ContextVariables,
    pub usage: Usage,
}

impl Response {
    /// Content of the last appended message, if any.
    pub fn last_content(&self) -> Option<&str> {
        self.messages.last().and_then(|m| m.content.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_value_result() {
        let result = ToolResult::value("ok");
        assert_eq!(result.value, "ok");
        assert!(result.agent.is_none());
        assert!(result.context_variables.is_empty());
    }

    #[test]
    fn test_handoff_result_records_target_name() {
        let result = ToolResult::handoff(Agent::new("Refunds", "Process refunds"));
        assert!(result.value.contains("Refunds"));
        assert_eq!(result.agent.unwrap().name, "Refunds");
    }

    #[test]
    fn test_with_context_builder() {
        let result = ToolResult::value("done").with_context("user_id", 42);
        assert_eq!(
            result.context_variables.get("user_id"),
            Some(&serde_json::json!(42))
        );
    }

    #[test]
    fn test_response_last_content() {
        let response = Response {
            messages: vec![Message::user("hi"), Message::assistant("hello")],
            ..Response::default()
        };
        assert_eq!(response.last_content(), Some("hello"));
    }
}
