//! Agent registry and registry-resolved handoffs.
//!
//! Agents that hand off to each other form reference cycles (A's tool
//! returns B, B's tool returns A). The registry breaks the cycle: handoff
//! tools capture a target *name* and resolve it through a shared
//! [`AgentRegistry`] at call time, so agents hold no owning references to
//! each other.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde_json::json;

use crate::agent::Agent;
use crate::error::TroupeError;
use crate::tool::{FunctionTool, ToolReturn};

/// Name-keyed collection of agents, owned by the host application.
#[derive(Default)]
pub struct AgentRegistry {
    agents: RwLock<HashMap<String, Agent>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent under its name, replacing any previous entry.
    pub fn register(&self, agent: Agent) {
        self.agents
            .write()
            .unwrap()
            .insert(agent.name.clone(), agent);
    }

    /// Look up an agent by name.
    pub fn get(&self, name: &str) -> Option<Agent> {
        self.agents.read().unwrap().get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.agents.read().unwrap().keys().cloned().collect()
    }
}

/// Build a `transfer_to_<target>` tool that resolves `target` through the
/// registry when called. An unknown target at call time is an authoring bug
/// and aborts the run.
pub fn handoff_to(
    registry: &Arc<AgentRegistry>,
    target: impl Into<String>,
    description: impl Into<String>,
) -> FunctionTool {
    let target = target.into();
    let registry = Arc::clone(registry);
    FunctionTool::new(
        format!("transfer_to_{}", tool_suffix(&target)),
        description,
        json!({"type": "object", "properties": {}}),
        move |_args, _context| {
            registry
                .get(&target)
                .map(ToolReturn::Handoff)
                .ok_or_else(|| TroupeError::UnknownAgent {
                    name: target.clone(),
                })
        },
    )
}

fn tool_suffix(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}
