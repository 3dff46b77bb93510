//! End-to-end runs against a scripted gateway: termination, handoffs,
//! turn budgets, and context threading.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;
use troupe::{
    tool_typed, Agent, ContextVariables, Instructions, Message, MockGateway, Role, RunConfig,
    Runner, ToolResult,
};

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
struct NoArgs {}

fn runner_with(gateway: MockGateway) -> (Runner, Arc<MockGateway>) {
    let gateway = Arc::new(gateway);
    (Runner::new(gateway.clone()), gateway)
}

#[tokio::test]
async fn plain_reply_terminates_after_one_turn() {
    let (runner, gateway) = runner_with(MockGateway::new().with_message("Hello!"));
    let agent = Agent::new("Solo", "Answer directly.");

    let response = runner
        .run(&agent, &[Message::user("hi")], RunConfig::default())
        .await
        .unwrap();

    assert_eq!(response.agent.as_ref().unwrap().name, "Solo");
    assert_eq!(response.messages.len(), 1);
    assert_eq!(response.last_content(), Some("Hello!"));
    assert_eq!(gateway.recorded_requests().len(), 1);
}

#[tokio::test]
async fn escalation_hands_off_and_finishes_as_target() {
    let agent_b = Agent::new("B", "You are agent B.");
    let escalate = tool_typed("escalate", "Escalate to B", {
        let agent_b = agent_b.clone();
        move |_: NoArgs| Ok(agent_b.clone())
    });
    let agent_a = Agent::new("A", "You are agent A.").with_tool(Arc::new(escalate));

    let (runner, _) = runner_with(
        MockGateway::new()
            .with_tool_call("escalate", json!({}))
            .with_message("Hello from B"),
    );

    let response = runner
        .run(&agent_a, &[Message::user("help")], RunConfig::default())
        .await
        .unwrap();

    assert_eq!(response.agent.as_ref().unwrap().name, "B");
    assert_eq!(response.last_content(), Some("Hello from B"));

    // Exactly: assistant-with-toolcall, tool-result, assistant-final.
    assert_eq!(response.messages.len(), 3);
    assert_eq!(response.messages[0].role, Role::Assistant);
    assert!(response.messages[0].tool_calls.is_some());
    assert_eq!(response.messages[1].role, Role::Tool);
    assert!(response.messages[1].content.as_deref().unwrap().contains("B"));
    assert_eq!(response.messages[2].role, Role::Assistant);
    assert_eq!(response.messages[2].sender.as_deref(), Some("B"));

    // Tool message correlates back to the triggering call.
    let call_id = &response.messages[0].tool_calls.as_ref().unwrap()[0].id;
    assert_eq!(response.messages[1].tool_call_id.as_ref(), Some(call_id));
}

#[tokio::test]
async fn max_turns_bounds_a_handoff_loop() {
    // A tool that keeps handing off; without a budget this would loop as long
    // as the scripted model keeps calling it.
    let ping = tool_typed("ping", "Bounce to the loop agent", |_: NoArgs| {
        Ok(Agent::new("Loop", "Keep going."))
    });
    let agent = Agent::new("Loop", "Keep going.").with_tool(Arc::new(ping));

    let (runner, gateway) = runner_with(
        MockGateway::new()
            .with_tool_call("ping", json!({}))
            .with_tool_call("ping", json!({}))
            .with_tool_call("ping", json!({})),
    );

    let response = runner
        .run(
            &agent,
            &[Message::user("go")],
            RunConfig::default().with_max_turns(1),
        )
        .await
        .unwrap();

    // One orchestrator iteration only, non-null final agent, no error.
    assert_eq!(gateway.recorded_requests().len(), 1);
    assert_eq!(response.messages.len(), 2);
    assert_eq!(response.agent.unwrap().name, "Loop");
}

#[tokio::test]
async fn context_update_reaches_the_next_agents_instructions() {
    let agent_b = Agent::new(
        "Accounts",
        Instructions::dynamic(|ctx| {
            format!(
                "Help user {}.",
                ctx.get("user_id").map(|v| v.to_string()).unwrap_or_default()
            )
        }),
    );
    let identify = tool_typed("identify", "Identify the user", {
        let agent_b = agent_b.clone();
        move |_: NoArgs| {
            Ok(ToolResult::value("identified")
                .with_context("user_id", 42)
                .with_agent(agent_b.clone()))
        }
    });
    let agent_a = Agent::new("Door", "Identify first.").with_tool(Arc::new(identify));

    let (runner, gateway) = runner_with(
        MockGateway::new()
            .with_tool_call("identify", json!({}))
            .with_message("Welcome back."),
    );

    let response = runner
        .run(&agent_a, &[Message::user("hi")], RunConfig::default())
        .await
        .unwrap();

    assert_eq!(response.context_variables.get("user_id"), Some(&json!(42)));

    // The handed-off agent's instruction function saw the merged context.
    let requests = gateway.recorded_requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].instructions, "Help user 42.");
}

#[tokio::test]
async fn caller_history_is_returned_as_delta_only() {
    let history = vec![
        Message::user("first"),
        Message::assistant("earlier answer"),
        Message::user("second"),
    ];
    let (runner, gateway) = runner_with(MockGateway::new().with_message("fresh answer"));
    let agent = Agent::new("Solo", "Answer.");

    let response = runner
        .run(&agent, &history, RunConfig::default())
        .await
        .unwrap();

    // Only the appended message comes back; the gateway saw the full history.
    assert_eq!(response.messages.len(), 1);
    assert_eq!(response.last_content(), Some("fresh answer"));
    assert_eq!(gateway.recorded_requests()[0].history.len(), 3);
    assert_eq!(history.len(), 3);
}

#[tokio::test]
async fn seed_context_is_not_mutated_in_place() {
    let seed = ContextVariables::new().with("count", 1);
    let bump = tool_typed_noargs_bump();
    let agent = Agent::new("Counter", "Count.").with_tool(Arc::new(bump));

    let (runner, _) = runner_with(MockGateway::new().with_tool_call("bump", json!({})));

    let response = runner
        .run(
            &agent,
            &[Message::user("go")],
            RunConfig::default().with_context_variables(seed.clone()),
        )
        .await
        .unwrap();

    assert_eq!(response.context_variables.get("count"), Some(&json!(2)));
    // The caller's map still holds the original value.
    assert_eq!(seed.get("count"), Some(&json!(1)));
}

fn tool_typed_noargs_bump() -> troupe::FunctionTool {
    troupe::tool_typed_ctx("bump", "Increment the counter", |_: NoArgs, ctx| {
        let current = ctx.get("count").and_then(|v| v.as_u64()).unwrap_or(0);
        Ok(ToolResult::value("bumped").with_context("count", current + 1))
    })
}
