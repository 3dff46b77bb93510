//! Streaming and non-streaming runs must be behaviorally identical: same
//! scripted gateway output, byte-identical final responses, regardless of
//! how the stream was chunked.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;
use troupe::{
    tool_typed, Agent, Message, MockGateway, ModelResponse, RunConfig, Runner, StreamDelta,
    StreamEvent, ToolCall,
};

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
struct NoArgs {}

/// A two-turn script: a tool call with non-trivial arguments, then a final
/// answer. Built once so both gateways replay identical call ids.
fn script() -> Vec<ModelResponse> {
    vec![
        ModelResponse::new_tool_calls(vec![ToolCall::new(
            "escalate",
            json!({"reason": "billing question"}).to_string(),
        )]),
        ModelResponse::new_message("Hello from B"),
    ]
}

fn triage_agent() -> Agent {
    let agent_b = Agent::new("B", "You are agent B.");
    let escalate = tool_typed("escalate", "Escalate to B", {
        move |_: NoArgs| Ok(agent_b.clone())
    });
    Agent::new("A", "You are agent A.").with_tool(Arc::new(escalate))
}

#[tokio::test]
async fn streaming_matches_non_streaming_under_arbitrary_chunking() {
    let agent = triage_agent();
    let history = vec![Message::user("help")];

    // One script, replayed verbatim by every gateway so call ids line up.
    let responses = script();

    let mut gateway_plain = MockGateway::new();
    for response in responses.clone() {
        gateway_plain = gateway_plain.with_response(response);
    }
    let plain = Runner::new(Arc::new(gateway_plain))
        .run(&agent, &history, RunConfig::default())
        .await
        .unwrap();

    for chunk_size in [1, 2, 7, 64] {
        let mut gateway_stream = MockGateway::new().with_chunk_size(chunk_size);
        for response in responses.clone() {
            gateway_stream = gateway_stream.with_response(response);
        }
        let streamed = Runner::new(Arc::new(gateway_stream))
            .run_stream(&agent, &history, RunConfig::default())
            .collect()
            .await
            .unwrap();

        assert_eq!(streamed.messages, plain.messages, "chunk_size={chunk_size}");
        assert_eq!(streamed.context_variables, plain.context_variables);
        assert_eq!(streamed.usage, plain.usage);
        assert_eq!(
            streamed.agent.as_ref().map(|a| a.name.as_str()),
            plain.agent.as_ref().map(|a| a.name.as_str())
        );
    }
}

#[tokio::test]
async fn stream_surfaces_turn_markers_and_fragments_in_order() {
    let agent = triage_agent();
    let mut gateway = MockGateway::new().with_chunk_size(2);
    for response in script() {
        gateway = gateway.with_response(response);
    }

    let mut stream = Runner::new(Arc::new(gateway)).run_stream(
        &agent,
        &[Message::user("help")],
        RunConfig::default(),
    );

    let mut events = Vec::new();
    while let Some(event) = stream.next_event().await {
        events.push(event.unwrap());
    }

    // First turn starts as A; a handoff turn follows as B.
    let starts: Vec<String> = events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::TurnStart { agent } => Some(agent.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(starts, vec!["A".to_string(), "B".to_string()]);

    // Argument JSON arrived in several fragments, none of which reached the
    // dispatcher unparsed (the run completed).
    let arg_fragments = events
        .iter()
        .filter(|e| {
            matches!(
                e,
                StreamEvent::Delta(StreamDelta::ToolCall { arguments, .. })
                    if !arguments.is_empty()
            )
        })
        .count();
    assert!(arg_fragments > 1);

    // Terminal event carries the response.
    match events.last().unwrap() {
        StreamEvent::Completed(response) => {
            assert_eq!(response.agent.as_ref().unwrap().name, "B");
            assert_eq!(response.last_content(), Some("Hello from B"));
        }
        other => panic!("expected Completed, got {other:?}"),
    }
}

#[tokio::test]
async fn stream_reports_gateway_content_immediately() {
    let gateway = MockGateway::new()
        .with_chunk_size(4)
        .with_message("streamed reply");
    let agent = Agent::new("Solo", "Answer.");

    let mut stream = Runner::new(Arc::new(gateway)).run_stream(
        &agent,
        &[Message::user("hi")],
        RunConfig::default(),
    );

    let mut content = String::new();
    while let Some(event) = stream.next_event().await {
        if let StreamEvent::Delta(StreamDelta::Content(piece)) = event.unwrap() {
            content.push_str(&piece);
        }
    }
    assert_eq!(content, "streamed reply");
}
