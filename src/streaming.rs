//! Streaming deltas, message reconstruction, and run events.
//!
//! The gateway's streaming side yields [`StreamDelta`]s: content fragments,
//! tool-call fragments keyed by call index, and usage. A
//! [`MessageAccumulator`] merges them back into the exact message shape the
//! non-streaming path receives, so everything downstream of message assembly
//! is shared between the two paths. [`RunStream`] is what callers consume:
//! every delta surfaces immediately, and the final event carries the same
//! [`Response`] a non-streaming run would have returned.

use std::collections::BTreeMap;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::error::{Result, TroupeError};
use crate::items::{ModelResponse, ToolCall};
use crate::result::Response;
use crate::usage::Usage;

/// One incremental piece of a streamed completion.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamDelta {
    /// A fragment of assistant content.
    Content(String),
    /// A fragment of one tool call. `index` identifies the call across
    /// chunks; `id`/`name` arrive on the first fragment, argument JSON is
    /// concatenated across fragments.
    ToolCall {
        index: usize,
        id: Option<String>,
        name: Option<String>,
        arguments: String,
    },
    /// Token usage for the call, typically the last chunk.
    Usage(Usage),
}

#[derive(Debug, Default)]
struct ToolCallDraft {
    id: String,
    name: String,
    arguments: String,
}

/// Merges [`StreamDelta`]s into one reconstructed [`ModelResponse`].
///
/// The dispatcher never sees partial JSON: argument fragments are buffered
/// here, keyed by call index, and only the finalized message is handed to
/// the turn-completion code.
#[derive(Debug, Default)]
pub struct MessageAccumulator {
    content: String,
    saw_content: bool,
    calls: BTreeMap<usize, ToolCallDraft>,
    usage: Usage,
}

impl MessageAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, delta: &StreamDelta) {
        match delta {
            StreamDelta::Content(fragment) => {
                self.saw_content = true;
                self.content.push_str(fragment);
            }
            StreamDelta::ToolCall {
                index,
                id,
                name,
                arguments,
            } => {
                let draft = self.calls.entry(*index).or_default();
                if let Some(id) = id {
                    draft.id.push_str(id);
                }
                if let Some(name) = name {
                    draft.name.push_str(name);
                }
                draft.arguments.push_str(arguments);
            }
            StreamDelta::Usage(usage) => {
                self.usage.add_usage(usage);
            }
        }
    }

    /// Finalize into the message shape the non-streaming path produces,
    /// plus the accumulated usage.
    pub fn finish(self) -> (ModelResponse, Usage) {
        let tool_calls = self
            .calls
            .into_values()
            .map(|draft| ToolCall {
                id: draft.id,
                name: draft.name,
                arguments: draft.arguments,
            })
            .collect();
        let response = ModelResponse {
            content: self.saw_content.then_some(self.content),
            tool_calls,
        };
        (response, self.usage)
    }
}

/// Events surfaced to the caller of a streaming run.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// A model call is starting for the named agent.
    TurnStart { agent: String },
    /// A delta, forwarded as received from the gateway.
    Delta(StreamDelta),
    /// The model call for this turn finished.
    TurnEnd,
    /// Terminal event: the run's [`Response`].
    Completed(Response),
}

/// The event stream returned by a streaming run.
pub struct RunStream {
    events: UnboundedReceiverStream<Result<StreamEvent>>,
}

impl RunStream {
    pub(crate) fn new(receiver: UnboundedReceiver<Result<StreamEvent>>) -> Self {
        Self {
            events: UnboundedReceiverStream::new(receiver),
        }
    }

    /// Next event, or `None` once the stream is exhausted.
    pub async fn next_event(&mut self) -> Option<Result<StreamEvent>> {
        self.events.next().await
    }

    /// Drain the stream and return the final [`Response`].
    pub async fn collect(mut self) -> Result<Response> {
        while let Some(event) = self.next_event().await {
            if let StreamEvent::Completed(response) = event? {
                return Ok(response);
            }
        }
        Err(TroupeError::Other(
            "run stream ended without a final response".to_string(),
        ))
    }
}

impl Stream for RunStream {
    type Item = Result<StreamEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.events).poll_next(cx)
    }
}
