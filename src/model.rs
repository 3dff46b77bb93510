//! Completion gateway abstraction.
//!
//! Wraps the chat-completion API behind [`CompletionGateway`] so the runner
//! never talks to a provider SDK directly. [`OpenAIGateway`] is the
//! production implementation on async-openai; [`MockGateway`] replays
//! scripted responses (with configurable re-chunking on the streaming side)
//! and is public so hosts can test their own agents against it. No retry or
//! backoff lives here: gateway failures surface to the caller.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Mutex;

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestToolMessageArgs,
        ChatCompletionRequestUserMessageArgs, ChatCompletionStreamOptions, ChatCompletionTool,
        ChatCompletionToolArgs, ChatCompletionToolChoiceOption, ChatCompletionToolType,
        CreateChatCompletionRequestArgs, CreateChatCompletionStreamResponse, FunctionObjectArgs,
    },
    Client,
};
use async_trait::async_trait;
use futures::{stream, Stream, StreamExt};

use crate::agent::ToolChoice;
use crate::error::{Result, TroupeError};
use crate::items::{Message, ModelResponse, Role, ToolCall};
use crate::schema::ToolSchema;
use crate::streaming::StreamDelta;
use crate::usage::Usage;

/// One completion call: the active agent's resolved instructions, the full
/// history, and the advertised (already context-stripped) tool schemas.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub instructions: String,
    pub history: Vec<Message>,
    pub tools: Vec<ToolSchema>,
    pub tool_choice: ToolChoice,
    pub parallel_tool_calls: bool,
}

/// Boxed stream of completion deltas.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<StreamDelta>> + Send>>;

/// Boundary to the LLM completion API.
#[async_trait]
pub trait CompletionGateway: Send + Sync {
    /// Blocking variant: one full assistant message.
    async fn complete(&self, request: CompletionRequest) -> Result<(ModelResponse, Usage)>;

    /// Streaming variant: incremental deltas for the same call.
    async fn complete_stream(&self, request: CompletionRequest) -> Result<DeltaStream>;
}

/// Production gateway backed by async-openai.
pub struct OpenAIGateway {
    client: Client<OpenAIConfig>,
}

impl Default for OpenAIGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenAIGateway {
    /// Client configured from the environment (`OPENAI_API_KEY`).
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    pub fn with_client(client: Client<OpenAIConfig>) -> Self {
        Self { client }
    }

    fn convert_message(message: &Message) -> ChatCompletionRequestMessage {
        let content = message.content.clone().unwrap_or_default();
        match message.role {
            Role::System => ChatCompletionRequestSystemMessageArgs::default()
                .content(content)
                .build()
                .unwrap()
                .into(),
            Role::User => ChatCompletionRequestUserMessageArgs::default()
                .content(content)
                .build()
                .unwrap()
                .into(),
            Role::Assistant => {
                let mut builder = ChatCompletionRequestAssistantMessageArgs::default();
                if let Some(text) = &message.content {
                    builder.content(text.clone());
                }
                if let Some(tool_calls) = &message.tool_calls {
                    let calls: Vec<_> = tool_calls
                        .iter()
                        .map(|tc| async_openai::types::ChatCompletionMessageToolCall {
                            id: tc.id.clone(),
                            r#type: ChatCompletionToolType::Function,
                            function: async_openai::types::FunctionCall {
                                name: tc.name.clone(),
                                arguments: tc.arguments.clone(),
                            },
                        })
                        .collect();
                    builder.tool_calls(calls);
                }
                builder.build().unwrap().into()
            }
            Role::Tool => ChatCompletionRequestToolMessageArgs::default()
                .content(content)
                .tool_call_id(message.tool_call_id.clone().unwrap_or_default())
                .build()
                .unwrap()
                .into(),
        }
    }

    fn convert_tools(tools: &[ToolSchema]) -> Vec<ChatCompletionTool> {
        tools
            .iter()
            .map(|tool| {
                ChatCompletionToolArgs::default()
                    .r#type(ChatCompletionToolType::Function)
                    .function(
                        FunctionObjectArgs::default()
                            .name(tool.name.as_str())
                            .description(tool.description.as_str())
                            .parameters(tool.parameters.clone())
                            .build()
                            .unwrap(),
                    )
                    .build()
                    .unwrap()
            })
            .collect()
    }

    fn build_request(
        request: &CompletionRequest,
        stream: bool,
    ) -> Result<async_openai::types::CreateChatCompletionRequest> {
        let mut messages = vec![ChatCompletionRequestSystemMessageArgs::default()
            .content(request.instructions.clone())
            .build()
            .unwrap()
            .into()];
        messages.extend(request.history.iter().map(Self::convert_message));

        let mut builder = CreateChatCompletionRequestArgs::default();
        builder.model(&request.model).messages(messages);
        if !request.tools.is_empty() {
            builder.tools(Self::convert_tools(&request.tools));
            builder.tool_choice(match request.tool_choice {
                ToolChoice::Auto => ChatCompletionToolChoiceOption::Auto,
                ToolChoice::Required => ChatCompletionToolChoiceOption::Required,
                ToolChoice::None => ChatCompletionToolChoiceOption::None,
            });
            builder.parallel_tool_calls(request.parallel_tool_calls);
        }
        if stream {
            builder.stream(true);
            builder.stream_options(ChatCompletionStreamOptions {
                include_usage: true,
            });
        }
        Ok(builder.build()?)
    }

    fn convert_chunk(
        chunk: std::result::Result<CreateChatCompletionStreamResponse, async_openai::error::OpenAIError>,
    ) -> Vec<Result<StreamDelta>> {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => return vec![Err(e.into())],
        };
        let mut deltas = Vec::new();
        if let Some(usage) = &chunk.usage {
            deltas.push(Ok(StreamDelta::Usage(Usage::new(
                usage.prompt_tokens as usize,
                usage.completion_tokens as usize,
            ))));
        }
        if let Some(choice) = chunk.choices.into_iter().next() {
            if let Some(content) = choice.delta.content {
                deltas.push(Ok(StreamDelta::Content(content)));
            }
            if let Some(tool_calls) = choice.delta.tool_calls {
                for tc in tool_calls {
                    let (name, arguments) = match tc.function {
                        Some(f) => (f.name, f.arguments.unwrap_or_default()),
                        None => (None, String::new()),
                    };
                    deltas.push(Ok(StreamDelta::ToolCall {
                        index: tc.index as usize,
                        id: tc.id,
                        name,
                        arguments,
                    }));
                }
            }
        }
        deltas
    }
}

#[async_trait]
impl CompletionGateway for OpenAIGateway {
    async fn complete(&self, request: CompletionRequest) -> Result<(ModelResponse, Usage)> {
        let response = self
            .client
            .chat()
            .create(Self::build_request(&request, false)?)
            .await?;

        let choice = response.choices.into_iter().next().ok_or_else(|| {
            TroupeError::MalformedCompletion("completion contained no choices".to_string())
        })?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolCall {
                id: tc.id,
                name: tc.function.name,
                arguments: tc.function.arguments,
            })
            .collect();

        let usage = response
            .usage
            .map(|u| Usage::new(u.prompt_tokens as usize, u.completion_tokens as usize))
            .unwrap_or_default();

        Ok((
            ModelResponse {
                content: choice.message.content,
                tool_calls,
            },
            usage,
        ))
    }

    async fn complete_stream(&self, request: CompletionRequest) -> Result<DeltaStream> {
        let stream = self
            .client
            .chat()
            .create_stream(Self::build_request(&request, true)?)
            .await?;
        Ok(Box::pin(
            stream.flat_map(|chunk| stream::iter(Self::convert_chunk(chunk))),
        ))
    }
}

/// Scripted gateway for tests and offline development.
///
/// Responses are replayed in order; the streaming side re-chunks content and
/// tool-call arguments into pieces of `chunk_size` characters, so the same
/// script can exercise both execution paths.
pub struct MockGateway {
    responses: Mutex<VecDeque<ModelResponse>>,
    requests: Mutex<Vec<CompletionRequest>>,
    chunk_size: usize,
    call_usage: Usage,
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            chunk_size: 3,
            call_usage: Usage::new(10, 5),
        }
    }

    pub fn with_response(self, response: ModelResponse) -> Self {
        self.responses.lock().unwrap().push_back(response);
        self
    }

    pub fn with_message(self, content: impl Into<String>) -> Self {
        self.with_response(ModelResponse::new_message(content))
    }

    pub fn with_tool_call(self, name: impl Into<String>, arguments: serde_json::Value) -> Self {
        self.with_response(ModelResponse::new_tool_calls(vec![ToolCall::new(
            name,
            arguments.to_string(),
        )]))
    }

    /// Streaming chunk size in characters (minimum 1).
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Every [`CompletionRequest`] this gateway has received, in order.
    pub fn recorded_requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn next_response(&self) -> ModelResponse {
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| ModelResponse::new_message("Default response"))
    }

    fn chunk_string(text: &str, size: usize) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        chars
            .chunks(size)
            .map(|piece| piece.iter().collect())
            .collect()
    }
}

#[async_trait]
impl CompletionGateway for MockGateway {
    async fn complete(&self, request: CompletionRequest) -> Result<(ModelResponse, Usage)> {
        self.requests.lock().unwrap().push(request);
        Ok((self.next_response(), self.call_usage.clone()))
    }

    async fn complete_stream(&self, request: CompletionRequest) -> Result<DeltaStream> {
        self.requests.lock().unwrap().push(request);
        let response = self.next_response();

        let mut deltas = Vec::new();
        if let Some(content) = &response.content {
            for piece in Self::chunk_string(content, self.chunk_size) {
                deltas.push(Ok(StreamDelta::Content(piece)));
            }
        }
        for (index, call) in response.tool_calls.iter().enumerate() {
            deltas.push(Ok(StreamDelta::ToolCall {
                index,
                id: Some(call.id.clone()),
                name: Some(call.name.clone()),
                arguments: String::new(),
            }));
            for piece in Self::chunk_string(&call.arguments, self.chunk_size) {
                deltas.push(Ok(StreamDelta::ToolCall {
                    index,
                    id: None,
                    name: None,
                    arguments: piece,
                }));
            }
        }
        deltas.push(Ok(StreamDelta::Usage(self.call_usage.clone())));

        Ok(Box::pin(stream::iter(deltas)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::MessageAccumulator;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn request() -> CompletionRequest {
        CompletionRequest {
            model: "test-model".to_string(),
            instructions: "Be terse.".to_string(),
            history: vec![Message::user("hi")],
            tools: vec![],
            tool_choice: ToolChoice::Auto,
            parallel_tool_calls: true,
        }
    }

    #[tokio::test]
    async fn test_mock_replays_in_order() {
        let gateway = MockGateway::new()
            .with_message("first")
            .with_message("second");

        let (r1, usage) = gateway.complete(request()).await.unwrap();
        assert_eq!(r1.content.as_deref(), Some("first"));
        assert_eq!(usage.request_count, 1);

        let (r2, _) = gateway.complete(request()).await.unwrap();
        assert_eq!(r2.content.as_deref(), Some("second"));

        // Queue exhausted: fall back to the default message, like a model
        // that always has something to say.
        let (r3, _) = gateway.complete(request()).await.unwrap();
        assert_eq!(r3.content.as_deref(), Some("Default response"));
    }

    #[tokio::test]
    async fn test_mock_records_requests() {
        let gateway = MockGateway::new().with_message("ok");
        gateway.complete(request()).await.unwrap();
        let recorded = gateway.recorded_requests();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].instructions, "Be terse.");
    }

    #[tokio::test]
    async fn test_mock_stream_reconstructs_to_same_message() {
        let scripted = ModelResponse::new_tool_calls(vec![ToolCall::new(
            "lookup",
            json!({"id": 12345}).to_string(),
        )]);
        let gateway = MockGateway::new()
            .with_response(scripted.clone())
            .with_chunk_size(2);

        let mut stream = gateway.complete_stream(request()).await.unwrap();
        let mut acc = MessageAccumulator::new();
        let mut fragments = 0;
        while let Some(delta) = stream.next().await {
            acc.apply(&delta.unwrap());
            fragments += 1;
        }
        // Arguments were genuinely split across several fragments.
        assert!(fragments > 3);

        let (rebuilt, usage) = acc.finish();
        assert_eq!(rebuilt, scripted);
        assert_eq!(usage, Usage::new(10, 5));
    }

    #[test]
    fn test_openai_request_shape() {
        let mut req = request();
        req.tools.push(ToolSchema {
            name: "lookup".to_string(),
            description: "Find a record".to_string(),
            parameters: json!({"type": "object", "properties": {}}),
        });
        let built = OpenAIGateway::build_request(&req, false).unwrap();
        assert_eq!(built.model, "test-model");
        // System message from instructions plus the single user message.
        assert_eq!(built.messages.len(), 2);
        assert_eq!(built.tools.as_ref().map(Vec::len), Some(1));

        let streaming = OpenAIGateway::build_request(&req, true).unwrap();
        assert_eq!(streaming.stream, Some(true));
    }
}
