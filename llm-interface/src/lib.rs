pub mod decision;
pub mod provider;
pub mod sink;
pub mod streaming;
pub mod types;

pub use decision::{search_tool, SearchDecision, SEARCH_TOOL_NAME};
pub use provider::DeepSeekProvider;
pub use sink::{BufferedSink, OutputSink, StdoutSink};
pub use types::{ChatMessage, EngineReply, FunctionCall, Role, ToolCall, ToolDefinition};

use async_trait::async_trait;
use std::sync::{Mutex, PoisonError};
use tracing::error;
use treehole_core::{CoreError, ErrorExt};

/// External language model used both to drive searching and to write the
/// final answer.
#[async_trait]
pub trait ReasoningEngine: Send + Sync {
    fn name(&self) -> &str;

    /// One non-streaming turn, optionally offering a single tool.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tool: Option<&ToolDefinition>,
    ) -> Result<EngineReply, CoreError>;

    /// Streams the answer to `sink` chunk by chunk and returns the full text.
    async fn stream(
        &self,
        messages: &[ChatMessage],
        sink: &dyn OutputSink,
    ) -> Result<String, CoreError>;
}

/// Runs a decision turn. Any failure degrades to an empty reply, which
/// callers treat as "no further tool calls".
pub async fn complete_or_empty(
    engine: &dyn ReasoningEngine,
    messages: &[ChatMessage],
    tool: Option<&ToolDefinition>,
) -> EngineReply {
    match engine.complete(messages, tool).await {
        Ok(reply) => reply,
        Err(e) => {
            error!("{} decision call failed", engine.name());
            e.log_error();
            EngineReply::default()
        }
    }
}

/// Passes chunks through to `inner` while keeping a copy.
struct TeeSink<'a> {
    inner: &'a dyn OutputSink,
    seen: Mutex<String>,
}

impl<'a> TeeSink<'a> {
    fn new(inner: &'a dyn OutputSink) -> Self {
        Self {
            inner,
            seen: Mutex::new(String::new()),
        }
    }

    fn into_seen(self) -> String {
        self.seen
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl OutputSink for TeeSink<'_> {
    fn emit(&self, chunk: &str) {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_str(chunk);
        self.inner.emit(chunk);
    }

    fn finish(&self) {
        self.inner.finish();
    }
}

/// Streams the final answer. A failed call appends an apology carrying the
/// error text to whatever was already streamed; the returned text always
/// equals what the sink received.
pub async fn answer_or_apologize(
    engine: &dyn ReasoningEngine,
    messages: &[ChatMessage],
    sink: &dyn OutputSink,
) -> String {
    let tee = TeeSink::new(sink);
    match engine.stream(messages, &tee).await {
        Ok(answer) => answer,
        Err(e) => {
            error!("调用 {} 时出错: {}", engine.name(), e);
            let apology = format!("抱歉，调用 {} 时出错: {}", engine.name(), e);
            sink.emit(&apology);
            sink.finish();

            let mut answer = tee.into_seen();
            answer.push_str(&apology);
            answer
        }
    }
}
