//! SSE parser for streamed chat completions.
//!
//! Turns a raw byte stream into text deltas. Lines are split on raw bytes
//! before UTF-8 decoding so multi-byte characters cut across network chunks
//! survive intact.

use bytes::Bytes;
use futures::stream::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::debug;
use treehole_core::LlmError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamChunk {
    pub delta: String,
    pub done: bool,
}

#[derive(Debug, serde::Deserialize)]
struct StreamChunkRaw {
    #[serde(default)]
    choices: Vec<StreamChoiceRaw>,
}

#[derive(Debug, serde::Deserialize)]
struct StreamChoiceRaw {
    #[serde(default)]
    delta: Option<DeltaRaw>,
}

#[derive(Debug, serde::Deserialize)]
struct DeltaRaw {
    #[serde(default)]
    content: Option<String>,
}

pub struct ChatCompletionStream<E> {
    inner: Pin<Box<dyn Stream<Item = Result<Bytes, E>> + Send>>,
    buffer: Vec<u8>,
}

impl<E> ChatCompletionStream<E> {
    pub fn new(byte_stream: impl Stream<Item = Result<Bytes, E>> + Send + 'static) -> Self {
        Self {
            inner: Box::pin(byte_stream),
            buffer: Vec::new(),
        }
    }
}

impl<E: std::fmt::Display> Stream for ChatCompletionStream<E> {
    type Item = Result<StreamChunk, LlmError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if let Some(chunk) = try_parse_line(&mut this.buffer, false) {
                return Poll::Ready(Some(chunk));
            }

            match this.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => this.buffer.extend_from_slice(&bytes),
                Poll::Ready(Some(Err(e))) => {
                    return Poll::Ready(Some(Err(LlmError::StreamInterrupted {
                        reason: e.to_string(),
                    })));
                }
                Poll::Ready(None) => {
                    // Trailing line without a newline
                    return Poll::Ready(try_parse_line(&mut this.buffer, true));
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Extracts the next meaningful SSE event from the buffer. With `flush` set,
/// an unterminated trailing line is consumed as well.
fn try_parse_line(buffer: &mut Vec<u8>, flush: bool) -> Option<Result<StreamChunk, LlmError>> {
    loop {
        let line_bytes: Vec<u8> = match buffer.iter().position(|b| *b == b'\n') {
            Some(pos) => buffer.drain(..=pos).collect(),
            None if flush && !buffer.is_empty() => std::mem::take(buffer),
            None => return None,
        };

        let line = match std::str::from_utf8(&line_bytes) {
            Ok(line) => line.trim(),
            Err(e) => {
                return Some(Err(LlmError::StreamInterrupted {
                    reason: format!("Invalid UTF-8 in stream: {}", e),
                }))
            }
        };

        // Blank separators and non-data fields (event:, id:, retry:)
        let Some(data) = line.strip_prefix("data:") else {
            continue;
        };
        let data = data.trim();

        if data == "[DONE]" {
            return Some(Ok(StreamChunk {
                delta: String::new(),
                done: true,
            }));
        }

        match serde_json::from_str::<StreamChunkRaw>(data) {
            Ok(raw) => {
                let delta = raw
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|c| c.delta)
                    .and_then(|d| d.content)
                    .unwrap_or_default();
                return Some(Ok(StreamChunk { delta, done: false }));
            }
            Err(e) => {
                debug!(
                    "Skipping undecodable stream chunk: {} (data: {})",
                    e,
                    data.chars().take(200).collect::<String>()
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn byte_stream(parts: Vec<Vec<u8>>) -> impl Stream<Item = Result<Bytes, String>> + Send {
        futures::stream::iter(parts.into_iter().map(|p| Ok(Bytes::from(p))))
    }

    fn lines(lines: &[&str]) -> Vec<Vec<u8>> {
        lines
            .iter()
            .map(|line| format!("{}\n", line).into_bytes())
            .collect()
    }

    #[tokio::test]
    async fn test_parse_multiple_tokens() {
        let data = lines(&[
            r#"data: {"choices":[{"delta":{"content":"你好"}}]}"#,
            "",
            r#"data: {"choices":[{"delta":{"content":"，世界"}}]}"#,
            "",
            "data: [DONE]",
        ]);
        let mut stream = ChatCompletionStream::new(byte_stream(data));

        assert_eq!(stream.next().await.unwrap().unwrap().delta, "你好");
        assert_eq!(stream.next().await.unwrap().unwrap().delta, "，世界");
        assert!(stream.next().await.unwrap().unwrap().done);
    }

    #[tokio::test]
    async fn test_multibyte_char_split_across_chunks() {
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"树洞\"}}]}\n".as_bytes();
        let split = line.iter().position(|b| *b >= 0x80).unwrap() + 1;
        let parts = vec![line[..split].to_vec(), line[split..].to_vec()];
        let mut stream = ChatCompletionStream::new(byte_stream(parts));

        assert_eq!(stream.next().await.unwrap().unwrap().delta, "树洞");
    }

    #[tokio::test]
    async fn test_bad_json_and_other_fields_are_skipped() {
        let data = lines(&[
            "event: message",
            "data: {not json",
            r#"data: {"choices":[{"delta":{"content":"ok"}}]}"#,
        ]);
        let mut stream = ChatCompletionStream::new(byte_stream(data));

        assert_eq!(stream.next().await.unwrap().unwrap().delta, "ok");
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_empty_delta() {
        let data = lines(&[r#"data: {"choices":[{"delta":{}}]}"#, "data: [DONE]"]);
        let mut stream = ChatCompletionStream::new(byte_stream(data));

        assert_eq!(stream.next().await.unwrap().unwrap().delta, "");
    }

    #[tokio::test]
    async fn test_unterminated_final_line() {
        let parts = vec![b"data: [DONE]".to_vec()];
        let mut stream = ChatCompletionStream::new(byte_stream(parts));

        assert!(stream.next().await.unwrap().unwrap().done);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_transport_error_interrupts() {
        let parts: Vec<Result<Bytes, String>> = vec![Err("connection reset".to_string())];
        let mut stream = ChatCompletionStream::new(futures::stream::iter(parts));

        match stream.next().await.unwrap() {
            Err(LlmError::StreamInterrupted { reason }) => assert!(reason.contains("reset")),
            other => panic!("unexpected item: {:?}", other),
        }
    }
}
