use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use treehole_core::{CoreError, LlmConfig, LlmError};

use crate::sink::OutputSink;
use crate::streaming::ChatCompletionStream;
use crate::types::{ChatMessage, EngineReply, ToolCall, ToolDefinition};
use crate::ReasoningEngine;

const PROVIDER: &str = "DeepSeek";

/// OpenAI-compatible chat completions client, DeepSeek by default.
#[derive(Clone)]
pub struct DeepSeekProvider {
    http_client: Client,
    api_key: String,
    api_base: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
}

#[derive(Debug, Deserialize)]
struct ChatResponseRaw {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

impl DeepSeekProvider {
    pub fn new(config: &LlmConfig) -> Result<Self, CoreError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| LlmError::InvalidApiKey {
                provider: PROVIDER.to_string(),
            })?;

        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            http_client,
            api_key,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_response_tokens,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request<'a>(
        &'a self,
        messages: &'a [ChatMessage],
        tool: Option<&ToolDefinition>,
        stream: bool,
    ) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream,
            tools: tool.map(|t| vec![t.to_openai_format()]),
            tool_choice: tool.map(|_| "auto"),
        }
    }

    async fn send(&self, request: &ChatRequest<'_>) -> Result<reqwest::Response, CoreError> {
        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.api_base))
            .header(header::AUTHORIZATION, format!("Bearer {}", self.api_key))
            .header(header::CONTENT_TYPE, "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "{} request failed", PROVIDER);
                if e.is_timeout() {
                    CoreError::Llm(LlmError::RequestTimeout {
                        provider: PROVIDER.to_string(),
                    })
                } else {
                    CoreError::Network(e)
                }
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(60);
        let body = response.text().await.unwrap_or_default();
        warn!(status = %status, error = %body, "{} API error", PROVIDER);

        Err(status_error(status, retry_after, &body).into())
    }
}

fn status_error(status: StatusCode, retry_after: u64, body: &str) -> LlmError {
    let provider = PROVIDER.to_string();
    match status {
        StatusCode::UNAUTHORIZED => LlmError::InvalidApiKey { provider },
        StatusCode::TOO_MANY_REQUESTS => LlmError::RateLimitExceeded {
            provider,
            retry_after,
        },
        StatusCode::SERVICE_UNAVAILABLE => LlmError::ServiceUnavailable { provider },
        _ => {
            let details = serde_json::from_str::<ApiErrorBody>(body)
                .map(|b| b.error.message)
                .unwrap_or_else(|_| body.to_string());
            LlmError::RequestFailed {
                provider,
                status_code: status.as_u16(),
                details,
            }
        }
    }
}

#[async_trait]
impl ReasoningEngine for DeepSeekProvider {
    fn name(&self) -> &str {
        "DeepSeek API"
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        tool: Option<&ToolDefinition>,
    ) -> Result<EngineReply, CoreError> {
        let start = Instant::now();
        let request = self.build_request(messages, tool, false);
        let response = self.send(&request).await?;

        let raw: ChatResponseRaw =
            response
                .json()
                .await
                .map_err(|e| LlmError::InvalidResponseFormat {
                    provider: PROVIDER.to_string(),
                    details: e.to_string(),
                })?;

        let message = raw
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| LlmError::InvalidResponseFormat {
                provider: PROVIDER.to_string(),
                details: "response contained no choices".to_string(),
            })?;

        debug!(
            model = %self.model,
            duration_ms = start.elapsed().as_millis(),
            tool_calls = message.tool_calls.as_ref().map_or(0, Vec::len),
            "Chat completion finished"
        );

        Ok(EngineReply {
            content: message.content,
            tool_calls: message.tool_calls.unwrap_or_default(),
        })
    }

    async fn stream(
        &self,
        messages: &[ChatMessage],
        sink: &dyn OutputSink,
    ) -> Result<String, CoreError> {
        let request = self.build_request(messages, None, true);
        let response = self.send(&request).await?;

        let mut stream = ChatCompletionStream::new(response.bytes_stream());
        let mut full_content = String::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if chunk.done {
                break;
            }
            if !chunk.delta.is_empty() {
                sink.emit(&chunk.delta);
                full_content.push_str(&chunk.delta);
            }
        }
        sink.finish();

        debug!(chars = full_content.chars().count(), "Streamed answer finished");
        Ok(full_content)
    }
}
