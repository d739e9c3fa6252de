//! The single `search` tool offered to the reasoning engine and decoding of
//! the engine's tool invocations into search decisions.

use serde::Deserialize;
use tracing::warn;

use crate::types::{EngineReply, ToolCall, ToolDefinition};

pub const SEARCH_TOOL_NAME: &str = "search_treehole";

pub fn search_tool() -> ToolDefinition {
    ToolDefinition {
        name: SEARCH_TOOL_NAME.to_string(),
        description: "在北大树洞中搜索相关帖子。如果当前信息不足以回答问题，可以使用不同的关键词多次调用此函数。"
            .to_string(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "keyword": {
                    "type": "string",
                    "description": "搜索关键词，精准的1-2个词，不要包含多个概念"
                },
                "reason": {
                    "type": "string",
                    "description": "为什么需要搜索这个关键词（可选）"
                }
            },
            "required": ["keyword"]
        }),
    }
}

#[derive(Debug, Deserialize)]
struct SearchArgs {
    keyword: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

/// What the engine asked for in one decision step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchDecision {
    Continue {
        call_id: String,
        keyword: String,
        reason: Option<String>,
    },
    /// The invocation could not be decoded; it is answered with an error
    /// observation and does not count as a search.
    Malformed { call_id: String, details: String },
    Finalize,
}

impl SearchDecision {
    pub fn from_tool_call(call: &ToolCall) -> Self {
        if call.name() != SEARCH_TOOL_NAME {
            return SearchDecision::Malformed {
                call_id: call.id.clone(),
                details: format!("unknown tool `{}`", call.name()),
            };
        }

        let args: SearchArgs = match serde_json::from_str(&call.function.arguments) {
            Ok(args) => args,
            Err(e) => {
                return SearchDecision::Malformed {
                    call_id: call.id.clone(),
                    details: format!("invalid arguments: {}", e),
                }
            }
        };

        match args.keyword.map(|k| k.trim().to_string()) {
            Some(keyword) if !keyword.is_empty() => SearchDecision::Continue {
                call_id: call.id.clone(),
                keyword,
                reason: args.reason.filter(|r| !r.trim().is_empty()),
            },
            _ => SearchDecision::Malformed {
                call_id: call.id.clone(),
                details: "missing keyword".to_string(),
            },
        }
    }

    /// Decodes every invocation in a reply, in order. A reply without tool
    /// calls is a single `Finalize`.
    pub fn decode_reply(reply: &EngineReply) -> Vec<SearchDecision> {
        if !reply.requests_tools() {
            return vec![SearchDecision::Finalize];
        }

        reply
            .tool_calls
            .iter()
            .map(|call| {
                let decision = Self::from_tool_call(call);
                if let SearchDecision::Malformed { details, .. } = &decision {
                    warn!(call_id = %call.id, "Skipping malformed tool call: {}", details);
                }
                decision
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(args: &str) -> ToolCall {
        ToolCall::function("call_1", SEARCH_TOOL_NAME, args)
    }

    #[test]
    fn test_decode_keyword_and_reason() {
        let decision =
            SearchDecision::from_tool_call(&call(r#"{"keyword":" 计网 ","reason":"找测评"}"#));
        assert_eq!(
            decision,
            SearchDecision::Continue {
                call_id: "call_1".to_string(),
                keyword: "计网".to_string(),
                reason: Some("找测评".to_string()),
            }
        );
    }

    #[test]
    fn test_blank_reason_is_dropped() {
        match SearchDecision::from_tool_call(&call(r#"{"keyword":"选课","reason":""}"#)) {
            SearchDecision::Continue { reason, .. } => assert!(reason.is_none()),
            other => panic!("unexpected decision: {:?}", other),
        }
    }

    #[test]
    fn test_invalid_json_is_malformed() {
        assert!(matches!(
            SearchDecision::from_tool_call(&call("{keyword:")),
            SearchDecision::Malformed { .. }
        ));
    }

    #[test]
    fn test_missing_keyword_is_malformed() {
        assert!(matches!(
            SearchDecision::from_tool_call(&call(r#"{"reason":"x"}"#)),
            SearchDecision::Malformed { .. }
        ));
        assert!(matches!(
            SearchDecision::from_tool_call(&call(r#"{"keyword":"   "}"#)),
            SearchDecision::Malformed { .. }
        ));
    }

    #[test]
    fn test_unknown_tool_is_malformed() {
        let other = ToolCall::function("call_2", "browse", r#"{"keyword":"x"}"#);
        assert!(matches!(
            SearchDecision::from_tool_call(&other),
            SearchDecision::Malformed { .. }
        ));
    }

    #[test]
    fn test_reply_without_calls_finalizes() {
        let decisions = SearchDecision::decode_reply(&EngineReply::text("done"));
        assert_eq!(decisions, vec![SearchDecision::Finalize]);

        let decisions = SearchDecision::decode_reply(&EngineReply::default());
        assert_eq!(decisions, vec![SearchDecision::Finalize]);
    }

    #[test]
    fn test_reply_preserves_call_order() {
        let reply = EngineReply::tool_calls(vec![
            ToolCall::function("a", SEARCH_TOOL_NAME, r#"{"keyword":"一"}"#),
            ToolCall::function("b", SEARCH_TOOL_NAME, "oops"),
            ToolCall::function("c", SEARCH_TOOL_NAME, r#"{"keyword":"三"}"#),
        ]);
        let decisions = SearchDecision::decode_reply(&reply);

        assert_eq!(decisions.len(), 3);
        assert!(matches!(&decisions[0], SearchDecision::Continue { keyword, .. } if keyword == "一"));
        assert!(matches!(&decisions[1], SearchDecision::Malformed { call_id, .. } if call_id == "b"));
        assert!(matches!(&decisions[2], SearchDecision::Continue { keyword, .. } if keyword == "三"));
    }

    #[test]
    fn test_search_tool_schema_requires_keyword() {
        let tool = search_tool();
        assert_eq!(tool.name, SEARCH_TOOL_NAME);
        assert_eq!(tool.parameters["required"][0], "keyword");
    }
}
