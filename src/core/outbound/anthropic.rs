//! Anthropic Messages outbound adapter (spec 4.6).
//!
//! The reference transformer this crate's outbound layer is otherwise
//! modeled on ships this direction as an empty stub, so this adapter is
//! built from the spec's prose and by mirroring the wire shapes already
//! reverse-engineered for [`crate::core::inbound::anthropic`] (same content
//! block vocabulary, same event grammar, opposite direction).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::outbound::{OutboundAdapter, OutboundHttpRequest};
use crate::core::types::{
    Choice, InternalContent, InternalContentPart, InternalMessage, InternalRequest,
    InternalResponse, Usage,
};
use crate::utils::error::{GatewayError, Result};

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Default)]
pub struct AnthropicOutbound {
    message_id: String,
    model: String,
    input_tokens: u32,
}

#[derive(Debug, Serialize)]
struct RequestBody {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<Vec<SystemBlock>>,
    messages: Vec<MessageOut>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ToolOut>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
struct SystemBlock {
    #[serde(rename = "type")]
    kind: &'static str,
    text: String,
}

#[derive(Debug, Serialize)]
struct MessageOut {
    role: &'static str,
    content: Vec<ContentBlockOut>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum ContentBlockOut {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image")]
    Image { source: ImageSourceOut },
    #[serde(rename = "tool_use")]
    ToolUse { id: String, name: String, input: serde_json::Value },
    #[serde(rename = "tool_result")]
    ToolResult { tool_use_id: String, content: String },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ImageSourceOut {
    Base64 { media_type: String, data: String },
    Url { url: String },
}

#[derive(Debug, Serialize)]
struct ToolOut {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    input_schema: serde_json::Value,
}

fn image_source_from_url(url: &str) -> ImageSourceOut {
    if let Some(rest) = url.strip_prefix("data:")
        && let Some((media_type, data)) = rest.split_once(";base64,")
    {
        return ImageSourceOut::Base64 { media_type: media_type.to_string(), data: data.to_string() };
    }
    ImageSourceOut::Url { url: url.to_string() }
}

fn build_content(msg: &InternalMessage) -> Vec<ContentBlockOut> {
    let mut blocks = Vec::new();
    match &msg.content {
        Some(InternalContent::Text(text)) if !text.is_empty() => {
            blocks.push(ContentBlockOut::Text { text: text.clone() });
        }
        Some(InternalContent::Text(_)) => {}
        Some(InternalContent::Parts(parts)) => {
            for part in parts {
                match part {
                    InternalContentPart::Text { text } => blocks.push(ContentBlockOut::Text { text: text.clone() }),
                    InternalContentPart::ImageUrl { url } => {
                        blocks.push(ContentBlockOut::Image { source: image_source_from_url(url) })
                    }
                }
            }
        }
        None => {}
    }
    if let Some(tool_calls) = &msg.tool_calls {
        for tc in tool_calls {
            blocks.push(ContentBlockOut::ToolUse {
                id: tc.id.clone(),
                name: tc.function.name.clone(),
                input: serde_json::from_str(&tc.function.arguments).unwrap_or(serde_json::json!({})),
            });
        }
    }
    blocks
}

/// Anthropic has no `tool` role: a tool result is a `user` message carrying
/// a `tool_result` block that references the call by id.
fn to_message_out(msg: &InternalMessage) -> MessageOut {
    if msg.role == "tool" {
        let text = match &msg.content {
            Some(InternalContent::Text(t)) => t.clone(),
            Some(InternalContent::Parts(parts)) => parts
                .iter()
                .filter_map(|p| match p {
                    InternalContentPart::Text { text } => Some(text.clone()),
                    InternalContentPart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join(""),
            None => String::new(),
        };
        return MessageOut {
            role: "user",
            content: vec![ContentBlockOut::ToolResult {
                tool_use_id: msg.tool_call_id.clone().unwrap_or_default(),
                content: text,
            }],
        };
    }
    let role = if msg.role == "assistant" { "assistant" } else { "user" };
    MessageOut { role, content: build_content(msg) }
}

#[async_trait]
impl OutboundAdapter for AnthropicOutbound {
    async fn transform_request(
        &mut self,
        request: &InternalRequest,
        base_url: &str,
        credential: &str,
    ) -> Result<OutboundHttpRequest> {
        let system: Vec<SystemBlock> = request
            .messages
            .iter()
            .filter(|m| m.role == "system")
            .filter_map(|m| match &m.content {
                Some(InternalContent::Text(t)) => Some(SystemBlock { kind: "text", text: t.clone() }),
                _ => None,
            })
            .collect();

        let messages: Vec<MessageOut> =
            request.messages.iter().filter(|m| m.role != "system").map(to_message_out).collect();

        let tools = request.tools.as_ref().map(|tools| {
            tools
                .iter()
                .map(|t| ToolOut {
                    name: t.function.name.clone(),
                    description: t.function.description.clone(),
                    input_schema: t.function.parameters.clone().unwrap_or(serde_json::json!({})),
                })
                .collect()
        });

        let body = RequestBody {
            model: request.model.clone(),
            max_tokens: request.max_tokens.unwrap_or(4096),
            temperature: request.temperature,
            top_p: request.top_p,
            stream: request.stream,
            system: if system.is_empty() { None } else { Some(system) },
            messages,
            tools,
            stop_sequences: request.stop.clone(),
        };

        let url = format!("{}/v1/messages", base_url.trim_end_matches('/'));
        Ok(OutboundHttpRequest::post(url, serde_json::to_vec(&body)?)
            .header("Content-Type", "application/json")
            .header("x-api-key", credential)
            .header("anthropic-version", ANTHROPIC_VERSION))
    }

    fn transform_response(&mut self, body: &[u8]) -> Result<InternalResponse> {
        let resp: ResponseBody =
            serde_json::from_slice(body).map_err(|e| GatewayError::upstream_unavailable(e.to_string()))?;

        let mut content_parts = Vec::new();
        let mut tool_calls = Vec::new();
        let mut reasoning_content = None;
        let mut reasoning_signature = None;
        for block in resp.content {
            match block {
                RespContentBlock::Text { text } => content_parts.push(InternalContentPart::Text { text }),
                RespContentBlock::Thinking { thinking, signature } => {
                    reasoning_content = Some(thinking);
                    reasoning_signature = signature;
                }
                RespContentBlock::ToolUse { id, name, input } => {
                    tool_calls.push(crate::core::models::openai::ToolCall {
                        id,
                        tool_type: "function".to_string(),
                        function: crate::core::models::openai::FunctionCall {
                            name,
                            arguments: input.to_string(),
                        },
                    });
                }
            }
        }

        let single_text = match content_parts.as_slice() {
            [InternalContentPart::Text { text }] => Some(text.clone()),
            _ => None,
        };
        let content = match single_text {
            Some(text) => Some(InternalContent::Text(text)),
            None if content_parts.is_empty() => None,
            None => Some(InternalContent::Parts(content_parts)),
        };

        Ok(InternalResponse {
            id: resp.id,
            object: "chat.completion".to_string(),
            created: 0,
            model: resp.model,
            choices: vec![Choice {
                index: 0,
                message: Some(InternalMessage {
                    role: "assistant".to_string(),
                    content,
                    name: None,
                    tool_calls: if tool_calls.is_empty() { None } else { Some(tool_calls) },
                    tool_call_id: None,
                    reasoning_content,
                    reasoning_signature,
                    cache_control: None,
                }),
                delta: None,
                finish_reason: resp.stop_reason.map(|r| map_stop_reason(&r)),
            }],
            usage: resp.usage.map(to_internal_usage),
        })
    }

    fn transform_stream(&mut self, event_data: &[u8]) -> Result<Option<InternalResponse>> {
        if event_data.is_empty() {
            return Ok(None);
        }
        let event: StreamEvent =
            serde_json::from_slice(event_data).map_err(|e| GatewayError::upstream_unavailable(e.to_string()))?;

        match event.event_type.as_str() {
            "message_start" => {
                if let Some(message) = event.message {
                    self.message_id = message.id;
                    self.model = message.model;
                    self.input_tokens = message.usage.input_tokens;
                }
                Ok(None)
            }
            "content_block_delta" => {
                let Some(delta) = event.delta else { return Ok(None) };
                let message = match delta.delta_type.as_deref() {
                    Some("text_delta") => InternalMessage {
                        role: "assistant".to_string(),
                        content: delta.text.map(InternalContent::Text),
                        name: None,
                        tool_calls: None,
                        tool_call_id: None,
                        reasoning_content: None,
                        reasoning_signature: None,
                        cache_control: None,
                    },
                    Some("thinking_delta") => InternalMessage {
                        role: "assistant".to_string(),
                        content: None,
                        name: None,
                        tool_calls: None,
                        tool_call_id: None,
                        reasoning_content: delta.thinking,
                        reasoning_signature: None,
                        cache_control: None,
                    },
                    Some("signature_delta") => InternalMessage {
                        role: "assistant".to_string(),
                        content: None,
                        name: None,
                        tool_calls: None,
                        tool_call_id: None,
                        reasoning_content: None,
                        reasoning_signature: delta.signature,
                        cache_control: None,
                    },
                    Some("input_json_delta") => InternalMessage {
                        role: "assistant".to_string(),
                        content: None,
                        name: None,
                        tool_calls: Some(vec![crate::core::models::openai::ToolCall {
                            id: String::new(),
                            tool_type: "function".to_string(),
                            function: crate::core::models::openai::FunctionCall {
                                name: String::new(),
                                arguments: delta.partial_json.unwrap_or_default(),
                            },
                        }]),
                        tool_call_id: None,
                        reasoning_content: None,
                        reasoning_signature: None,
                        cache_control: None,
                    },
                    _ => return Ok(None),
                };
                Ok(Some(InternalResponse {
                    id: self.message_id.clone(),
                    object: "chat.completion.chunk".to_string(),
                    created: 0,
                    model: self.model.clone(),
                    choices: vec![Choice { index: 0, message: None, delta: Some(message), finish_reason: None }],
                    usage: None,
                }))
            }
            "content_block_start" => {
                let Some(block) = event.content_block else { return Ok(None) };
                let RespContentBlock::ToolUse { id, name, .. } = block else { return Ok(None) };
                Ok(Some(InternalResponse {
                    id: self.message_id.clone(),
                    object: "chat.completion.chunk".to_string(),
                    created: 0,
                    model: self.model.clone(),
                    choices: vec![Choice {
                        index: 0,
                        message: None,
                        delta: Some(InternalMessage {
                            role: "assistant".to_string(),
                            content: None,
                            name: None,
                            tool_calls: Some(vec![crate::core::models::openai::ToolCall {
                                id,
                                tool_type: "function".to_string(),
                                function: crate::core::models::openai::FunctionCall {
                                    name,
                                    arguments: String::new(),
                                },
                            }]),
                            tool_call_id: None,
                            reasoning_content: None,
                            reasoning_signature: None,
                            cache_control: None,
                        }),
                        finish_reason: None,
                    }],
                    usage: None,
                }))
            }
            "message_delta" => {
                let finish_reason =
                    event.delta.as_ref().and_then(|d| d.stop_reason.as_deref()).map(map_stop_reason);
                let usage = event.usage.map(|u| Usage {
                    prompt_tokens: self.input_tokens,
                    completion_tokens: u.output_tokens,
                    total_tokens: self.input_tokens + u.output_tokens,
                    ..Default::default()
                });
                Ok(Some(InternalResponse {
                    id: self.message_id.clone(),
                    object: "chat.completion.chunk".to_string(),
                    created: 0,
                    model: self.model.clone(),
                    choices: vec![Choice { index: 0, message: None, delta: None, finish_reason }],
                    usage,
                }))
            }
            _ => Ok(None),
        }
    }
}

fn map_stop_reason(reason: &str) -> String {
    match reason {
        "end_turn" => "stop",
        "max_tokens" => "length",
        "tool_use" => "tool_calls",
        other => return other.to_string(),
    }
    .to_string()
}

fn to_internal_usage(u: RespUsage) -> Usage {
    let cached = u.cache_read_input_tokens.unwrap_or(0);
    Usage {
        prompt_tokens: u.input_tokens + cached,
        completion_tokens: u.output_tokens,
        total_tokens: u.input_tokens + cached + u.output_tokens,
        prompt_tokens_details: if cached > 0 {
            Some(crate::core::types::PromptTokensDetails { cached_tokens: cached })
        } else {
            None
        },
        cache_creation_input_tokens: u.cache_creation_input_tokens.unwrap_or(0),
        anthropic_usage: true,
    }
}

#[derive(Debug, Deserialize)]
struct ResponseBody {
    id: String,
    model: String,
    content: Vec<RespContentBlock>,
    stop_reason: Option<String>,
    usage: Option<RespUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum RespContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "thinking")]
    Thinking { thinking: String, signature: Option<String> },
    #[serde(rename = "tool_use")]
    ToolUse { id: String, name: String, #[serde(default)] input: serde_json::Value },
}

#[derive(Debug, Deserialize)]
struct RespUsage {
    input_tokens: u32,
    output_tokens: u32,
    #[serde(default)]
    cache_read_input_tokens: Option<u32>,
    #[serde(default)]
    cache_creation_input_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct StreamEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    message: Option<StreamMessage>,
    #[serde(default)]
    content_block: Option<RespContentBlock>,
    #[serde(default)]
    delta: Option<StreamDelta>,
    #[serde(default)]
    usage: Option<StreamUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamMessage {
    id: String,
    model: String,
    usage: StreamUsage,
}

#[derive(Debug, Default, Deserialize)]
struct StreamUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(rename = "type")]
    delta_type: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    thinking: Option<String>,
    #[serde(default)]
    signature: Option<String>,
    #[serde(default)]
    partial_json: Option<String>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::RawApiFormat;

    fn request() -> InternalRequest {
        InternalRequest {
            model: "claude-3-5-sonnet".to_string(),
            messages: vec![
                InternalMessage {
                    role: "system".to_string(),
                    content: Some(InternalContent::Text("be terse".to_string())),
                    name: None,
                    tool_calls: None,
                    tool_call_id: None,
                    reasoning_content: None,
                    reasoning_signature: None,
                    cache_control: None,
                },
                InternalMessage {
                    role: "user".to_string(),
                    content: Some(InternalContent::Text("hi".to_string())),
                    name: None,
                    tool_calls: None,
                    tool_call_id: None,
                    reasoning_content: None,
                    reasoning_signature: None,
                    cache_control: None,
                },
            ],
            tools: None,
            tool_choice: None,
            stop: None,
            max_tokens: Some(256),
            temperature: None,
            top_p: None,
            stream: false,
            reasoning_effort: None,
            reasoning_budget: None,
            raw_api_format: RawApiFormat::Anthropic,
            transformer_metadata: Default::default(),
        }
    }

    #[tokio::test]
    async fn system_message_is_hoisted_out_of_the_messages_array() {
        let mut adapter = AnthropicOutbound::default();
        let out = adapter.transform_request(&request(), "https://api.anthropic.com", "sk-ant-x").await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&out.body).unwrap();
        assert_eq!(body["system"][0]["text"], "be terse");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert!(out.headers.contains(&("x-api-key".to_string(), "sk-ant-x".to_string())));
    }

    #[test]
    fn anthropic_usage_marks_prompt_tokens_as_inclusive_of_cache_reads() {
        let mut adapter = AnthropicOutbound::default();
        let body = br#"{"id":"msg_1","model":"claude-3","content":[{"type":"text","text":"hi"}],
            "stop_reason":"end_turn","usage":{"input_tokens":10,"output_tokens":5,"cache_read_input_tokens":3}}"#;
        let resp = adapter.transform_response(body).unwrap();
        let usage = resp.usage.unwrap();
        assert!(usage.anthropic_usage);
        assert_eq!(usage.prompt_tokens, 13);
    }
}
