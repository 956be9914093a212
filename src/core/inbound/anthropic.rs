//! Anthropic Messages inbound adapter (spec 4.5): the non-trivial one.
//!
//! Grounded on the streaming state machine of a reference Anthropic
//! transformer: content blocks open/close in strict order (thinking, text,
//! then any number of tool-use blocks), `contentIndex` only ever increases,
//! and `message_delta` fires exactly once, combining the first observed
//! `finish_reason` with the usage chunk that follows it.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::core::types::{
    CacheControl, InternalContent, InternalContentPart, InternalMessage, InternalRequest,
    InternalResponse, RawApiFormat,
};
use crate::utils::error::{GatewayError, Result};

// ---- wire request types ----------------------------------------------

#[derive(Debug, Deserialize)]
struct MessageRequest {
    model: String,
    max_tokens: u32,
    #[serde(default)]
    temperature: Option<f32>,
    #[serde(default)]
    top_p: Option<f32>,
    #[serde(default)]
    stream: bool,
    #[serde(default)]
    system: Option<SystemField>,
    messages: Vec<WireMessage>,
    #[serde(default)]
    tools: Option<Vec<WireTool>>,
    #[serde(default)]
    stop_sequences: Option<Vec<String>>,
    #[serde(default)]
    thinking: Option<ThinkingConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SystemField {
    Prompt(String),
    Blocks(Vec<SystemBlock>),
}

#[derive(Debug, Deserialize)]
struct SystemBlock {
    text: String,
    #[serde(default)]
    cache_control: Option<WireCacheControl>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    role: String,
    content: WireContent,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireContent {
    Text(String),
    Blocks(Vec<WireContentBlock>),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum WireContentBlock {
    #[serde(rename = "text")]
    Text {
        text: String,
        #[serde(default)]
        cache_control: Option<WireCacheControl>,
    },
    #[serde(rename = "image")]
    Image {
        source: WireImageSource,
        #[serde(default)]
        cache_control: Option<WireCacheControl>,
    },
    #[serde(rename = "thinking")]
    Thinking {
        #[serde(default)]
        thinking: Option<String>,
        #[serde(default)]
        signature: Option<String>,
    },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: serde_json::Value,
        #[serde(default)]
        cache_control: Option<WireCacheControl>,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        #[serde(default)]
        content: Option<ToolResultContent>,
        #[serde(default)]
        is_error: Option<bool>,
        #[serde(default)]
        cache_control: Option<WireCacheControl>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ToolResultContent {
    Text(String),
    Blocks(Vec<WireContentBlock>),
}

#[derive(Debug, Deserialize)]
struct WireImageSource {
    #[serde(rename = "type")]
    source_type: String,
    #[serde(default)]
    media_type: Option<String>,
    #[serde(default)]
    data: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireCacheControl {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    ttl: Option<String>,
}

impl From<WireCacheControl> for CacheControl {
    fn from(c: WireCacheControl) -> Self {
        CacheControl { kind: c.kind, ttl: c.ttl }
    }
}

#[derive(Debug, Deserialize)]
struct WireTool {
    name: String,
    #[serde(default)]
    description: Option<String>,
    input_schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ThinkingConfig {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    budget_tokens: u32,
}

fn thinking_budget_to_reasoning_effort(budget_tokens: u32) -> String {
    match budget_tokens {
        0..=2047 => "low",
        2048..=8191 => "medium",
        _ => "high",
    }
    .to_string()
}

// ---- wire response types ----------------------------------------------

#[derive(Debug, Serialize)]
struct OutMessage {
    id: String,
    #[serde(rename = "type")]
    kind: &'static str,
    role: &'static str,
    model: String,
    content: Vec<OutContentBlock>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    usage: Option<OutUsage>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
enum OutContentBlock {
    #[serde(rename = "thinking")]
    Thinking {
        thinking: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image")]
    Image { source: OutImageSource },
    #[serde(rename = "tool_use")]
    ToolUse { id: String, name: String, input: serde_json::Value },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OutImageSource {
    Base64 { media_type: String, data: String },
    Url { url: String },
}

#[derive(Debug, Clone, Serialize, Default)]
struct OutUsage {
    input_tokens: u32,
    output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    cache_read_input_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cache_creation_input_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct StreamEvent {
    #[serde(rename = "type")]
    event_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    index: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    content_block: Option<OutContentBlock>,
    #[serde(skip_serializing_if = "Option::is_none")]
    delta: Option<StreamDelta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<StreamMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    usage: Option<OutUsage>,
}

#[derive(Debug, Default, Serialize)]
struct StreamDelta {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    delta_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    partial_json: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_reason: Option<String>,
}

#[derive(Debug, Serialize)]
struct StreamMessage {
    id: String,
    #[serde(rename = "type")]
    kind: &'static str,
    role: &'static str,
    model: String,
    content: Vec<OutContentBlock>,
    usage: OutUsage,
}

fn event(event_type: &'static str) -> StreamEvent {
    StreamEvent { event_type, index: None, content_block: None, delta: None, message: None, usage: None }
}

// ---- adapter ------------------------------------------------------------

#[derive(Debug, Default)]
pub struct AnthropicInbound {
    has_started: bool,
    has_text_content_started: bool,
    has_thinking_content_started: bool,
    has_tool_content_started: bool,
    has_finished: bool,
    message_stopped: bool,
    message_id: String,
    model_name: String,
    content_index: i64,
    stop_reason: Option<String>,
    tool_call_indices: HashSet<u32>,
}

impl super::InboundAdapter for AnthropicInbound {
    fn transform_request(&mut self, body: &[u8]) -> Result<InternalRequest> {
        let req: MessageRequest =
            serde_json::from_slice(body).map_err(|e| GatewayError::invalid_json(e.to_string()))?;

        let mut messages = Vec::new();
        let mut transformer_metadata = std::collections::HashMap::new();

        match req.system {
            Some(SystemField::Prompt(text)) => {
                messages.push(system_message(text, None));
            }
            Some(SystemField::Blocks(blocks)) => {
                transformer_metadata.insert("anthropic_system_array_format".to_string(), "true".to_string());
                for block in blocks {
                    messages.push(system_message(block.text, block.cache_control.map(Into::into)));
                }
            }
            None => {}
        }

        for (msg_index, msg) in req.messages.into_iter().enumerate() {
            match msg.content {
                WireContent::Text(text) => {
                    messages.push(InternalMessage {
                        role: msg.role,
                        content: Some(InternalContent::Text(text)),
                        name: None,
                        tool_calls: None,
                        tool_call_id: None,
                        reasoning_content: None,
                        reasoning_signature: None,
                        cache_control: None,
                    });
                }
                WireContent::Blocks(blocks) => {
                    push_message_from_blocks(&mut messages, msg.role, msg_index, blocks);
                }
            }
        }

        let tools = req.tools.map(|tools| {
            tools
                .into_iter()
                .map(|t| crate::core::models::openai::Tool {
                    tool_type: "function".to_string(),
                    function: crate::core::models::openai::Function {
                        name: t.name,
                        description: t.description,
                        parameters: Some(t.input_schema),
                    },
                })
                .collect()
        });

        let (reasoning_effort, reasoning_budget) = match req.thinking {
            Some(t) if t.kind == "enabled" => {
                (Some(thinking_budget_to_reasoning_effort(t.budget_tokens)), Some(t.budget_tokens))
            }
            _ => (None, None),
        };

        Ok(InternalRequest {
            model: req.model,
            messages,
            tools,
            tool_choice: None,
            stop: req.stop_sequences,
            max_tokens: Some(req.max_tokens),
            temperature: req.temperature,
            top_p: req.top_p,
            stream: req.stream,
            reasoning_effort,
            reasoning_budget,
            raw_api_format: RawApiFormat::Anthropic,
            transformer_metadata,
        })
    }

    fn transform_response(&mut self, resp: &InternalResponse) -> Result<Vec<u8>> {
        let mut content = Vec::new();
        let mut stop_reason = None;

        if let Some(choice) = resp.choices.first() {
            let message = choice.message.as_ref().or(choice.delta.as_ref());
            if let Some(message) = message {
                if let Some(reasoning) = message.reasoning_content.clone().filter(|s| !s.is_empty()) {
                    content.push(OutContentBlock::Thinking {
                        thinking: reasoning,
                        signature: Some(
                            message
                                .reasoning_signature
                                .clone()
                                .filter(|s| !s.is_empty())
                                .unwrap_or_else(redacted_thinking_signature),
                        ),
                    });
                }
                if let Some(c) = &message.content {
                    append_content_blocks(&mut content, c);
                }
                if let Some(tool_calls) = &message.tool_calls {
                    for tc in tool_calls {
                        content.push(OutContentBlock::ToolUse {
                            id: tc.id.clone(),
                            name: tc.function.name.clone(),
                            input: serde_json::from_str(&tc.function.arguments)
                                .unwrap_or(serde_json::json!({})),
                        });
                    }
                }
            }

            if let Some(finish_reason) = &choice.finish_reason {
                stop_reason = Some(map_finish_reason(finish_reason));
            }
        }

        let usage = resp.usage.as_ref().map(to_out_usage);

        let message = OutMessage {
            id: resp.id.clone(),
            kind: "message",
            role: "assistant",
            model: resp.model.clone(),
            content,
            stop_reason,
            usage,
        };
        Ok(serde_json::to_vec(&message)?)
    }

    fn transform_stream(&mut self, resp: &InternalResponse) -> Result<Vec<u8>> {
        let mut frames = Vec::new();

        if self.message_id.is_empty() && !resp.id.is_empty() {
            self.message_id = resp.id.clone();
        }
        if self.model_name.is_empty() && !resp.model.is_empty() {
            self.model_name = resp.model.clone();
        }

        if !self.has_started {
            self.has_started = true;
            let usage = resp.usage.as_ref().map(to_out_usage).unwrap_or(OutUsage {
                input_tokens: 1,
                output_tokens: 1,
                ..Default::default()
            });
            let mut e = event("message_start");
            e.message = Some(StreamMessage {
                id: self.message_id.clone(),
                kind: "message",
                role: "assistant",
                model: self.model_name.clone(),
                content: Vec::new(),
                usage,
            });
            frames.push(super::sse_frame(Some("message_start"), &e)?);
        }

        if let Some(choice) = resp.choices.first() {
            let delta = choice.delta.as_ref();

            if let Some(reasoning) = delta.and_then(|d| d.reasoning_content.clone()).filter(|s| !s.is_empty())
            {
                if self.has_tool_content_started {
                    self.has_tool_content_started = false;
                    frames.push(self.stop_block()?);
                    self.content_index += 1;
                }
                if !self.has_thinking_content_started {
                    self.has_thinking_content_started = true;
                    let mut e = event("content_block_start");
                    e.index = Some(self.content_index);
                    e.content_block =
                        Some(OutContentBlock::Thinking { thinking: String::new(), signature: None });
                    frames.push(super::sse_frame(Some("content_block_start"), &e)?);
                }
                let mut e = event("content_block_delta");
                e.index = Some(self.content_index);
                e.delta = Some(StreamDelta {
                    delta_type: Some("thinking_delta"),
                    thinking: Some(reasoning),
                    ..Default::default()
                });
                frames.push(super::sse_frame(Some("content_block_delta"), &e)?);
            }

            if let Some(signature) =
                delta.and_then(|d| d.reasoning_signature.clone()).filter(|s| !s.is_empty())
            {
                let mut e = event("content_block_delta");
                e.index = Some(self.content_index);
                e.delta = Some(StreamDelta {
                    delta_type: Some("signature_delta"),
                    signature: Some(signature),
                    ..Default::default()
                });
                frames.push(super::sse_frame(Some("content_block_delta"), &e)?);
            }

            let text_delta = delta.and_then(|d| d.content.as_ref()).map(content_as_text).filter(|t| !t.is_empty());
            if let Some(text) = text_delta {
                if self.has_thinking_content_started {
                    self.has_thinking_content_started = false;
                    frames.push(self.stop_block()?);
                    self.content_index += 1;
                }
                if self.has_tool_content_started {
                    self.has_tool_content_started = false;
                    frames.push(self.stop_block()?);
                    self.content_index += 1;
                }
                if !self.has_text_content_started {
                    self.has_text_content_started = true;
                    let mut e = event("content_block_start");
                    e.index = Some(self.content_index);
                    e.content_block = Some(OutContentBlock::Text { text: String::new() });
                    frames.push(super::sse_frame(Some("content_block_start"), &e)?);
                }
                let mut e = event("content_block_delta");
                e.index = Some(self.content_index);
                e.delta =
                    Some(StreamDelta { delta_type: Some("text_delta"), text: Some(text), ..Default::default() });
                frames.push(super::sse_frame(Some("content_block_delta"), &e)?);
            }

            if let Some(tool_calls) = delta.and_then(|d| d.tool_calls.as_ref()).filter(|t| !t.is_empty()) {
                if self.has_thinking_content_started {
                    self.has_thinking_content_started = false;
                    frames.push(self.stop_block()?);
                    self.content_index += 1;
                }
                if self.has_text_content_started {
                    self.has_text_content_started = false;
                    frames.push(self.stop_block()?);
                    self.content_index += 1;
                }
                for (idx, tc) in tool_calls.iter().enumerate() {
                    let tool_index = idx as u32;
                    if !self.tool_call_indices.contains(&tool_index) {
                        if tool_index > 0 {
                            frames.push(self.stop_block()?);
                            self.content_index += 1;
                        }
                        self.tool_call_indices.insert(tool_index);
                        self.has_tool_content_started = true;
                        let mut e = event("content_block_start");
                        e.index = Some(self.content_index);
                        e.content_block = Some(OutContentBlock::ToolUse {
                            id: tc.id.clone(),
                            name: tc.function.name.clone(),
                            input: serde_json::json!({}),
                        });
                        frames.push(super::sse_frame(Some("content_block_start"), &e)?);
                        if !tc.function.arguments.is_empty() {
                            let mut e = event("content_block_delta");
                            e.index = Some(self.content_index);
                            e.delta = Some(StreamDelta {
                                delta_type: Some("input_json_delta"),
                                partial_json: Some(tc.function.arguments.clone()),
                                ..Default::default()
                            });
                            frames.push(super::sse_frame(Some("content_block_delta"), &e)?);
                        }
                    } else {
                        let mut e = event("content_block_delta");
                        e.index = Some(self.content_index);
                        e.delta = Some(StreamDelta {
                            delta_type: Some("input_json_delta"),
                            partial_json: Some(tc.function.arguments.clone()),
                            ..Default::default()
                        });
                        frames.push(super::sse_frame(Some("content_block_delta"), &e)?);
                    }
                }
            }

            if let Some(finish_reason) = &choice.finish_reason {
                if !self.has_finished {
                    self.has_finished = true;
                    frames.push(self.stop_block()?);
                    self.stop_reason = Some(map_finish_reason(finish_reason));
                }
            }
        }

        if resp.usage.is_some() && self.has_finished && !self.message_stopped {
            let mut e = event("message_delta");
            e.delta = self.stop_reason.clone().map(|stop_reason| StreamDelta {
                stop_reason: Some(stop_reason),
                ..Default::default()
            });
            e.usage = resp.usage.as_ref().map(to_out_usage);
            frames.push(super::sse_frame(Some("message_delta"), &e)?);
            frames.push(super::sse_frame(Some("message_stop"), &event("message_stop"))?);
            self.message_stopped = true;
        }

        Ok(frames.concat())
    }
}

impl AnthropicInbound {
    fn stop_block(&self) -> Result<Vec<u8>> {
        let mut e = event("content_block_stop");
        e.index = Some(self.content_index);
        super::sse_frame(Some("content_block_stop"), &e)
    }
}

fn system_message(text: String, cache_control: Option<CacheControl>) -> InternalMessage {
    InternalMessage {
        role: "system".to_string(),
        content: Some(InternalContent::Text(text)),
        name: None,
        tool_calls: None,
        tool_call_id: None,
        reasoning_content: None,
        reasoning_signature: None,
        cache_control,
    }
}

fn push_message_from_blocks(
    messages: &mut Vec<InternalMessage>,
    role: String,
    msg_index: usize,
    blocks: Vec<WireContentBlock>,
) {
    let _ = msg_index;
    let mut parts = Vec::new();
    let mut tool_calls = Vec::new();
    let mut reasoning_content = None;
    let mut reasoning_signature = None;
    let mut message_cache_control = None;

    for block in blocks {
        match block {
            WireContentBlock::Thinking { thinking, signature } => {
                if let Some(t) = thinking.filter(|s| !s.is_empty()) {
                    reasoning_content = Some(t);
                }
                if let Some(s) = signature.filter(|s| !s.is_empty()) {
                    reasoning_signature = Some(s);
                }
            }
            WireContentBlock::Text { text, cache_control } => {
                if let Some(cc) = cache_control {
                    message_cache_control = Some(cc.into());
                }
                parts.push(InternalContentPart::Text { text });
            }
            WireContentBlock::Image { source, cache_control } => {
                if let Some(cc) = cache_control {
                    message_cache_control = Some(cc.into());
                }
                let url = match source.source_type.as_str() {
                    "base64" => format!(
                        "data:{};base64,{}",
                        source.media_type.unwrap_or_default(),
                        source.data.unwrap_or_default()
                    ),
                    _ => source.url.unwrap_or_default(),
                };
                parts.push(InternalContentPart::ImageUrl { url });
            }
            WireContentBlock::ToolUse { id, name, input, cache_control } => {
                if let Some(cc) = cache_control {
                    message_cache_control = Some(cc.into());
                }
                tool_calls.push(crate::core::models::openai::ToolCall {
                    id,
                    tool_type: "function".to_string(),
                    function: crate::core::models::openai::FunctionCall {
                        name,
                        arguments: input.to_string(),
                    },
                });
            }
            WireContentBlock::ToolResult { tool_use_id, content, is_error: _, cache_control } => {
                let text = match content {
                    Some(ToolResultContent::Text(t)) => t,
                    Some(ToolResultContent::Blocks(blocks)) => blocks
                        .into_iter()
                        .filter_map(|b| match b {
                            WireContentBlock::Text { text, .. } => Some(text),
                            _ => None,
                        })
                        .collect::<Vec<_>>()
                        .join(""),
                    None => String::new(),
                };
                messages.push(InternalMessage {
                    role: "tool".to_string(),
                    content: Some(InternalContent::Text(text)),
                    name: None,
                    tool_calls: None,
                    tool_call_id: Some(tool_use_id),
                    reasoning_content: None,
                    reasoning_signature: None,
                    cache_control: cache_control.map(Into::into),
                });
            }
        }
    }

    let has_content = !parts.is_empty() || !tool_calls.is_empty() || reasoning_content.is_some();
    if !has_content {
        return;
    }

    let content = if parts.len() == 1 {
        match &parts[0] {
            InternalContentPart::Text { text } => Some(InternalContent::Text(text.clone())),
            _ => Some(InternalContent::Parts(parts)),
        }
    } else if !parts.is_empty() {
        Some(InternalContent::Parts(parts))
    } else {
        None
    };

    messages.push(InternalMessage {
        role,
        content,
        name: None,
        tool_calls: if tool_calls.is_empty() { None } else { Some(tool_calls) },
        tool_call_id: None,
        reasoning_content,
        reasoning_signature,
        cache_control: message_cache_control,
    });
}

fn append_content_blocks(out: &mut Vec<OutContentBlock>, content: &InternalContent) {
    match content {
        InternalContent::Text(text) if !text.is_empty() => {
            out.push(OutContentBlock::Text { text: text.clone() });
        }
        InternalContent::Text(_) => {}
        InternalContent::Parts(parts) => {
            for part in parts {
                match part {
                    InternalContentPart::Text { text } => {
                        out.push(OutContentBlock::Text { text: text.clone() });
                    }
                    InternalContentPart::ImageUrl { url } => {
                        out.push(OutContentBlock::Image { source: image_source_from_url(url) });
                    }
                }
            }
        }
    }
}

fn image_source_from_url(url: &str) -> OutImageSource {
    if let Some(rest) = url.strip_prefix("data:") {
        if let Some((media_type, data)) = rest.split_once(";base64,") {
            return OutImageSource::Base64 { media_type: media_type.to_string(), data: data.to_string() };
        }
    }
    OutImageSource::Url { url: url.to_string() }
}

fn content_as_text(c: &InternalContent) -> String {
    match c {
        InternalContent::Text(t) => t.clone(),
        InternalContent::Parts(parts) => parts
            .iter()
            .filter_map(|p| match p {
                InternalContentPart::Text { text } => Some(text.clone()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join(""),
    }
}

fn map_finish_reason(reason: &str) -> String {
    match reason {
        "stop" => "end_turn",
        "length" => "max_tokens",
        "tool_calls" => "tool_use",
        other => return other.to_string(),
    }
    .to_string()
}

fn to_out_usage(u: &crate::core::types::Usage) -> OutUsage {
    let cached = u.prompt_tokens_details.as_ref().map(|d| d.cached_tokens).unwrap_or(0);
    OutUsage {
        input_tokens: u.prompt_tokens.saturating_sub(cached),
        output_tokens: u.completion_tokens,
        cache_read_input_tokens: if cached > 0 { Some(cached) } else { None },
        cache_creation_input_tokens: if u.cache_creation_input_tokens > 0 {
            Some(u.cache_creation_input_tokens)
        } else {
            None
        },
    }
}

fn redacted_thinking_signature() -> String {
    "ANTHROPIC_MAGIC_STRING_TRIGGER_REDACTED_THINKING_46C9A13E193C177646C7398A98432ECCCE4C1253D5E2D82641AC0E52CC2876CB"
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::inbound::InboundAdapter;
    use crate::core::types::{Choice, Usage};

    fn chunk(delta: Option<InternalMessage>, finish_reason: Option<&str>, usage: Option<Usage>) -> InternalResponse {
        InternalResponse {
            id: "msg_1".to_string(),
            object: "chat.completion.chunk".to_string(),
            created: 0,
            model: "claude-3".to_string(),
            choices: vec![Choice {
                index: 0,
                message: None,
                delta,
                finish_reason: finish_reason.map(str::to_string),
            }],
            usage,
        }
    }

    fn text_delta(text: &str) -> InternalMessage {
        InternalMessage {
            role: "assistant".to_string(),
            content: Some(InternalContent::Text(text.to_string())),
            name: None,
            tool_calls: None,
            tool_call_id: None,
            reasoning_content: None,
            reasoning_signature: None,
            cache_control: None,
        }
    }

    #[test]
    fn event_sequence_matches_message_start_block_delta_stop_grammar() {
        let mut adapter = AnthropicInbound::default();
        let mut all_events = Vec::new();

        let out = adapter.transform_stream(&chunk(Some(text_delta("hi")), None, None)).unwrap();
        all_events.push(String::from_utf8(out).unwrap());

        let out = adapter.transform_stream(&chunk(None, Some("stop"), None)).unwrap();
        all_events.push(String::from_utf8(out).unwrap());

        let usage = Usage { prompt_tokens: 10, completion_tokens: 5, total_tokens: 15, ..Default::default() };
        let out = adapter.transform_stream(&chunk(None, None, Some(usage))).unwrap();
        all_events.push(String::from_utf8(out).unwrap());

        let joined = all_events.concat();
        assert!(joined.starts_with("event:message_start"));
        assert!(joined.contains("event:content_block_start"));
        assert!(joined.contains("event:content_block_delta"));
        assert!(joined.contains("event:content_block_stop"));
        assert!(joined.contains("event:message_delta"));
        assert!(joined.trim_end().ends_with("event:message_stop\ndata:{\"type\":\"message_stop\"}"));
        assert!(adapter.message_stopped);
    }

    #[test]
    fn content_index_increases_across_block_transitions() {
        let mut adapter = AnthropicInbound::default();
        let mut thinking_delta = text_delta("");
        thinking_delta.content = None;
        thinking_delta.reasoning_content = Some("pondering".to_string());
        adapter.transform_stream(&chunk(Some(thinking_delta), None, None)).unwrap();
        assert_eq!(adapter.content_index, 0);

        adapter.transform_stream(&chunk(Some(text_delta("hello")), None, None)).unwrap();
        assert_eq!(adapter.content_index, 1);
    }

    #[test]
    fn request_maps_system_array_and_sets_transformer_metadata() {
        let body = br#"{
            "model": "claude-3",
            "max_tokens": 100,
            "system": [{"text": "be terse"}],
            "messages": [{"role": "user", "content": "hi"}]
        }"#;
        let mut adapter = AnthropicInbound::default();
        let req = adapter.transform_request(body).unwrap();
        assert_eq!(req.messages[0].role, "system");
        assert_eq!(
            req.transformer_metadata.get("anthropic_system_array_format").map(String::as_str),
            Some("true")
        );
    }
}
