//! OpenAI "responses" inbound adapter (spec 4.5): same pivot as the chat
//! adapter, `response.*` event framing and an `input`/`output` wire envelope
//! instead of `messages`/`choices`.

use serde::{Deserialize, Serialize};

use crate::core::inbound::sse_frame;
use crate::core::types::{
    InternalContent, InternalMessage, InternalRequest, InternalResponse, RawApiFormat,
};
use crate::utils::error::{GatewayError, Result};

#[derive(Debug, Deserialize)]
struct ResponsesRequest {
    model: String,
    input: ResponsesInput,
    #[serde(default)]
    instructions: Option<String>,
    #[serde(default)]
    max_output_tokens: Option<u32>,
    #[serde(default)]
    temperature: Option<f32>,
    #[serde(default)]
    top_p: Option<f32>,
    #[serde(default)]
    stream: bool,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ResponsesInput {
    Text(String),
    Items(Vec<ResponsesInputItem>),
}

#[derive(Debug, Deserialize)]
struct ResponsesInputItem {
    role: String,
    content: ResponsesItemContent,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ResponsesItemContent {
    Text(String),
    Parts(Vec<serde_json::Value>),
}

#[derive(Debug, Serialize)]
struct ResponsesEnvelope {
    id: String,
    object: &'static str,
    created_at: u64,
    model: String,
    status: &'static str,
    output: Vec<ResponsesOutputItem>,
    usage: Option<ResponsesUsage>,
}

#[derive(Debug, Serialize)]
struct ResponsesOutputItem {
    #[serde(rename = "type")]
    item_type: &'static str,
    role: String,
    content: Vec<ResponsesOutputContent>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum ResponsesOutputContent {
    #[serde(rename = "output_text")]
    OutputText { text: String },
}

#[derive(Debug, Serialize)]
struct ResponsesUsage {
    input_tokens: u32,
    output_tokens: u32,
    total_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ResponsesStreamEvent<'a> {
    #[serde(rename = "type")]
    event_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    delta: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response: Option<&'a ResponsesEnvelope>,
}

#[derive(Default)]
pub struct OpenAiResponsesInbound;

impl super::InboundAdapter for OpenAiResponsesInbound {
    fn transform_request(&mut self, body: &[u8]) -> Result<InternalRequest> {
        let req: ResponsesRequest =
            serde_json::from_slice(body).map_err(|e| GatewayError::invalid_json(e.to_string()))?;

        let mut messages = Vec::new();
        if let Some(instructions) = req.instructions {
            messages.push(InternalMessage {
                role: "system".to_string(),
                content: Some(InternalContent::Text(instructions)),
                name: None,
                tool_calls: None,
                tool_call_id: None,
                reasoning_content: None,
                reasoning_signature: None,
                cache_control: None,
            });
        }
        match req.input {
            ResponsesInput::Text(text) => messages.push(InternalMessage {
                role: "user".to_string(),
                content: Some(InternalContent::Text(text)),
                name: None,
                tool_calls: None,
                tool_call_id: None,
                reasoning_content: None,
                reasoning_signature: None,
                cache_control: None,
            }),
            ResponsesInput::Items(items) => {
                for item in items {
                    let text = match item.content {
                        ResponsesItemContent::Text(t) => t,
                        ResponsesItemContent::Parts(parts) => parts
                            .iter()
                            .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
                            .collect::<Vec<_>>()
                            .join(""),
                    };
                    messages.push(InternalMessage {
                        role: item.role,
                        content: Some(InternalContent::Text(text)),
                        name: None,
                        tool_calls: None,
                        tool_call_id: None,
                        reasoning_content: None,
                        reasoning_signature: None,
                        cache_control: None,
                    });
                }
            }
        }

        Ok(InternalRequest {
            model: req.model,
            messages,
            tools: None,
            tool_choice: None,
            stop: None,
            max_tokens: req.max_output_tokens,
            temperature: req.temperature,
            top_p: req.top_p,
            stream: req.stream,
            reasoning_effort: None,
            reasoning_budget: None,
            raw_api_format: RawApiFormat::OpenaiResponses,
            transformer_metadata: Default::default(),
        })
    }

    fn transform_response(&mut self, resp: &InternalResponse) -> Result<Vec<u8>> {
        let envelope = build_envelope(resp, "completed");
        Ok(serde_json::to_vec(&envelope)?)
    }

    fn transform_stream(&mut self, resp: &InternalResponse) -> Result<Vec<u8>> {
        let text = resp
            .choices
            .first()
            .and_then(|c| c.delta.as_ref())
            .and_then(|m| m.content.as_ref())
            .map(content_as_text)
            .unwrap_or_default();

        if text.is_empty() && resp.usage.is_none() {
            return Ok(Vec::new());
        }

        if resp.usage.is_some() {
            let envelope = build_envelope(resp, "completed");
            let event = ResponsesStreamEvent {
                event_type: "response.completed",
                delta: None,
                response: Some(&envelope),
            };
            return sse_frame(None, &event);
        }

        let event = ResponsesStreamEvent {
            event_type: "response.output_text.delta",
            delta: Some(text),
            response: None,
        };
        sse_frame(None, &event)
    }
}

fn content_as_text(c: &InternalContent) -> String {
    match c {
        InternalContent::Text(t) => t.clone(),
        InternalContent::Parts(parts) => parts
            .iter()
            .filter_map(|p| match p {
                crate::core::types::InternalContentPart::Text { text } => Some(text.clone()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join(""),
    }
}

fn build_envelope(resp: &InternalResponse, status: &'static str) -> ResponsesEnvelope {
    let text = resp
        .choices
        .first()
        .and_then(|c| c.message.as_ref())
        .and_then(|m| m.content.as_ref())
        .map(content_as_text)
        .unwrap_or_default();

    ResponsesEnvelope {
        id: resp.id.clone(),
        object: "response",
        created_at: resp.created,
        model: resp.model.clone(),
        status,
        output: vec![ResponsesOutputItem {
            item_type: "message",
            role: "assistant".to_string(),
            content: vec![ResponsesOutputContent::OutputText { text }],
        }],
        usage: resp.usage.as_ref().map(|u| ResponsesUsage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::inbound::InboundAdapter;

    #[test]
    fn plain_text_input_becomes_single_user_message() {
        let body = br#"{"model":"gpt-4o","input":"hello"}"#;
        let mut adapter = OpenAiResponsesInbound;
        let internal = adapter.transform_request(body).unwrap();
        assert_eq!(internal.messages.len(), 1);
        assert_eq!(internal.messages[0].role, "user");
    }

    #[test]
    fn instructions_become_a_leading_system_message() {
        let body = br#"{"model":"gpt-4o","instructions":"be terse","input":"hello"}"#;
        let mut adapter = OpenAiResponsesInbound;
        let internal = adapter.transform_request(body).unwrap();
        assert_eq!(internal.messages.len(), 2);
        assert_eq!(internal.messages[0].role, "system");
    }
}
