//! Gemini (`generativelanguage`-style) outbound adapter (spec 4.6): maps
//! Internal messages to `contents[]`, assistant tool calls to
//! `functionCall` parts and tool results to `functionResponse` parts.
//!
//! No original-source file covers Gemini directly; built from the spec's
//! prose plus the `contents`/`parts` shape the Antigravity adapter already
//! proves out (Antigravity's request body is itself a thin wrapper around
//! this same Gemini wire format).

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::outbound::{OutboundAdapter, OutboundHttpRequest};
use crate::core::types::{
    Choice, InternalContent, InternalContentPart, InternalMessage, InternalRequest,
    InternalResponse, Usage,
};
use crate::utils::error::{GatewayError, Result};

const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 8096;

#[derive(Default)]
pub struct GeminiOutbound {
    model: String,
}

#[derive(Debug, Serialize)]
struct RequestBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "systemInstruction")]
    system_instruction: Option<ContentOut>,
    contents: Vec<ContentOut>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ToolOut>>,
}

#[derive(Debug, Serialize)]
struct ContentOut {
    role: &'static str,
    parts: Vec<PartOut>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum PartOut {
    Text { text: String },
    InlineData { #[serde(rename = "inlineData")] inline_data: InlineDataOut },
    FileData { #[serde(rename = "fileData")] file_data: FileDataOut },
    FunctionCall { #[serde(rename = "functionCall")] function_call: FunctionCallOut },
    FunctionResponse { #[serde(rename = "functionResponse")] function_response: FunctionResponseOut },
}

#[derive(Debug, Serialize)]
struct InlineDataOut {
    #[serde(rename = "mimeType")]
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct FileDataOut {
    #[serde(rename = "fileUri")]
    file_uri: String,
}

#[derive(Debug, Serialize)]
struct FunctionCallOut {
    name: String,
    args: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct FunctionResponseOut {
    name: String,
    response: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "topP")]
    top_p: Option<f32>,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ToolOut {
    #[serde(rename = "functionDeclarations")]
    function_declarations: Vec<FunctionDeclarationOut>,
}

#[derive(Debug, Serialize)]
struct FunctionDeclarationOut {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    parameters: serde_json::Value,
}

fn part_from_content(part: &InternalContentPart) -> PartOut {
    match part {
        InternalContentPart::Text { text } => PartOut::Text { text: text.clone() },
        InternalContentPart::ImageUrl { url } => {
            if let Some(rest) = url.strip_prefix("data:")
                && let Some((mime_type, data)) = rest.split_once(";base64,")
            {
                return PartOut::InlineData {
                    inline_data: InlineDataOut { mime_type: mime_type.to_string(), data: data.to_string() },
                };
            }
            PartOut::FileData { file_data: FileDataOut { file_uri: url.clone() } }
        }
    }
}

fn parts_from_message(msg: &InternalMessage) -> Vec<PartOut> {
    let mut parts = Vec::new();
    match &msg.content {
        Some(InternalContent::Text(text)) if !text.is_empty() => parts.push(PartOut::Text { text: text.clone() }),
        Some(InternalContent::Text(_)) => {}
        Some(InternalContent::Parts(content_parts)) => {
            parts.extend(content_parts.iter().map(part_from_content));
        }
        None => {}
    }
    if let Some(tool_calls) = &msg.tool_calls {
        for tc in tool_calls {
            parts.push(PartOut::FunctionCall {
                function_call: FunctionCallOut {
                    name: tc.function.name.clone(),
                    args: serde_json::from_str(&tc.function.arguments).unwrap_or(serde_json::json!({})),
                },
            });
        }
    }
    parts
}

/// Gemini identifies a `functionResponse` by tool name, not call id; a
/// tool-result message only carries the call id, so the call's name is
/// recovered from the assistant turn that issued it.
fn content_from_message(msg: &InternalMessage, names_by_call_id: &HashMap<String, String>) -> ContentOut {
    if msg.role == "tool" {
        let name = msg
            .tool_call_id
            .as_ref()
            .and_then(|id| names_by_call_id.get(id))
            .cloned()
            .unwrap_or_default();
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
        return ContentOut {
            role: "user",
            parts: vec![PartOut::FunctionResponse {
                function_response: FunctionResponseOut { name, response: serde_json::json!({"result": text}) },
            }],
        };
    }
    let role = if msg.role == "assistant" { "model" } else { "user" };
    ContentOut { role, parts: parts_from_message(msg) }
}

#[async_trait]
impl OutboundAdapter for GeminiOutbound {
    async fn transform_request(
        &mut self,
        request: &InternalRequest,
        base_url: &str,
        credential: &str,
    ) -> Result<OutboundHttpRequest> {
        self.model = request.model.clone();

        let system_instruction = request
            .messages
            .iter()
            .find(|m| m.role == "system")
            .map(|m| ContentOut { role: "user", parts: parts_from_message(m) });

        let mut names_by_call_id = HashMap::new();
        for msg in &request.messages {
            if let Some(tool_calls) = &msg.tool_calls {
                for tc in tool_calls {
                    names_by_call_id.insert(tc.id.clone(), tc.function.name.clone());
                }
            }
        }

        let contents = request
            .messages
            .iter()
            .filter(|m| m.role != "system")
            .map(|m| content_from_message(m, &names_by_call_id))
            .collect();

        let tools = request.tools.as_ref().map(|tools| {
            vec![ToolOut {
                function_declarations: tools
                    .iter()
                    .map(|t| FunctionDeclarationOut {
                        name: t.function.name.clone(),
                        description: t.function.description.clone(),
                        parameters: t.function.parameters.clone().unwrap_or(serde_json::json!({})),
                    })
                    .collect(),
            }]
        });

        let body = RequestBody {
            system_instruction,
            contents,
            generation_config: GenerationConfig {
                temperature: request.temperature,
                top_p: request.top_p,
                max_output_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_OUTPUT_TOKENS),
            },
            tools,
        };

        let method = if request.stream { "streamGenerateContent" } else { "generateContent" };
        let query = if request.stream { "?alt=sse" } else { "" };
        let url = format!(
            "{}/v1beta/models/{}:{method}{query}",
            base_url.trim_end_matches('/'),
            request.model
        );

        Ok(OutboundHttpRequest::post(url, serde_json::to_vec(&body)?)
            .header("Content-Type", "application/json")
            .header("x-goog-api-key", credential))
    }

    fn transform_response(&mut self, body: &[u8]) -> Result<InternalResponse> {
        let resp: GenerateContentResponse =
            serde_json::from_slice(body).map_err(|e| GatewayError::upstream_unavailable(e.to_string()))?;
        Ok(self.response_to_internal(resp))
    }

    fn transform_stream(&mut self, event_data: &[u8]) -> Result<Option<InternalResponse>> {
        if event_data.is_empty() {
            return Ok(None);
        }
        let resp: GenerateContentResponse =
            serde_json::from_slice(event_data).map_err(|e| GatewayError::upstream_unavailable(e.to_string()))?;
        let mut internal = self.response_to_internal(resp);
        for choice in &mut internal.choices {
            choice.delta = choice.message.take();
        }
        internal.object = "chat.completion.chunk".to_string();
        Ok(Some(internal))
    }
}

impl GeminiOutbound {
    fn response_to_internal(&self, resp: GenerateContentResponse) -> InternalResponse {
        let candidate = resp.candidates.into_iter().next();
        let (content, finish_reason) = match candidate {
            Some(c) => (message_from_content(c.content), c.finish_reason.map(map_finish_reason)),
            None => (None, None),
        };
        InternalResponse {
            id: String::new(),
            object: "chat.completion".to_string(),
            created: 0,
            model: self.model.clone(),
            choices: vec![Choice { index: 0, message: content, delta: None, finish_reason }],
            usage: resp.usage_metadata.map(|u| Usage {
                prompt_tokens: u.prompt_token_count,
                completion_tokens: u.candidates_token_count,
                total_tokens: u.total_token_count,
                ..Default::default()
            }),
        }
    }
}

fn message_from_content(content: Option<RespContent>) -> Option<InternalMessage> {
    let content = content?;
    let mut text = String::new();
    let mut tool_calls = Vec::new();
    for part in content.parts {
        match part {
            RespPart::Text { text: t } => text.push_str(&t),
            RespPart::FunctionCall { function_call } => {
                tool_calls.push(crate::core::models::openai::ToolCall {
                    id: format!("call_{}", function_call.name),
                    tool_type: "function".to_string(),
                    function: crate::core::models::openai::FunctionCall {
                        name: function_call.name,
                        arguments: function_call.args.to_string(),
                    },
                });
            }
        }
    }
    Some(InternalMessage {
        role: "assistant".to_string(),
        content: if text.is_empty() { None } else { Some(InternalContent::Text(text)) },
        name: None,
        tool_calls: if tool_calls.is_empty() { None } else { Some(tool_calls) },
        tool_call_id: None,
        reasoning_content: None,
        reasoning_signature: None,
        cache_control: None,
    })
}

fn map_finish_reason(reason: String) -> String {
    match reason.as_str() {
        "STOP" => "stop",
        "MAX_TOKENS" => "length",
        other if other.is_empty() => "stop",
        _ => return reason,
    }
    .to_string()
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<RespCandidate>,
    #[serde(rename = "usageMetadata", default)]
    usage_metadata: Option<RespUsage>,
}

#[derive(Debug, Deserialize)]
struct RespCandidate {
    #[serde(default)]
    content: Option<RespContent>,
    #[serde(rename = "finishReason", default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RespContent {
    #[serde(default)]
    parts: Vec<RespPart>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RespPart {
    FunctionCall { #[serde(rename = "functionCall")] function_call: RespFunctionCall },
    Text { text: String },
}

#[derive(Debug, Deserialize)]
struct RespFunctionCall {
    name: String,
    #[serde(default)]
    args: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct RespUsage {
    #[serde(rename = "promptTokenCount", default)]
    prompt_token_count: u32,
    #[serde(rename = "candidatesTokenCount", default)]
    candidates_token_count: u32,
    #[serde(rename = "totalTokenCount", default)]
    total_token_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::RawApiFormat;

    fn request() -> InternalRequest {
        InternalRequest {
            model: "gemini-1.5-pro".to_string(),
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
                    role: "assistant".to_string(),
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
            max_tokens: None,
            temperature: None,
            top_p: None,
            stream: false,
            reasoning_effort: None,
            reasoning_budget: None,
            raw_api_format: RawApiFormat::OpenaiChat,
            transformer_metadata: Default::default(),
        }
    }

    #[tokio::test]
    async fn assistant_role_is_rewritten_to_model_and_system_is_hoisted() {
        let mut adapter = GeminiOutbound::default();
        let out = adapter.transform_request(&request(), "https://example.com", "key").await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&out.body).unwrap();
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "be terse");
        assert_eq!(body["contents"][0]["role"], "model");
        assert!(out.url.contains(":generateContent"));
    }

    #[test]
    fn response_maps_finish_reason_and_usage() {
        let mut adapter = GeminiOutbound::default();
        let body = br#"{"candidates":[{"content":{"parts":[{"text":"hi"}]},"finishReason":"STOP"}],
            "usageMetadata":{"promptTokenCount":3,"candidatesTokenCount":2,"totalTokenCount":5}}"#;
        let resp = adapter.transform_response(body).unwrap();
        assert_eq!(resp.choices[0].finish_reason.as_deref(), Some("stop"));
        assert_eq!(resp.usage.unwrap().total_tokens, 5);
    }
}
