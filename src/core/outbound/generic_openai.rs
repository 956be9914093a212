//! OpenAI-compatible outbound adapter: builds the same wire shapes the
//! OpenAI inbound adapter accepts, for both the chat-completions and the
//! responses surface (spec 4.6). No original-source code exists for either
//! direction; built from the spec's prose and by symmetry with
//! [`crate::core::inbound::openai_chat`] and
//! [`crate::core::inbound::openai_responses`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::models::openai::{
    ChatMessage, ChatMessageDelta, MessageContent, MessageRole, PromptTokensDetails as OaPromptTokensDetails,
    Usage as OaUsage,
};
use crate::core::outbound::{OutboundAdapter, OutboundHttpRequest};
use crate::core::types::{
    Choice, InternalContent, InternalContentPart, InternalMessage, InternalRequest,
    InternalResponse, Usage,
};
use crate::utils::error::{GatewayError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Surface {
    Chat,
    Responses,
}

pub struct OpenAiOutbound {
    surface: Surface,
}

impl OpenAiOutbound {
    pub fn chat() -> Self {
        Self { surface: Surface::Chat }
    }

    pub fn responses() -> Self {
        Self { surface: Surface::Responses }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequestBody {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<crate::core::models::openai::Tool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<crate::core::models::openai::ToolChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ResponsesRequestBody {
    model: String,
    input: Vec<ResponsesInputItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ResponsesInputItem {
    role: String,
    content: String,
}

#[async_trait]
impl OutboundAdapter for OpenAiOutbound {
    async fn transform_request(
        &mut self,
        request: &InternalRequest,
        base_url: &str,
        credential: &str,
    ) -> Result<OutboundHttpRequest> {
        let (path, body) = match self.surface {
            Surface::Chat => {
                let body = ChatRequestBody {
                    model: request.model.clone(),
                    messages: request.messages.iter().cloned().map(to_chat_message).collect(),
                    tools: request.tools.clone(),
                    tool_choice: request.tool_choice.clone(),
                    stop: request.stop.clone(),
                    max_tokens: request.max_tokens,
                    temperature: request.temperature,
                    top_p: request.top_p,
                    stream: request.stream,
                };
                ("/chat/completions", serde_json::to_vec(&body)?)
            }
            Surface::Responses => {
                let body = ResponsesRequestBody {
                    model: request.model.clone(),
                    input: request
                        .messages
                        .iter()
                        .map(|m| ResponsesInputItem { role: m.role.clone(), content: content_as_text_ref(m) })
                        .collect(),
                    max_output_tokens: request.max_tokens,
                    temperature: request.temperature,
                    top_p: request.top_p,
                    stream: request.stream,
                };
                ("/responses", serde_json::to_vec(&body)?)
            }
        };

        let url = format!("{}{}", base_url.trim_end_matches('/'), path);
        Ok(OutboundHttpRequest::post(url, body)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {credential}")))
    }

    fn transform_response(&mut self, body: &[u8]) -> Result<InternalResponse> {
        match self.surface {
            Surface::Chat => {
                let resp: ChatResponseBody =
                    serde_json::from_slice(body).map_err(|e| GatewayError::upstream_unavailable(e.to_string()))?;
                Ok(InternalResponse {
                    id: resp.id,
                    object: resp.object,
                    created: resp.created,
                    model: resp.model,
                    choices: resp
                        .choices
                        .into_iter()
                        .map(|c| Choice {
                            index: c.index,
                            message: Some(to_internal_message(c.message)),
                            delta: None,
                            finish_reason: c.finish_reason,
                        })
                        .collect(),
                    usage: resp.usage.map(to_internal_usage),
                })
            }
            Surface::Responses => {
                let resp: ResponsesResponseBody =
                    serde_json::from_slice(body).map_err(|e| GatewayError::upstream_unavailable(e.to_string()))?;
                Ok(responses_body_to_internal(resp))
            }
        }
    }

    fn transform_stream(&mut self, event_data: &[u8]) -> Result<Option<InternalResponse>> {
        if event_data.is_empty() || event_data == b"[DONE]" {
            return Ok(None);
        }
        match self.surface {
            Surface::Chat => {
                let chunk: ChatChunkBody = serde_json::from_slice(event_data)
                    .map_err(|e| GatewayError::upstream_unavailable(e.to_string()))?;
                Ok(Some(InternalResponse {
                    id: chunk.id,
                    object: chunk.object,
                    created: chunk.created,
                    model: chunk.model,
                    choices: chunk
                        .choices
                        .into_iter()
                        .map(|c| Choice {
                            index: c.index,
                            message: None,
                            delta: Some(to_internal_delta(c.delta)),
                            finish_reason: c.finish_reason,
                        })
                        .collect(),
                    usage: chunk.usage.map(to_internal_usage),
                }))
            }
            Surface::Responses => {
                let resp: ResponsesResponseBody = serde_json::from_slice(event_data)
                    .map_err(|e| GatewayError::upstream_unavailable(e.to_string()))?;
                Ok(Some(responses_body_to_internal(resp)))
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponseBody {
    id: String,
    object: String,
    created: u64,
    model: String,
    choices: Vec<ChatResponseChoice>,
    usage: Option<OaUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatResponseChoice {
    index: u32,
    message: ChatMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChunkBody {
    id: String,
    object: String,
    created: u64,
    model: String,
    choices: Vec<ChatChunkChoice>,
    usage: Option<OaUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChunkChoice {
    index: u32,
    delta: ChatMessageDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponsesResponseBody {
    id: String,
    #[serde(default)]
    created_at: u64,
    model: String,
    output: Vec<ResponsesOutputItem>,
    usage: Option<ResponsesUsage>,
}

#[derive(Debug, Deserialize)]
struct ResponsesOutputItem {
    role: String,
    content: Vec<ResponsesOutputContent>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ResponsesOutputContent {
    #[serde(rename = "output_text")]
    OutputText { text: String },
}

#[derive(Debug, Deserialize)]
struct ResponsesUsage {
    input_tokens: u32,
    output_tokens: u32,
    total_tokens: u32,
}

fn responses_body_to_internal(resp: ResponsesResponseBody) -> InternalResponse {
    let item = resp.output.into_iter().next();
    let (role, text) = match item {
        Some(item) => {
            let text = item
                .content
                .into_iter()
                .map(|c| match c {
                    ResponsesOutputContent::OutputText { text } => text,
                })
                .collect::<Vec<_>>()
                .join("");
            (item.role, text)
        }
        None => ("assistant".to_string(), String::new()),
    };
    InternalResponse {
        id: resp.id,
        object: "response".to_string(),
        created: resp.created_at,
        model: resp.model,
        choices: vec![Choice {
            index: 0,
            message: Some(InternalMessage {
                role,
                content: Some(InternalContent::Text(text)),
                name: None,
                tool_calls: None,
                tool_call_id: None,
                reasoning_content: None,
                reasoning_signature: None,
                cache_control: None,
            }),
            delta: None,
            finish_reason: None,
        }],
        usage: resp.usage.map(|u| Usage {
            prompt_tokens: u.input_tokens,
            completion_tokens: u.output_tokens,
            total_tokens: u.total_tokens,
            ..Default::default()
        }),
    }
}

fn content_as_text_ref(m: &InternalMessage) -> String {
    match &m.content {
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
    }
}

fn to_chat_message(m: InternalMessage) -> ChatMessage {
    ChatMessage {
        role: parse_role(&m.role),
        content: m.content.map(from_internal_content),
        name: m.name,
        function_call: None,
        tool_calls: m.tool_calls,
        tool_call_id: m.tool_call_id,
        audio: None,
    }
}

fn from_internal_content(c: InternalContent) -> MessageContent {
    match c {
        InternalContent::Text(t) => MessageContent::Text(t),
        InternalContent::Parts(parts) => MessageContent::Parts(
            parts
                .into_iter()
                .map(|p| match p {
                    InternalContentPart::Text { text } => crate::core::models::openai::ContentPart::Text { text },
                    InternalContentPart::ImageUrl { url } => crate::core::models::openai::ContentPart::ImageUrl {
                        image_url: crate::core::models::openai::ImageUrl { url, detail: None },
                    },
                })
                .collect(),
        ),
    }
}

fn parse_role(role: &str) -> MessageRole {
    match role {
        "system" => MessageRole::System,
        "assistant" => MessageRole::Assistant,
        "function" => MessageRole::Function,
        "tool" => MessageRole::Tool,
        _ => MessageRole::User,
    }
}

fn to_internal_message(m: ChatMessage) -> InternalMessage {
    InternalMessage {
        role: m.role.to_string(),
        content: m.content.map(to_internal_content),
        name: m.name,
        tool_calls: m.tool_calls,
        tool_call_id: m.tool_call_id,
        reasoning_content: None,
        reasoning_signature: None,
        cache_control: None,
    }
}

fn to_internal_delta(m: ChatMessageDelta) -> InternalMessage {
    InternalMessage {
        role: m.role.map(|r| r.to_string()).unwrap_or_else(|| "assistant".to_string()),
        content: m.content.map(InternalContent::Text),
        name: None,
        tool_calls: m.tool_calls.map(|deltas| {
            deltas
                .into_iter()
                .map(|d| crate::core::models::openai::ToolCall {
                    id: d.id.unwrap_or_default(),
                    tool_type: d.tool_type.unwrap_or_else(|| "function".to_string()),
                    function: crate::core::models::openai::FunctionCall {
                        name: d.function.as_ref().and_then(|f| f.name.clone()).unwrap_or_default(),
                        arguments: d.function.and_then(|f| f.arguments).unwrap_or_default(),
                    },
                })
                .collect()
        }),
        tool_call_id: None,
        reasoning_content: None,
        reasoning_signature: None,
        cache_control: None,
    }
}

fn to_internal_content(c: MessageContent) -> InternalContent {
    match c {
        MessageContent::Text(t) => InternalContent::Text(t),
        MessageContent::Parts(parts) => InternalContent::Parts(
            parts
                .into_iter()
                .filter_map(|p| match p {
                    crate::core::models::openai::ContentPart::Text { text } => Some(InternalContentPart::Text { text }),
                    crate::core::models::openai::ContentPart::ImageUrl { image_url } => {
                        Some(InternalContentPart::ImageUrl { url: image_url.url })
                    }
                    crate::core::models::openai::ContentPart::Audio { .. } => None,
                })
                .collect(),
        ),
    }
}

fn to_internal_usage(u: OaUsage) -> Usage {
    Usage {
        prompt_tokens: u.prompt_tokens,
        completion_tokens: u.completion_tokens,
        total_tokens: u.total_tokens,
        prompt_tokens_details: u.prompt_tokens_details.map(|d: OaPromptTokensDetails| {
            crate::core::types::PromptTokensDetails { cached_tokens: d.cached_tokens.unwrap_or(0) }
        }),
        cache_creation_input_tokens: 0,
        anthropic_usage: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::RawApiFormat;

    fn request() -> InternalRequest {
        InternalRequest {
            model: "gpt-4o".to_string(),
            messages: vec![InternalMessage {
                role: "user".to_string(),
                content: Some(InternalContent::Text("hi".to_string())),
                name: None,
                tool_calls: None,
                tool_call_id: None,
                reasoning_content: None,
                reasoning_signature: None,
                cache_control: None,
            }],
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
    async fn chat_request_targets_chat_completions_path_with_bearer_auth() {
        let mut adapter = OpenAiOutbound::chat();
        let out = adapter
            .transform_request(&request(), "https://api.openai.com/v1/", "sk-test")
            .await
            .unwrap();
        assert_eq!(out.url, "https://api.openai.com/v1/chat/completions");
        assert!(out.headers.contains(&("Authorization".to_string(), "Bearer sk-test".to_string())));
    }

    #[test]
    fn chat_response_parses_into_internal_response() {
        let mut adapter = OpenAiOutbound::chat();
        let body = br#"{"id":"x","object":"chat.completion","created":1,"model":"gpt-4o",
            "choices":[{"index":0,"message":{"role":"assistant","content":"hi"},"finish_reason":"stop"}]}"#;
        let resp = adapter.transform_response(body).unwrap();
        assert_eq!(resp.choices[0].finish_reason.as_deref(), Some("stop"));
    }
}
