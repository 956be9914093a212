//! OpenAI chat-completions inbound adapter: identity mapping (spec 4.5).

use crate::core::inbound::sse_frame;
use crate::core::models::openai::{
    ChatChoice, ChatChoiceDelta, ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse,
    ChatMessage, ChatMessageDelta, MessageContent, MessageRole,
};
use crate::core::types::{
    InternalContent, InternalMessage, InternalRequest, InternalResponse, RawApiFormat, Usage,
};
use crate::utils::error::{GatewayError, Result};

#[derive(Default)]
pub struct OpenAiChatInbound;

impl super::InboundAdapter for OpenAiChatInbound {
    fn transform_request(&mut self, body: &[u8]) -> Result<InternalRequest> {
        let req: ChatCompletionRequest =
            serde_json::from_slice(body).map_err(|e| GatewayError::invalid_json(e.to_string()))?;
        Ok(InternalRequest {
            model: req.model,
            messages: req.messages.into_iter().map(to_internal_message).collect(),
            tools: req.tools,
            tool_choice: req.tool_choice,
            stop: req.stop,
            max_tokens: req.max_tokens.or(req.max_completion_tokens),
            temperature: req.temperature,
            top_p: req.top_p,
            stream: req.stream.unwrap_or(false),
            reasoning_effort: None,
            reasoning_budget: None,
            raw_api_format: RawApiFormat::OpenaiChat,
            transformer_metadata: Default::default(),
        })
    }

    fn transform_response(&mut self, resp: &InternalResponse) -> Result<Vec<u8>> {
        let response = ChatCompletionResponse {
            id: resp.id.clone(),
            object: "chat.completion".to_string(),
            created: resp.created,
            model: resp.model.clone(),
            system_fingerprint: None,
            choices: resp
                .choices
                .iter()
                .map(|c| ChatChoice {
                    index: c.index,
                    message: c.message.clone().map(from_internal_message).unwrap_or(empty_message()),
                    logprobs: None,
                    finish_reason: c.finish_reason.clone(),
                })
                .collect(),
            usage: resp.usage.as_ref().map(to_openai_usage),
        };
        Ok(serde_json::to_vec(&response)?)
    }

    fn transform_stream(&mut self, resp: &InternalResponse) -> Result<Vec<u8>> {
        let chunk = ChatCompletionChunk {
            id: resp.id.clone(),
            object: "chat.completion.chunk".to_string(),
            created: resp.created,
            model: resp.model.clone(),
            system_fingerprint: None,
            choices: resp
                .choices
                .iter()
                .map(|c| ChatChoiceDelta {
                    index: c.index,
                    delta: c.delta.clone().map(from_internal_delta).unwrap_or(empty_delta()),
                    logprobs: None,
                    finish_reason: c.finish_reason.clone(),
                })
                .collect(),
            usage: resp.usage.as_ref().map(to_openai_usage),
        };
        sse_frame(None, &chunk)
    }

    fn stream_terminator(&mut self) -> Vec<u8> {
        b"data: [DONE]\n\n".to_vec()
    }
}

fn empty_delta() -> ChatMessageDelta {
    ChatMessageDelta {
        role: None,
        content: None,
        function_call: None,
        tool_calls: None,
        audio: None,
    }
}

fn empty_message() -> ChatMessage {
    ChatMessage {
        role: MessageRole::Assistant,
        content: None,
        name: None,
        function_call: None,
        tool_calls: None,
        tool_call_id: None,
        audio: None,
    }
}

fn to_internal_message(m: ChatMessage) -> InternalMessage {
    InternalMessage {
        role: m.role.to_string(),
        content: m.content.map(|c| match c {
            MessageContent::Text(t) => InternalContent::Text(t),
            MessageContent::Parts(parts) => InternalContent::Parts(
                parts
                    .into_iter()
                    .filter_map(|p| match p {
                        crate::core::models::openai::ContentPart::Text { text } => {
                            Some(crate::core::types::InternalContentPart::Text { text })
                        }
                        crate::core::models::openai::ContentPart::ImageUrl { image_url } => {
                            Some(crate::core::types::InternalContentPart::ImageUrl { url: image_url.url })
                        }
                        crate::core::models::openai::ContentPart::Audio { .. } => None,
                    })
                    .collect(),
            ),
        }),
        name: m.name,
        tool_calls: m.tool_calls,
        tool_call_id: m.tool_call_id,
        reasoning_content: None,
        reasoning_signature: None,
        cache_control: None,
    }
}

fn from_internal_message(m: InternalMessage) -> ChatMessage {
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

fn from_internal_delta(m: InternalMessage) -> ChatMessageDelta {
    ChatMessageDelta {
        role: Some(parse_role(&m.role)),
        content: m.content.map(content_as_text),
        function_call: None,
        tool_calls: m.tool_calls.map(|calls| {
            calls
                .into_iter()
                .enumerate()
                .map(|(index, tc)| crate::core::models::openai::ToolCallDelta {
                    index: index as u32,
                    id: Some(tc.id),
                    tool_type: Some(tc.tool_type),
                    function: Some(crate::core::models::openai::FunctionCallDelta {
                        name: Some(tc.function.name),
                        arguments: Some(tc.function.arguments),
                    }),
                })
                .collect()
        }),
        audio: None,
    }
}

fn content_as_text(c: InternalContent) -> String {
    match c {
        InternalContent::Text(t) => t,
        InternalContent::Parts(parts) => parts
            .into_iter()
            .filter_map(|p| match p {
                crate::core::types::InternalContentPart::Text { text } => Some(text),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join(""),
    }
}

fn from_internal_content(c: InternalContent) -> MessageContent {
    match c {
        InternalContent::Text(t) => MessageContent::Text(t),
        InternalContent::Parts(parts) => MessageContent::Parts(
            parts
                .into_iter()
                .map(|p| match p {
                    crate::core::types::InternalContentPart::Text { text } => {
                        crate::core::models::openai::ContentPart::Text { text }
                    }
                    crate::core::types::InternalContentPart::ImageUrl { url } => {
                        crate::core::models::openai::ContentPart::ImageUrl {
                            image_url: crate::core::models::openai::ImageUrl { url, detail: None },
                        }
                    }
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

fn to_openai_usage(u: &Usage) -> crate::core::models::openai::Usage {
    crate::core::models::openai::Usage {
        prompt_tokens: u.prompt_tokens,
        completion_tokens: u.completion_tokens,
        total_tokens: u.total_tokens,
        prompt_tokens_details: u.prompt_tokens_details.as_ref().map(|d| {
            crate::core::models::openai::PromptTokensDetails {
                cached_tokens: Some(d.cached_tokens),
                audio_tokens: None,
            }
        }),
        completion_tokens_details: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::inbound::InboundAdapter;

    #[test]
    fn identity_round_trip_preserves_model_and_content() {
        let body = br#"{"model":"gpt-4o","messages":[{"role":"user","content":"hi"}]}"#;
        let mut adapter = OpenAiChatInbound;
        let internal = adapter.transform_request(body).unwrap();
        assert_eq!(internal.model, "gpt-4o");
        assert_eq!(internal.messages.len(), 1);
        assert_eq!(internal.messages[0].role, "user");
    }

    #[test]
    fn stream_terminator_is_done_sentinel() {
        let mut adapter = OpenAiChatInbound;
        assert_eq!(adapter.stream_terminator(), b"data: [DONE]\n\n".to_vec());
    }
}
