//! Inbound adapters: caller wire format <-> [`InternalRequest`]/[`InternalResponse`]
//! (spec section 4.5).
//!
//! Each adapter is **per-request stateful** — one instance is obtained per
//! relay call and owns SSE-assembly state for that call only. Factories are
//! keyed on [`crate::core::types::RawApiFormat`] per spec section 9's
//! "polymorphic inbound/outbound dispatch" pattern.

pub mod anthropic;
pub mod openai_chat;
pub mod openai_responses;

use crate::core::types::{InternalRequest, InternalResponse, RawApiFormat};
use crate::utils::error::Result;

pub trait InboundAdapter: Send {
    fn transform_request(&mut self, body: &[u8]) -> Result<InternalRequest>;
    fn transform_response(&mut self, resp: &InternalResponse) -> Result<Vec<u8>>;
    /// One SSE frame (or several concatenated) for this chunk; empty when
    /// the chunk produced no caller-visible event yet (e.g. buffered state).
    fn transform_stream(&mut self, resp: &InternalResponse) -> Result<Vec<u8>>;
    /// Emitted once after the upstream stream ends. OpenAI-shaped adapters
    /// emit `data: [DONE]\n\n`; Anthropic's terminator is folded into the
    /// `message_stop` event already emitted by `transform_stream`.
    fn stream_terminator(&mut self) -> Vec<u8> {
        Vec::new()
    }
}

pub fn new_adapter(format: RawApiFormat) -> Box<dyn InboundAdapter> {
    match format {
        RawApiFormat::OpenaiChat => Box::new(openai_chat::OpenAiChatInbound::default()),
        RawApiFormat::OpenaiResponses => Box::new(openai_responses::OpenAiResponsesInbound::default()),
        RawApiFormat::Anthropic => Box::new(anthropic::AnthropicInbound::default()),
    }
}

pub(crate) fn sse_frame(event: Option<&str>, data: &impl serde::Serialize) -> Result<Vec<u8>> {
    let json = serde_json::to_string(data)?;
    Ok(match event {
        Some(ev) => format!("event:{ev}\ndata:{json}\n\n").into_bytes(),
        None => format!("data: {json}\n\n").into_bytes(),
    })
}
