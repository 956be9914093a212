//! Outbound adapters: [`InternalRequest`] -> provider HTTP request, and a
//! provider's response/stream -> [`InternalResponse`] (spec section 4.6).
//!
//! Mirrors the inbound side's polymorphic dispatch (spec section 9): one
//! adapter per [`ProviderKind`], a shared `{transform_request,
//! transform_response, transform_stream}` surface, and a factory keyed on
//! the enum. `transform_request` is async because Antigravity's credential
//! may require an OAuth refresh round-trip before the request can be built.

pub mod antigravity;
pub mod anthropic;
pub mod gemini;
pub mod generic_openai;

use async_trait::async_trait;
use reqwest::Method;

use crate::core::types::{InternalRequest, InternalResponse, ProviderKind};
use crate::utils::error::Result;

/// Provider-neutral description of the HTTP request an adapter wants sent.
/// The router fills in the caller's forwarded headers (minus hop-by-hop)
/// before handing this to the transport pool.
#[derive(Debug, Clone)]
pub struct OutboundHttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl OutboundHttpRequest {
    pub fn post(url: impl Into<String>, body: Vec<u8>) -> Self {
        Self { method: Method::POST, url: url.into(), headers: Vec::new(), body }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

#[async_trait]
pub trait OutboundAdapter: Send {
    async fn transform_request(
        &mut self,
        request: &InternalRequest,
        base_url: &str,
        credential: &str,
    ) -> Result<OutboundHttpRequest>;

    fn transform_response(&mut self, body: &[u8]) -> Result<InternalResponse>;

    /// `Ok(None)` when an event produced no caller-visible chunk (a
    /// keep-alive comment, or the `[DONE]` sentinel already folded into the
    /// terminator).
    fn transform_stream(&mut self, event_data: &[u8]) -> Result<Option<InternalResponse>>;
}

pub fn new_adapter(kind: ProviderKind) -> Box<dyn OutboundAdapter> {
    match kind {
        ProviderKind::OpenaiChat => Box::new(generic_openai::OpenAiOutbound::chat()),
        ProviderKind::OpenaiResponse => Box::new(generic_openai::OpenAiOutbound::responses()),
        ProviderKind::Anthropic => Box::new(anthropic::AnthropicOutbound::default()),
        ProviderKind::Gemini => Box::new(gemini::GeminiOutbound::default()),
        ProviderKind::Antigravity => Box::new(antigravity::AntigravityOutbound::new()),
    }
}
