//! Antigravity outbound adapter (spec 4.6), grounded on a reference
//! Antigravity transformer: an OAuth-fronted Gemini variant. A credential
//! starting with `1//` is a refresh token exchanged for a short-lived
//! access token; the access token is cached process-wide and refreshed
//! 5 minutes ahead of expiry. Always targets the streaming endpoint, even
//! for non-streaming calls, since the non-stream endpoint needs additional
//! permissions most credentials don't have.

use std::sync::OnceLock;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::core::outbound::{OutboundAdapter, OutboundHttpRequest};
use crate::core::types::{Choice, InternalContent, InternalMessage, InternalRequest, InternalResponse, Usage};
use crate::utils::error::{GatewayError, Result};

const DEFAULT_BASE_URL: &str = "https://daily-cloudcode-pa.sandbox.googleapis.com";
const STREAM_PATH: &str = "/v1internal:streamGenerateContent";
const USER_AGENT: &str = "antigravity/1.11.3 windows/amd64";
const CLIENT_ID: &str = "1071006060591-tmhssin2h21lcre235vtolojh4g403ep.apps.googleusercontent.com";
const CLIENT_SECRET: &str = "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";
const TOKEN_REFRESH_THRESHOLD_SECS: i64 = 5 * 60;
const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 8096;
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

struct CachedToken {
    access_token: String,
    expires_at: i64,
}

fn token_cache() -> &'static DashMap<String, CachedToken> {
    static CACHE: OnceLock<DashMap<String, CachedToken>> = OnceLock::new();
    CACHE.get_or_init(DashMap::new)
}

fn token_http_client() -> &'static reqwest::Client {
    static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();
    CLIENT.get_or_init(|| reqwest::Client::builder().build().expect("default reqwest client"))
}

fn now_secs() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO).as_secs() as i64
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

async fn refresh_access_token(refresh_token: &str) -> Result<TokenResponse> {
    let response = token_http_client()
        .post(TOKEN_URL)
        .header("Host", "oauth2.googleapis.com")
        .header("User-Agent", USER_AGENT)
        .form(&[
            ("client_id", CLIENT_ID),
            ("client_secret", CLIENT_SECRET),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(GatewayError::upstream_unavailable(format!(
            "antigravity token refresh failed ({status}): {body}"
        )));
    }

    Ok(response.json().await?)
}

/// Resolves a channel credential to a bearer-usable access token, refreshing
/// through the cache when it is a `1//`-prefixed refresh token nearing expiry.
async fn resolve_access_token(credential: &str) -> Result<String> {
    let credential = credential.trim();
    if !credential.starts_with("1//") {
        return Ok(credential.to_string());
    }

    if let Some(entry) = token_cache().get(credential)
        && entry.expires_at > now_secs() + TOKEN_REFRESH_THRESHOLD_SECS
    {
        return Ok(entry.access_token.clone());
    }

    let token = refresh_access_token(credential).await?;
    let cached = CachedToken {
        access_token: token.access_token.clone(),
        expires_at: now_secs() + token.expires_in,
    };
    token_cache().insert(credential.to_string(), cached);
    Ok(token.access_token)
}

#[derive(Default)]
pub struct AntigravityOutbound {
    model: String,
}

impl AntigravityOutbound {
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Debug, Serialize)]
struct OuterRequest {
    model: String,
    request: InnerRequest,
}

#[derive(Debug, Serialize)]
struct InnerRequest {
    contents: Vec<ContentOut>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct ContentOut {
    role: &'static str,
    parts: Vec<PartOut>,
}

#[derive(Debug, Serialize)]
struct PartOut {
    text: String,
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

fn text_of(msg: &InternalMessage) -> String {
    match &msg.content {
        Some(InternalContent::Text(t)) => t.clone(),
        Some(InternalContent::Parts(parts)) => parts
            .iter()
            .filter_map(|p| match p {
                crate::core::types::InternalContentPart::Text { text } => Some(text.clone()),
                crate::core::types::InternalContentPart::ImageUrl { .. } => None,
            })
            .collect::<Vec<_>>()
            .join(""),
        None => String::new(),
    }
}

fn convert_messages(messages: &[InternalMessage]) -> Vec<ContentOut> {
    messages
        .iter()
        .filter(|m| !text_of(m).is_empty())
        .map(|m| {
            let role = if m.role == "assistant" { "model" } else { "user" };
            ContentOut { role, parts: vec![PartOut { text: text_of(m) }] }
        })
        .collect()
}

#[async_trait]
impl OutboundAdapter for AntigravityOutbound {
    async fn transform_request(
        &mut self,
        request: &InternalRequest,
        base_url: &str,
        credential: &str,
    ) -> Result<OutboundHttpRequest> {
        self.model = request.model.clone();
        let access_token = resolve_access_token(credential).await?;

        let body = OuterRequest {
            model: request.model.clone(),
            request: InnerRequest {
                contents: convert_messages(&request.messages),
                generation_config: GenerationConfig {
                    temperature: request.temperature,
                    top_p: request.top_p,
                    max_output_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_OUTPUT_TOKENS),
                },
            },
        };

        let base = if base_url.is_empty() { DEFAULT_BASE_URL } else { base_url.trim_end_matches('/') };
        let url = format!("{base}{STREAM_PATH}?alt=sse");

        Ok(OutboundHttpRequest::post(url, serde_json::to_vec(&body)?)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {access_token}"))
            .header("User-Agent", USER_AGENT)
            .header("Accept", "text/event-stream"))
    }

    fn transform_response(&mut self, body: &[u8]) -> Result<InternalResponse> {
        let resp: AntigravityResponse =
            serde_json::from_slice(body).map_err(|e| GatewayError::upstream_unavailable(e.to_string()))?;
        Ok(self.to_internal(resp))
    }

    fn transform_stream(&mut self, event_data: &[u8]) -> Result<Option<InternalResponse>> {
        if event_data.is_empty() || event_data == b"[DONE]" {
            return Ok(None);
        }
        let resp: AntigravityResponse =
            serde_json::from_slice(event_data).map_err(|e| GatewayError::upstream_unavailable(e.to_string()))?;
        let mut internal = self.to_internal(resp);
        internal.object = "chat.completion.chunk".to_string();
        for choice in &mut internal.choices {
            choice.delta = choice.message.take();
        }
        Ok(Some(internal))
    }
}

impl AntigravityOutbound {
    fn to_internal(&self, resp: AntigravityResponse) -> InternalResponse {
        let candidate = resp.response.candidates.into_iter().next();
        let (content, finish_reason) = match candidate {
            Some(c) => {
                let text = c
                    .content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.get("text").and_then(|t| t.as_str()).map(str::to_string))
                    .collect::<Vec<_>>()
                    .join("");
                let message = InternalMessage {
                    role: "assistant".to_string(),
                    content: if text.is_empty() { None } else { Some(InternalContent::Text(text)) },
                    name: None,
                    tool_calls: None,
                    tool_call_id: None,
                    reasoning_content: None,
                    reasoning_signature: None,
                    cache_control: None,
                };
                (Some(message), c.finish_reason)
            }
            None => (None, None),
        };
        InternalResponse {
            id: resp.trace_id.unwrap_or_default(),
            object: "chat.completion".to_string(),
            created: 0,
            model: self.model.clone(),
            choices: vec![Choice { index: 0, message: content, delta: None, finish_reason }],
            usage: resp.response.usage_metadata.map(|u| Usage {
                prompt_tokens: u.prompt_token_count,
                completion_tokens: u.candidates_token_count,
                total_tokens: u.total_token_count,
                ..Default::default()
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AntigravityResponse {
    response: AntigravityInnerResponse,
    #[serde(rename = "traceId", default)]
    trace_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AntigravityInnerResponse {
    #[serde(default)]
    candidates: Vec<AntigravityCandidate>,
    #[serde(rename = "usageMetadata", default)]
    usage_metadata: Option<AntigravityUsage>,
}

#[derive(Debug, Deserialize)]
struct AntigravityCandidate {
    content: AntigravityContent,
    #[serde(rename = "finishReason", default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AntigravityContent {
    #[serde(default)]
    parts: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct AntigravityUsage {
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
            model: "gemini-2.0-flash".to_string(),
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
    async fn plain_access_token_credential_is_used_as_is() {
        let mut adapter = AntigravityOutbound::new();
        let out = adapter.transform_request(&request(), "", "ya29.plain-access-token").await.unwrap();
        assert!(out.url.contains("streamGenerateContent"));
        assert!(
            out.headers.contains(&("Authorization".to_string(), "Bearer ya29.plain-access-token".to_string()))
        );
    }

    #[test]
    fn response_parses_trace_id_and_usage() {
        let mut adapter = AntigravityOutbound::new();
        let body = br#"{"response":{"candidates":[{"content":{"parts":[{"text":"hi"}]},"finishReason":"STOP"}],
            "usageMetadata":{"promptTokenCount":1,"candidatesTokenCount":1,"totalTokenCount":2}},"traceId":"t1"}"#;
        let resp = adapter.transform_response(body).unwrap();
        assert_eq!(resp.id, "t1");
        assert_eq!(resp.usage.unwrap().total_tokens, 2);
    }
}
