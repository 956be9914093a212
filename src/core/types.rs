//! Provider-neutral data model (spec section 3).
//!
//! `InternalRequest`/`InternalResponse` are the pivot every inbound and
//! outbound adapter translates to and from; everything else here is the
//! entity model the cache and durable store share.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::models::openai::ToolCall;

/// One upstream provider endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub id: i64,
    pub name: String,
    pub provider: ProviderKind,
    pub base_url: String,
    /// Bearer token, `x-api-key`, or (Antigravity) an OAuth access/refresh token.
    pub credential: String,
    pub models: Vec<String>,
    pub custom_models: Vec<String>,
    pub proxy_mode: ProxyMode,
    pub auto_sync: bool,
    pub auto_group: bool,
    pub enabled: bool,
}

impl Channel {
    /// Full set of model names this channel can serve.
    pub fn all_models(&self) -> impl Iterator<Item = &str> {
        self.models.iter().chain(self.custom_models.iter()).map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    OpenaiChat,
    OpenaiResponse,
    Anthropic,
    Gemini,
    Antigravity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProxyMode {
    None,
    System,
    CustomUrl,
}

/// Routing bucket: a logical model name resolves to an ordered list of
/// `(channel, upstream model name)` pairs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: i64,
    pub name: String,
    pub match_regex: Option<String>,
    pub mode: SelectionMode,
    pub items: Vec<GroupItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    Priority,
    Weighted,
    RoundRobin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupItem {
    pub channel_id: i64,
    pub upstream_model: String,
    pub priority: i32,
    pub weight: u32,
}

/// Caller credential for relay endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: i64,
    /// `sk-<app>-<random>`.
    pub key: String,
    pub enabled: bool,
    /// Unix epoch seconds; 0 means no expiry.
    pub expire_at: i64,
    /// 0 means unlimited.
    pub max_cost: f64,
    /// Consumed cost so far, read from the per-key counter.
    pub consumed_cost: f64,
    /// Empty means all models allowed.
    pub allowed_models: Vec<String>,
}

impl ApiKey {
    /// `enabled ∧ (expire=0 ∨ expire>now) ∧ (max_cost=0 ∨ consumed<max_cost)`.
    pub fn is_usable(&self, now: i64) -> Result<(), &'static str> {
        if !self.enabled {
            return Err("API key is disabled");
        }
        if self.expire_at != 0 && self.expire_at <= now {
            return Err("API key has expired");
        }
        if self.max_cost > 0.0 && self.consumed_cost >= self.max_cost {
            return Err("API key has reached the max cost");
        }
        Ok(())
    }

    pub fn allows_model(&self, model: &str) -> bool {
        self.allowed_models.is_empty() || self.allowed_models.iter().any(|m| m == model)
    }
}

/// `(model, channel) -> price` in micro-units per token, with a
/// process-wide `(model) -> price` fallback entry when `channel_id` is `None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceEntry {
    pub model: String,
    pub channel_id: Option<i64>,
    pub input: f64,
    pub output: f64,
    pub cache_read: f64,
    pub cache_write: f64,
}

/// Operator-editable runtime setting (distinct from [`crate::config::Config`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Setting {
    pub key: String,
    pub value: String,
}

pub mod setting_keys {
    pub const PROXY_URL: &str = "proxy_url";
    pub const STATS_SAVE_INTERVAL: &str = "stats_save_interval";
    pub const MODEL_INFO_UPDATE_INTERVAL: &str = "model_info_update_interval";
    pub const RELAY_LOG_KEEP_PERIOD: &str = "relay_log_keep_period";
    pub const SYNC_LLM_INTERVAL: &str = "sync_llm_interval";
    pub const ANTHROPIC_CACHE_TTL_PASSTHROUGH: &str = "anthropic_cache_ttl_passthrough";
}

/// Cache-control marker carried at message, part, or tool granularity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheControl {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<String>,
}

/// Stop sequence(s); Anthropic sends an array, OpenAI historically a string or array.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Stop {
    One(String),
    Many(Vec<String>),
}

impl Stop {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            Stop::One(s) => vec![s],
            Stop::Many(v) => v,
        }
    }
}

/// Provider-neutral chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InternalMessage {
    pub role: String,
    pub content: Option<InternalContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<CacheControl>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InternalContent {
    Text(String),
    Parts(Vec<InternalContentPart>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InternalContentPart {
    Text { text: String },
    ImageUrl { url: String },
}

/// Provider-neutral request, the pivot every inbound adapter normalizes into.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InternalRequest {
    pub model: String,
    pub messages: Vec<InternalMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<crate::core::models::openai::Tool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<crate::core::models::openai::ToolChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_budget: Option<u32>,
    /// Which inbound wire format this request arrived as; carried through so
    /// the matching outbound response shape can be reconstructed.
    pub raw_api_format: RawApiFormat,
    /// Adapter-specific bits that don't fit the common shape, e.g.
    /// `anthropic_system_array_format`.
    #[serde(default)]
    pub transformer_metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RawApiFormat {
    OpenaiChat,
    OpenaiResponses,
    Anthropic,
}

/// Provider-neutral response / streaming chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InternalResponse {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub model: String,
    pub choices: Vec<Choice>,
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub index: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<InternalMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta: Option<InternalMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_tokens_details: Option<PromptTokensDetails>,
    /// Anthropic-only: tokens spent creating a new cache entry.
    #[serde(default)]
    pub cache_creation_input_tokens: u32,
    /// When true, `prompt_tokens` already includes `cached_tokens`
    /// (Anthropic convention) rather than excluding them (OpenAI convention).
    #[serde(default)]
    pub anthropic_usage: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptTokensDetails {
    #[serde(default)]
    pub cached_tokens: u32,
}

/// Per-request accounting delta, summed into total/per-channel/per-key/hour/day buckets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatsMetrics {
    pub request_success: u64,
    pub request_failed: u64,
    pub wait_time_ms: u64,
    pub input_token: u64,
    pub output_token: u64,
    pub input_cost: f64,
    pub output_cost: f64,
}

impl StatsMetrics {
    pub fn merge(&mut self, other: &StatsMetrics) {
        self.request_success += other.request_success;
        self.request_failed += other.request_failed;
        self.wait_time_ms += other.wait_time_ms;
        self.input_token += other.input_token;
        self.output_token += other.output_token;
        self.input_cost += other.input_cost;
        self.output_cost += other.output_cost;
    }
}

/// One record per completed relay call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayLog {
    pub timestamp: i64,
    pub requested_model: String,
    pub actual_model: String,
    pub channel_id: i64,
    pub channel_name: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub first_token_ms: Option<u64>,
    pub total_ms: u64,
    pub cost: f64,
    pub request_json: serde_json::Value,
    pub response_json: serde_json::Value,
    pub error: Option<String>,
}

/// Redact inline image data before a request/response body is logged,
/// bounding storage (spec section 4.8).
pub fn redact_images_for_log(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            if let Some(t) = map.get("type").and_then(|v| v.as_str())
                && (t == "image_url" || t == "image")
            {
                map.insert(
                    "redacted".to_string(),
                    serde_json::Value::String("[image data omitted for storage]".to_string()),
                );
                map.remove("image_url");
                map.remove("source");
                return;
            }
            for v in map.values_mut() {
                redact_images_for_log(v);
            }
        }
        serde_json::Value::Array(items) => {
            for v in items.iter_mut() {
                redact_images_for_log(v);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_enforces_max_cost() {
        let key = ApiKey {
            id: 1,
            key: "sk-relay-x".into(),
            enabled: true,
            expire_at: 0,
            max_cost: 0.001,
            consumed_cost: 0.0015,
            allowed_models: vec![],
        };
        assert_eq!(key.is_usable(1000).unwrap_err(), "API key has reached the max cost");
    }

    #[test]
    fn api_key_allows_all_models_when_list_empty() {
        let key = ApiKey {
            id: 1,
            key: "sk-relay-x".into(),
            enabled: true,
            expire_at: 0,
            max_cost: 0.0,
            consumed_cost: 0.0,
            allowed_models: vec![],
        };
        assert!(key.allows_model("anything"));
    }

    #[test]
    fn redact_images_strips_nested_image_parts() {
        let mut v = serde_json::json!({
            "messages": [{"role": "user", "content": [
                {"type": "text", "text": "hi"},
                {"type": "image_url", "image_url": {"url": "data:..."}}
            ]}]
        });
        redact_images_for_log(&mut v);
        let part = &v["messages"][0]["content"][1];
        assert!(part.get("image_url").is_none());
        assert_eq!(part["redacted"], "[image data omitted for storage]");
    }
}
