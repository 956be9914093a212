//! Relay endpoints (spec section 6): the three caller-facing completion
//! routes plus `/v1/models`. Auth -> admission -> inbound transform ->
//! router dispatch -> monitoring record -> inbound transform back, in that
//! order, matching the pipeline spec section 2 describes.

use std::sync::Arc;
use std::time::Instant;

use actix_web::{web, HttpRequest, HttpResponse};
use futures_util::StreamExt;

use crate::auth::{authenticate_api_key, RequestFormat};
use crate::core::inbound::{new_adapter as new_inbound_adapter, InboundAdapter};
use crate::core::pricing::compute_cost;
use crate::core::router::{dispatch, dispatch_stream};
use crate::core::types::{InternalRequest, RawApiFormat};
use crate::monitoring::RecordedCall;
use crate::server::state::AppState;
use crate::utils::error::{GatewayError, Result};

fn header_str(req: &HttpRequest, name: &str) -> Option<String> {
    req.headers().get(name).and_then(|h| h.to_str().ok()).map(str::to_string)
}

fn forwarded_headers(req: &HttpRequest) -> Vec<(String, String)> {
    req.headers()
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string())))
        .collect()
}

pub async fn chat_completions(state: web::Data<AppState>, req: HttpRequest, body: web::Bytes) -> Result<HttpResponse> {
    relay(&state, &req, body, RawApiFormat::OpenaiChat).await
}

pub async fn responses(state: web::Data<AppState>, req: HttpRequest, body: web::Bytes) -> Result<HttpResponse> {
    relay(&state, &req, body, RawApiFormat::OpenaiResponses).await
}

pub async fn messages(state: web::Data<AppState>, req: HttpRequest, body: web::Bytes) -> Result<HttpResponse> {
    relay(&state, &req, body, RawApiFormat::Anthropic).await
}

pub async fn list_models(state: web::Data<AppState>, req: HttpRequest) -> Result<HttpResponse> {
    let x_api_key = header_str(&req, "x-api-key");
    let authorization = header_str(&req, "authorization");
    let (api_key, format) = authenticate_api_key(&state.cache, x_api_key.as_deref(), authorization.as_deref())?;

    let mut models: Vec<String> = state
        .cache
        .list_channels()
        .into_iter()
        .filter(|c| c.enabled)
        .flat_map(|c| c.all_models().map(str::to_string).collect::<Vec<_>>())
        .filter(|m| api_key.allows_model(m))
        .collect();
    models.sort();
    models.dedup();

    let body = match format {
        RequestFormat::OpenaiStyle => serde_json::json!({
            "object": "list",
            "data": models.iter().map(|m| serde_json::json!({"id": m, "object": "model", "owned_by": "relaycrate"})).collect::<Vec<_>>(),
        }),
        RequestFormat::AnthropicStyle => serde_json::json!({
            "data": models.iter().map(|m| serde_json::json!({"type": "model", "id": m, "display_name": m})).collect::<Vec<_>>(),
        }),
    };
    Ok(HttpResponse::Ok().json(body))
}

async fn relay(state: &AppState, req: &HttpRequest, body: web::Bytes, format: RawApiFormat) -> Result<HttpResponse> {
    let x_api_key = header_str(req, "x-api-key");
    let authorization = header_str(req, "authorization");
    let (api_key, _format_tag) = authenticate_api_key(&state.cache, x_api_key.as_deref(), authorization.as_deref())?;

    let mut adapter = new_inbound_adapter(format);
    let internal_request = adapter.transform_request(&body)?;

    if !api_key.allows_model(&internal_request.model) {
        return Err(GatewayError::forbidden("model not allowed for this API key"));
    }

    let requested_model = internal_request.model.clone();
    let is_stream = internal_request.stream;
    let started = Instant::now();

    let wait_started = Instant::now();
    let _guard = state.admission.acquire(None).await?;
    let wait_time_ms = wait_started.elapsed().as_millis() as u64;

    let forwarded = forwarded_headers(req);

    if is_stream {
        stream_relay(state, &requested_model, internal_request, forwarded, adapter, api_key.id, wait_time_ms, started, body)
            .await
    } else {
        oneshot_relay(state, &requested_model, internal_request, forwarded, adapter, api_key.id, wait_time_ms, started, body)
            .await
    }
}

#[allow(clippy::too_many_arguments)]
async fn oneshot_relay(
    state: &AppState,
    requested_model: &str,
    internal_request: InternalRequest,
    forwarded: Vec<(String, String)>,
    mut adapter: Box<dyn InboundAdapter>,
    api_key_id: i64,
    wait_time_ms: u64,
    started: Instant,
    raw_request_body: web::Bytes,
) -> Result<HttpResponse> {
    let system_proxy_url = state.system_proxy_url();
    let outcome = dispatch(&state.cache, &state.transport, system_proxy_url.as_deref(), requested_model, internal_request, &forwarded).await;

    let request_json = serde_json::from_slice(&raw_request_body).unwrap_or(serde_json::Value::Null);
    let total_ms = started.elapsed().as_millis() as u64;

    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(e) => {
            record(
                state,
                RecordedCall {
                    requested_model: requested_model.to_string(),
                    actual_model: requested_model.to_string(),
                    channel_id: 0,
                    channel_name: String::new(),
                    api_key_id,
                    success: false,
                    wait_time_ms,
                    input_tokens: 0,
                    output_tokens: 0,
                    input_cost: 0.0,
                    output_cost: 0.0,
                    first_token_ms: None,
                    total_ms,
                    request_json,
                    response_json: serde_json::Value::Null,
                    error: Some(e.to_string()),
                },
            )
            .await;
            return Err(e);
        }
    };

    let body_out = adapter.transform_response(&outcome.response)?;
    let cost = outcome
        .response
        .usage
        .as_ref()
        .map(|u| compute_cost(&state.cache.prices, &outcome.item.upstream_model, outcome.channel.id, u))
        .unwrap_or_default();

    record(
        state,
        RecordedCall {
            requested_model: requested_model.to_string(),
            actual_model: outcome.item.upstream_model.clone(),
            channel_id: outcome.channel.id,
            channel_name: outcome.channel.name.clone(),
            api_key_id,
            success: true,
            wait_time_ms,
            input_tokens: outcome.response.usage.as_ref().map(|u| u.prompt_tokens).unwrap_or(0),
            output_tokens: outcome.response.usage.as_ref().map(|u| u.completion_tokens).unwrap_or(0),
            input_cost: cost.input_cost,
            output_cost: cost.output_cost,
            first_token_ms: Some(total_ms),
            total_ms,
            request_json,
            response_json: serde_json::from_slice(&body_out).unwrap_or(serde_json::Value::Null),
            error: None,
        },
    )
    .await;

    Ok(HttpResponse::Ok().content_type("application/json").body(body_out))
}

#[allow(clippy::too_many_arguments)]
async fn stream_relay(
    state: &AppState,
    requested_model: &str,
    internal_request: InternalRequest,
    forwarded: Vec<(String, String)>,
    mut adapter: Box<dyn InboundAdapter>,
    api_key_id: i64,
    wait_time_ms: u64,
    started: Instant,
    raw_request_body: web::Bytes,
) -> Result<HttpResponse> {
    let system_proxy_url = state.system_proxy_url();
    let outcome =
        dispatch_stream(&state.cache, &state.transport, system_proxy_url.as_deref(), requested_model, internal_request, forwarded).await;

    let request_json = serde_json::from_slice::<serde_json::Value>(&raw_request_body).unwrap_or(serde_json::Value::Null);

    let (channel, item, mut inner) = match outcome {
        Ok(v) => v,
        Err(e) => {
            record(
                state,
                RecordedCall {
                    requested_model: requested_model.to_string(),
                    actual_model: requested_model.to_string(),
                    channel_id: 0,
                    channel_name: String::new(),
                    api_key_id,
                    success: false,
                    wait_time_ms,
                    input_tokens: 0,
                    output_tokens: 0,
                    input_cost: 0.0,
                    output_cost: 0.0,
                    first_token_ms: None,
                    total_ms: started.elapsed().as_millis() as u64,
                    request_json,
                    response_json: serde_json::Value::Null,
                    error: Some(e.to_string()),
                },
            )
            .await;
            return Err(e);
        }
    };

    let cache = Arc::clone(&state.cache);
    let monitoring = Arc::clone(&state.monitoring);
    let requested_model = requested_model.to_string();
    let channel_id = channel.id;
    let channel_name = channel.name;
    let actual_model = item.upstream_model;

    let body_stream = async_stream::stream! {
        let mut last_usage: Option<crate::core::types::Usage> = None;
        let mut response_text = String::new();
        let mut error: Option<String> = None;
        let mut first_chunk_ms: Option<u64> = None;

        loop {
            match inner.next().await {
                Some(Ok(resp)) => {
                    if resp.usage.is_some() {
                        last_usage = resp.usage.clone();
                    }
                    match adapter.transform_stream(&resp) {
                        Ok(bytes) if !bytes.is_empty() => {
                            if first_chunk_ms.is_none() {
                                first_chunk_ms = Some(started.elapsed().as_millis() as u64);
                            }
                            response_text.push_str(&String::from_utf8_lossy(&bytes));
                            yield Ok::<web::Bytes, actix_web::Error>(web::Bytes::from(bytes));
                        }
                        Ok(_) => {}
                        Err(e) => {
                            error = Some(e.to_string());
                            break;
                        }
                    }
                }
                Some(Err(e)) => {
                    tracing::warn!(channel_id, error = %e, "upstream stream failed after first byte");
                    error = Some(e.to_string());
                    break;
                }
                None => break,
            }
        }

        let terminator = adapter.stream_terminator();
        if !terminator.is_empty() {
            response_text.push_str(&String::from_utf8_lossy(&terminator));
            yield Ok(web::Bytes::from(terminator));
        }

        let cost = last_usage
            .as_ref()
            .map(|u| compute_cost(&cache.prices, &actual_model, channel_id, u))
            .unwrap_or_default();

        let call = RecordedCall {
            requested_model,
            actual_model,
            channel_id,
            channel_name,
            api_key_id,
            success: true,
            wait_time_ms,
            input_tokens: last_usage.as_ref().map(|u| u.prompt_tokens).unwrap_or(0),
            output_tokens: last_usage.as_ref().map(|u| u.completion_tokens).unwrap_or(0),
            input_cost: cost.input_cost,
            output_cost: cost.output_cost,
            first_token_ms: first_chunk_ms,
            total_ms: started.elapsed().as_millis() as u64,
            request_json,
            response_json: serde_json::Value::String(response_text),
            error,
        };
        if let Err(e) = monitoring.record(call).await {
            tracing::warn!(error = %e, "failed to record streaming relay call");
        }
    };

    Ok(HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("Cache-Control", "no-cache"))
        .insert_header(("X-Accel-Buffering", "no"))
        .streaming(body_stream))
}

async fn record(state: &AppState, call: RecordedCall) {
    if let Err(e) = state.monitoring.record(call).await {
        tracing::warn!(error = %e, "failed to record relay call");
    }
}
