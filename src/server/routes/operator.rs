//! Operator surface (spec section 6): login, CRUD over channels/groups/API
//! keys, read-only log/stats, and the SSE log stream. Every route here
//! except `login` and `log_stream` runs behind [`super::super::middleware::auth::OperatorJwtMiddleware`].

use std::sync::Arc;
use std::time::Duration;

use actix_web::{web, HttpResponse};
use serde::Deserialize;

use crate::core::types::{ApiKey, Channel, Group};
use crate::server::state::AppState;
use crate::utils::error::{GatewayError, Result};

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub expires: Option<i64>,
}

pub async fn login(state: web::Data<AppState>, body: web::Json<LoginRequest>) -> Result<HttpResponse> {
    let token = state.operator_auth.login(&body.username, &body.password, body.expires)?;
    Ok(HttpResponse::Ok().json(serde_json::json!({"token": token})))
}

pub async fn issue_stream_token(state: web::Data<AppState>) -> HttpResponse {
    let token = state.operator_auth.issue_stream_token();
    HttpResponse::Ok().json(serde_json::json!({"token": token}))
}

pub async fn list_api_keys(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(state.cache.list_api_keys())
}

#[derive(Deserialize, Default)]
pub struct CreateApiKeyRequest {
    #[serde(default)]
    pub allowed_models: Vec<String>,
    #[serde(default)]
    pub max_cost: f64,
    #[serde(default)]
    pub expire_at: i64,
}

pub async fn create_api_key(state: web::Data<AppState>, body: web::Json<CreateApiKeyRequest>) -> Result<HttpResponse> {
    let next_id = state.cache.list_api_keys().iter().map(|k| k.id).max().unwrap_or(0) + 1;
    let mut key = state.cache.create_api_key(&state.config.auth.app_name, next_id).await?;
    key.allowed_models = body.allowed_models.clone();
    key.max_cost = body.max_cost;
    key.expire_at = body.expire_at;
    state.cache.put_api_key(key.clone()).await?;
    Ok(HttpResponse::Ok().json(key))
}

#[derive(Deserialize, Default)]
pub struct UpdateApiKeyRequest {
    pub enabled: Option<bool>,
    pub allowed_models: Option<Vec<String>>,
    pub max_cost: Option<f64>,
    pub expire_at: Option<i64>,
}

pub async fn update_api_key(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<UpdateApiKeyRequest>,
) -> Result<HttpResponse> {
    let key_value = path.into_inner();
    let mut key: ApiKey = state
        .cache
        .api_key(&key_value)
        .ok_or_else(|| GatewayError::validation(format!("unknown api key: {key_value}")))?;
    if let Some(v) = body.enabled {
        key.enabled = v;
    }
    if let Some(v) = body.allowed_models.clone() {
        key.allowed_models = v;
    }
    if let Some(v) = body.max_cost {
        key.max_cost = v;
    }
    if let Some(v) = body.expire_at {
        key.expire_at = v;
    }
    state.cache.put_api_key(key.clone()).await?;
    Ok(HttpResponse::Ok().json(key))
}

pub async fn delete_api_key(state: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse> {
    state.cache.delete_api_key(&path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

pub async fn list_channels(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(state.cache.list_channels())
}

pub async fn put_channel(state: web::Data<AppState>, body: web::Json<Channel>) -> Result<HttpResponse> {
    let channel = body.into_inner();
    state.cache.put_channel(channel.clone()).await?;
    Ok(HttpResponse::Ok().json(channel))
}

pub async fn delete_channel(state: web::Data<AppState>, path: web::Path<i64>) -> Result<HttpResponse> {
    state.cache.delete_channel(path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

pub async fn list_groups(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(state.cache.list_groups())
}

pub async fn put_group(state: web::Data<AppState>, body: web::Json<Group>) -> Result<HttpResponse> {
    let group = body.into_inner();
    state.cache.put_group(group.clone()).await?;
    Ok(HttpResponse::Ok().json(group))
}

pub async fn delete_group(state: web::Data<AppState>, path: web::Path<i64>) -> Result<HttpResponse> {
    state.cache.delete_group(path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[derive(Deserialize)]
pub struct LogQuery {
    #[serde(default = "default_log_limit")]
    pub limit: u64,
}

fn default_log_limit() -> u64 {
    100
}

pub async fn list_logs(state: web::Data<AppState>, query: web::Query<LogQuery>) -> Result<HttpResponse> {
    let logs = state.monitoring.recent_logs(query.limit).await?;
    Ok(HttpResponse::Ok().json(logs))
}

pub async fn stats(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(state.monitoring.snapshot())
}

/// Settings are read through `EntityCache::setting`; writing them back is
/// out of scope (spec section 4's Non-goals) until a dedicated settings
/// schema lands, so this endpoint is reserved but unimplemented.
pub async fn update_stub() -> HttpResponse {
    HttpResponse::NotImplemented().json(serde_json::json!({
        "error": {"code": "not_implemented", "message": "settings update is not implemented"}
    }))
}

#[derive(Deserialize)]
pub struct LogStreamQuery {
    pub token: String,
}

const LOG_STREAM_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Fans out newly recorded `RelayLog`s as SSE events. Auth is the one-time
/// `token` query parameter rather than the JWT bearer scheme, since
/// `EventSource` cannot set custom request headers.
pub async fn log_stream(state: web::Data<AppState>, query: web::Query<LogStreamQuery>) -> Result<HttpResponse> {
    if !state.operator_auth.consume_stream_token(&query.token) {
        return Err(GatewayError::unauthorized("invalid or expired stream token"));
    }

    let monitoring = Arc::clone(&state.monitoring);
    let stream = async_stream::stream! {
        let mut last_timestamp = 0i64;
        let mut ticker = tokio::time::interval(LOG_STREAM_POLL_INTERVAL);
        loop {
            ticker.tick().await;
            let logs = match monitoring.recent_logs(50).await {
                Ok(logs) => logs,
                Err(e) => {
                    tracing::warn!(error = %e, "log stream poll failed");
                    continue;
                }
            };
            for log in logs.into_iter() {
                if log.timestamp <= last_timestamp {
                    continue;
                }
                last_timestamp = last_timestamp.max(log.timestamp);
                let payload = serde_json::to_vec(&log).unwrap_or_default();
                let mut frame = b"data: ".to_vec();
                frame.extend_from_slice(&payload);
                frame.extend_from_slice(b"\n\n");
                yield Ok::<web::Bytes, actix_web::Error>(web::Bytes::from(frame));
            }
        }
    };

    Ok(HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("Cache-Control", "no-cache"))
        .insert_header(("X-Accel-Buffering", "no"))
        .streaming(stream))
}
