//! Router and failover (spec section 4.7), grounded on a reference relay
//! handler: resolve the logical model to a group, select a channel, build
//! and send the outbound request, and on any failure before the first
//! upstream byte, advance to the next channel in the group transparently.
//! Only once every item in the group has been tried does the caller see a
//! `502 bad_gateway`.

use futures_util::{Stream, StreamExt};

use crate::core::cache::{EntityCache, model_not_found};
use crate::core::outbound::new_adapter;
use crate::core::types::{Channel, GroupItem, InternalRequest, InternalResponse};
use crate::utils::error::{GatewayError, Result};
use crate::utils::net::{ProxyPolicy, TransportPool};

/// Request headers that must never be forwarded verbatim to an upstream:
/// either they're hop-by-hop (RFC 7230) or the outbound adapter already
/// set its own value for them (`Authorization`, `x-api-key`, `Content-Length`).
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "authorization",
    "x-api-key",
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "content-length",
    "host",
    "accept-encoding",
];

fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP_HEADERS.iter().any(|h| h.eq_ignore_ascii_case(name))
}

fn build_client(
    transport: &TransportPool,
    channel: &Channel,
    system_proxy_url: Option<&str>,
) -> Result<reqwest::Client> {
    let policy = ProxyPolicy::from_channel(channel.proxy_mode, None);
    transport.client_for(&policy, system_proxy_url)
}

/// One completed, successful relay attempt (non-streaming).
pub struct RelayOutcome {
    pub channel: Channel,
    pub item: GroupItem,
    pub response: InternalResponse,
}

/// Non-streaming failover loop: try each eligible item in the model's group
/// in selection order until one returns a successful parseable response.
pub async fn dispatch(
    cache: &EntityCache,
    transport: &TransportPool,
    system_proxy_url: Option<&str>,
    requested_model: &str,
    mut internal_request: InternalRequest,
    forwarded_headers: &[(String, String)],
) -> Result<RelayOutcome> {
    let group = cache.group_for_model(requested_model).ok_or_else(|| model_not_found(requested_model))?;
    let mut item = cache
        .select_item(&group)
        .ok_or_else(|| GatewayError::upstream_unavailable("no channel available for group"))?;

    loop {
        let Some(channel) = cache.channel(item.channel_id) else {
            item = advance_or_fail(cache, &group, item)?;
            continue;
        };
        if !channel.enabled {
            item = advance_or_fail(cache, &group, item)?;
            continue;
        }

        internal_request.model = item.upstream_model.clone();
        let mut adapter = new_adapter(channel.provider);

        let built = match adapter
            .transform_request(&internal_request, &channel.base_url, &channel.credential)
            .await
        {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(channel_id = channel.id, error = %e, "outbound request build failed");
                item = advance_or_fail(cache, &group, item)?;
                continue;
            }
        };

        let client = build_client(transport, &channel, system_proxy_url)?;
        let request = match to_reqwest_request(&client, &built, forwarded_headers) {
            Ok(r) => r,
            Err(e) => return Err(e),
        };

        let response = match client.execute(request).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(channel_id = channel.id, error = %e, "outbound request failed");
                item = advance_or_fail(cache, &group, item)?;
                continue;
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(channel_id = channel.id, %status, body, "upstream returned an error status");
            item = advance_or_fail(cache, &group, item)?;
            continue;
        }

        let body = match response.bytes().await {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(channel_id = channel.id, error = %e, "failed reading upstream body");
                item = advance_or_fail(cache, &group, item)?;
                continue;
            }
        };

        return match adapter.transform_response(&body) {
            Ok(parsed) => Ok(RelayOutcome { channel: channel.clone(), item: item.clone(), response: parsed }),
            Err(e) => {
                tracing::warn!(channel_id = channel.id, error = %e, "failed parsing upstream response");
                item = advance_or_fail(cache, &group, item)?;
                continue;
            }
        };
    }
}

fn advance_or_fail<'a>(
    cache: &EntityCache,
    group: &'a crate::core::types::Group,
    current: &GroupItem,
) -> Result<&'a GroupItem> {
    cache.next_item(group, current).ok_or(GatewayError::BadGateway)
}

fn to_reqwest_request(
    client: &reqwest::Client,
    built: &crate::core::outbound::OutboundHttpRequest,
    forwarded_headers: &[(String, String)],
) -> Result<reqwest::Request> {
    let mut builder = client.request(built.method.clone(), &built.url);
    for (name, value) in &built.headers {
        builder = builder.header(name, value);
    }
    for (name, value) in forwarded_headers {
        if !is_hop_by_hop(name) {
            builder = builder.header(name, value);
        }
    }
    builder
        .body(built.body.clone())
        .build()
        .map_err(|e| GatewayError::internal(format!("failed to build outbound request: {e}")))
}

/// Streaming failover: like [`dispatch`], but a channel is only committed to
/// once its first non-empty upstream byte has been read. A channel that
/// returns a successful status but then fails before any byte arrives is
/// treated the same as a connection failure and the next item is tried;
/// once committed, the caller has already started forwarding to the client
/// and no further failover happens.
pub async fn dispatch_stream(
    cache: &EntityCache,
    transport: &TransportPool,
    system_proxy_url: Option<&str>,
    requested_model: &str,
    mut internal_request: InternalRequest,
    forwarded_headers: Vec<(String, String)>,
) -> Result<(Channel, GroupItem, std::pin::Pin<Box<dyn Stream<Item = Result<InternalResponse>> + Send>>)> {
    internal_request.stream = true;
    let group = cache.group_for_model(requested_model).ok_or_else(|| model_not_found(requested_model))?;
    let mut item = cache
        .select_item(&group)
        .ok_or_else(|| GatewayError::upstream_unavailable("no channel available for group"))?;

    loop {
        let Some(channel) = cache.channel(item.channel_id) else {
            item = advance_or_fail(cache, &group, item)?;
            continue;
        };
        if !channel.enabled {
            item = advance_or_fail(cache, &group, item)?;
            continue;
        }

        internal_request.model = item.upstream_model.clone();
        let mut adapter = new_adapter(channel.provider);

        let built = match adapter
            .transform_request(&internal_request, &channel.base_url, &channel.credential)
            .await
        {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(channel_id = channel.id, error = %e, "outbound request build failed");
                item = advance_or_fail(cache, &group, item)?;
                continue;
            }
        };

        let client = build_client(transport, &channel, system_proxy_url)?;
        let request = to_reqwest_request(&client, &built, &forwarded_headers)?;

        let response = match client.execute(request).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(channel_id = channel.id, error = %e, "outbound request failed");
                item = advance_or_fail(cache, &group, item)?;
                continue;
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            tracing::warn!(channel_id = channel.id, %status, "upstream returned an error status");
            item = advance_or_fail(cache, &group, item)?;
            continue;
        }

        let mut byte_stream = response.bytes_stream();
        let first = match byte_stream.next().await {
            Some(Ok(chunk)) if !chunk.is_empty() => chunk,
            Some(Ok(_)) | None => {
                tracing::warn!(channel_id = channel.id, "upstream closed before the first byte");
                item = advance_or_fail(cache, &group, item)?;
                continue;
            }
            Some(Err(e)) => {
                tracing::warn!(channel_id = channel.id, error = %e, "upstream failed before the first byte");
                item = advance_or_fail(cache, &group, item)?;
                continue;
            }
        };

        let channel_committed = channel.clone();
        let item_committed = item.clone();
        let stream = async_stream::try_stream! {
            let mut buf: Vec<u8> = Vec::new();
            buf.extend(first.iter().copied().filter(|&b| b != b'\r'));
            loop {
                while let Some(payload) = extract_sse_event(&mut buf) {
                    if let Some(chunk) = adapter.transform_stream(&payload)? {
                        yield chunk;
                    }
                }
                match byte_stream.next().await {
                    Some(Ok(chunk)) => buf.extend(chunk.iter().copied().filter(|&b| b != b'\r')),
                    Some(Err(e)) => Err(GatewayError::upstream_unavailable(e.to_string()))?,
                    None => break,
                }
            }
            while let Some(payload) = extract_sse_event(&mut buf) {
                if let Some(chunk) = adapter.transform_stream(&payload)? {
                    yield chunk;
                }
            }
        };

        return Ok((channel_committed, item_committed, Box::pin(stream)));
    }
}

/// Pulls one complete `\n\n`-terminated SSE event out of `buf` and returns
/// its joined `data:` payload (empty when the event carried none, e.g. a
/// bare `event:` line or a keep-alive comment).
fn extract_sse_event(buf: &mut Vec<u8>) -> Option<Vec<u8>> {
    let idx = buf.windows(2).position(|w| w == b"\n\n")?;
    let block: Vec<u8> = buf.drain(..idx + 2).collect();
    let text = String::from_utf8_lossy(&block);
    let data: Vec<&str> = text
        .lines()
        .filter_map(|line| line.strip_prefix("data:").map(|rest| rest.trim_start()))
        .collect();
    Some(data.join("\n").into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hop_by_hop_headers_are_recognized_case_insensitively() {
        assert!(is_hop_by_hop("Authorization"));
        assert!(is_hop_by_hop("content-length"));
        assert!(is_hop_by_hop("X-Api-Key"));
        assert!(!is_hop_by_hop("x-request-id"));
    }

    #[test]
    fn extract_sse_event_joins_multi_line_data_and_skips_comment_only_blocks() {
        let mut buf = b"event:message_start\ndata:{\"a\":1}\n\n: keep-alive\n\n".to_vec();
        let first = extract_sse_event(&mut buf).unwrap();
        assert_eq!(first, b"{\"a\":1}");
        let second = extract_sse_event(&mut buf).unwrap();
        assert!(second.is_empty());
        assert!(extract_sse_event(&mut buf).is_none());
    }
}
