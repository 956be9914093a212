//! Application state shared across HTTP handlers.

use std::sync::Arc;

use crate::auth::OperatorAuth;
use crate::config::Config;
use crate::core::admission::AdmissionController;
use crate::core::cache::EntityCache;
use crate::core::types::setting_keys;
use crate::monitoring::Monitoring;
use crate::utils::net::TransportPool;

/// Shared resources handed to every handler behind `web::Data`. Cheap to
/// clone: every field is already an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub cache: Arc<EntityCache>,
    pub admission: Arc<AdmissionController>,
    pub transport: Arc<TransportPool>,
    pub monitoring: Arc<Monitoring>,
    pub operator_auth: Arc<OperatorAuth>,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        cache: Arc<EntityCache>,
        admission: Arc<AdmissionController>,
        transport: Arc<TransportPool>,
        monitoring: Arc<Monitoring>,
        operator_auth: Arc<OperatorAuth>,
    ) -> Self {
        Self { config, cache, admission, transport, monitoring, operator_auth }
    }

    /// The operator-editable system proxy URL, if one is set (spec section 4.1).
    pub fn system_proxy_url(&self) -> Option<String> {
        self.cache.setting(setting_keys::PROXY_URL).filter(|v| !v.is_empty())
    }
}
