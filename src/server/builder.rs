//! Composition root: wires config, storage, the entity cache, admission
//! control, the transport pool, and monitoring into one `AppState`, then
//! hands it to [`crate::server::server::run`].

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::auth::OperatorAuth;
use crate::config::{Cli, Config};
use crate::core::admission::{AdmissionConfig, AdmissionController};
use crate::core::cache::EntityCache;
use crate::monitoring::{spawn_flush_timer, Monitoring};
use crate::server::state::AppState;
use crate::storage::Storage;
use crate::utils::error::Result;
use crate::utils::net::TransportPool;

const LOG_FLUSH_INTERVAL: Duration = Duration::from_secs(5);
const AUTO_GROUP_SYNC_INTERVAL: Duration = Duration::from_secs(60);

/// Builds the full `AppState` from a loaded `Config`, spawning the
/// background workers spec section 2 names (stats/log flush, auto-group sync).
pub async fn build_state(config: Config) -> Result<AppState> {
    let config = Arc::new(config);

    let storage = Storage::connect(&config.database.url).await?;
    let cache = Arc::new(EntityCache::load(storage.clone()).await?);
    let admission = Arc::new(AdmissionController::new(AdmissionConfig::default()));
    let transport = Arc::new(TransportPool::new()?);
    let monitoring = Arc::new(Monitoring::new(storage));
    let operator_auth = Arc::new(OperatorAuth::new(&config.auth));

    spawn_flush_timer(Arc::clone(&monitoring), LOG_FLUSH_INTERVAL);
    spawn_auto_group_sync(Arc::clone(&cache));

    Ok(AppState::new(config, cache, admission, transport, monitoring, operator_auth))
}

fn spawn_auto_group_sync(cache: Arc<EntityCache>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(AUTO_GROUP_SYNC_INTERVAL);
        loop {
            ticker.tick().await;
            if let Err(e) = cache.sync_auto_groups().await {
                tracing::warn!(error = %e, "auto-group sync failed");
            }
        }
    })
}

/// Loads configuration and runs the server to completion.
pub async fn run_server(cli: Cli) -> Result<()> {
    let config = Config::load(&cli)?;
    info!(host = %config.server.host, port = config.server.port, "starting relaycrate gateway");

    let state = build_state(config).await?;
    crate::server::server::run(state).await
}
