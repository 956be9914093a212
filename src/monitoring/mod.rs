//! Metrics & logger (spec section 4.8): write-behind stats counters and the
//! bounded relay-log ring, grounded on a reference relay metrics recorder.
//! After every relay call, success or failure, the core computes cost
//! (`core::pricing`), folds the delta into the in-memory counters, and
//! enqueues one `RelayLog`; once the ring reaches 20 entries it flushes
//! synchronously, and a background timer forces a flush on an interval
//! regardless of ring depth.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::core::types::{RelayLog, Setting, StatsMetrics, redact_images_for_log};
use crate::storage::Storage;
use crate::utils::error::Result;

const RING_FLUSH_AT: usize = 20;
const DAY_SECS: i64 = 24 * 60 * 60;
const HOUR_SECS: i64 = 60 * 60;

fn now_secs() -> i64 {
    std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap_or_default().as_secs() as i64
}

/// Everything one completed relay call needs recorded, whether it
/// succeeded or every channel in the group failed.
pub struct RecordedCall {
    pub requested_model: String,
    pub actual_model: String,
    pub channel_id: i64,
    pub channel_name: String,
    pub api_key_id: i64,
    pub success: bool,
    pub wait_time_ms: u64,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub input_cost: f64,
    pub output_cost: f64,
    pub first_token_ms: Option<u64>,
    pub total_ms: u64,
    pub request_json: serde_json::Value,
    pub response_json: serde_json::Value,
    pub error: Option<String>,
}

impl RecordedCall {
    fn stats_delta(&self) -> StatsMetrics {
        StatsMetrics {
            request_success: u64::from(self.success),
            request_failed: u64::from(!self.success),
            wait_time_ms: self.wait_time_ms,
            input_token: u64::from(self.input_tokens),
            output_token: u64::from(self.output_tokens),
            input_cost: self.input_cost,
            output_cost: self.output_cost,
        }
    }

    fn into_log(self, timestamp: i64) -> RelayLog {
        let mut request_json = self.request_json;
        let mut response_json = self.response_json;
        redact_images_for_log(&mut request_json);
        redact_images_for_log(&mut response_json);
        RelayLog {
            timestamp,
            requested_model: self.requested_model,
            actual_model: self.actual_model,
            channel_id: self.channel_id,
            channel_name: self.channel_name,
            input_tokens: self.input_tokens,
            output_tokens: self.output_tokens,
            first_token_ms: self.first_token_ms,
            total_ms: self.total_ms,
            cost: self.input_cost + self.output_cost,
            request_json,
            response_json,
            error: self.error,
        }
    }
}

struct DailyBucket {
    day: i64,
    metrics: StatsMetrics,
}

/// Point-in-time view for the operator `stats` route.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct StatsSnapshot {
    pub total: StatsMetrics,
    pub per_channel: Vec<(i64, StatsMetrics)>,
    pub per_api_key: Vec<(i64, StatsMetrics)>,
    pub hourly: Vec<(i64, StatsMetrics)>,
    pub daily: (i64, StatsMetrics),
}

struct Counters {
    total: Mutex<StatsMetrics>,
    per_channel: DashMap<i64, StatsMetrics>,
    per_api_key: DashMap<i64, StatsMetrics>,
    hourly: DashMap<i64, StatsMetrics>,
    daily: Mutex<DailyBucket>,
}

impl Counters {
    fn new() -> Self {
        Self {
            total: Mutex::new(StatsMetrics::default()),
            per_channel: DashMap::new(),
            per_api_key: DashMap::new(),
            hourly: DashMap::new(),
            daily: Mutex::new(DailyBucket { day: now_secs() / DAY_SECS, metrics: StatsMetrics::default() }),
        }
    }

    /// Folds `delta` into every bucket. Returns the outgoing day's snapshot
    /// when local-midnight rollover just happened, so the caller can flush
    /// it to durable storage before the in-memory bucket moves on.
    fn apply(&self, delta: &StatsMetrics, channel_id: i64, api_key_id: i64, now: i64) -> Option<(i64, StatsMetrics)> {
        self.total.lock().merge(delta);
        self.per_channel.entry(channel_id).or_insert_with(StatsMetrics::default).merge(delta);
        self.per_api_key.entry(api_key_id).or_insert_with(StatsMetrics::default).merge(delta);
        self.hourly.entry(now / HOUR_SECS).or_insert_with(StatsMetrics::default).merge(delta);

        let day = now / DAY_SECS;
        let mut daily = self.daily.lock();
        if daily.day != day {
            let rolled = (daily.day, std::mem::take(&mut daily.metrics));
            daily.day = day;
            daily.metrics.merge(delta);
            Some(rolled)
        } else {
            daily.metrics.merge(delta);
            None
        }
    }

    fn snapshot(&self) -> StatsSnapshot {
        let daily = self.daily.lock();
        StatsSnapshot {
            total: self.total.lock().clone(),
            per_channel: self.per_channel.iter().map(|e| (*e.key(), e.value().clone())).collect(),
            per_api_key: self.per_api_key.iter().map(|e| (*e.key(), e.value().clone())).collect(),
            hourly: self.hourly.iter().map(|e| (*e.key(), e.value().clone())).collect(),
            daily: (daily.day, daily.metrics.clone()),
        }
    }
}

/// Bounded ring of pending `RelayLog`s; flushes in a batch at 20 entries or
/// on the background timer, whichever comes first.
struct RelayLogRing {
    buffer: Mutex<Vec<RelayLog>>,
    storage: Storage,
}

impl RelayLogRing {
    fn new(storage: Storage) -> Self {
        Self { buffer: Mutex::new(Vec::with_capacity(RING_FLUSH_AT)), storage }
    }

    async fn push(&self, log: RelayLog) -> Result<()> {
        let batch = {
            let mut buf = self.buffer.lock();
            buf.push(log);
            if buf.len() >= RING_FLUSH_AT { Some(std::mem::take(&mut *buf)) } else { None }
        };
        match batch {
            Some(batch) => self.storage.append_relay_logs(&batch).await,
            None => Ok(()),
        }
    }

    async fn flush(&self) -> Result<()> {
        let batch = std::mem::take(&mut *self.buffer.lock());
        if batch.is_empty() {
            return Ok(());
        }
        self.storage.append_relay_logs(&batch).await
    }
}

/// Composition-root handle: one per process, shared behind an `Arc` with
/// the rest of [`crate::server::state::AppState`].
pub struct Monitoring {
    counters: Counters,
    logs: RelayLogRing,
    storage: Storage,
}

impl Monitoring {
    pub fn new(storage: Storage) -> Self {
        Self { counters: Counters::new(), logs: RelayLogRing::new(storage.clone()), storage }
    }

    pub async fn record(&self, call: RecordedCall) -> Result<()> {
        let now = now_secs();
        let delta = call.stats_delta();
        if let Some((day, rolled)) = self.counters.apply(&delta, call.channel_id, call.api_key_id, now) {
            self.persist_daily_snapshot(day, &rolled).await?;
        }
        self.logs.push(call.into_log(now)).await
    }

    async fn persist_daily_snapshot(&self, day: i64, metrics: &StatsMetrics) -> Result<()> {
        let value = serde_json::to_string(metrics)?;
        self.storage.upsert_setting(&Setting { key: format!("stats_daily_{day}"), value }).await
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        self.counters.snapshot()
    }

    pub async fn flush(&self) -> Result<()> {
        self.logs.flush().await
    }

    pub async fn recent_logs(&self, limit: u64) -> Result<Vec<RelayLog>> {
        self.storage.recent_relay_logs(limit).await
    }
}

/// Forces a ring flush on a fixed interval, independent of the 20-entry
/// threshold, so a quiet deployment's tail of logs still lands durably.
pub fn spawn_flush_timer(monitoring: Arc<Monitoring>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if let Err(e) = monitoring.flush().await {
                tracing::warn!(error = %e, "periodic relay log flush failed");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_call(success: bool) -> RecordedCall {
        RecordedCall {
            requested_model: "gpt-x".to_string(),
            actual_model: "gpt-x-upstream".to_string(),
            channel_id: 1,
            channel_name: "primary".to_string(),
            api_key_id: 7,
            success,
            wait_time_ms: 5,
            input_tokens: 10,
            output_tokens: 20,
            input_cost: 0.001,
            output_cost: 0.002,
            first_token_ms: Some(50),
            total_ms: 200,
            request_json: serde_json::json!({"model": "gpt-x"}),
            response_json: serde_json::json!({"choices": []}),
            error: None,
        }
    }

    #[test]
    fn counters_accumulate_success_and_failure_separately() {
        let counters = Counters::new();
        counters.apply(&sample_call(true).stats_delta(), 1, 7, now_secs());
        counters.apply(&sample_call(false).stats_delta(), 1, 7, now_secs());
        let snap = counters.snapshot();
        assert_eq!(snap.total.request_success, 1);
        assert_eq!(snap.total.request_failed, 1);
    }

    #[test]
    fn rollover_is_detected_on_a_day_boundary_change() {
        let counters = Counters::new();
        let today = counters.daily.lock().day;
        let rolled = counters.apply(&sample_call(true).stats_delta(), 1, 7, (today + 1) * DAY_SECS);
        assert!(rolled.is_some());
        assert_eq!(rolled.unwrap().0, today);
    }

    #[test]
    fn image_parts_are_redacted_before_becoming_a_relay_log() {
        let mut call = sample_call(true);
        call.request_json = serde_json::json!({
            "messages": [{"role": "user", "content": [
                {"type": "image_url", "image_url": {"url": "data:..."}}
            ]}]
        });
        let log = call.into_log(now_secs());
        assert!(log.request_json["messages"][0]["content"][0].get("image_url").is_none());
    }
}
