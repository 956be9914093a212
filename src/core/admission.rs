//! Admission control: token-bucket rate limiting plus a two-tier
//! fast/slow concurrency limiter with migration (spec section 4.3).
//!
//! The concurrency design generalizes the teacher's
//! `core::rate_limiter::RateLimiter` (a single `HashMap`-keyed limiter) into
//! two cooperating semaphores. Migration and completion race on one
//! `parking_lot::Mutex`-protected [`SlotState`] exactly as spec section 9
//! requires: whichever side observes `done` first wins, and release is a
//! single branch over `{fast_permit, slow_permit}`.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use governor::{Quota, RateLimiter as GovernorLimiter};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::utils::error::GatewayError;

type TokenBucket = GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>;

#[derive(Debug, Clone)]
pub struct AdmissionConfig {
    pub rate_per_sec: Option<NonZeroU32>,
    pub burst: Option<NonZeroU32>,
    /// 0 disables the concurrency tiers entirely.
    pub fast_max: usize,
    /// 0 disables migration; the fast tier then behaves as a plain cap.
    pub slow_max: usize,
    pub migrate_after: Duration,
    /// Bounded FIFO queue depth once the fast tier is full.
    pub max_queue: usize,
    /// Per-request maximum wait for a fast slot.
    pub max_wait: Duration,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            rate_per_sec: None,
            burst: None,
            fast_max: 0,
            slow_max: 0,
            migrate_after: Duration::from_secs(0),
            max_queue: 0,
            max_wait: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
struct SlotState {
    done: bool,
    in_slow: bool,
    fast_permit: Option<OwnedSemaphorePermit>,
    slow_permit: Option<OwnedSemaphorePermit>,
}

/// Held for the lifetime of one admitted request; dropping it releases
/// whichever tier currently holds the slot.
#[derive(Debug)]
pub struct AdmissionGuard {
    state: Option<Arc<Mutex<SlotState>>>,
}

impl AdmissionGuard {
    fn none() -> Self {
        Self { state: None }
    }

    /// True once the migration background task has moved this request to
    /// the slow tier. Exposed for tests that assert on migration timing.
    pub fn in_slow(&self) -> bool {
        self.state.as_ref().is_some_and(|s| s.lock().in_slow)
    }
}

impl Drop for AdmissionGuard {
    fn drop(&mut self) {
        if let Some(state) = &self.state {
            let mut st = state.lock();
            st.done = true;
            st.fast_permit = None;
            st.slow_permit = None;
        }
    }
}

pub struct AdmissionController {
    config: AdmissionConfig,
    rate_limiter: Option<TokenBucket>,
    fast: Option<Arc<Semaphore>>,
    slow: Option<Arc<Semaphore>>,
    waiting: AtomicUsize,
}

impl AdmissionController {
    pub fn new(config: AdmissionConfig) -> Self {
        let rate_limiter = match (config.rate_per_sec, config.burst) {
            (Some(rate), burst) => {
                let burst = burst.unwrap_or(rate);
                Some(GovernorLimiter::direct(Quota::per_second(rate).allow_burst(burst)))
            }
            _ => None,
        };
        let fast = (config.fast_max > 0).then(|| Arc::new(Semaphore::new(config.fast_max)));
        let slow = (config.slow_max > 0).then(|| Arc::new(Semaphore::new(config.slow_max)));
        Self { config, rate_limiter, fast, slow, waiting: AtomicUsize::new(0) }
    }

    /// Steps 1-6 of spec section 4.3. `client_deadline` is the inbound
    /// connection's own cancellation horizon, if any; the effective wait
    /// deadline is `min(client_deadline, now + max_wait)`.
    pub async fn acquire(&self, client_deadline: Option<Duration>) -> Result<AdmissionGuard, GatewayError> {
        let wait_budget = match client_deadline {
            Some(d) => d.min(self.config.max_wait),
            None => self.config.max_wait,
        };

        if let Some(limiter) = &self.rate_limiter {
            tokio::time::timeout(wait_budget, async {
                while limiter.check().is_err() {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            })
            .await
            .map_err(|_| GatewayError::RateExceeded)?;
        }

        let Some(fast) = &self.fast else {
            return Ok(AdmissionGuard::none());
        };

        let fast_permit = match Arc::clone(fast).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                if self.waiting.load(Ordering::SeqCst) >= self.config.max_queue {
                    return Err(GatewayError::QueueFull);
                }
                let _ticket = QueueTicket::new(&self.waiting);
                tokio::time::timeout(wait_budget, Arc::clone(fast).acquire_owned())
                    .await
                    .map_err(|_| GatewayError::QueueWaitTimeout)?
                    .expect("fast semaphore never closed")
            }
        };

        let state = Arc::new(Mutex::new(SlotState {
            done: false,
            in_slow: false,
            fast_permit: Some(fast_permit),
            slow_permit: None,
        }));

        if let Some(slow) = self.slow.clone()
            && !self.config.migrate_after.is_zero()
        {
            let migrate_state = state.clone();
            let migrate_after = self.config.migrate_after;
            tokio::spawn(async move {
                tokio::time::sleep(migrate_after).await;
                if migrate_state.lock().done {
                    return;
                }
                let Ok(slow_permit) = slow.acquire_owned().await else {
                    return;
                };
                let mut st = migrate_state.lock();
                if st.done {
                    drop(slow_permit);
                } else {
                    st.fast_permit = None;
                    st.slow_permit = Some(slow_permit);
                    st.in_slow = true;
                }
            });
        }

        Ok(AdmissionGuard { state: Some(state) })
    }
}

/// RAII bookkeeping for the bounded wait queue: decrements on drop so a
/// cancelled (dropped) waiter doesn't leak queue capacity.
struct QueueTicket<'a> {
    waiting: &'a AtomicUsize,
}

impl<'a> QueueTicket<'a> {
    fn new(waiting: &'a AtomicUsize) -> Self {
        waiting.fetch_add(1, Ordering::SeqCst);
        Self { waiting }
    }
}

impl Drop for QueueTicket<'_> {
    fn drop(&mut self) {
        self.waiting.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_concurrency_admits_immediately() {
        let ctl = AdmissionController::new(AdmissionConfig::default());
        let guard = ctl.acquire(None).await.unwrap();
        assert!(!guard.in_slow());
    }

    #[tokio::test]
    async fn fast_tier_caps_simultaneous_admission() {
        let ctl = AdmissionController::new(AdmissionConfig {
            fast_max: 1,
            max_queue: 0,
            max_wait: Duration::from_millis(50),
            ..Default::default()
        });
        let _g1 = ctl.acquire(None).await.unwrap();
        let err = ctl.acquire(None).await.unwrap_err();
        assert!(matches!(err, GatewayError::QueueFull));
    }

    #[tokio::test]
    async fn migration_moves_long_request_to_slow_tier() {
        let ctl = AdmissionController::new(AdmissionConfig {
            fast_max: 1,
            slow_max: 1,
            migrate_after: Duration::from_millis(30),
            max_queue: 1,
            max_wait: Duration::from_millis(500),
            ..Default::default()
        });
        let g1 = ctl.acquire(None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(g1.in_slow());
        // fast tier now has a free slot even though g1 is still alive
        let g2 = ctl.acquire(None).await.unwrap();
        assert!(!g2.in_slow());
    }

    #[tokio::test]
    async fn migration_aborts_if_request_completes_first() {
        let ctl = AdmissionController::new(AdmissionConfig {
            fast_max: 1,
            slow_max: 1,
            migrate_after: Duration::from_millis(30),
            max_queue: 0,
            max_wait: Duration::from_millis(500),
            ..Default::default()
        });
        let g1 = ctl.acquire(None).await.unwrap();
        drop(g1);
        tokio::time::sleep(Duration::from_millis(60)).await;
        // slow tier must still be fully free since migration backed out
        let g2 = ctl.acquire(None).await.unwrap();
        assert!(!g2.in_slow());
    }
}
