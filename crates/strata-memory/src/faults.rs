use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use strata_core::{Tier, TierError, TierResult};

/// Fault injection shared by the in-memory backends.
#[derive(Debug)]
pub struct Faults {
    tier: Tier,
    available: AtomicBool,
    latency: Mutex<Duration>,
    calls: AtomicU64,
}

impl Faults {
    pub(crate) fn new(tier: Tier) -> Self {
        Self {
            tier,
            available: AtomicBool::new(true),
            latency: Mutex::new(Duration::ZERO),
            calls: AtomicU64::new(0),
        }
    }

    /// Makes every call fail with a connection error while `false`.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Delays every call by `latency` before it runs.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    /// Number of calls made against the backend, including failed ones.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    pub(crate) async fn enter(&self) -> TierResult<()> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(TierError::connection(self.tier, "connection refused"))
        }
    }
}
