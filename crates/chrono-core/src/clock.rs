//! Timer abstraction.
//!
//! The processor loop needs testable sleeping. Time is abstracted behind a
//! `Clock` capability injected at construction; tests substitute a virtual
//! clock that fast-forwards instead of sleeping in real wall-clock time.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::Notify;

#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
    async fn sleep(&self, duration: Duration);
}

/// Delegates to the real wall clock and `tokio::time::sleep`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// A clock that only advances when `advance` is called, for deterministic
/// tests of the processor loop, backoff timing, and stale-claim recovery.
pub struct VirtualClock {
    millis: AtomicI64,
    notify: Notify,
}

impl VirtualClock {
    pub fn new(start: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self { millis: AtomicI64::new(start.timestamp_millis()), notify: Notify::new() })
    }

    /// Moves the clock forward and wakes any tasks sleeping past the new time.
    pub fn advance(&self, duration: Duration) {
        self.millis.fetch_add(duration.as_millis() as i64, Ordering::SeqCst);
        self.notify.notify_waiters();
    }
}

#[async_trait]
impl Clock for VirtualClock {
    fn now(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.millis.load(Ordering::SeqCst)).single().expect("valid timestamp")
    }

    async fn sleep(&self, duration: Duration) {
        let target = self.millis.load(Ordering::SeqCst) + duration.as_millis() as i64;
        loop {
            if self.millis.load(Ordering::SeqCst) >= target {
                return;
            }
            self.notify.notified().await;
        }
    }
}
