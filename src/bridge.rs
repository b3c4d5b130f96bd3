use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::error::DashError;

/// Default wait before the backend surface is declared unavailable.
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_millis(10_000);
/// Default spacing between readiness checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Answers whether the host has finished injecting the backend surface.
pub trait RuntimeCheck: Send + Sync {
    fn is_callable(&self) -> bool;
}

impl<F> RuntimeCheck for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn is_callable(&self) -> bool {
        self()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Readiness {
    NotReady = 0,
    Ready = 1,
    Unavailable = 2,
}

impl Readiness {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Readiness::Ready,
            2 => Readiness::Unavailable,
            _ => Readiness::NotReady,
        }
    }
}

/// Tracks whether backend calls can be issued yet.
///
/// `Ready` is terminal: once observed, the check is never consulted again.
/// `Unavailable` only records that a bounded wait gave up; a later manual
/// `is_ready()` may still discover the surface.
pub struct RuntimeBridge {
    check: Box<dyn RuntimeCheck>,
    state: AtomicU8,
    poll_interval: Duration,
}

impl RuntimeBridge {
    pub fn new(check: impl RuntimeCheck + 'static) -> Self {
        Self::with_poll_interval(check, DEFAULT_POLL_INTERVAL)
    }

    pub fn with_poll_interval(check: impl RuntimeCheck + 'static, poll_interval: Duration) -> Self {
        Self {
            check: Box::new(check),
            state: AtomicU8::new(Readiness::NotReady as u8),
            poll_interval: poll_interval.max(Duration::from_millis(1)),
        }
    }

    /// A bridge for backends that are callable from the start (in-process).
    pub fn always_ready() -> Self {
        Self::new(|| true)
    }

    pub fn state(&self) -> Readiness {
        Readiness::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_ready(&self) -> bool {
        if self.state() == Readiness::Ready {
            return true;
        }
        if self.check.is_callable() {
            self.state.store(Readiness::Ready as u8, Ordering::Release);
            return true;
        }
        false
    }

    /// Poll the check every `poll_interval` until it answers or `timeout` elapses.
    pub async fn await_ready(&self, timeout: Duration) -> Result<(), DashError> {
        if self.is_ready() {
            return Ok(());
        }

        let start = Instant::now();
        let mut ticker = time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if self.is_ready() {
                info!(waited_ms = start.elapsed().as_millis() as u64, "backend runtime ready");
                return Ok(());
            }
            if start.elapsed() > timeout {
                self.state
                    .store(Readiness::Unavailable as u8, Ordering::Release);
                let waited_ms = start.elapsed().as_millis() as u64;
                error!(waited_ms, "backend runtime never became callable");
                return Err(DashError::ReadinessTimeout { waited_ms });
            }
            debug!("backend runtime not ready yet");
        }
    }
}
