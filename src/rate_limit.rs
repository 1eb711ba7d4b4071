//! Shared cooldown for the rate-limited blob channel.
//!
//! The remote service enforces one limit per credential, so a single
//! rate-limit response must hold back every upload and delete in the
//! process, not only the call that received it.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::{sleep_until, Instant};
use tracing::debug;

/// Process-wide cooldown deadline shared by every transport call.
///
/// Only the deadline check/update is synchronized; no lock is held while
/// waiting or while a network call is in flight.
///
/// # Example
///
/// ```
/// use chunkdrive::rate_limit::CooldownGate;
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let gate = CooldownGate::new();
/// assert!(!gate.is_cooling_down());
///
/// gate.record_limit_hit(Duration::from_millis(10));
/// gate.await_ready().await;
/// assert!(!gate.is_cooling_down());
/// # }
/// ```
#[derive(Debug, Default)]
pub struct CooldownGate {
    deadline: Mutex<Option<Instant>>,
}

impl CooldownGate {
    /// Create a gate with no cooldown in effect.
    pub fn new() -> Self {
        Self::default()
    }

    /// The current cooldown deadline, if one has ever been set.
    pub fn deadline(&self) -> Option<Instant> {
        *self.deadline.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Time left until calls may proceed.
    pub fn remaining(&self) -> Duration {
        self.deadline()
            .map(|d| d.saturating_duration_since(Instant::now()))
            .unwrap_or(Duration::ZERO)
    }

    /// Whether callers would currently have to wait.
    pub fn is_cooling_down(&self) -> bool {
        !self.remaining().is_zero()
    }

    /// Suspend until the cooldown deadline has passed.
    ///
    /// Returns immediately when no cooldown is in effect. If the deadline is
    /// pushed further out while waiting, keeps waiting for the new one.
    pub async fn await_ready(&self) {
        loop {
            match self.deadline() {
                Some(deadline) if deadline > Instant::now() => {
                    debug!(
                        "Waiting {}ms for transport cooldown",
                        deadline.saturating_duration_since(Instant::now()).as_millis()
                    );
                    sleep_until(deadline).await;
                }
                _ => return,
            }
        }
    }

    /// Extend the cooldown to `now + retry_after`.
    ///
    /// Never moves the deadline backward: a smaller retry-after reported
    /// after a larger one leaves the later deadline in place. Returns the
    /// deadline now in effect.
    pub fn record_limit_hit(&self, retry_after: Duration) -> Instant {
        let candidate = Instant::now() + retry_after;
        let mut deadline = self.deadline.lock().unwrap_or_else(PoisonError::into_inner);
        match *deadline {
            Some(current) if current >= candidate => current,
            _ => {
                *deadline = Some(candidate);
                candidate
            }
        }
    }
}
