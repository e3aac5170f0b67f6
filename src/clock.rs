use crate::cancel::CancelToken;
use std::time::{Duration, Instant};

/// Time source for the polling loop. Abstracted so waits can be driven by a
/// manual clock in tests.
pub trait Clock {
    fn now(&self) -> Instant;

    /// Sleeps for `duration` unless cancelled first. Returns `true` on cancel.
    fn sleep(&self, duration: Duration, cancel: &CancelToken) -> bool;
}

/// Monotonic wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration, cancel: &CancelToken) -> bool {
        cancel.wait_timeout(duration)
    }
}
