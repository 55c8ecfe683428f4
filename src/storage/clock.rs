//! Wall-clock time source for expiry.
//!
//! Expiry instants are absolute milliseconds since the Unix epoch. They come
//! from the system clock, so clock adjustments move them too.

use std::time::{SystemTime, UNIX_EPOCH};

pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_millis(&self) -> i64;
}

/// The real wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now_millis(&self) -> i64 {
        let dur = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();

        i64::try_from(dur.as_millis()).unwrap_or(i64::MAX)
    }
}
