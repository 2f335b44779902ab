//! Access windows: the time interval during which grants are honored.
//!
//! Windows are half-open on nothing: `[start, end]` inclusive, matching the
//! host's "access for N seconds" model. Evaluation always takes `now`
//! explicitly so expiry is a pure function of time.

use serde::{Deserialize, Serialize};

/// The interval during which download/forward flags are meaningful.
///
/// Outside the window, access evaluates as denied regardless of the stored
/// flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessWindow {
    /// Window start, Unix milliseconds.
    pub start_ms: i64,
    /// Window end, Unix milliseconds.
    pub end_ms: i64,
}

impl AccessWindow {
    /// Build a window `[now, now + timeout_secs]`.
    ///
    /// A zero or negative timeout yields a window that is already elapsed
    /// for any `t > now`.
    pub fn from_timeout(now_ms: i64, timeout_secs: i64) -> Self {
        let span_ms = timeout_secs.saturating_mul(1000).max(0);
        Self {
            start_ms: now_ms,
            end_ms: now_ms.saturating_add(span_ms),
        }
    }

    /// Whether `now` falls inside the window.
    pub fn contains(&self, now_ms: i64) -> bool {
        now_ms >= self.start_ms && now_ms <= self.end_ms
    }

    /// Whether the window has elapsed at `now`.
    pub fn elapsed(&self, now_ms: i64) -> bool {
        now_ms > self.end_ms
    }

    /// Reset the window to `[now, now + timeout_secs]`.
    pub fn renew(&mut self, now_ms: i64, timeout_secs: i64) {
        *self = Self::from_timeout(now_ms, timeout_secs);
    }

    /// Remaining validity in milliseconds (zero once elapsed).
    pub fn remaining_ms(&self, now_ms: i64) -> i64 {
        (self.end_ms - now_ms).max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_window_contains_bounds() {
        let w = AccessWindow::from_timeout(1_000, 10);
        assert!(w.contains(1_000));
        assert!(w.contains(11_000));
        assert!(!w.contains(11_001));
        assert!(!w.contains(999));
    }

    #[test]
    fn test_elapsed_is_pure_function_of_time() {
        let w = AccessWindow::from_timeout(0, 60);
        assert!(!w.elapsed(60_000));
        assert!(w.elapsed(60_001));
    }

    #[test]
    fn test_zero_timeout_expires_immediately() {
        let w = AccessWindow::from_timeout(5_000, 0);
        assert!(w.contains(5_000));
        assert!(w.elapsed(5_001));
    }

    #[test]
    fn test_negative_timeout_clamped() {
        let w = AccessWindow::from_timeout(5_000, -30);
        assert_eq!(w.end_ms, 5_000);
    }

    #[test]
    fn test_renew_resets_both_bounds() {
        let mut w = AccessWindow::from_timeout(0, 10);
        assert!(w.elapsed(20_000));
        w.renew(20_000, 10);
        assert!(w.contains(25_000));
        assert_eq!(w.start_ms, 20_000);
    }

    proptest! {
        #[test]
        fn prop_contains_implies_not_elapsed(
            now in 0i64..1_000_000_000,
            timeout in 0i64..1_000_000,
            probe in 0i64..2_000_000_000,
        ) {
            let w = AccessWindow::from_timeout(now, timeout);
            prop_assert!(!(w.contains(probe) && w.elapsed(probe)));
        }

        #[test]
        fn prop_remaining_zero_iff_elapsed_or_past_end(
            now in 0i64..1_000_000_000,
            timeout in 1i64..1_000_000,
        ) {
            let w = AccessWindow::from_timeout(now, timeout);
            prop_assert!(w.remaining_ms(w.end_ms + 1) == 0);
            prop_assert!(w.remaining_ms(w.start_ms) > 0);
        }
    }
}
