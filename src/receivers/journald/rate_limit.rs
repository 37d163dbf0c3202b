// SPDX-License-Identifier: Apache-2.0

use std::time::{Duration, Instant};

/// Window based admission control for forwarded entries.
///
/// Up to `burst` entries are admitted per window. The window opens with the
/// first admission and closes once `interval` has elapsed, after which the
/// budget is restored. An `interval` of zero disables limiting.
///
/// The limiter is owned by the read loop, so it takes `&mut self` and keeps
/// no timer of its own: each call compares against the window start.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    burst: u32,
    window_start: Option<Instant>,
    admitted: u32,
    dropped: u64,
    // dropped count of the last closed window, not yet reported
    unreported: u64,
}

impl RateLimiter {
    pub fn new(interval: Duration, burst: u32) -> Self {
        Self {
            interval,
            burst,
            window_start: None,
            admitted: 0,
            dropped: 0,
            unreported: 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.interval.is_zero()
    }

    pub fn admit(&mut self) -> bool {
        self.admit_at(Instant::now())
    }

    /// Admission check against an explicit clock reading.
    pub fn admit_at(&mut self, now: Instant) -> bool {
        if !self.is_enabled() {
            return true;
        }

        match self.window_start {
            Some(start) if now.saturating_duration_since(start) < self.interval => {}
            _ => self.open_window(now),
        }

        if self.admitted < self.burst {
            self.admitted += 1;
            true
        } else {
            self.dropped += 1;
            false
        }
    }

    fn open_window(&mut self, now: Instant) {
        self.unreported += self.dropped;
        self.dropped = 0;
        self.admitted = 0;
        self.window_start = Some(now);
    }

    /// Number of entries rejected in windows that have since closed. Returns
    /// each count once, `None` when there is nothing to report.
    pub fn take_dropped(&mut self) -> Option<u64> {
        match std::mem::take(&mut self.unreported) {
            0 => None,
            n => Some(n),
        }
    }

    /// Like [`RateLimiter::take_dropped`], but also counts rejections of the
    /// window that is still open. Used when the caller stops reading.
    pub fn take_all_dropped(&mut self) -> Option<u64> {
        self.unreported += std::mem::take(&mut self.dropped);
        self.take_dropped()
    }
}
