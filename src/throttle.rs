// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Token-bucket rate limiting, approximated by a sliding window that rebases
//! every `reset_rate` seconds to avoid floating point drift.
//!
//! Ported from `original_source/aioftp/common.py`'s `Throttle` /
//! `StreamThrottle`: `wait()` never errors, it only sleeps; `append()` is a
//! decaying accumulator, not a hard reset.

use std::time::Duration;

use tokio::time::Instant;

/// Default window over which a throttle's memory is rebased.
pub const DEFAULT_RESET_RATE: Duration = Duration::from_secs(10);

/// A single-direction leaky-bucket limiter.
///
/// `limit_bps = None` (or `Some(0)`) means unlimited: `wait` returns
/// immediately and `append` is a no-op.
#[derive(Debug, Clone)]
pub struct Throttle {
    limit_bps: Option<u64>,
    reset_rate: Duration,
    window_start: Option<Instant>,
    window_bytes: i64,
}

impl Throttle {
    pub fn new(limit_bps: Option<u64>) -> Self {
        Self {
            limit_bps,
            reset_rate: DEFAULT_RESET_RATE,
            window_start: None,
            window_bytes: 0,
        }
    }

    pub fn with_reset_rate(limit_bps: Option<u64>, reset_rate: Duration) -> Self {
        Self { limit_bps, reset_rate, window_start: None, window_bytes: 0 }
    }

    #[inline]
    fn active_limit(&self) -> Option<u64> {
        self.limit_bps.filter(|&l| l > 0)
    }

    /// Waits until enough time has passed for the configured limit to permit
    /// more I/O. Never fails: an unlimited throttle resolves immediately.
    pub async fn wait(&self) {
        if let Some(d) = self.wait_duration(Instant::now()) {
            tokio::time::sleep(d).await;
        }
    }

    /// Pure computation of how long `wait()` would sleep for, without
    /// actually sleeping. Lets callers join several throttles' waits by
    /// taking the maximum duration instead of racing real sleep futures.
    pub fn wait_duration(&self, now: Instant) -> Option<Duration> {
        let limit = self.active_limit()?;
        if self.window_bytes <= 0 {
            return None;
        }
        let start = self.window_start?;
        let end = start + Duration::from_secs_f64(self.window_bytes as f64 / limit as f64);
        (end > now).then(|| end - now)
    }

    /// Accounts `data.len()` bytes transferred at `start`, lazily opening the
    /// window and rebasing it if more than `reset_rate` has elapsed since it
    /// was opened.
    pub fn append(&mut self, len: usize, start: Instant) {
        let Some(limit) = self.active_limit() else { return };
        let window_start = *self.window_start.get_or_insert(start);
        let elapsed = start.saturating_duration_since(window_start);
        if elapsed > self.reset_rate {
            let decay = (elapsed.as_secs_f64() * limit as f64).round() as i64;
            self.window_bytes -= decay;
            self.window_start = Some(start);
        }
        self.window_bytes += len as i64;
    }

    pub fn limit_bps(&self) -> Option<u64> {
        self.limit_bps
    }

    /// Replaces the limit, resetting accumulated window state.
    pub fn set_limit(&mut self, limit_bps: Option<u64>) {
        self.limit_bps = limit_bps;
        self.window_start = None;
        self.window_bytes = 0;
    }

    /// Copies the configuration (limit, reset rate) without the accumulated
    /// window state — a fresh throttle starting cold.
    pub fn clone_config(&self) -> Self {
        Self {
            limit_bps: self.limit_bps,
            reset_rate: self.reset_rate,
            window_start: None,
            window_bytes: 0,
        }
    }
}

/// Paired read/write throttles attached to one stream.
#[derive(Debug, Clone)]
pub struct StreamThrottle {
    pub read: Throttle,
    pub write: Throttle,
}

impl StreamThrottle {
    pub fn from_limits(read_bps: Option<u64>, write_bps: Option<u64>) -> Self {
        Self { read: Throttle::new(read_bps), write: Throttle::new(write_bps) }
    }

    /// Clones configuration only, not accumulated window state.
    pub fn clone_config(&self) -> Self {
        Self { read: self.read.clone_config(), write: self.write.clone_config() }
    }
}
