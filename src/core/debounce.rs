//! Debounced folder-delta input - delays manual folder switches under
//! rapid repeated input.
//!
//! A single pending slot holds the latest `(main_delta, float_delta)`
//! command; each new command overwrites the slot and resets the timer, and
//! the command is applied only after a quiet period with no new input.

use std::time::{Duration, Instant};

/// Single-slot debounced delta command.
#[derive(Debug, Clone)]
pub struct DebouncedDeltas {
    /// Quiet period before a pending command applies.
    delay: Duration,
    /// Latest command and its trigger deadline.
    pending: Option<(i64, i64, Instant)>,
}

impl Default for DebouncedDeltas {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(150),
            pending: None,
        }
    }
}

impl DebouncedDeltas {
    pub fn new(delay_ms: u64) -> Self {
        Self {
            delay: Duration::from_millis(delay_ms),
            pending: None,
        }
    }

    pub fn set_delay(&mut self, delay_ms: u64) {
        self.delay = Duration::from_millis(delay_ms);
    }

    /// Queue a command, overwriting any pending one and resetting the timer.
    pub fn schedule(&mut self, main_delta: i64, float_delta: i64) {
        let trigger_at = Instant::now() + self.delay;
        self.pending = Some((main_delta, float_delta, trigger_at));
        log::trace!(
            "debounce: pending deltas ({}, {}) in {}ms",
            main_delta,
            float_delta,
            self.delay.as_millis()
        );
    }

    /// Drop any pending command.
    pub fn cancel(&mut self) {
        self.pending = None;
    }

    /// Return the pending deltas once the quiet period has elapsed.
    /// Clears the slot when triggered.
    pub fn tick(&mut self) -> Option<(i64, i64)> {
        let (main_delta, float_delta, trigger_at) = self.pending?;
        if Instant::now() >= trigger_at {
            self.pending = None;
            Some((main_delta, float_delta))
        } else {
            None
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}
