//! Clock/frame driver: wall-clock time to frame number and direction.
//!
//! FPS-based timing: each frame has a fixed duration (1/fps seconds) and the
//! frame number is derived from accumulated elapsed time, so a slow render
//! tick never drifts the clock — playback catches up by frame count.
//!
//! Two loop modes:
//! - **PingPong**: position folds into `[0, 2*max_index)`; the effective
//!   frame rises `0..max_index-1` then falls back by reflection, and the
//!   direction flips exactly at the two reflection points.
//! - **Wrap**: position modulo `max_index`, always forward.
//!
//! The monotonic `position()` (total ticks) is what the prefetch cache and
//! folder schedule key on; the folded `frame()` drives display and events.

use log::{debug, info, warn};
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::core::events::LoopEvent;

/// Playback direction, derived from the ping-pong reflection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

impl Direction {
    pub fn signum(self) -> i64 {
        match self {
            Direction::Forward => 1,
            Direction::Backward => -1,
        }
    }
}

/// Boundary behavior for the frame counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopMode {
    /// Reflect at the sequence boundaries.
    PingPong,
    /// Wrap around to 0, always forward.
    Wrap,
}

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("max_index must be > 0 (got {0})")]
    InvalidMaxIndex(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DriverState {
    Initial,
    Running,
    Paused,
}

/// Frame clock with pause/reset and cycle accounting.
#[derive(Debug)]
pub struct Driver {
    frame_duration: Duration,
    mode: LoopMode,
    max_index: i64,
    cycle_len: i64,
    state: DriverState,
    elapsed: Duration,
    last_update: Option<Instant>,
    position: i64,
    frame: i64,
    direction: Direction,
    cycles: u64,
    pause_after_cycles: Option<u64>,
    warned_uninit: bool,
}

impl Driver {
    pub fn new(fps: u32, mode: LoopMode) -> Self {
        let fps = fps.max(1);
        Self {
            frame_duration: Duration::from_secs_f64(1.0 / fps as f64),
            mode,
            max_index: 0,
            cycle_len: 0,
            state: DriverState::Initial,
            elapsed: Duration::ZERO,
            last_update: None,
            position: 0,
            frame: 0,
            direction: Direction::Forward,
            cycles: 0,
            pause_after_cycles: None,
            warned_uninit: false,
        }
    }

    /// Pause automatically once this many full cycles complete.
    pub fn set_pause_after_cycles(&mut self, cycles: Option<u64>) {
        self.pause_after_cycles = cycles;
    }

    /// Set the sequence length and start the clock. Must be called before
    /// `update`; a non-positive length is rejected (no zero cycle length,
    /// ever).
    pub fn initialize(&mut self, max_index: i64) -> Result<(), DriverError> {
        if max_index <= 0 {
            return Err(DriverError::InvalidMaxIndex(max_index));
        }
        self.max_index = max_index;
        self.cycle_len = match self.mode {
            LoopMode::PingPong => 2 * max_index,
            LoopMode::Wrap => max_index,
        };
        self.state = DriverState::Running;
        self.reset();
        info!(
            "driver initialized: max_index={}, cycle_len={}, mode={:?}",
            max_index, self.cycle_len, self.mode
        );
        Ok(())
    }

    /// Advance the clock to `now`. Returns the change notifications for this
    /// tick; empty while paused, uninitialized, or when nothing changed.
    pub fn update(&mut self, now: Instant) -> Vec<LoopEvent> {
        let mut events = Vec::new();
        match self.state {
            DriverState::Initial => {
                if !self.warned_uninit {
                    warn!("driver update called before initialize, ignoring");
                    self.warned_uninit = true;
                }
                return events;
            }
            DriverState::Paused => return events,
            DriverState::Running => {}
        }

        let Some(last) = self.last_update else {
            self.last_update = Some(now);
            return events;
        };
        self.elapsed += now.saturating_duration_since(last);
        self.last_update = Some(now);

        let ticks =
            (self.elapsed.as_nanos() / self.frame_duration.as_nanos().max(1)) as i64;
        self.position = ticks;

        let raw = ticks % self.cycle_len;
        let cycle = (ticks / self.cycle_len) as u64;
        let (frame, direction) = self.fold(raw);

        if direction != self.direction {
            self.direction = direction;
            debug!("direction flip at position {}: {:?}", ticks, direction);
            events.push(LoopEvent::DirectionChanged { direction });
        }
        if frame != self.frame {
            self.frame = frame;
            events.push(LoopEvent::FrameChanged { frame });
        }
        if cycle != self.cycles {
            self.cycles = cycle;
            events.push(LoopEvent::CycleCompleted { cycles: cycle });
            if let Some(limit) = self.pause_after_cycles
                && cycle >= limit
            {
                info!("pausing after {} cycle(s)", cycle);
                self.state = DriverState::Paused;
                events.push(LoopEvent::Paused { paused: true });
            }
        }
        events
    }

    /// Freeze elapsed-time accumulation.
    pub fn pause(&mut self) {
        if self.state == DriverState::Running {
            self.state = DriverState::Paused;
            debug!("driver paused at frame {}", self.frame);
        }
    }

    /// Resume. The paused span never enters the elapsed accumulator, so no
    /// frames are skipped or jumped.
    pub fn unpause(&mut self) {
        if self.state == DriverState::Paused {
            self.state = DriverState::Running;
            self.last_update = None;
            debug!("driver resumed at frame {}", self.frame);
        }
    }

    /// Return to the initial frame unconditionally.
    pub fn reset(&mut self) {
        self.elapsed = Duration::ZERO;
        self.last_update = None;
        self.position = 0;
        self.frame = 0;
        self.direction = Direction::Forward;
        self.cycles = 0;
    }

    fn fold(&self, raw: i64) -> (i64, Direction) {
        match self.mode {
            LoopMode::PingPong => {
                if raw < self.max_index {
                    (raw, Direction::Forward)
                } else {
                    (self.cycle_len - raw - 1, Direction::Backward)
                }
            }
            LoopMode::Wrap => (raw, Direction::Forward),
        }
    }

    /// Monotonic tick counter (total frame durations elapsed).
    pub fn position(&self) -> i64 {
        self.position
    }

    /// Effective (folded) frame index.
    pub fn frame(&self) -> i64 {
        self.frame
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn mode(&self) -> LoopMode {
        self.mode
    }

    pub fn frame_duration(&self) -> Duration {
        self.frame_duration
    }

    pub fn is_running(&self) -> bool {
        self.state == DriverState::Running
    }

    pub fn is_initialized(&self) -> bool {
        self.state != DriverState::Initial
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FPS: u32 = 10;

    fn ticked(driver: &mut Driver, start: Instant, ticks: u32) -> Vec<LoopEvent> {
        driver.update(start + driver.frame_duration() * ticks)
    }

    /// maxIndex=4, ping-pong: 8 driver ticks give 0,1,2,3,3,2,1,0 with the
    /// direction flipping between the two 3s and back between the two 0s.
    #[test]
    fn test_ping_pong_end_to_end() {
        let mut driver = Driver::new(FPS, LoopMode::PingPong);
        driver.initialize(4).unwrap();

        let start = Instant::now();
        driver.update(start); // arms the clock

        let mut frames = Vec::new();
        let mut flips = Vec::new();
        for tick in 0..8 {
            let events = ticked(&mut driver, start, tick);
            for ev in events {
                if let LoopEvent::DirectionChanged { direction } = ev {
                    flips.push((tick, direction));
                }
            }
            frames.push(driver.frame());
        }

        assert_eq!(frames, vec![0, 1, 2, 3, 3, 2, 1, 0]);
        // flip to backward between the two 3s (tick 4), forward again at wrap
        assert_eq!(flips, vec![(4, Direction::Backward)]);

        // tick 8: frame stays 0 but direction returns to forward and a cycle
        // completes
        let events = ticked(&mut driver, start, 8);
        assert_eq!(driver.frame(), 0);
        assert!(events.contains(&LoopEvent::DirectionChanged {
            direction: Direction::Forward
        }));
        assert!(events.contains(&LoopEvent::CycleCompleted { cycles: 1 }));
    }

    /// Reflection symmetry: frame(t) == frame(2M - t mod 2M).
    #[test]
    fn test_ping_pong_symmetry() {
        let m: i64 = 6;
        let mut driver = Driver::new(FPS, LoopMode::PingPong);
        driver.initialize(m).unwrap();
        let start = Instant::now();
        driver.update(start);

        let mut by_tick = Vec::new();
        for tick in 0..(2 * m as u32) {
            ticked(&mut driver, start, tick);
            by_tick.push(driver.frame());
        }
        for t in 1..(2 * m) as usize {
            let mirrored = (2 * m as usize - t) % (2 * m as usize);
            assert_eq!(by_tick[t], by_tick[mirrored], "t={}", t);
        }
    }

    #[test]
    fn test_wrap_mode_never_reflects() {
        let mut driver = Driver::new(FPS, LoopMode::Wrap);
        driver.initialize(3).unwrap();
        let start = Instant::now();
        driver.update(start);

        let mut frames = Vec::new();
        for tick in 0..7 {
            ticked(&mut driver, start, tick);
            frames.push(driver.frame());
            assert_eq!(driver.direction(), Direction::Forward);
        }
        assert_eq!(frames, vec![0, 1, 2, 0, 1, 2, 0]);
        assert_eq!(driver.cycles(), 2);
    }

    #[test]
    fn test_frame_changed_only_on_change() {
        let mut driver = Driver::new(FPS, LoopMode::Wrap);
        driver.initialize(10).unwrap();
        let start = Instant::now();
        driver.update(start);

        ticked(&mut driver, start, 1);
        // half a frame later: no new frame, no events
        let events = driver.update(start + driver.frame_duration() * 3 / 2);
        assert!(events.is_empty());
    }

    #[test]
    fn test_update_before_initialize_is_noop() {
        let mut driver = Driver::new(FPS, LoopMode::PingPong);
        let events = driver.update(Instant::now());
        assert!(events.is_empty());
        assert_eq!(driver.frame(), 0);
    }

    #[test]
    fn test_initialize_rejects_zero_length() {
        let mut driver = Driver::new(FPS, LoopMode::PingPong);
        assert!(driver.initialize(0).is_err());
        assert!(!driver.is_initialized());
    }

    #[test]
    fn test_pause_excludes_elapsed_time() {
        let mut driver = Driver::new(FPS, LoopMode::Wrap);
        driver.initialize(100).unwrap();
        let start = Instant::now();
        driver.update(start);
        ticked(&mut driver, start, 2);
        assert_eq!(driver.frame(), 2);

        driver.pause();
        // a long gap while paused
        assert!(ticked(&mut driver, start, 50).is_empty());
        assert_eq!(driver.frame(), 2);

        driver.unpause();
        // first update after unpause re-arms the clock, no jump
        ticked(&mut driver, start, 50);
        assert_eq!(driver.frame(), 2);
        // one more frame duration advances by exactly one
        driver.update(start + driver.frame_duration() * 51);
        assert_eq!(driver.frame(), 3);
    }

    #[test]
    fn test_reset_returns_to_initial_frame() {
        let mut driver = Driver::new(FPS, LoopMode::PingPong);
        driver.initialize(4).unwrap();
        let start = Instant::now();
        driver.update(start);
        ticked(&mut driver, start, 5);
        assert_ne!(driver.frame(), 0);

        driver.reset();
        assert_eq!(driver.frame(), 0);
        assert_eq!(driver.position(), 0);
        assert_eq!(driver.cycles(), 0);
        assert_eq!(driver.direction(), Direction::Forward);
    }

    #[test]
    fn test_pause_after_cycles() {
        let mut driver = Driver::new(FPS, LoopMode::Wrap);
        driver.initialize(2).unwrap();
        driver.set_pause_after_cycles(Some(1));
        let start = Instant::now();
        driver.update(start);

        let mut paused = false;
        for tick in 0..4 {
            for ev in ticked(&mut driver, start, tick) {
                if matches!(ev, LoopEvent::Paused { paused: true }) {
                    paused = true;
                }
            }
        }
        assert!(paused);
        assert!(!driver.is_running());
    }
}
