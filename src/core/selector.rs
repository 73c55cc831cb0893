//! Folder selection: which (main, float) folder pair is active at a frame.
//!
//! Three interchangeable policies:
//! - **Random**: folder switches at randomized intervals tied to the frame
//!   rate, with a reset rule that periodically forces both folders back to 0.
//! - **Increment**: fixed-interval advancement, a pure function of position.
//! - **Manual**: externally driven deltas, debounced.
//!
//! # Change schedule
//!
//! The prefetch cache needs folder answers for positions ahead of the
//! playhead. Under the random policy this is answered through an append-only
//! change schedule: `ensure_until(p)` deterministically extends the schedule
//! through position `p` (consuming RNG draws exactly once per position), and
//! `pair_at(p)` binary-searches for the latest entry at or before `p`. The
//! playhead and the prefetch window therefore always agree on what the pair
//! will be. Entries behind the playhead are pruned, keeping the floor entry
//! so every lookup resolves.
//!
//! Schedule keys are monotonic positions, but the random policy's predicates
//! (the reset rule, the modular change conditions) are evaluated against the
//! folded effective frame — positions never revisit small values, frames do,
//! so the reset region recurs every cycle.

use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::core::debounce::DebouncedDeltas;
use crate::core::driver::{Direction, LoopMode};

/// Bounds for the random interval multiplier.
const RAND_MULT_MIN: i64 = 1;
const RAND_MULT_MAX: i64 = 4;

/// Folder selection policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectorMode {
    Random,
    Increment,
    Manual,
}

/// Active (background, foreground) folder indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FolderPair {
    pub main: usize,
    pub float: usize,
}

impl FolderPair {
    pub const ZERO: FolderPair = FolderPair { main: 0, float: 0 };
}

/// One recorded folder change: takes effect at `at_frame`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleEntry {
    pub at_frame: i64,
    pub pair: FolderPair,
}

/// Append-only folder change schedule with floor lookup.
///
/// Never empty: the first entry is the floor every query falls back to, so a
/// lookup for any frame resolves (a miss below the floor returns the floor
/// pair).
#[derive(Debug, Clone)]
pub struct ChangeSchedule {
    entries: Vec<ScheduleEntry>,
}

impl ChangeSchedule {
    pub fn new(initial: FolderPair) -> Self {
        Self {
            entries: vec![ScheduleEntry {
                at_frame: 0,
                pair: initial,
            }],
        }
    }

    /// Append a change. Equal `at_frame` overwrites the last entry;
    /// out-of-order records are rejected with a warning.
    pub fn record(&mut self, at_frame: i64, pair: FolderPair) {
        if let Some(last) = self.entries.last_mut() {
            if at_frame == last.at_frame {
                last.pair = pair;
                return;
            }
            if at_frame < last.at_frame {
                warn!(
                    "schedule record out of order: {} < {}, ignoring",
                    at_frame, last.at_frame
                );
                return;
            }
        }
        self.entries.push(ScheduleEntry { at_frame, pair });
    }

    /// Latest entry with `at_frame <= frame`.
    pub fn pair_at(&self, frame: i64) -> FolderPair {
        let idx = self.entries.partition_point(|e| e.at_frame <= frame);
        if idx == 0 {
            self.entries[0].pair
        } else {
            self.entries[idx - 1].pair
        }
    }

    fn last_pair(&self) -> FolderPair {
        self.entries.last().map(|e| e.pair).unwrap_or(FolderPair::ZERO)
    }

    /// Drop entries that fell behind `frame`, keeping the floor entry.
    pub fn prune_before(&mut self, frame: i64) {
        let idx = self.entries.partition_point(|e| e.at_frame <= frame);
        if idx > 1 {
            self.entries.drain(..idx - 1);
        }
    }

    /// Rebuild as a single floor entry.
    pub fn reset(&mut self, pair: FolderPair) {
        self.entries.clear();
        self.entries.push(ScheduleEntry { at_frame: 0, pair });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Folder pair selection state machine.
#[derive(Debug)]
pub struct Selector {
    mode: SelectorMode,
    fps: i64,
    main_count: usize,
    float_count: usize,

    rng: StdRng,
    rand_mult: i64,
    rand_start: i64,

    schedule: ChangeSchedule,
    /// Random schedule has been generated through this position.
    generated_until: i64,

    /// Fold parameters for mapping positions to effective frames; unset
    /// (max_index 0) means positions are used as-is.
    max_index: i64,
    loop_mode: LoopMode,

    direction: Direction,
    current: FolderPair,
    last_pos: i64,

    /// Manual-mode pair and its debounced pending command.
    manual: FolderPair,
    pending: DebouncedDeltas,
}

/// Wrap an index by a signed delta, modulo count (negative deltas included).
fn wrap_index(idx: usize, delta: i64, count: usize) -> usize {
    (idx as i64 + delta).rem_euclid(count.max(1) as i64) as usize
}

impl Selector {
    /// `seed` pins the RNG for reproducible runs/tests; `None` seeds from
    /// entropy. Folder counts are clamped to at least 1 (empty groups are
    /// rejected earlier, at manifest load).
    pub fn new(
        mode: SelectorMode,
        fps: u32,
        main_count: usize,
        float_count: usize,
        seed: Option<u64>,
    ) -> Self {
        let mut rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        let fps = fps.max(1) as i64;
        let rand_mult = rng.gen_range(RAND_MULT_MIN..=RAND_MULT_MAX);
        let rand_start = rng.gen_range(fps..=10 * fps);
        info!(
            "selector: mode={:?}, {} main / {} float folders",
            mode, main_count, float_count
        );
        Self {
            mode,
            fps,
            main_count: main_count.max(1),
            float_count: float_count.max(1),
            rng,
            rand_mult,
            rand_start,
            schedule: ChangeSchedule::new(FolderPair::ZERO),
            generated_until: 0,
            max_index: 0,
            loop_mode: LoopMode::Wrap,
            direction: Direction::Forward,
            current: FolderPair::ZERO,
            last_pos: 0,
            manual: FolderPair::ZERO,
            pending: DebouncedDeltas::default(),
        }
    }

    pub fn set_debounce_ms(&mut self, delay_ms: u64) {
        self.pending.set_delay(delay_ms);
    }

    /// Set the sequence length and loop mode so positions fold into effective
    /// frames the same way the driver folds them.
    pub fn set_fold(&mut self, max_index: i64, loop_mode: LoopMode) {
        self.max_index = max_index.max(0);
        self.loop_mode = loop_mode;
    }

    /// Effective frame and sweep direction at a monotonic position. Without
    /// fold parameters the position is the frame (always forward).
    fn fold(&self, pos: i64) -> (i64, Direction) {
        if self.max_index <= 0 {
            return (pos, self.direction);
        }
        match self.loop_mode {
            LoopMode::PingPong => {
                let cycle = 2 * self.max_index;
                let raw = pos.rem_euclid(cycle);
                if raw < self.max_index {
                    (raw, Direction::Forward)
                } else {
                    (cycle - raw - 1, Direction::Backward)
                }
            }
            LoopMode::Wrap => (pos.rem_euclid(self.max_index), Direction::Forward),
        }
    }

    pub fn mode(&self) -> SelectorMode {
        self.mode
    }

    pub fn current(&self) -> FolderPair {
        self.current
    }

    #[cfg(test)]
    pub(crate) fn schedule_len(&self) -> usize {
        self.schedule.len()
    }

    /// Switch policy. Redraws the randomness and rebuilds the schedule from
    /// the current pair. Returns false when the mode is unchanged.
    pub fn set_mode(&mut self, mode: SelectorMode) -> bool {
        if mode == self.mode {
            return false;
        }
        info!("selector mode {:?} -> {:?}", self.mode, mode);
        self.mode = mode;
        self.redraw_mult();
        self.redraw_start();
        self.pending.cancel();
        self.manual = self.current;
        self.schedule.reset(self.current);
        self.generated_until = self.last_pos;
        true
    }

    fn redraw_mult(&mut self) {
        self.rand_mult = self.rng.gen_range(RAND_MULT_MIN..=RAND_MULT_MAX);
    }

    fn redraw_start(&mut self) {
        self.rand_start = self.rng.gen_range(self.fps..=10 * self.fps);
    }

    /// One random-policy step at position `pos`. Returns the new pair when
    /// the selection actually changes.
    ///
    /// All predicates see the folded effective frame: ping-pong re-enters
    /// the low-frame reset region every cycle, so the "force both folders to
    /// 0" rule keeps firing for the lifetime of the loop.
    fn random_step(&mut self, pos: i64) -> Option<FolderPair> {
        let cur = self.schedule.last_pair();
        let (frame, direction) = self.fold(pos);

        // Reset rule: before the drawn start frame, or inside the forward
        // reset band, force both folders to 0. rand_start is redrawn only
        // when the rule fires, not every step.
        let in_reset_band = direction == Direction::Forward
            && frame > 10 * self.rand_mult
            && frame < 12 * self.rand_mult;
        if frame < self.rand_start || in_reset_band {
            self.redraw_start();
            return (cur != FolderPair::ZERO).then_some(FolderPair::ZERO);
        }

        let mut pair = cur;
        if frame % ((self.fps + 1) * self.rand_mult) == 0 {
            pair.main = self.rng.gen_range(0..self.main_count);
            self.redraw_mult();
        }
        if frame % (2 + self.fps * self.rand_mult) == 0 {
            pair.float = self.rng.gen_range(0..self.float_count);
            self.redraw_mult();
        }
        (pair != cur).then_some(pair)
    }

    /// Extend the random schedule through `pos` (speculative precompute for
    /// the prefetch window). No-op for the other policies.
    pub fn ensure_until(&mut self, pos: i64) {
        if self.mode != SelectorMode::Random || pos <= self.generated_until {
            return;
        }
        for f in (self.generated_until + 1)..=pos {
            if let Some(pair) = self.random_step(f) {
                debug!("folder change scheduled at {}: {:?}", f, pair);
                self.schedule.record(f, pair);
            }
        }
        self.generated_until = pos;
    }

    fn increment_pair(&self, pos: i64) -> FolderPair {
        // foreground advances every fps frames, background every 2*fps
        FolderPair {
            main: ((pos / (2 * self.fps)) % self.main_count as i64) as usize,
            float: ((pos / self.fps) % self.float_count as i64) as usize,
        }
    }

    /// What the folder pair is (or will be) at `pos`, without mutating
    /// selection state. Random answers come from the schedule; positions
    /// beyond the generated range fall back to the latest known pair.
    pub fn pair_at(&self, pos: i64) -> FolderPair {
        match self.mode {
            SelectorMode::Random => self.schedule.pair_at(pos),
            SelectorMode::Increment => self.increment_pair(pos),
            SelectorMode::Manual => self.manual,
        }
    }

    /// Move the playhead to `pos`. Returns the new pair when it changed.
    pub fn advance(&mut self, pos: i64) -> Option<FolderPair> {
        self.last_pos = pos;
        self.ensure_until(pos);
        let pair = self.pair_at(pos);
        if pair != self.current {
            self.current = pair;
            Some(pair)
        } else {
            None
        }
    }

    /// Drop schedule entries the playhead has passed.
    pub fn prune(&mut self, pos: i64) {
        self.schedule.prune_before(pos);
    }

    /// Direction flip: the schedule is stale, rebuild it from the current
    /// pair at the new playhead.
    pub fn on_direction_change(&mut self, pos: i64, direction: Direction) {
        self.direction = direction;
        self.schedule.reset(self.current);
        self.generated_until = pos;
        self.last_pos = pos;
        debug!(
            "schedule rebuilt at position {} ({:?})",
            pos, direction
        );
    }

    /// Queue a manual folder delta (debounced). Ignored with a warning
    /// outside manual mode.
    pub fn request_deltas(&mut self, main_delta: i64, float_delta: i64) {
        if self.mode != SelectorMode::Manual {
            warn!(
                "folder deltas ignored: selector is in {:?} mode",
                self.mode
            );
            return;
        }
        self.pending.schedule(main_delta, float_delta);
    }

    /// Apply a pending manual command whose quiet period elapsed.
    pub fn poll_manual(&mut self) -> Option<FolderPair> {
        if self.mode != SelectorMode::Manual {
            return None;
        }
        let (main_delta, float_delta) = self.pending.tick()?;
        let pair = FolderPair {
            main: wrap_index(self.manual.main, main_delta, self.main_count),
            float: wrap_index(self.manual.float, float_delta, self.float_count),
        };
        if pair == self.manual {
            return None;
        }
        self.manual = pair;
        self.current = pair;
        Some(pair)
    }
}
