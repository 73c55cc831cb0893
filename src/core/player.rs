//! Player: ties the clock, folder selection, path resolution, and the
//! prefetch cache into one tick pipeline.
//!
//! `tick()` is the whole engine. Per call it advances the clock, reacts to
//! direction/folder changes, folds finished decodes in, keeps the prefetch
//! window warm, and paints the current position. A cache miss repeats the
//! last successfully rendered pair instead of flashing a hole, and the miss
//! is counted once per position.
//!
//! Everything stateful runs on the caller's thread; the only other threads
//! are the loader pool inside the cache.

use log::{debug, info};
use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::core::cache::PrefetchCache;
use crate::core::driver::{Driver, DriverError, LoopMode};
use crate::core::events::{EventSink, LoopEvent};
use crate::core::resolver::resolve;
use crate::core::selector::{Selector, SelectorMode};
use crate::entities::{FolderSet, ImagePair, ImageSource};

/// Output surface. The player hands over the decoded pair for the effective
/// frame; compositing the two layers is the renderer's business.
pub trait Renderer {
    fn draw(&mut self, frame: i64, pair: &ImagePair);
}

/// Playback engine for a dual-layer image sequence loop.
pub struct Player {
    driver: Driver,
    selector: Selector,
    cache: PrefetchCache,
    folders: FolderSet,
    events: EventSink,
    buffer_size: i64,

    last_good: Option<ImagePair>,
    /// Position whose pair was actually drawn.
    drawn: Option<i64>,
    /// Position whose miss was already counted (one repeat per position).
    repeated: Option<i64>,
    rendered: u64,
    repeats: u64,
}

impl Player {
    pub fn new(
        folders: FolderSet,
        loader: Arc<dyn ImageSource>,
        config: &Config,
    ) -> Result<Self, DriverError> {
        let mut driver = Driver::new(config.fps, config.mode);
        driver.set_pause_after_cycles(config.pause_after_cycles);
        driver.initialize(folders.max_len() as i64)?;

        let mut selector = Selector::new(
            config.policy,
            config.fps,
            folders.main_count(),
            folders.float_count(),
            config.seed,
        );
        selector.set_debounce_ms(config.debounce_ms);
        selector.set_fold(folders.max_len() as i64, config.mode);

        let mut cache = PrefetchCache::new(
            config.cache_capacity(),
            config.max_concurrent,
            loader,
        );
        cache.set_cooldown_ticks(config.cooldown_ticks);

        info!(
            "player: {} fps, buffer {}, {:?}/{:?}",
            config.fps, config.buffer_size, config.mode, config.policy
        );

        Ok(Self {
            driver,
            selector,
            cache,
            folders,
            events: EventSink::new(),
            buffer_size: config.buffer_size.max(1) as i64,
            last_good: None,
            drawn: None,
            repeated: None,
            rendered: 0,
            repeats: 0,
        })
    }

    /// Event sink for subscriptions; all playback events flow through here.
    pub fn events(&self) -> &EventSink {
        &self.events
    }

    /// One engine tick: advance the clock to `now`, service the cache, draw.
    pub fn tick(&mut self, now: Instant, renderer: &mut dyn Renderer) {
        let driver_events = self.driver.update(now);
        let position = self.driver.position();

        for event in driver_events {
            if let LoopEvent::DirectionChanged { direction } = event {
                // the schedule and every prefetched prediction belong to the
                // old sweep; rebuild selection and restart the cache
                self.selector.on_direction_change(position, direction);
                self.cache.clear();
            }
            self.events.emit(event);
        }

        // debounced manual folder switch: unscheduled, so prefetched
        // positions for the old pair are wrong
        if let Some(pair) = self.selector.poll_manual() {
            self.cache.clear();
            self.events.emit(LoopEvent::FolderChanged { pair });
        }

        if let Some(pair) = self.selector.advance(position) {
            self.events.emit(LoopEvent::FolderChanged { pair });
        }

        self.cache.on_tick();
        self.cache.drain_loaded();

        let window = position..position + self.buffer_size;
        self.selector.ensure_until(window.end - 1);
        let (selector, folders, mode) = (&self.selector, &self.folders, self.driver.mode());
        self.cache.ensure(window.clone(), |pos| {
            resolve(pos, selector.pair_at(pos), folders, mode)
        });
        self.cache.trim(&window);
        self.selector.prune(position);

        self.draw(position, renderer);
    }

    fn draw(&mut self, position: i64, renderer: &mut dyn Renderer) {
        if self.drawn == Some(position) {
            return;
        }
        let frame = self.driver.frame();
        if let Some(pair) = self.cache.get(position) {
            renderer.draw(frame, &pair);
            self.last_good = Some(pair);
            self.drawn = Some(position);
            self.rendered += 1;
        } else if self.repeated != Some(position)
            && let Some(last) = &self.last_good
        {
            // nothing resident yet: hold the last good frame instead of a
            // hole (startup misses before any frame are just waited out)
            self.repeated = Some(position);
            self.repeats += 1;
            debug!("position {} not resident, repeating last frame", position);
            renderer.draw(frame, last);
        }
        // a miss leaves `drawn` unset so a late decode still paints
    }

    pub fn pause(&mut self) {
        if self.driver.is_running() {
            self.driver.pause();
            self.events.emit(LoopEvent::Paused { paused: true });
        }
    }

    pub fn unpause(&mut self) {
        if self.driver.is_initialized() && !self.driver.is_running() {
            self.driver.unpause();
            self.events.emit(LoopEvent::Paused { paused: false });
        }
    }

    /// Back to the initial frame; selection carries over, cache restarts.
    pub fn reset(&mut self) {
        self.driver.reset();
        self.selector
            .on_direction_change(0, crate::core::driver::Direction::Forward);
        self.cache.clear();
        self.drawn = None;
        self.repeated = None;
        self.events.emit(LoopEvent::Reset);
    }

    /// Switch folder selection policy at runtime.
    pub fn set_policy(&mut self, mode: SelectorMode) {
        if self.selector.set_mode(mode) {
            self.cache.clear();
            self.events.emit(LoopEvent::ModeChanged { mode });
        }
    }

    /// Queue a manual folder switch (applies after the debounce window).
    pub fn request_folder_deltas(&mut self, main_delta: i64, float_delta: i64) {
        self.selector.request_deltas(main_delta, float_delta);
    }

    pub fn frame(&self) -> i64 {
        self.driver.frame()
    }

    pub fn position(&self) -> i64 {
        self.driver.position()
    }

    pub fn cycles(&self) -> u64 {
        self.driver.cycles()
    }

    pub fn mode(&self) -> LoopMode {
        self.driver.mode()
    }

    pub fn policy(&self) -> SelectorMode {
        self.selector.mode()
    }

    pub fn folder_pair(&self) -> crate::core::selector::FolderPair {
        self.selector.current()
    }

    pub fn is_running(&self) -> bool {
        self.driver.is_running()
    }

    /// Resident pairs in the prefetch cache.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    /// Positions drawn with a fresh decoded pair.
    pub fn rendered(&self) -> u64 {
        self.rendered
    }

    /// Positions where the last good frame was repeated.
    pub fn repeats(&self) -> u64 {
        self.repeats
    }

    pub fn cache_mem(&self) -> usize {
        self.cache.mem()
    }
}
