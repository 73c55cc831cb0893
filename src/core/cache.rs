//! Prefetch cache: decoded image pairs for upcoming positions.
//!
//! Loading is pushed to a fixed pool of worker threads over crossbeam
//! channels; the tick thread owns all bookkeeping. `ensure()` scans the
//! prefetch window, enqueues missing positions, and `drain_loaded()` folds
//! finished decodes back in on the next tick. Nothing in here blocks on IO.
//!
//! Stale work is cancelled by epoch: `clear()` bumps a shared counter, and
//! results carrying an older epoch are discarded at both ends (workers skip
//! stale requests, the drain skips stale results).
//!
//! A pair is inserted all-or-nothing: the worker decodes both halves and a
//! single-side failure inserts nothing, so a hit always renders a complete
//! frame.

use crossbeam_channel::{Receiver, Sender, unbounded};
use log::{debug, trace, warn};
use lru::LruCache;
use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::ops::Range;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;

use crate::core::resolver::PairPaths;
use crate::entities::{ImagePair, ImageSource};

/// Decode order for the worker pool.
struct LoadRequest {
    pos: i64,
    paths: PairPaths,
    epoch: u64,
}

/// A finished decode (both halves succeeded).
struct LoadResult {
    pos: i64,
    epoch: u64,
    pair: Option<ImagePair>,
}

/// Windowed LRU cache of decoded pairs with an async loading pipeline.
pub struct PrefetchCache {
    cache: LruCache<i64, ImagePair>,
    in_flight: HashSet<i64>,
    req_tx: Sender<LoadRequest>,
    res_rx: Receiver<LoadResult>,
    epoch: Arc<AtomicU64>,
    pass_active: Arc<AtomicBool>,
    /// Ticks since the last full ensure pass, for the cooldown guard.
    ticks_since_pass: u64,
    cooldown_ticks: u64,
    misses: u64,
    _handles: Vec<thread::JoinHandle<()>>,
}

impl std::fmt::Debug for PrefetchCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrefetchCache")
            .field("resident", &self.cache.len())
            .field("in_flight", &self.in_flight.len())
            .field("epoch", &self.epoch.load(Ordering::Relaxed))
            .finish()
    }
}

fn worker_loop(
    worker_id: usize,
    rx: Receiver<LoadRequest>,
    tx: Sender<LoadResult>,
    epoch: Arc<AtomicU64>,
    loader: Arc<dyn ImageSource>,
) {
    debug!("loader {} started", worker_id);
    while let Ok(req) = rx.recv() {
        if req.epoch != epoch.load(Ordering::Relaxed) {
            trace!("loader {}: skipping stale request for {}", worker_id, req.pos);
            continue;
        }
        // Both halves or nothing.
        let pair = match (&req.paths.main, &req.paths.float) {
            (Some(main), Some(float)) => {
                match (loader.load(main), loader.load(float)) {
                    (Ok(main), Ok(float)) => Some(ImagePair { main, float }),
                    (Err(e), _) | (_, Err(e)) => {
                        warn!("loader {}: position {} dropped: {}", worker_id, req.pos, e);
                        None
                    }
                }
            }
            _ => None,
        };
        let result = LoadResult {
            pos: req.pos,
            epoch: req.epoch,
            pair,
        };
        if tx.send(result).is_err() {
            break;
        }
    }
    debug!("loader {} stopped", worker_id);
}

impl PrefetchCache {
    /// `capacity` bounds resident pairs (LRU fence behind the windowed trim);
    /// `max_concurrent` worker threads gate how many decodes run at once.
    pub fn new(capacity: usize, max_concurrent: usize, loader: Arc<dyn ImageSource>) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        let (req_tx, req_rx) = unbounded::<LoadRequest>();
        let (res_tx, res_rx) = unbounded::<LoadResult>();
        let epoch = Arc::new(AtomicU64::new(0));

        let workers = max_concurrent.max(1);
        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let rx = req_rx.clone();
            let tx = res_tx.clone();
            let epoch = Arc::clone(&epoch);
            let loader = Arc::clone(&loader);
            let handle = thread::Builder::new()
                .name(format!("diptych-load-{}", worker_id))
                .spawn(move || worker_loop(worker_id, rx, tx, epoch, loader))
                .expect("failed to spawn loader thread");
            handles.push(handle);
        }
        debug!("prefetch cache: capacity {}, {} loader(s)", capacity, workers);

        Self {
            cache: LruCache::new(capacity),
            in_flight: HashSet::new(),
            req_tx,
            res_rx,
            epoch,
            pass_active: Arc::new(AtomicBool::new(false)),
            ticks_since_pass: 0,
            cooldown_ticks: 3,
            misses: 0,
            _handles: handles,
        }
    }

    /// Minimum ticks between ensure passes once the window is mostly warm.
    pub fn set_cooldown_ticks(&mut self, ticks: u64) {
        self.cooldown_ticks = ticks;
    }

    /// Tick bookkeeping; call once per display tick.
    pub fn on_tick(&mut self) {
        self.ticks_since_pass = self.ticks_since_pass.saturating_add(1);
    }

    /// Scan the prefetch window and enqueue every position not resident and
    /// not already requested. `paths_for` maps a position to its image paths.
    ///
    /// Skipped entirely when a pass is already active (single-flight) or when
    /// the window is mostly warm and the cooldown has not elapsed yet.
    pub fn ensure<F>(&mut self, window: Range<i64>, paths_for: F)
    where
        F: Fn(i64) -> PairPaths,
    {
        if self
            .pass_active
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            trace!("ensure pass already active, skipping");
            return;
        }

        let window_len = (window.end - window.start).max(0) as usize;
        let warm = self.cache.len() * 2 > window_len;
        if warm && self.ticks_since_pass < self.cooldown_ticks {
            trace!(
                "ensure on cooldown ({} of {} ticks)",
                self.ticks_since_pass, self.cooldown_ticks
            );
            self.pass_active.store(false, Ordering::Release);
            return;
        }

        let epoch = self.epoch.load(Ordering::Relaxed);
        let mut queued = 0;
        for pos in window.clone() {
            if self.cache.contains(&pos) || self.in_flight.contains(&pos) {
                continue;
            }
            let paths = paths_for(pos);
            if !paths.complete() {
                continue;
            }
            self.in_flight.insert(pos);
            if self.req_tx.send(LoadRequest { pos, paths, epoch }).is_err() {
                warn!("loader pool is gone, dropping request for {}", pos);
                self.in_flight.remove(&pos);
                break;
            }
            queued += 1;
        }
        if queued > 0 {
            trace!("queued {} load(s) for window {:?}", queued, window);
        }
        self.ticks_since_pass = 0;
        self.pass_active.store(false, Ordering::Release);
    }

    /// Fold finished decodes into the cache. Returns how many pairs landed.
    /// Results from before the last `clear()` are discarded.
    pub fn drain_loaded(&mut self) -> usize {
        let current = self.epoch.load(Ordering::Relaxed);
        let mut inserted = 0;
        while let Ok(result) = self.res_rx.try_recv() {
            self.in_flight.remove(&result.pos);
            if result.epoch != current {
                trace!("discarding stale result for {}", result.pos);
                continue;
            }
            if let Some(pair) = result.pair {
                self.cache.put(result.pos, pair);
                inserted += 1;
            }
        }
        inserted
    }

    /// Drop resident pairs outside the validity window. This is the step
    /// that bounds residency to the look-ahead window after every fill pass;
    /// the LRU capacity only fences mid-pass growth between drain and trim.
    pub fn trim(&mut self, window: &Range<i64>) {
        let stale: Vec<i64> = self
            .cache
            .iter()
            .map(|(pos, _)| *pos)
            .filter(|pos| !window.contains(pos))
            .collect();
        for pos in &stale {
            self.cache.pop(pos);
        }
        if !stale.is_empty() {
            trace!("trimmed {} pair(s) outside {:?}", stale.len(), window);
        }
    }

    /// Invalidate everything: resident pairs and in-flight work. Bumps the
    /// epoch so late results from the old generation never land.
    pub fn clear(&mut self) {
        let epoch = self.epoch.fetch_add(1, Ordering::Relaxed) + 1;
        self.cache.clear();
        self.in_flight.clear();
        debug!("cache cleared, epoch {}", epoch);
    }

    /// Resident pair for `pos`, touching LRU order. A miss is counted.
    pub fn get(&mut self, pos: i64) -> Option<ImagePair> {
        match self.cache.get(&pos) {
            Some(pair) => Some(pair.clone()),
            None => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn has(&self, pos: i64) -> bool {
        self.cache.contains(&pos)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    /// Total bytes held by resident pairs.
    pub fn mem(&self) -> usize {
        self.cache.iter().map(|(_, p)| p.mem()).sum()
    }

    #[cfg(test)]
    pub(crate) fn force_pass_active(&self, active: bool) {
        self.pass_active.store(active, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{ImageHandle, LoadError};
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;
    use std::time::{Duration, Instant};

    fn paths_for(pos: i64) -> PairPaths {
        PairPaths {
            main: Some(PathBuf::from(format!("main/{}.png", pos))),
            float: Some(PathBuf::from(format!("float/{}.png", pos))),
        }
    }

    fn tiny() -> ImageHandle {
        ImageHandle::from_rgba8(vec![0u8; 4], 1, 1)
    }

    /// Counts concurrent `load` calls and tracks the high-water mark.
    struct CountingSource {
        active: AtomicUsize,
        high_water: AtomicUsize,
        delay: Duration,
    }

    impl CountingSource {
        fn new(delay_ms: u64) -> Self {
            Self {
                active: AtomicUsize::new(0),
                high_water: AtomicUsize::new(0),
                delay: Duration::from_millis(delay_ms),
            }
        }
    }

    impl ImageSource for CountingSource {
        fn load(&self, _path: &Path) -> Result<ImageHandle, LoadError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.high_water.fetch_max(now, Ordering::SeqCst);
            thread::sleep(self.delay);
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(tiny())
        }
    }

    /// Fails for paths containing the given marker.
    struct FailingSource {
        marker: &'static str,
        attempts: Mutex<Vec<PathBuf>>,
    }

    impl ImageSource for FailingSource {
        fn load(&self, path: &Path) -> Result<ImageHandle, LoadError> {
            self.attempts.lock().unwrap().push(path.to_path_buf());
            if path.to_string_lossy().contains(self.marker) {
                Err(LoadError::Decode {
                    path: path.to_path_buf(),
                    source: image::ImageError::IoError(std::io::Error::other("boom")),
                })
            } else {
                Ok(tiny())
            }
        }
    }

    fn drain_until(cache: &mut PrefetchCache, want: usize, timeout_ms: u64) -> usize {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        let mut total = 0;
        while total < want && Instant::now() < deadline {
            total += cache.drain_loaded();
            thread::sleep(Duration::from_millis(2));
        }
        total
    }

    #[test]
    fn test_window_fills_and_hits() {
        let mut cache = PrefetchCache::new(32, 2, Arc::new(CountingSource::new(0)));
        cache.ensure(0..8, paths_for);
        assert_eq!(drain_until(&mut cache, 8, 2000), 8);

        for pos in 0..8 {
            assert!(cache.has(pos), "pos={}", pos);
            assert!(cache.get(pos).is_some());
        }
        assert_eq!(cache.misses(), 0);
        assert!(cache.get(99).is_none());
        assert_eq!(cache.misses(), 1);
    }

    #[test]
    fn test_capacity_evicts_lru() {
        let mut cache = PrefetchCache::new(4, 2, Arc::new(CountingSource::new(0)));
        cache.ensure(0..8, paths_for);
        drain_until(&mut cache, 8, 2000);
        assert_eq!(cache.len(), 4);
    }

    #[test]
    fn test_concurrency_stays_within_pool() {
        let source = Arc::new(CountingSource::new(20));
        let mut cache = PrefetchCache::new(64, 3, Arc::clone(&source) as Arc<dyn ImageSource>);
        cache.ensure(0..12, paths_for);
        drain_until(&mut cache, 12, 5000);
        assert!(
            source.high_water.load(Ordering::SeqCst) <= 3,
            "high water {}",
            source.high_water.load(Ordering::SeqCst)
        );
    }

    #[test]
    fn test_single_side_failure_inserts_nothing() {
        let source = Arc::new(FailingSource {
            marker: "float/3",
            attempts: Mutex::new(Vec::new()),
        });
        let mut cache = PrefetchCache::new(32, 1, source);
        cache.ensure(0..5, paths_for);
        drain_until(&mut cache, 4, 2000);

        assert!(cache.has(0));
        assert!(cache.has(2));
        assert!(!cache.has(3), "half-failed pair must not be resident");
    }

    #[test]
    fn test_clear_discards_stale_results() {
        let mut cache = PrefetchCache::new(32, 2, Arc::new(CountingSource::new(30)));
        cache.ensure(0..6, paths_for);
        cache.clear();

        // old-epoch results arrive but never land
        thread::sleep(Duration::from_millis(200));
        assert_eq!(cache.drain_loaded(), 0);
        assert!(cache.is_empty());
        assert_eq!(cache.in_flight(), 0);
    }

    #[test]
    fn test_ensure_is_single_flight() {
        let mut cache = PrefetchCache::new(32, 2, Arc::new(CountingSource::new(0)));
        cache.force_pass_active(true);
        cache.ensure(0..8, paths_for);
        assert_eq!(cache.in_flight(), 0);

        cache.force_pass_active(false);
        cache.ensure(0..8, paths_for);
        assert_eq!(cache.in_flight(), 8);
    }

    #[test]
    fn test_warm_cache_respects_cooldown() {
        let mut cache = PrefetchCache::new(32, 2, Arc::new(CountingSource::new(0)));
        cache.set_cooldown_ticks(1000);
        cache.ensure(0..8, paths_for);
        drain_until(&mut cache, 8, 2000);

        // warm window, cooldown not elapsed: the new position is not queued
        cache.ensure(1..9, paths_for);
        assert_eq!(cache.in_flight(), 0);

        // after enough ticks the pass runs again
        for _ in 0..1000 {
            cache.on_tick();
        }
        cache.ensure(1..9, paths_for);
        assert_eq!(cache.in_flight(), 1);
    }

    #[test]
    fn test_trim_drops_positions_behind_window() {
        let mut cache = PrefetchCache::new(32, 2, Arc::new(CountingSource::new(0)));
        cache.ensure(0..8, paths_for);
        drain_until(&mut cache, 8, 2000);

        cache.trim(&(4..12));
        for pos in 0..4 {
            assert!(!cache.has(pos), "pos={}", pos);
        }
        for pos in 4..8 {
            assert!(cache.has(pos), "pos={}", pos);
        }
    }

    #[test]
    fn test_trim_bounds_residency_to_window() {
        // capacity is wider than the window; after the trim step residency
        // never exceeds the window length
        let mut cache = PrefetchCache::new(32, 2, Arc::new(CountingSource::new(0)));
        cache.ensure(0..16, paths_for);
        drain_until(&mut cache, 16, 2000);
        assert!(cache.len() > 8);

        let window = 8..16;
        cache.trim(&window);
        assert!(cache.len() <= (window.end - window.start) as usize);
        for pos in window {
            assert!(cache.has(pos), "pos={}", pos);
        }
    }

    #[test]
    fn test_incomplete_paths_never_queued() {
        let mut cache = PrefetchCache::new(32, 2, Arc::new(CountingSource::new(0)));
        cache.ensure(0..4, |_| PairPaths {
            main: None,
            float: Some(PathBuf::from("float/x.png")),
        });
        assert_eq!(cache.in_flight(), 0);
    }
}
