//! Typed playback events with synchronous listener fan-out.
//!
//! Components report state changes as `LoopEvent` values. Listeners are
//! invoked immediately on emit, and every event is also queued so a main
//! loop can batch-process via `poll()`.

use std::sync::{Arc, Mutex, RwLock};

use crate::core::driver::Direction;
use crate::core::selector::{FolderPair, SelectorMode};

/// Playback state change notifications.
#[derive(Debug, Clone, PartialEq)]
pub enum LoopEvent {
    /// Effective (folded) frame changed. Emitted only on actual change,
    /// not every tick.
    FrameChanged { frame: i64 },
    /// Playback direction flipped at a reflection point.
    DirectionChanged { direction: Direction },
    /// One full cycle (forward+back traversal, or one wrap) completed.
    CycleCompleted { cycles: u64 },
    /// Active folder pair changed.
    FolderChanged { pair: FolderPair },
    /// Selector policy switched.
    ModeChanged { mode: SelectorMode },
    /// Playback paused or resumed.
    Paused { paused: bool },
    /// Driver returned to the initial frame.
    Reset,
}

type Listener = Arc<dyn Fn(&LoopEvent) + Send + Sync>;

/// Listener registry + deferred event queue.
///
/// Cloning shares the underlying registry, so a clone can be handed to
/// components that need to emit.
#[derive(Clone, Default)]
pub struct EventSink {
    listeners: Arc<RwLock<Vec<Listener>>>,
    queue: Arc<Mutex<Vec<LoopEvent>>>,
}

impl std::fmt::Debug for EventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSink")
            .field(
                "listeners",
                &self.listeners.read().map(|l| l.len()).unwrap_or(0),
            )
            .field("queued", &self.queue.lock().map(|q| q.len()).unwrap_or(0))
            .finish()
    }
}

impl EventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener invoked synchronously on every emit.
    pub fn subscribe<F>(&self, listener: F)
    where
        F: Fn(&LoopEvent) + Send + Sync + 'static,
    {
        self.listeners
            .write()
            .expect("lock")
            .push(Arc::new(listener));
    }

    /// Dispatch to listeners immediately and queue for `poll()`.
    pub fn emit(&self, event: LoopEvent) {
        for listener in self.listeners.read().expect("lock").iter() {
            listener(&event);
        }
        self.queue.lock().expect("lock").push(event);
    }

    /// Drain all events queued since the last poll.
    pub fn poll(&self) -> Vec<LoopEvent> {
        std::mem::take(&mut *self.queue.lock().expect("lock"))
    }

    pub fn queue_len(&self) -> usize {
        self.queue.lock().expect("lock").len()
    }
}
