//! Core engine modules - clock, selection, resolution, cache, player.
//!
//! These form the playback engine, independent of any output surface.

pub mod cache;
pub mod debounce;
pub mod driver;
pub mod events;
pub mod player;
pub mod resolver;
pub mod selector;

// Re-exports for convenience
pub use cache::PrefetchCache;
pub use debounce::DebouncedDeltas;
pub use driver::{Direction, Driver, DriverError, LoopMode};
pub use events::{EventSink, LoopEvent};
pub use player::{Player, Renderer};
pub use resolver::{PairPaths, resolve};
pub use selector::{ChangeSchedule, FolderPair, Selector, SelectorMode};
