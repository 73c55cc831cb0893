//! DIPTYCH - Dual-layer looping image sequence player core
//!
//! Re-exports all modules for use by binary targets.

// Playback engine (clock, selection, cache, player)
pub mod core;

// App modules
pub mod cli;
pub mod config;
pub mod entities;

// Re-export commonly used types from core
pub use core::driver::{Direction, Driver, LoopMode};
pub use core::events::{EventSink, LoopEvent};
pub use core::player::{Player, Renderer};
pub use core::selector::{FolderPair, SelectorMode};

// Re-export entities
pub use entities::{FolderSet, FsLoader, ImagePair, ImageSource};
