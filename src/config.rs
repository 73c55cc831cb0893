//! Runtime configuration with serde defaults.
//!
//! Every field has a default, so a partial JSON config (or none at all) is
//! valid. CLI flags are applied on top via `apply_args`.

use log::warn;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::core::driver::LoopMode;
use crate::core::selector::SelectorMode;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Playback rate in frames per second.
    pub fps: u32,
    /// Prefetch window length in positions ahead of the playhead.
    pub buffer_size: usize,
    /// Loader pool size (concurrent decodes).
    pub max_concurrent: usize,
    /// Boundary behavior: ping-pong reflection or wrap.
    pub mode: LoopMode,
    /// Folder selection policy.
    pub policy: SelectorMode,
    /// Quiet period for manual folder switches, milliseconds.
    pub debounce_ms: u64,
    /// Minimum ticks between prefetch passes once the window is warm.
    pub cooldown_ticks: u64,
    /// Pause automatically after this many full cycles.
    pub pause_after_cycles: Option<u64>,
    /// RNG seed for reproducible folder selection.
    pub seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fps: 12,
            buffer_size: 24,
            max_concurrent: 4,
            mode: LoopMode::PingPong,
            policy: SelectorMode::Random,
            debounce_ms: 150,
            cooldown_ticks: 3,
            pause_after_cycles: None,
            seed: None,
        }
    }
}

impl Config {
    /// Load from a JSON file; missing fields take defaults. A missing file is
    /// not an error, config is optional.
    pub fn from_file(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(config) => config,
                Err(e) => {
                    warn!("bad config {}: {}, using defaults", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    /// LRU capacity handed to the prefetch cache. Deliberately larger than
    /// `buffer_size`: the windowed trim after each fill pass is what holds
    /// residency to the look-ahead window; this bound is the hard fence that
    /// keeps a mid-pass burst of inserts from growing without limit before
    /// the trim runs.
    pub fn cache_capacity(&self) -> usize {
        (self.buffer_size * 2).max(8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.fps, 12);
        assert_eq!(config.buffer_size, 24);
        assert_eq!(config.mode, LoopMode::PingPong);
        assert_eq!(config.policy, SelectorMode::Random);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: Config =
            serde_json::from_str(r#"{ "fps": 24, "mode": "wrap" }"#).unwrap();
        assert_eq!(config.fps, 24);
        assert_eq!(config.mode, LoopMode::Wrap);
        assert_eq!(config.buffer_size, 24);
        assert_eq!(config.policy, SelectorMode::Random);
    }

    #[test]
    fn test_missing_file_is_defaults() {
        let config = Config::from_file(Path::new("/nonexistent/diptych.json"));
        assert_eq!(config.fps, 12);
    }
}
