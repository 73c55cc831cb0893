use clap::Parser;
use log::warn;
use std::path::PathBuf;

use crate::config::Config;
use crate::core::driver::LoopMode;
use crate::core::selector::SelectorMode;

/// Dual-layer looping image sequence player
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Manifest JSON listing the background (main) folders
    #[arg(value_name = "MAIN_MANIFEST")]
    pub main_manifest: PathBuf,

    /// Manifest JSON listing the foreground (float) folders
    #[arg(value_name = "FLOAT_MANIFEST")]
    pub float_manifest: PathBuf,

    /// Root directory manifest paths are resolved against
    #[arg(short = 'r', long = "root", value_name = "DIR", default_value = ".")]
    pub root: PathBuf,

    /// Optional JSON config file (CLI flags override it)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Playback rate in frames per second
    #[arg(long = "fps", value_name = "N")]
    pub fps: Option<u32>,

    /// Prefetch window length (positions ahead of the playhead)
    #[arg(short = 'b', long = "buffer", value_name = "N")]
    pub buffer: Option<usize>,

    /// Concurrent image decodes
    #[arg(short = 'w', long = "workers", value_name = "N")]
    pub workers: Option<usize>,

    /// Loop mode: pingpong or wrap
    #[arg(short = 'm', long = "mode", value_name = "MODE")]
    pub mode: Option<String>,

    /// Folder selection policy: random, increment or manual
    #[arg(short = 'p', long = "policy", value_name = "POLICY")]
    pub policy: Option<String>,

    /// Pause after this many full cycles
    #[arg(long = "cycles", value_name = "N")]
    pub pause_after_cycles: Option<u64>,

    /// How many display ticks to run before exiting
    #[arg(short = 't', long = "ticks", value_name = "N", default_value = "240")]
    pub ticks: u64,

    /// RNG seed for reproducible folder selection
    #[arg(long = "seed", value_name = "N")]
    pub seed: Option<u64>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbosity: u8,
}

impl Args {
    /// Layer CLI flags over a config. Unknown mode/policy strings keep the
    /// configured value with a warning rather than aborting.
    pub fn apply(&self, mut config: Config) -> Config {
        if let Some(fps) = self.fps {
            config.fps = fps;
        }
        if let Some(buffer) = self.buffer {
            config.buffer_size = buffer;
        }
        if let Some(workers) = self.workers {
            config.max_concurrent = workers;
        }
        if let Some(mode) = &self.mode {
            match mode.to_lowercase().as_str() {
                "pingpong" | "ping-pong" => config.mode = LoopMode::PingPong,
                "wrap" => config.mode = LoopMode::Wrap,
                other => warn!("unknown mode {:?}, keeping {:?}", other, config.mode),
            }
        }
        if let Some(policy) = &self.policy {
            match policy.to_lowercase().as_str() {
                "random" => config.policy = SelectorMode::Random,
                "increment" => config.policy = SelectorMode::Increment,
                "manual" => config.policy = SelectorMode::Manual,
                other => warn!("unknown policy {:?}, keeping {:?}", other, config.policy),
            }
        }
        if self.pause_after_cycles.is_some() {
            config.pause_after_cycles = self.pause_after_cycles;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        config
    }
}
