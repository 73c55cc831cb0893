use diptych::cli::Args;
use diptych::config::Config;
use diptych::core::player::{Player, Renderer};
use diptych::entities::{FolderSet, FsLoader, ImagePair};

use anyhow::Context;
use clap::Parser;
use log::{debug, info};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Headless output: logs what would be composited. Embedders implement
/// `Renderer` against their own surface.
#[derive(Default)]
struct ConsoleRenderer {
    drawn: u64,
}

impl Renderer for ConsoleRenderer {
    fn draw(&mut self, frame: i64, pair: &ImagePair) {
        self.drawn += 1;
        debug!(
            "frame {}: main {}x{}, float {}x{}",
            frame,
            pair.main.width(),
            pair.main.height(),
            pair.float.width(),
            pair.float.height()
        );
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // 0 (default) = warn, 1 (-v) = info, 2 (-vv) = debug, 3+ (-vvv) = trace
    let default_level = match args.verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_millis()
        .init();

    info!("diptych starting");
    debug!("command-line args: {:?}", args);

    let config = args.apply(match &args.config {
        Some(path) => Config::from_file(path),
        None => Config::default(),
    });

    let folders = FolderSet::load(&args.main_manifest, &args.float_manifest)
        .context("loading folder manifests")?;
    let loader = Arc::new(FsLoader::new(&args.root));
    let mut player =
        Player::new(folders, loader, &config).context("initializing player")?;

    player.events().subscribe(|event| {
        debug!("event: {:?}", event);
    });

    let mut renderer = ConsoleRenderer::default();
    let frame_duration = Duration::from_secs_f64(1.0 / config.fps.max(1) as f64);

    // warm-up: arm the clock and give the loader pool a head start
    player.tick(Instant::now(), &mut renderer);
    std::thread::sleep(frame_duration);

    for _ in 0..args.ticks {
        let tick_start = Instant::now();
        player.tick(tick_start, &mut renderer);
        if !player.is_running() {
            info!("playback paused after {} cycle(s), stopping", player.cycles());
            break;
        }
        if let Some(remaining) = frame_duration.checked_sub(tick_start.elapsed()) {
            std::thread::sleep(remaining);
        }
    }

    info!(
        "done: {} drawn, {} fresh, {} repeated, {} resident ({} KiB), {} cycle(s)",
        renderer.drawn,
        player.rendered(),
        player.repeats(),
        player.cached(),
        player.cache_mem() / 1024,
        player.cycles()
    );
    Ok(())
}
