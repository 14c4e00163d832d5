mod config;
mod hotkey;
mod input;
mod observer;
mod runner;
mod session;

use anyhow::{Context, Result};
use roll_capture::WindowHandle;
use roll_store::{BestRollStore, RollHistory};
use roll_vision::RollReader;
use std::path::Path;
use std::time::Duration;
use tracing::{error, info};

use config::Config;
use observer::{DebugFrameSaver, NullObserver, RollObserver};
use runner::{LoopTuning, RerollLoop};
use session::{Session, WindowRoiSource};

const CONFIG_PATH: &str = "maxroll.json";

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    if let Err(e) = run() {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let config = Config::load(Path::new(CONFIG_PATH))?;

    // The window is the one thing we cannot proceed without.
    let window = WindowHandle::find(&config.window_title)
        .with_context(|| format!("Could not find the game window \"{}\"", config.window_title))?;

    let session = Session::establish(&window, &config)?;

    let store = BestRollStore::load(&config.max_roll_path);
    let history = config.track_history.then(|| RollHistory::seeded(store.best()));
    let reader = RollReader::new(config.ocr_threshold);

    let observer: Box<dyn RollObserver> = if config.debug {
        Box::new(DebugFrameSaver::new(&config.debug_dir))
    } else {
        Box::new(NullObserver)
    };

    let tuning = LoopTuning {
        target_roll: config.target_roll,
        reroll_settle: Duration::from_millis(config.reroll_settle_ms),
        post_store_delay: Duration::from_millis(config.post_store_delay_ms),
        store_clicks: config.store_clicks,
        store_click_interval: Duration::from_millis(config.store_click_interval_ms),
    };

    let cancel = hotkey::spawn_cancel_listener();
    info!("Hold Ctrl+Space to stop");

    let roi_source = WindowRoiSource::new(window, &config, session.origin);
    let mut reroll_loop = RerollLoop::new(
        roi_source,
        input::RdevClicker,
        reader,
        store,
        history,
        observer,
        cancel,
        tuning,
        session.reroll_at,
        session.store_at,
    );

    reroll_loop.run();
    info!("Final best roll: {}", reroll_loop.best());
    Ok(())
}
