//! Configuration for the automation run.
//!
//! The defaults encode the tuning for the one window/resolution this tool
//! targets (ROI geometry, roll target, pacing). Every knob that varied
//! between historical versions of the script is a field here rather than a
//! forked code path.

use anyhow::{Context, Result};
use roll_capture::PixelRegion;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Substring of the game window title to look for.
    pub window_title: String,
    /// Button reference images, loaded once per session.
    pub reroll_template: PathBuf,
    pub store_template: PathBuf,
    /// Result region, in window-local pixels, sized to exactly bound the digits.
    pub roi: PixelRegion,
    /// Where the best roll is persisted across runs.
    pub max_roll_path: PathBuf,
    /// Stop automating once a roll reaches this value.
    pub target_roll: u32,
    /// Grayscale cutoff for digit pixels during OCR preprocessing.
    pub ocr_threshold: u8,
    /// Delay between clicking reroll and capturing the result region.
    pub reroll_settle_ms: u64,
    /// Delay after the store click so it registers before the next reroll;
    /// rerolling too soon cancels the store in the game.
    pub post_store_delay_ms: u64,
    /// The store button wants a double click.
    pub store_clicks: u32,
    pub store_click_interval_ms: u64,
    /// Track every observed roll in memory and log the most frequent value.
    pub track_history: bool,
    /// Re-resolve the window every iteration and warn when it is minimized
    /// or has moved since startup.
    pub revalidate_window: bool,
    /// Save every captured ROI and its recognized value to `debug_dir`.
    pub debug: bool,
    pub debug_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            window_title: "Baldur's Gate II - Enhanced Edition".to_string(),
            reroll_template: PathBuf::from("assets/reroll.png"),
            store_template: PathBuf::from("assets/store.png"),
            roi: PixelRegion {
                x: 385,
                y: 615,
                width: 35,
                height: 20,
            },
            max_roll_path: PathBuf::from("max_roll.txt"),
            target_roll: 100,
            ocr_threshold: 140,
            reroll_settle_ms: 1000,
            post_store_delay_ms: 300,
            store_clicks: 2,
            store_click_interval_ms: 100,
            track_history: false,
            revalidate_window: false,
            debug: false,
            debug_dir: PathBuf::from("debug_rolls"),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file, falling back to the built-in
    /// defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("No config at {}; using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }
}
