//! Session setup: resolving the window, locating the two buttons once, and
//! the per-iteration window-backed ROI capture.

use anyhow::{Context, Result};
use image::RgbaImage;
use roll_capture::{crop_region, PixelRegion, WindowHandle};
use roll_vision::{locate, ButtonTemplate};
use tracing::{info, warn};

use crate::config::Config;
use crate::runner::RoiSource;

/// Button click points and window origin, computed once at startup and held
/// for the loop's duration. Button positions are assumed static while the
/// loop runs.
pub struct Session {
    pub origin: (i32, i32),
    pub reroll_at: (i32, i32),
    pub store_at: (i32, i32),
}

impl Session {
    /// Locate both buttons in a fresh capture of the window and convert
    /// their centers to screen coordinates.
    pub fn establish(window: &WindowHandle, config: &Config) -> Result<Self> {
        let origin = window.origin()?;
        info!(
            "Window \"{}\" at ({}, {})",
            window.title(),
            origin.0,
            origin.1
        );

        let reroll_template = ButtonTemplate::load(&config.reroll_template)?;
        let store_template = ButtonTemplate::load(&config.store_template)?;
        let frame = window.capture()?;

        let reroll_hit = locate(&frame, &reroll_template);
        let store_hit = locate(&frame, &store_template);
        info!(
            "Reroll button at ({}, {}) score {:.3}; store button at ({}, {}) score {:.3}",
            reroll_hit.x, reroll_hit.y, reroll_hit.score, store_hit.x, store_hit.y, store_hit.score
        );

        let to_screen = |center: (u32, u32)| {
            (origin.0 + center.0 as i32, origin.1 + center.1 as i32)
        };

        Ok(Self {
            origin,
            reroll_at: to_screen(reroll_hit.center(&reroll_template)),
            store_at: to_screen(store_hit.center(&store_template)),
        })
    }
}

/// Captures the result region from a fresh window frame every iteration.
pub struct WindowRoiSource {
    window: WindowHandle,
    title: String,
    roi: PixelRegion,
    expected_origin: (i32, i32),
    revalidate: bool,
}

impl WindowRoiSource {
    pub fn new(window: WindowHandle, config: &Config, expected_origin: (i32, i32)) -> Self {
        Self {
            title: config.window_title.clone(),
            roi: config.roi,
            expected_origin,
            revalidate: config.revalidate_window,
            window,
        }
    }

    /// Re-resolve the window and surface anything that would make the
    /// session's cached coordinates wrong. Positions are assumed static, so
    /// drift is reported to the operator rather than silently chased.
    fn revalidate(&mut self) {
        let Some(window) = WindowHandle::find(&self.title) else {
            warn!("Game window \"{}\" is gone; captures will fail", self.title);
            return;
        };
        if window.is_minimized() {
            warn!("Game window is minimized; rolls will read as absent");
        }
        if let Ok(origin) = window.origin() {
            if origin != self.expected_origin {
                warn!(
                    "Game window moved from {:?} to {:?}; button positions are stale",
                    self.expected_origin, origin
                );
            }
        }
        self.window = window;
    }
}

impl RoiSource for WindowRoiSource {
    fn capture_roi(&mut self) -> Result<RgbaImage> {
        if self.revalidate {
            self.revalidate();
        }
        let frame = self
            .window
            .capture()
            .context("Failed to capture game window")?;
        Ok(crop_region(&frame, &self.roi))
    }
}
