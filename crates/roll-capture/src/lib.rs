use anyhow::{Context, Result};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use xcap::Window;

/// A rectangle in window-local pixel coordinates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PixelRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Handle to the game window. Resolved once at startup and, depending on
/// the revalidation policy, again on every iteration.
pub struct WindowHandle {
    window: Window,
    title: String,
}

impl WindowHandle {
    /// Find the game window whose title contains `title_fragment`
    /// (case-insensitive). Returns `None` when no window matches.
    pub fn find(title_fragment: &str) -> Option<Self> {
        let needle = title_fragment.to_lowercase();
        let windows = match Window::all() {
            Ok(w) => w,
            Err(e) => {
                warn!("Failed to enumerate windows: {}", e);
                return None;
            }
        };

        for window in windows {
            let title = match window.title() {
                Ok(t) => t,
                Err(_) => continue,
            };
            if title.to_lowercase().contains(&needle) {
                debug!("Found game window: {}", title);
                return Some(Self { window, title });
            }
        }
        None
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Top-left corner of the window in screen coordinates.
    pub fn origin(&self) -> Result<(i32, i32)> {
        let x = self.window.x().context("Failed to read window x")?;
        let y = self.window.y().context("Failed to read window y")?;
        Ok((x, y))
    }

    pub fn is_minimized(&self) -> bool {
        self.window.is_minimized().unwrap_or(false)
    }

    /// Capture the current contents of the window.
    pub fn capture(&self) -> Result<RgbaImage> {
        self.window
            .capture_image()
            .context("Failed to capture window image")
    }
}

/// Crop a region from a captured frame, clamped to the frame bounds.
pub fn crop_region(frame: &RgbaImage, region: &PixelRegion) -> RgbaImage {
    let (w, h) = (frame.width(), frame.height());

    let x = region.x.min(w.saturating_sub(1));
    let y = region.y.min(h.saturating_sub(1));
    let rw = region.width.min(w - x).max(1);
    let rh = region.height.min(h - y).max(1);

    image::imageops::crop_imm(frame, x, y, rw, rh).to_image()
}
