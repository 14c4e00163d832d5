//! Post-extraction observer hook. The loop itself has no dependency on any
//! display or filesystem path; diagnostics plug in here.

use image::RgbaImage;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Invoked after every extraction attempt with the captured ROI and the
/// value read from it (if any).
pub trait RollObserver {
    fn on_extraction(&mut self, roi: &RgbaImage, roll: Option<u32>);
}

/// Default observer: does nothing.
pub struct NullObserver;

impl RollObserver for NullObserver {
    fn on_extraction(&mut self, _roi: &RgbaImage, _roll: Option<u32>) {}
}

/// Debug observer: saves every ROI crop with its recognized value in the
/// file name, so a misaligned region or a bad threshold is visible at a
/// glance.
pub struct DebugFrameSaver {
    dir: PathBuf,
    counter: u32,
}

impl DebugFrameSaver {
    pub fn new(dir: &Path) -> Self {
        if let Err(e) = std::fs::create_dir_all(dir) {
            warn!("Could not create debug dir {}: {}", dir.display(), e);
        } else {
            info!("Saving ROI crops to {}", dir.display());
        }
        Self {
            dir: dir.to_path_buf(),
            counter: 0,
        }
    }
}

impl RollObserver for DebugFrameSaver {
    fn on_extraction(&mut self, roi: &RgbaImage, roll: Option<u32>) {
        let label = match roll {
            Some(roll) => roll.to_string(),
            None => "absent".to_string(),
        };
        let path = self.dir.join(format!("roi_{:05}_{}.png", self.counter, label));
        self.counter += 1;

        match roi.save(&path) {
            Ok(()) => debug!("Saved ROI to {}", path.display()),
            Err(e) => warn!("Could not save ROI to {}: {}", path.display(), e),
        }
    }
}
