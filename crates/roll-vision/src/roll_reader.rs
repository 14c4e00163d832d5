use image::{GrayImage, RgbaImage};
use std::path::PathBuf;
use std::process::Command;
use tracing::{debug, warn};

/// Reads the roll value from the result region via Tesseract OCR,
/// constrained to decimal digits.
///
/// Every failure mode (engine missing, engine error, unparsable text) maps
/// to `None`: an unreadable frame is a normal per-iteration outcome, the
/// caller just retries on the next reroll.
pub struct RollReader {
    tesseract_available: bool,
    temp_dir: PathBuf,
    threshold: u8,
}

impl RollReader {
    /// `threshold` is the grayscale cutoff separating digit pixels from the
    /// UI background during preprocessing.
    pub fn new(threshold: u8) -> Self {
        let tesseract_available = check_tesseract();
        if tesseract_available {
            debug!("Tesseract OCR available");
        } else {
            warn!("Tesseract not found on PATH; every roll will read as absent");
        }

        let temp_dir = std::env::temp_dir().join("maxroll_ocr");
        let _ = std::fs::create_dir_all(&temp_dir);

        Self {
            tesseract_available,
            temp_dir,
            threshold,
        }
    }

    pub fn is_available(&self) -> bool {
        self.tesseract_available
    }

    /// Extract the roll value from the result region, or `None` when no
    /// reliable value could be read.
    pub fn read_roll(&self, roi: &RgbaImage) -> Option<u32> {
        if !self.tesseract_available {
            return None;
        }

        let processed = binarize_roi(roi, self.threshold);
        let text = self.run_tesseract(&processed)?;
        parse_roll(&text)
    }

    fn run_tesseract(&self, image: &GrayImage) -> Option<String> {
        let temp_path = self.temp_dir.join(format!("roi_{}.png", std::process::id()));
        if let Err(e) = image.save(&temp_path) {
            warn!("Failed to write OCR input image: {}", e);
            return None;
        }

        let output = Command::new("tesseract")
            .arg(&temp_path)
            .arg("stdout")
            .arg("--psm")
            .arg("7") // single text line: the ROI bounds exactly one number
            .arg("-c")
            .arg("tessedit_char_whitelist=0123456789")
            .output();

        let output = match output {
            Ok(o) => o,
            Err(e) => {
                warn!("Tesseract failed to run: {}; skipping this roll", e);
                return None;
            }
        };

        if !output.status.success() {
            warn!(
                "Tesseract exited with {}; skipping this roll",
                output.status
            );
            return None;
        }

        String::from_utf8(output.stdout).ok()
    }
}

/// Parse OCR output as a non-negative roll value. Rejects empty output,
/// stray characters, and multi-line garbage.
pub fn parse_roll(text: &str) -> Option<u32> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        debug!("OCR produced no text");
        return None;
    }
    match trimmed.parse::<u32>() {
        Ok(roll) => Some(roll),
        Err(_) => {
            warn!("OCR text {:?} is not a roll value; skipping this roll", trimmed);
            None
        }
    }
}

/// Pre-process the result region for OCR: grayscale, then threshold so the
/// light digits on the dark game UI become black text on white, which is
/// what Tesseract prefers.
pub fn binarize_roi(image: &RgbaImage, threshold: u8) -> GrayImage {
    let gray = image::imageops::grayscale(image);
    let (w, h) = gray.dimensions();

    GrayImage::from_fn(w, h, |x, y| {
        let pixel = gray.get_pixel(x, y)[0];
        if pixel > threshold {
            image::Luma([0u8])
        } else {
            image::Luma([255u8])
        }
    })
}

/// Check whether the Tesseract binary is installed and runnable.
fn check_tesseract() -> bool {
    Command::new("tesseract")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}
