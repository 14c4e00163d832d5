use anyhow::{Context, Result};
use image::{GrayImage, RgbaImage};
use serde::Serialize;
use std::path::Path;
use tracing::{debug, warn};

/// Pre-processed button reference image, loaded once per session.
pub struct ButtonTemplate {
    gray: GrayImage,
    mean: f64,
    std_dev: f64,
}

impl ButtonTemplate {
    /// Load a button template from a PNG file.
    pub fn load(path: &Path) -> Result<Self> {
        let img = image::open(path)
            .with_context(|| format!("Failed to open template {}", path.display()))?;
        Ok(Self::from_gray(img.to_luma8()))
    }

    pub fn from_gray(gray: GrayImage) -> Self {
        let (mean, std_dev) = compute_stats(&gray);
        Self {
            gray,
            mean,
            std_dev,
        }
    }

    pub fn width(&self) -> u32 {
        self.gray.width()
    }

    pub fn height(&self) -> u32 {
        self.gray.height()
    }
}

/// Best-match position of a template within a frame. The score is kept for
/// logging only; no minimum confidence is enforced, the best available
/// position is always reported.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct MatchPoint {
    /// Top-left corner of the match, in frame coordinates.
    pub x: u32,
    pub y: u32,
    /// Zero-mean NCC score, -1.0 to 1.0.
    pub score: f64,
}

impl MatchPoint {
    /// Clickable center of the matched button: top-left plus half the
    /// template dimensions, integer division.
    pub fn center(&self, template: &ButtonTemplate) -> (u32, u32) {
        (
            self.x + template.width() / 2,
            self.y + template.height() / 2,
        )
    }
}

/// Find the best-matching position of `template` within `frame` using
/// zero-mean normalized cross-correlation over every valid offset.
///
/// This is a full exhaustive search; it runs once per session per button,
/// so the cost is acceptable and there is no pyramid or early-out.
pub fn locate(frame: &RgbaImage, template: &ButtonTemplate) -> MatchPoint {
    let gray = image::imageops::grayscale(frame);
    locate_gray(&gray, template)
}

fn locate_gray(frame: &GrayImage, template: &ButtonTemplate) -> MatchPoint {
    let (fw, fh) = frame.dimensions();
    let (tw, th) = template.gray.dimensions();

    if tw > fw || th > fh || tw == 0 || th == 0 {
        warn!(
            "Template {}x{} does not fit in frame {}x{}",
            tw, th, fw, fh
        );
        return MatchPoint {
            x: 0,
            y: 0,
            score: 0.0,
        };
    }

    // Integral images over pixel values and squared values, so the window
    // mean and variance at each offset are O(1).
    let (sums, sq_sums) = integral_images(frame);
    let n = (tw * th) as f64;
    let t_mean = template.mean;
    let t_std = template.std_dev;

    let mut best = MatchPoint {
        x: 0,
        y: 0,
        score: f64::NEG_INFINITY,
    };

    for oy in 0..=(fh - th) {
        for ox in 0..=(fw - tw) {
            let w_sum = window_sum(&sums, fw, ox, oy, tw, th);
            let w_sq_sum = window_sum(&sq_sums, fw, ox, oy, tw, th);
            let w_mean = w_sum / n;
            let w_var = (w_sq_sum / n - w_mean * w_mean).max(0.0);
            let w_std = w_var.sqrt();

            let denom = n * w_std * t_std;
            let score = if denom < 1e-10 {
                0.0
            } else {
                let mut cross = 0.0f64;
                for ty in 0..th {
                    for tx in 0..tw {
                        let f = frame.get_pixel(ox + tx, oy + ty)[0] as f64;
                        let t = template.gray.get_pixel(tx, ty)[0] as f64;
                        cross += f * t;
                    }
                }
                (cross - n * w_mean * t_mean) / denom
            };

            if score > best.score {
                best = MatchPoint {
                    x: ox,
                    y: oy,
                    score,
                };
            }
        }
    }

    debug!(
        "Template matched at ({}, {}) with score {:.3}",
        best.x, best.y, best.score
    );
    best
}

/// Prefix-sum tables of size (w+1)*(h+1) over pixel values and their squares.
fn integral_images(frame: &GrayImage) -> (Vec<f64>, Vec<f64>) {
    let (w, h) = frame.dimensions();
    let stride = (w + 1) as usize;
    let mut sums = vec![0.0f64; stride * (h + 1) as usize];
    let mut sq_sums = vec![0.0f64; stride * (h + 1) as usize];

    for y in 0..h {
        for x in 0..w {
            let v = frame.get_pixel(x, y)[0] as f64;
            let i = (y + 1) as usize * stride + (x + 1) as usize;
            let up = i - stride;
            sums[i] = v + sums[i - 1] + sums[up] - sums[up - 1];
            sq_sums[i] = v * v + sq_sums[i - 1] + sq_sums[up] - sq_sums[up - 1];
        }
    }
    (sums, sq_sums)
}

fn window_sum(table: &[f64], frame_w: u32, x: u32, y: u32, w: u32, h: u32) -> f64 {
    let stride = (frame_w + 1) as usize;
    let x0 = x as usize;
    let y0 = y as usize;
    let x1 = (x + w) as usize;
    let y1 = (y + h) as usize;
    table[y1 * stride + x1] - table[y0 * stride + x1] - table[y1 * stride + x0]
        + table[y0 * stride + x0]
}

/// Mean and standard deviation of pixel values.
fn compute_stats(img: &GrayImage) -> (f64, f64) {
    let pixels: Vec<f64> = img.pixels().map(|p| p[0] as f64).collect();
    let n = pixels.len() as f64;
    if n == 0.0 {
        return (0.0, 0.0);
    }
    let mean = pixels.iter().sum::<f64>() / n;
    let variance = pixels.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn textured_frame(w: u32, h: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| {
            image::Luma([(x.wrapping_mul(7).wrapping_add(y.wrapping_mul(13)) % 256) as u8])
        })
    }

    fn distinct_template(w: u32, h: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| {
            image::Luma([(x.wrapping_mul(31).wrapping_add(y.wrapping_mul(17)) % 251) as u8])
        })
    }

    #[test]
    fn test_locate_finds_embedded_template() {
        let mut frame = textured_frame(120, 80);
        let tpl_img = distinct_template(14, 9);
        let (ox, oy) = (43, 27);
        for y in 0..9 {
            for x in 0..14 {
                frame.put_pixel(ox + x, oy + y, *tpl_img.get_pixel(x, y));
            }
        }

        let template = ButtonTemplate::from_gray(tpl_img);
        let hit = locate_gray(&frame, &template);
        assert_eq!((hit.x, hit.y), (ox, oy));
        assert!(
            hit.score > 0.99,
            "Exact embed should score ~1.0, got {}",
            hit.score
        );
    }

    #[test]
    fn test_locate_without_true_match_still_returns_best() {
        // The button is absent; the locator must still report some offset.
        let frame = textured_frame(60, 40);
        let template = ButtonTemplate::from_gray(distinct_template(10, 6));
        let hit = locate_gray(&frame, &template);
        assert!(hit.x <= 50 && hit.y <= 34);
        assert!(hit.score < 0.999);
    }

    #[test]
    fn test_center_uses_floor_division() {
        let template = ButtonTemplate::from_gray(distinct_template(13, 7));
        let hit = MatchPoint {
            x: 5,
            y: 9,
            score: 1.0,
        };
        assert_eq!(hit.center(&template), (5 + 6, 9 + 3));
    }

    #[test]
    fn test_oversized_template_reports_origin() {
        let frame = textured_frame(10, 10);
        let template = ButtonTemplate::from_gray(distinct_template(20, 20));
        let hit = locate_gray(&frame, &template);
        assert_eq!((hit.x, hit.y, hit.score), (0, 0, 0.0));
    }

    #[test]
    fn test_uniform_window_scores_zero() {
        // Flat regions have zero variance; the score must not be NaN.
        let frame = GrayImage::from_pixel(30, 30, image::Luma([128]));
        let template = ButtonTemplate::from_gray(distinct_template(5, 5));
        let hit = locate_gray(&frame, &template);
        assert_eq!(hit.score, 0.0);
    }
}
