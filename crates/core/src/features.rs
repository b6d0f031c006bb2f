use std::path::Path;

use image::RgbImage;
use tracing::{debug, warn};

use crate::config::{Config, ScreenshotConfig};
use crate::domain::{ColorHistogram, PhotoRecord, BINS_PER_CHANNEL, HISTOGRAM_BINS};
use crate::error::Result;
use crate::gateway::MetadataGateway;
use crate::hasher::decode::{resize_rgb, rgb_to_gray};
use crate::scanner::is_screenshot_name;

/// Side length of the normalized image used for histogram and edge features.
pub const FEATURE_SIDE: u32 = 256;

const CANNY_LOW: u32 = 100;
const CANNY_HIGH: u32 = 200;

/// Build a [`PhotoRecord`] for `path` through the gateway.
///
/// Only a missing file is an error. Every other extraction step degrades
/// its own field to `None` and logs a warning, so one bad decode never
/// takes down a scan.
pub fn extract_record<G: MetadataGateway + ?Sized>(
    gateway: &G,
    path: &Path,
    config: &Config,
) -> Result<PhotoRecord> {
    let file_size = std::fs::metadata(path)?.len();
    let mut record = PhotoRecord::new(path, file_size);

    match gateway.content_hash(path) {
        Ok(hash) => record.content_hash = Some(hash),
        Err(e) => warn!(path = %path.display(), error = %e, "content hash failed"),
    }

    match gateway.perceptual_hash(path, config.clustering.hash_size) {
        Ok(hash) => record.perceptual_hash = Some(hash),
        Err(e) => warn!(path = %path.display(), error = %e, "perceptual hash failed"),
    }

    match gateway.decode_image(path) {
        Ok(rgb) => {
            record = record.with_dimensions(rgb.width(), rgb.height());
            record.is_screenshot =
                is_likely_screenshot(rgb.width(), rgb.height(), &config.screenshots)
                    || is_screenshot_name(&record.file_name());
            match visual_features(&rgb) {
                Ok((histogram, edges)) => record = record.with_visual_features(histogram, edges),
                Err(e) => warn!(path = %path.display(), error = %e, "feature extraction failed"),
            }
        }
        Err(e) => warn!(path = %path.display(), error = %e, "decode failed"),
    }

    match gateway.capture_datetime(path) {
        Ok(dt) => record.capture_datetime = dt,
        Err(e) => debug!(path = %path.display(), error = %e, "no readable capture date"),
    }

    match gateway.gps(path) {
        Ok(gps) => record.gps = gps,
        Err(e) => debug!(path = %path.display(), error = %e, "no readable GPS"),
    }

    Ok(record)
}

/// Color histogram and edge density from one shared 256×256 resize.
pub fn visual_features(rgb: &RgbImage) -> Result<(ColorHistogram, f64)> {
    let small = resize_rgb(rgb, FEATURE_SIDE, FEATURE_SIDE)?;
    let histogram = histogram_of(&small)?;
    let gray = rgb_to_gray(&small);
    let edges = edge_density_of(&gray, FEATURE_SIDE as usize, FEATURE_SIDE as usize);
    Ok((histogram, edges))
}

/// 32 bins per channel over the fixed 0..=255 range, channels concatenated R, G, B.
pub fn color_histogram(rgb: &RgbImage) -> Result<ColorHistogram> {
    let small = resize_rgb(rgb, FEATURE_SIDE, FEATURE_SIDE)?;
    histogram_of(&small)
}

fn histogram_of(rgb: &[u8]) -> Result<ColorHistogram> {
    let bin_width = 256 / BINS_PER_CHANNEL;
    let mut bins = vec![0.0f64; HISTOGRAM_BINS];
    for px in rgb.chunks_exact(3) {
        for (channel, &value) in px.iter().enumerate() {
            bins[channel * BINS_PER_CHANNEL + value as usize / bin_width] += 1.0;
        }
    }
    ColorHistogram::new(bins)
}

/// Fraction of pixels marked as edges by Canny on the 256×256 grayscale.
pub fn edge_density(rgb: &RgbImage) -> Result<f64> {
    let small = resize_rgb(rgb, FEATURE_SIDE, FEATURE_SIDE)?;
    let gray = rgb_to_gray(&small);
    Ok(edge_density_of(&gray, FEATURE_SIDE as usize, FEATURE_SIDE as usize))
}

fn edge_density_of(gray: &[u8], w: usize, h: usize) -> f64 {
    if w == 0 || h == 0 {
        return 0.0;
    }
    let edges = canny(gray, w, h, CANNY_LOW, CANNY_HIGH);
    edges.iter().filter(|&&e| e).count() as f64 / (w * h) as f64
}

/// Canny edge detector: 3×3 Sobel with L1 magnitude, non-maximum
/// suppression along the quantized gradient direction, then hysteresis.
/// Border pixels never carry an edge.
fn canny(gray: &[u8], w: usize, h: usize, low: u32, high: u32) -> Vec<bool> {
    let at = |x: usize, y: usize| gray[y * w + x] as i32;

    let mut gx = vec![0i32; w * h];
    let mut gy = vec![0i32; w * h];
    let mut mag = vec![0u32; w * h];
    for y in 1..h.saturating_sub(1) {
        for x in 1..w.saturating_sub(1) {
            let dx = (at(x + 1, y - 1) + 2 * at(x + 1, y) + at(x + 1, y + 1))
                - (at(x - 1, y - 1) + 2 * at(x - 1, y) + at(x - 1, y + 1));
            let dy = (at(x - 1, y + 1) + 2 * at(x, y + 1) + at(x + 1, y + 1))
                - (at(x - 1, y - 1) + 2 * at(x, y - 1) + at(x + 1, y - 1));
            let i = y * w + x;
            gx[i] = dx;
            gy[i] = dy;
            mag[i] = dx.unsigned_abs() + dy.unsigned_abs();
        }
    }

    // tan(22.5°) and tan(67.5°)
    const TAN_22: f64 = 0.414_213_562;
    const TAN_67: f64 = 2.414_213_562;

    // 0 = suppressed, 1 = weak, 2 = strong
    let mut class = vec![0u8; w * h];
    for y in 1..h.saturating_sub(1) {
        for x in 1..w.saturating_sub(1) {
            let i = y * w + x;
            let m = mag[i];
            if m <= low {
                continue;
            }
            let (ax, ay) = (gx[i].abs() as f64, gy[i].abs() as f64);
            let (a, b) = if ay <= ax * TAN_22 {
                (mag[i - 1], mag[i + 1])
            } else if ay > ax * TAN_67 {
                (mag[i - w], mag[i + w])
            } else if (gx[i] > 0) == (gy[i] > 0) {
                (mag[i - w - 1], mag[i + w + 1])
            } else {
                (mag[i - w + 1], mag[i + w - 1])
            };
            if m > a && m >= b {
                class[i] = if m > high { 2 } else { 1 };
            }
        }
    }

    let mut edges = vec![false; w * h];
    let mut stack: Vec<usize> = Vec::new();
    for (i, &c) in class.iter().enumerate() {
        if c == 2 && !edges[i] {
            edges[i] = true;
            stack.push(i);
            while let Some(j) = stack.pop() {
                let (x, y) = (j % w, j / w);
                for ny in y.saturating_sub(1)..=(y + 1).min(h - 1) {
                    for nx in x.saturating_sub(1)..=(x + 1).min(w - 1) {
                        let k = ny * w + nx;
                        if class[k] > 0 && !edges[k] {
                            edges[k] = true;
                            stack.push(k);
                        }
                    }
                }
            }
        }
    }
    edges
}

/// True when the dimensions match a known device screen resolution, in
/// either orientation, or are within `tolerance` pixels of one.
pub fn is_likely_screenshot(width: u32, height: u32, config: &ScreenshotConfig) -> bool {
    config.resolutions.iter().any(|&(w, h)| {
        (width, height) == (w, h)
            || (width, height) == (h, w)
            || (width.abs_diff(w) <= config.tolerance && height.abs_diff(h) <= config.tolerance)
    })
}
