use std::f64::consts::PI;
use std::path::Path;

use crate::domain::PerceptualHash;
use crate::error::Result;

use super::decode::load_gray_square;

/// The image is shrunk to `HIGHFREQ_FACTOR × hash_size` on each side before
/// the DCT, so the kept low-frequency block is a quarter of the spectrum.
const HIGHFREQ_FACTOR: u32 = 4;

/// Compute a DCT perceptual hash (pHash) of `hash_size²` bits.
///
/// Pipeline: decode → EXIF orientation → grayscale `4·hash_size` square →
/// 2-D DCT-II → top-left `hash_size × hash_size` coefficients → one bit per
/// coefficient, set when it is above the block median.
pub fn compute_phash(path: &Path, hash_size: u32) -> Result<PerceptualHash> {
    let side = hash_size * HIGHFREQ_FACTOR;
    let pixels = load_gray_square(path, side)?;
    Ok(phash_from_gray(&pixels, side as usize, hash_size as usize))
}

/// pHash of a `side × side` grayscale buffer.
pub fn phash_from_gray(pixels: &[u8], side: usize, hash_size: usize) -> PerceptualHash {
    let coeffs = low_frequency_dct(pixels, side, hash_size);
    let median = median(&coeffs);
    let bits: Vec<bool> = coeffs.iter().map(|&c| c > median).collect();
    PerceptualHash::from_bits(&bits)
}

/// Separable DCT-II keeping only the first `keep` frequencies per axis.
/// Returns `keep × keep` coefficients, row-major (vertical frequency major).
fn low_frequency_dct(pixels: &[u8], side: usize, keep: usize) -> Vec<f64> {
    // cos_table[k][n] = cos(π·k·(2n+1) / 2N)
    let cos_table: Vec<Vec<f64>> = (0..keep)
        .map(|k| {
            (0..side)
                .map(|n| (PI * k as f64 * (2 * n + 1) as f64 / (2 * side) as f64).cos())
                .collect()
        })
        .collect();

    // Pass 1: along columns (axis 0) → keep × side
    let mut vertical = vec![0.0f64; keep * side];
    for (k, cos_k) in cos_table.iter().enumerate() {
        for x in 0..side {
            let mut sum = 0.0;
            for (y, c) in cos_k.iter().enumerate() {
                sum += pixels[y * side + x] as f64 * c;
            }
            vertical[k * side + x] = sum;
        }
    }

    // Pass 2: along rows (axis 1) → keep × keep
    let mut out = vec![0.0f64; keep * keep];
    for u in 0..keep {
        for (v, cos_v) in cos_table.iter().enumerate() {
            let mut sum = 0.0;
            for (x, c) in cos_v.iter().enumerate() {
                sum += vertical[u * side + x] * c;
            }
            out[u * keep + v] = sum;
        }
    }
    out
}

fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_jpeg(path: &Path, r: u8, g: u8, b: u8) {
        let img = image::RgbImage::from_fn(64, 64, |x, y| {
            image::Rgb([
                r.wrapping_add((x * 3) as u8),
                g.wrapping_add((y * 3) as u8),
                b,
            ])
        });
        img.save(path).unwrap();
    }

    #[test]
    fn test_hash_length_is_hash_size_squared() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("test.jpg");
        create_test_jpeg(&path, 128, 128, 128);

        assert_eq!(compute_phash(&path, 16).unwrap().bit_len(), 256);
        assert_eq!(compute_phash(&path, 8).unwrap().bit_len(), 64);
    }

    #[test]
    fn test_identical_images_same_hash() {
        let tmp = tempfile::tempdir().unwrap();
        let path_a = tmp.path().join("a.jpg");
        let path_b = tmp.path().join("b.jpg");
        create_test_jpeg(&path_a, 200, 100, 50);
        create_test_jpeg(&path_b, 200, 100, 50);

        let a = compute_phash(&path_a, 16).unwrap();
        let b = compute_phash(&path_b, 16).unwrap();
        assert_eq!(a.distance(&b), 0);
    }

    #[test]
    fn test_different_images_different_hash() {
        let tmp = tempfile::tempdir().unwrap();
        let path_a = tmp.path().join("gradient.png");
        let path_b = tmp.path().join("checkerboard.png");

        image::RgbImage::from_fn(64, 64, |x, _| image::Rgb([(x * 4) as u8, 0, 0]))
            .save(&path_a)
            .unwrap();
        image::RgbImage::from_fn(64, 64, |x, y| {
            if (x / 8 + y / 8) % 2 == 0 {
                image::Rgb([255, 255, 255])
            } else {
                image::Rgb([0, 0, 0])
            }
        })
        .save(&path_b)
        .unwrap();

        let a = compute_phash(&path_a, 16).unwrap();
        let b = compute_phash(&path_b, 16).unwrap();
        assert!(a.distance(&b) > 5);
    }

    #[test]
    fn test_nonexistent_file_is_error() {
        assert!(compute_phash(Path::new("/nonexistent/image.jpg"), 16).is_err());
    }

    #[test]
    fn test_non_image_file_is_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("not_an_image.jpg");
        std::fs::write(&path, b"this is not a jpeg").unwrap();

        assert!(compute_phash(&path, 16).is_err());
    }

    #[test]
    fn test_dct_of_flat_block_is_dc_only() {
        let pixels = [100u8; 64];
        let coeffs = low_frequency_dct(&pixels, 8, 4);
        assert!(coeffs[0] > 0.0);
        assert!(coeffs[1..].iter().all(|c| c.abs() < 1e-9));
    }

    #[test]
    fn test_phash_from_gray_sets_about_half_the_bits() {
        let pixels: Vec<u8> = (0..64 * 64).map(|i| ((i * 37) % 251) as u8).collect();
        let hash = phash_from_gray(&pixels, 64, 16);
        let zero = PerceptualHash::from_words(vec![0; 4], 256);
        let ones = hash.distance(&zero);
        assert!(ones > 64 && ones < 192, "got {ones} set bits");
    }

    #[test]
    fn test_median_even_and_odd() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), 2.5);
        assert_eq!(median(&[]), 0.0);
    }
}
