use std::io::BufReader;
use std::path::Path;

use fast_image_resize::{self as fir, images::Image as FirImage};
use image::RgbImage;

use crate::error::{Error, Result};

/// Read EXIF orientation tag (1-8). Returns 1 (normal) if missing or unreadable.
pub fn read_exif_orientation(path: &Path) -> u8 {
    let read = || -> Option<u8> {
        let file = std::fs::File::open(path).ok()?;
        let mut reader = BufReader::new(file);
        let exif = exif::Reader::new().read_from_container(&mut reader).ok()?;
        let field = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
        field.value.get_uint(0).map(|v| v as u8)
    };
    read().unwrap_or(1)
}

/// Apply EXIF orientation to an interleaved pixel buffer with `channels`
/// bytes per pixel, returning the corrected buffer and new dimensions.
///
/// Orientations:
/// 1: Normal                    5: Mirror + rotate 90° CW
/// 2: Mirror horizontal         6: Rotate 90° CW
/// 3: Rotate 180°               7: Mirror + rotate 90° CCW
/// 4: Mirror vertical           8: Rotate 90° CCW
pub fn apply_orientation(
    buf: &[u8],
    w: usize,
    h: usize,
    channels: usize,
    orientation: u8,
) -> (Vec<u8>, usize, usize) {
    if !(2..=8).contains(&orientation) {
        return (buf.to_vec(), w, h);
    }

    let (new_w, new_h) = if orientation >= 5 { (h, w) } else { (w, h) };
    let mut out = vec![0u8; w * h * channels];

    for y in 0..h {
        for x in 0..w {
            let (dx, dy) = match orientation {
                2 => (w - 1 - x, y),
                3 => (w - 1 - x, h - 1 - y),
                4 => (x, h - 1 - y),
                5 => (y, x),
                6 => (h - 1 - y, x),
                7 => (h - 1 - y, w - 1 - x),
                _ => (y, w - 1 - x),
            };
            let src = (y * w + x) * channels;
            let dst = (dy * new_w + dx) * channels;
            out[dst..dst + channels].copy_from_slice(&buf[src..src + channels]);
        }
    }
    (out, new_w, new_h)
}

/// Decode any supported format to RGB with EXIF orientation applied.
pub fn open_oriented_rgb(path: &Path) -> Result<RgbImage> {
    let rgb = image::open(path)?.to_rgb8();
    let orientation = read_exif_orientation(path);
    if orientation == 1 {
        return Ok(rgb);
    }

    let (w, h) = (rgb.width() as usize, rgb.height() as usize);
    let (buf, w, h) = apply_orientation(rgb.as_raw(), w, h, 3, orientation);
    RgbImage::from_raw(w as u32, h as u32, buf)
        .ok_or_else(|| Error::Resize("oriented buffer does not match its dimensions".to_string()))
}

/// SIMD resize of an RGB image to `dst_w` x `dst_h`, returning the raw buffer.
pub fn resize_rgb(img: &RgbImage, dst_w: u32, dst_h: u32) -> Result<Vec<u8>> {
    let src = FirImage::from_vec_u8(
        img.width(),
        img.height(),
        img.as_raw().clone(),
        fir::PixelType::U8x3,
    )
    .map_err(|e| Error::Resize(e.to_string()))?;
    let mut dst = FirImage::new(dst_w, dst_h, fir::PixelType::U8x3);
    fir::Resizer::new()
        .resize(&src, &mut dst, None)
        .map_err(|e| Error::Resize(e.to_string()))?;
    Ok(dst.buffer().to_vec())
}

/// Convert packed RGB to grayscale using BT.601 luma weights.
pub fn rgb_to_gray(rgb: &[u8]) -> Vec<u8> {
    rgb.chunks_exact(3)
        .map(|px| {
            let (r, g, b) = (px[0] as f32, px[1] as f32, px[2] as f32);
            (0.299 * r + 0.587 * g + 0.114 * b) as u8
        })
        .collect()
}

/// Load an image as a `side` x `side` grayscale buffer, orientation applied.
///
/// JPEG files go through a full-resolution grayscale turbojpeg decode when
/// the `turbojpeg` feature is enabled; everything else is decoded with the
/// `image` crate, resized in RGB, then converted to gray.
pub fn load_gray_square(path: &Path, side: u32) -> Result<Vec<u8>> {
    #[cfg(feature = "turbojpeg")]
    if is_jpeg(path) {
        if let Some(buf) = load_jpeg_gray(path, side) {
            return Ok(buf);
        }
    }

    let rgb = open_oriented_rgb(path)?;
    let small = resize_rgb(&rgb, side, side)?;
    Ok(rgb_to_gray(&small))
}

#[cfg(feature = "turbojpeg")]
fn is_jpeg(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| matches!(e.to_ascii_lowercase().as_str(), "jpg" | "jpeg"))
}

/// Pipeline: turbojpeg GRAY (full res) → EXIF orientation → resize to side².
/// Skips chroma decode entirely.
#[cfg(feature = "turbojpeg")]
fn load_jpeg_gray(path: &Path, side: u32) -> Option<Vec<u8>> {
    let jpeg_data = std::fs::read(path).ok()?;
    let mut decompressor = turbojpeg::Decompressor::new().ok()?;
    let header = decompressor.read_header(&jpeg_data).ok()?;
    let (w, h) = (header.width, header.height);

    let mut buf = vec![0u8; w * h];
    let output = turbojpeg::Image {
        pixels: buf.as_mut_slice(),
        width: w,
        pitch: w,
        height: h,
        format: turbojpeg::PixelFormat::GRAY,
    };
    decompressor.decompress(&jpeg_data, output).ok()?;

    let orientation = read_exif_orientation(path);
    let (buf, w, h) = apply_orientation(&buf, w, h, 1, orientation);

    let src = FirImage::from_vec_u8(w as u32, h as u32, buf, fir::PixelType::U8).ok()?;
    let mut dst = FirImage::new(side, side, fir::PixelType::U8);
    fir::Resizer::new().resize(&src, &mut dst, None).ok()?;
    Some(dst.buffer().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_orientation_identity() {
        let buf: Vec<u8> = (0..12).collect(); // 4x3
        let (out, w, h) = apply_orientation(&buf, 4, 3, 1, 1);
        assert_eq!((w, h), (4, 3));
        assert_eq!(out, buf);
    }

    #[test]
    fn test_apply_orientation_rotate_90_cw() {
        // [1, 2, 3]
        // [4, 5, 6]
        let buf = vec![1, 2, 3, 4, 5, 6];
        let (out, w, h) = apply_orientation(&buf, 3, 2, 1, 6);
        // [4, 1]
        // [5, 2]
        // [6, 3]
        assert_eq!((w, h), (2, 3));
        assert_eq!(out, vec![4, 1, 5, 2, 6, 3]);
    }

    #[test]
    fn test_apply_orientation_rotate_180() {
        let buf = vec![1, 2, 3, 4, 5, 6];
        let (out, w, h) = apply_orientation(&buf, 3, 2, 1, 3);
        assert_eq!((w, h), (3, 2));
        assert_eq!(out, vec![6, 5, 4, 3, 2, 1]);
    }

    #[test]
    fn test_apply_orientation_rotate_90_ccw() {
        let buf = vec![1, 2, 3, 4, 5, 6];
        let (out, w, h) = apply_orientation(&buf, 3, 2, 1, 8);
        // [3, 6]
        // [2, 5]
        // [1, 4]
        assert_eq!((w, h), (2, 3));
        assert_eq!(out, vec![3, 6, 2, 5, 1, 4]);
    }

    #[test]
    fn test_apply_orientation_moves_whole_rgb_pixels() {
        // 2x1 RGB: red, blue → mirrored: blue, red
        let buf = vec![255, 0, 0, 0, 0, 255];
        let (out, w, h) = apply_orientation(&buf, 2, 1, 3, 2);
        assert_eq!((w, h), (2, 1));
        assert_eq!(out, vec![0, 0, 255, 255, 0, 0]);
    }

    #[test]
    fn test_rgb_to_gray_weights() {
        assert_eq!(rgb_to_gray(&[255, 0, 0, 0, 0, 0]), vec![76, 0]);
        assert_eq!(rgb_to_gray(&[0, 100, 0]), vec![58]);
    }

    #[test]
    fn test_load_gray_square_dimensions() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("flat.png");
        image::RgbImage::from_fn(40, 30, |_, _| image::Rgb([10, 20, 30]))
            .save(&path)
            .unwrap();

        let gray = load_gray_square(&path, 16).unwrap();
        assert_eq!(gray.len(), 256);
    }

    #[test]
    fn test_missing_file_is_error() {
        assert!(open_oriented_rgb(Path::new("/nonexistent/photo.jpg")).is_err());
    }
}
