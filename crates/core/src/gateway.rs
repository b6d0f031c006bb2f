use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use image::RgbImage;
use tracing::debug;

use crate::domain::{GpsCoords, PerceptualHash};
use crate::error::{Error, Result};
use crate::hasher::decode::open_oriented_rgb;
use crate::hasher::{self, perceptual};

/// Everything the engine needs from the outside world about a photo file.
///
/// Implementations are fault-isolated per call: an error concerns only the
/// path it was called with.
pub trait MetadataGateway {
    fn capture_datetime(&self, path: &Path) -> Result<Option<NaiveDateTime>>;

    /// Write the capture time to every date field the format has.
    fn write_capture_datetime(&self, path: &Path, datetime: NaiveDateTime) -> Result<()>;

    fn gps(&self, path: &Path) -> Result<Option<GpsCoords>>;

    fn write_gps(&self, path: &Path, gps: GpsCoords) -> Result<()>;

    fn content_hash(&self, path: &Path) -> Result<String>;

    fn perceptual_hash(&self, path: &Path, hash_size: u32) -> Result<PerceptualHash>;

    fn decode_image(&self, path: &Path) -> Result<RgbImage>;

    /// Keep a pristine copy of `path` before it is modified. Calling it again
    /// for an already backed-up path succeeds without copying. Returns the
    /// backup location.
    fn backup_original(&self, path: &Path) -> Result<PathBuf>;
}

/// Gateway over the local filesystem: kamadak-exif for metadata, the
/// `image` crate for pixels, copies into a sibling backup directory.
#[derive(Debug, Clone)]
pub struct FsGateway {
    backup_dir: String,
}

impl FsGateway {
    pub fn new(backup_dir: impl Into<String>) -> Self {
        Self {
            backup_dir: backup_dir.into(),
        }
    }

    /// Where `backup_original` puts the copy of `path`.
    pub fn backup_path(&self, path: &Path) -> Result<PathBuf> {
        let name = path
            .file_name()
            .ok_or_else(|| Error::PathNotFound(path.to_path_buf()))?;
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        Ok(parent.join(&self.backup_dir).join(name))
    }
}

impl Default for FsGateway {
    fn default() -> Self {
        Self::new(".backup")
    }
}

impl MetadataGateway for FsGateway {
    fn capture_datetime(&self, path: &Path) -> Result<Option<NaiveDateTime>> {
        crate::exif::read_capture_datetime(path)
    }

    fn write_capture_datetime(&self, path: &Path, datetime: NaiveDateTime) -> Result<()> {
        crate::exif::write_capture_datetime(path, datetime)
    }

    fn gps(&self, path: &Path) -> Result<Option<GpsCoords>> {
        crate::exif::read_gps(path)
    }

    fn write_gps(&self, path: &Path, gps: GpsCoords) -> Result<()> {
        crate::exif::write_gps(path, gps)
    }

    fn content_hash(&self, path: &Path) -> Result<String> {
        Ok(hasher::content_hash(path)?)
    }

    fn perceptual_hash(&self, path: &Path, hash_size: u32) -> Result<PerceptualHash> {
        perceptual::compute_phash(path, hash_size)
    }

    fn decode_image(&self, path: &Path) -> Result<RgbImage> {
        open_oriented_rgb(path)
    }

    fn backup_original(&self, path: &Path) -> Result<PathBuf> {
        if !path.is_file() {
            return Err(Error::PathNotFound(path.to_path_buf()));
        }
        let target = self.backup_path(path)?;
        if target.exists() {
            debug!(path = %path.display(), "backup already present");
            return Ok(target);
        }
        if let Some(dir) = target.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::copy(path, &target)?;
        debug!(path = %path.display(), backup = %target.display(), "backed up original");
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backup_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("IMG_0001.jpg");
        fs::write(&path, b"original").unwrap();
        let gateway = FsGateway::default();

        let first = gateway.backup_original(&path).unwrap();
        assert_eq!(first, tmp.path().join(".backup/IMG_0001.jpg"));
        assert_eq!(fs::read(&first).unwrap(), b"original");

        // A second call must not overwrite the pristine copy.
        fs::write(&path, b"modified").unwrap();
        let second = gateway.backup_original(&path).unwrap();
        assert_eq!(first, second);
        assert_eq!(fs::read(&second).unwrap(), b"original");
    }

    #[test]
    fn test_backup_missing_file_is_error() {
        let tmp = tempfile::tempdir().unwrap();
        let gateway = FsGateway::new("_orig");
        assert!(gateway.backup_original(&tmp.path().join("nope.jpg")).is_err());
        assert!(!tmp.path().join("_orig").exists());
    }

    #[test]
    fn test_gateway_reads_what_it_writes() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("shot.jpg");
        image::RgbImage::from_fn(48, 32, |x, _| image::Rgb([x as u8 * 5, 40, 40]))
            .save(&path)
            .unwrap();
        let gateway = FsGateway::default();

        assert_eq!(gateway.capture_datetime(&path).unwrap(), None);
        let when = chrono::NaiveDate::from_ymd_opt(2018, 7, 1)
            .unwrap()
            .and_hms_opt(9, 15, 0)
            .unwrap();
        gateway.write_capture_datetime(&path, when).unwrap();
        assert_eq!(gateway.capture_datetime(&path).unwrap(), Some(when));

        let rgb = gateway.decode_image(&path).unwrap();
        assert_eq!((rgb.width(), rgb.height()), (48, 32));
        assert_eq!(gateway.perceptual_hash(&path, 8).unwrap().bit_len(), 64);
        assert_eq!(gateway.content_hash(&path).unwrap().len(), 64);
    }
}
