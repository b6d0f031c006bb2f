use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("EXIF error: {0}")]
    Exif(#[from] exif::Error),

    #[error("invalid config: {0}")]
    Config(#[from] toml::de::Error),

    #[error("report error: {0}")]
    Report(#[from] csv::Error),

    #[error("resize failed: {0}")]
    Resize(String),

    #[error("path does not exist: {}", .0.display())]
    PathNotFound(PathBuf),

    #[error("path is not a directory: {}", .0.display())]
    NotDirectory(PathBuf),

    #[error("metadata writing is only supported for JPEG files: {}", .0.display())]
    WriteUnsupported(PathBuf),

    #[error("not a valid JPEG stream: {}", .0.display())]
    NotJpeg(PathBuf),

    #[error("EXIF segment exceeds 64 KiB for {}", .0.display())]
    ExifTooLarge(PathBuf),

    #[error("color histogram must have {expected} bins, got {actual}")]
    InvalidHistogram { expected: usize, actual: usize },

    #[error("failed to move {} to backup: {message}", .path.display())]
    BackupFailed { path: PathBuf, message: String },
}

pub type Result<T> = std::result::Result<T, Error>;
