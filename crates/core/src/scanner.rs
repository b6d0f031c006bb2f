use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{Error, Result};

/// Extensions the engine reads. Writing is narrower, see [`crate::exif::is_writable`].
pub const SUPPORTED_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "heic"];

static SYSTEM_FILE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(\._|\.DS_Store|Thumbs\.db|\.picasa\.ini|\.Spotlight-V100|\.Trashes|\.fseventsd|\.TemporaryItems)",
    )
    .expect("system file pattern is valid")
});

static SCREENSHOT_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)screenshot|screen shot|screencap|capture|snapchat|截圖|截图|截屏|屏幕截图|屏幕快照|IMG_[0-9]{4}\s*\([0-9]+\)|Screen\s+Shot\s+[0-9]{4}-[0-9]{2}-[0-9]{2}",
    )
    .expect("screenshot pattern is valid")
});

/// Result of walking a directory tree.
#[derive(Debug, Default)]
pub struct ScanResult {
    /// Supported image files, sorted by path.
    pub photos: Vec<PathBuf>,
    /// OS and indexer debris found along the way.
    pub system_files: Vec<PathBuf>,
}

/// Recursively collect photos under `root`.
///
/// Anything inside a directory named `backup_dir` is skipped, so earlier
/// backups never re-enter a run. Unreadable entries are logged and skipped.
pub fn scan_directory(root: &Path, backup_dir: &str) -> Result<ScanResult> {
    if !root.exists() {
        return Err(Error::PathNotFound(root.to_path_buf()));
    }
    if !root.is_dir() {
        return Err(Error::NotDirectory(root.to_path_buf()));
    }

    let mut result = ScanResult::default();
    let walker = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !(e.file_type().is_dir() && e.file_name() == backup_dir));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let name = entry.file_name().to_string_lossy();
        if is_system_file(&name) {
            result.system_files.push(entry.into_path());
            continue;
        }
        if has_supported_extension(entry.path()) {
            result.photos.push(entry.into_path());
        }
    }

    result.photos.sort();
    result.system_files.sort();
    debug!(
        root = %root.display(),
        photos = result.photos.len(),
        system_files = result.system_files.len(),
        "scan complete"
    );
    Ok(result)
}

pub fn has_supported_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| SUPPORTED_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

pub fn is_system_file(name: &str) -> bool {
    SYSTEM_FILE.is_match(name)
}

/// File names that suggest a screen capture rather than a camera photo.
pub fn is_screenshot_name(name: &str) -> bool {
    SCREENSHOT_NAME.is_match(name)
}
