pub mod decode;
pub mod perceptual;

use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

/// Whole-file SHA-256 as lowercase hex, the exact-duplicate key.
/// Streams the file in 64KB chunks.
pub fn content_hash(path: &Path) -> std::io::Result<String> {
    let file = std::fs::File::open(path)?;
    let mut reader = std::io::BufReader::with_capacity(64 * 1024, file);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];

    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_content_hash_known_value() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("test.bin");
        fs::write(&path, b"hello world").unwrap();

        assert_eq!(
            content_hash(&path).unwrap(),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_copies_share_hash() {
        let tmp = tempfile::tempdir().unwrap();
        let original = tmp.path().join("IMG_0001.jpg");
        let copy = tmp.path().join("IMG_0001 (1).jpg");
        fs::write(&original, b"same bytes").unwrap();
        fs::copy(&original, &copy).unwrap();
        fs::write(tmp.path().join("other.jpg"), b"other bytes").unwrap();

        let a = content_hash(&original).unwrap();
        assert_eq!(a, content_hash(&copy).unwrap());
        assert_ne!(a, content_hash(&tmp.path().join("other.jpg")).unwrap());
    }

    #[test]
    fn test_content_hash_nonexistent_file() {
        assert!(content_hash(Path::new("/nonexistent/file.bin")).is_err());
    }
}
