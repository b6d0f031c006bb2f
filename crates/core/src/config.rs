use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::estimate::EstimationMode;
use crate::similarity::FeatureWeights;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub clustering: ClusteringConfig,

    #[serde(default)]
    pub matching: MatchingConfig,

    #[serde(default)]
    pub estimation: EstimationConfig,

    #[serde(default)]
    pub merge: MergeConfig,

    #[serde(default)]
    pub screenshots: ScreenshotConfig,

    #[serde(default)]
    pub folder_dates: FolderDateConfig,
}

impl Config {
    /// Parse a TOML document. Missing sections and keys take their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Read a TOML config file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusteringConfig {
    /// Maximum perceptual-hash Hamming distance to a cluster seed.
    #[serde(default = "default_similar_threshold")]
    pub similar_threshold: u32,

    /// Side length of the pHash DCT block; the hash has `hash_size²` bits.
    #[serde(default = "default_hash_size")]
    pub hash_size: u32,
}

fn default_similar_threshold() -> u32 {
    5
}

fn default_hash_size() -> u32 {
    16
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            similar_threshold: default_similar_threshold(),
            hash_size: default_hash_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// Minimum combined score for a reference to become a candidate.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,

    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,

    #[serde(default)]
    pub weights: FeatureWeights,
}

fn default_similarity_threshold() -> f64 {
    0.7
}

fn default_max_candidates() -> usize {
    5
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            max_candidates: default_max_candidates(),
            weights: FeatureWeights::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EstimationConfig {
    #[serde(default)]
    pub mode: EstimationMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeConfig {
    /// Name of the backup directory. Originals are copied to
    /// `<parent>/<backup_dir>/` and duplicates moved under
    /// `<root>/<backup_dir>/duplicates/`.
    #[serde(default = "default_backup_dir")]
    pub backup_dir: String,

    /// A kept member whose date differs from the consensus by more than
    /// this is rewritten during smart merge.
    #[serde(default = "default_consensus_tolerance_secs")]
    pub consensus_tolerance_secs: i64,
}

fn default_backup_dir() -> String {
    ".backup".to_string()
}

fn default_consensus_tolerance_secs() -> i64 {
    60
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            backup_dir: default_backup_dir(),
            consensus_tolerance_secs: default_consensus_tolerance_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenshotConfig {
    /// Common device screen resolutions as (width, height).
    #[serde(default = "default_screenshot_resolutions")]
    pub resolutions: Vec<(u32, u32)>,

    /// Allowed deviation in pixels on each axis.
    #[serde(default = "default_screenshot_tolerance")]
    pub tolerance: u32,
}

fn default_screenshot_resolutions() -> Vec<(u32, u32)> {
    vec![
        (1920, 1080),
        (2560, 1440),
        (3840, 2160),
        (1080, 1920),
        (1440, 2560),
        (2160, 3840),
        (2048, 2732),
        (2732, 2048),
        (1170, 2532),
        (1179, 2556),
    ]
}

fn default_screenshot_tolerance() -> u32 {
    10
}

impl Default for ScreenshotConfig {
    fn default() -> Self {
        Self {
            resolutions: default_screenshot_resolutions(),
            tolerance: default_screenshot_tolerance(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolderDateConfig {
    /// Spacing between consecutive files of one folder.
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: i64,

    /// Rewrite files even when their existing date looks valid.
    #[serde(default)]
    pub overwrite_existing: bool,

    /// Copy originals to the backup directory before writing.
    #[serde(default = "default_backup")]
    pub backup: bool,

    #[serde(default = "default_max_deviation_days")]
    pub max_deviation_days: i64,

    /// Existing dates before this year are treated as invalid.
    #[serde(default = "default_min_valid_year")]
    pub min_valid_year: i32,
}

fn default_interval_minutes() -> i64 {
    2
}

fn default_backup() -> bool {
    true
}

fn default_max_deviation_days() -> i64 {
    365
}

fn default_min_valid_year() -> i32 {
    2000
}

impl Default for FolderDateConfig {
    fn default() -> Self {
        Self {
            interval_minutes: default_interval_minutes(),
            overwrite_existing: false,
            backup: default_backup(),
            max_deviation_days: default_max_deviation_days(),
            min_valid_year: default_min_valid_year(),
        }
    }
}
