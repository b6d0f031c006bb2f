use std::fmt;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Number of bins per color channel in a [`ColorHistogram`].
pub const BINS_PER_CHANNEL: usize = 32;

/// Total histogram length: 32 bins for each of R, G, B.
pub const HISTOGRAM_BINS: usize = BINS_PER_CHANNEL * 3;

/// Latitude/longitude in decimal degrees. Negative values are south/west.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsCoords {
    pub lat: f64,
    pub lon: f64,
}

impl GpsCoords {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

impl fmt::Display for GpsCoords {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}, {:.4}", self.lat, self.lon)
    }
}

/// Fixed-length bit vector produced by perceptual hashing.
/// Bits are packed little-endian into 64-bit words: bit `i` lives in
/// `words[i / 64]` at position `i % 64`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PerceptualHash {
    words: Vec<u64>,
    bit_len: u32,
}

impl PerceptualHash {
    /// Build a hash from packed words. Bits beyond `bit_len` are cleared.
    pub fn from_words(mut words: Vec<u64>, bit_len: u32) -> Self {
        let needed = (bit_len as usize).div_ceil(64);
        words.resize(needed, 0);
        let tail = bit_len % 64;
        if tail != 0 {
            if let Some(last) = words.last_mut() {
                *last &= (1u64 << tail) - 1;
            }
        }
        Self { words, bit_len }
    }

    /// Build a hash from individual bits, in order.
    pub fn from_bits(bits: &[bool]) -> Self {
        let mut words = vec![0u64; bits.len().div_ceil(64)];
        for (i, &bit) in bits.iter().enumerate() {
            if bit {
                words[i / 64] |= 1 << (i % 64);
            }
        }
        Self {
            words,
            bit_len: bits.len() as u32,
        }
    }

    pub fn bit_len(&self) -> u32 {
        self.bit_len
    }

    /// Hamming distance over the full bit length.
    /// Hashes of different lengths are maximally distant.
    pub fn distance(&self, other: &PerceptualHash) -> u32 {
        if self.bit_len != other.bit_len {
            return self.bit_len.max(other.bit_len);
        }
        self.words
            .iter()
            .zip(&other.words)
            .map(|(a, b)| (a ^ b).count_ones())
            .sum()
    }

    /// Lowercase hex rendering, most significant word first.
    pub fn to_hex(&self) -> String {
        self.words
            .iter()
            .rev()
            .map(|w| format!("{w:016x}"))
            .collect()
    }
}

impl fmt::Display for PerceptualHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// 96-bin color histogram (32 bins per RGB channel).
#[derive(Debug, Clone, PartialEq)]
pub struct ColorHistogram(Vec<f64>);

impl ColorHistogram {
    pub fn new(bins: Vec<f64>) -> Result<Self> {
        if bins.len() != HISTOGRAM_BINS {
            return Err(Error::InvalidHistogram {
                expected: HISTOGRAM_BINS,
                actual: bins.len(),
            });
        }
        Ok(Self(bins))
    }

    pub fn bins(&self) -> &[f64] {
        &self.0
    }

    pub fn total(&self) -> f64 {
        self.0.iter().sum()
    }

    /// L1 (Manhattan) distance between two histograms.
    pub fn l1_distance(&self, other: &ColorHistogram) -> f64 {
        self.0
            .iter()
            .zip(&other.0)
            .map(|(a, b)| (a - b).abs())
            .sum()
    }
}

/// Everything known about one photo after a scan. Identity is the path.
///
/// Records are built once per scan and never mutated by clustering or
/// matching. A record without `content_hash` or `perceptual_hash` is
/// excluded from both.
#[derive(Debug, Clone, PartialEq)]
pub struct PhotoRecord {
    pub path: PathBuf,
    pub content_hash: Option<String>,
    pub perceptual_hash: Option<PerceptualHash>,
    pub color_histogram: Option<ColorHistogram>,
    pub edge_density: Option<f64>,
    pub capture_datetime: Option<NaiveDateTime>,
    pub gps: Option<GpsCoords>,
    pub file_size: u64,
    pub width: u32,
    pub height: u32,
    pub is_screenshot: bool,
}

impl PhotoRecord {
    pub fn new(path: impl Into<PathBuf>, file_size: u64) -> Self {
        Self {
            path: path.into(),
            content_hash: None,
            perceptual_hash: None,
            color_histogram: None,
            edge_density: None,
            capture_datetime: None,
            gps: None,
            file_size,
            width: 0,
            height: 0,
            is_screenshot: false,
        }
    }

    pub fn with_hashes(mut self, content_hash: impl Into<String>, perceptual_hash: PerceptualHash) -> Self {
        self.content_hash = Some(content_hash.into());
        self.perceptual_hash = Some(perceptual_hash);
        self
    }

    pub fn with_capture_datetime(mut self, datetime: Option<NaiveDateTime>) -> Self {
        self.capture_datetime = datetime;
        self
    }

    pub fn with_gps(mut self, gps: Option<GpsCoords>) -> Self {
        self.gps = gps;
        self
    }

    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Attach visual features. Edge density is clamped into [0, 1].
    pub fn with_visual_features(mut self, histogram: ColorHistogram, edge_density: f64) -> Self {
        self.color_histogram = Some(histogram);
        self.edge_density = Some(edge_density.clamp(0.0, 1.0));
        self
    }

    /// True when both hashes are present, i.e. the record may be clustered.
    pub fn is_hashed(&self) -> bool {
        self.content_hash.is_some() && self.perceptual_hash.is_some()
    }

    /// The full feature set used for similarity scoring, if complete.
    pub fn features(&self) -> Option<FeatureSet<'_>> {
        Some(FeatureSet {
            perceptual_hash: self.perceptual_hash.as_ref()?,
            color_histogram: self.color_histogram.as_ref()?,
            edge_density: self.edge_density?,
        })
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Borrowed view of the visual features of a record.
#[derive(Debug, Clone, Copy)]
pub struct FeatureSet<'a> {
    pub perceptual_hash: &'a PerceptualHash,
    pub color_histogram: &'a ColorHistogram,
    pub edge_density: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterKind {
    /// Byte-identical files (same content hash).
    Exact,
    /// Perceptual hash within threshold of the cluster seed.
    Similar,
}

impl fmt::Display for ClusterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClusterKind::Exact => write!(f, "exact"),
            ClusterKind::Similar => write!(f, "similar"),
        }
    }
}

/// A group of records judged to depict the same photo.
/// Members keep scan order; for similar clusters the seed is first.
#[derive(Debug, Clone)]
pub struct DuplicateCluster<'a> {
    pub kind: ClusterKind,
    pub key: String,
    pub members: Vec<&'a PhotoRecord>,
}

/// A reference photo that scored above the similarity threshold.
#[derive(Debug, Clone, Copy)]
pub struct MatchCandidate<'a> {
    pub reference: &'a PhotoRecord,
    pub similarity: f64,
}

/// Where an estimated date came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTag {
    FolderDate,
    MostSimilar,
    WeightedAverage,
    Interpolated,
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SourceTag::FolderDate => "folder_date",
            SourceTag::MostSimilar => "most_similar",
            SourceTag::WeightedAverage => "weighted_average",
            SourceTag::Interpolated => "interpolated",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EstimationResult {
    pub datetime: NaiveDateTime,
    pub confidence: f64,
    pub source: SourceTag,
    pub gps: Option<GpsCoords>,
}

/// A per-item fault that was isolated from the rest of a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemFailure {
    pub path: PathBuf,
    pub reason: String,
}

impl ItemFailure {
    pub fn new(path: impl Into<PathBuf>, reason: impl fmt::Display) -> Self {
        Self {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Outcome counts of a batch operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub success: usize,
    pub skipped: usize,
    pub failed: usize,
    pub failures: Vec<ItemFailure>,
}

impl BatchReport {
    pub fn fail(&mut self, path: impl Into<PathBuf>, reason: impl fmt::Display) {
        self.failed += 1;
        self.failures.push(ItemFailure::new(path, reason));
    }

    pub fn total(&self) -> usize {
        self.success + self.skipped + self.failed
    }
}
