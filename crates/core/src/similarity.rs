use serde::{Deserialize, Serialize};

use crate::domain::{FeatureSet, MatchCandidate, PhotoRecord};

/// Perceptual-hash distance that maps to a visual score of zero.
const VISUAL_SCALE: f64 = 256.0;

/// Per-component inclusion weights. A component participates when its
/// weight is above zero; the magnitude does not scale its contribution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureWeights {
    #[serde(default)]
    pub visual: f64,
    #[serde(default)]
    pub color: f64,
    #[serde(default)]
    pub edge: f64,
}

impl Default for FeatureWeights {
    fn default() -> Self {
        Self {
            visual: 0.4,
            color: 0.3,
            edge: 0.3,
        }
    }
}

impl FeatureWeights {
    pub fn visual_enabled(&self) -> bool {
        self.visual > 0.0
    }

    pub fn color_enabled(&self) -> bool {
        self.color > 0.0
    }

    pub fn edge_enabled(&self) -> bool {
        self.edge > 0.0
    }

    /// Copy with the named components switched off.
    pub fn without(mut self, visual: bool, color: bool, edge: bool) -> Self {
        if visual {
            self.visual = 0.0;
        }
        if color {
            self.color = 0.0;
        }
        if edge {
            self.edge = 0.0;
        }
        self
    }
}

pub fn visual_score(target: &FeatureSet<'_>, reference: &FeatureSet<'_>) -> f64 {
    let distance = target.perceptual_hash.distance(reference.perceptual_hash) as f64;
    (1.0 - distance / VISUAL_SCALE).max(0.0)
}

/// Normalised by twice the target's mass. An empty target histogram scores 0.
pub fn color_score(target: &FeatureSet<'_>, reference: &FeatureSet<'_>) -> f64 {
    let total = target.color_histogram.total();
    if total <= 0.0 {
        return 0.0;
    }
    let l1 = target.color_histogram.l1_distance(reference.color_histogram);
    (1.0 - l1 / (2.0 * total)).max(0.0)
}

pub fn edge_score(target: &FeatureSet<'_>, reference: &FeatureSet<'_>) -> f64 {
    1.0 - (target.edge_density - reference.edge_density).abs().min(1.0)
}

/// Combined similarity in [0, 1]: the plain mean of the enabled components.
/// Zero when either side has no feature set or no component is enabled.
pub fn score(
    target: Option<FeatureSet<'_>>,
    reference: Option<FeatureSet<'_>>,
    weights: &FeatureWeights,
) -> f64 {
    let (Some(target), Some(reference)) = (target, reference) else {
        return 0.0;
    };

    let mut parts = Vec::with_capacity(3);
    if weights.visual_enabled() {
        parts.push(visual_score(&target, &reference));
    }
    if weights.color_enabled() {
        parts.push(color_score(&target, &reference));
    }
    if weights.edge_enabled() {
        parts.push(edge_score(&target, &reference));
    }

    if parts.is_empty() {
        return 0.0;
    }
    parts.iter().sum::<f64>() / parts.len() as f64
}

/// Score `target` against every reference, keep those at or above
/// `threshold`, and return the best `max_candidates` in descending order.
/// Ties keep reference order. Unhashed records never match.
pub fn rank_matches<'a>(
    target: &PhotoRecord,
    references: &'a [PhotoRecord],
    weights: &FeatureWeights,
    threshold: f64,
    max_candidates: usize,
) -> Vec<MatchCandidate<'a>> {
    if !target.is_hashed() {
        return Vec::new();
    }
    let target_features = target.features();

    let mut candidates: Vec<MatchCandidate<'a>> = references
        .iter()
        .filter(|r| r.is_hashed() && r.path != target.path)
        .filter_map(|reference| {
            let similarity = score(target_features, reference.features(), weights);
            (similarity >= threshold).then_some(MatchCandidate {
                reference,
                similarity,
            })
        })
        .collect();

    candidates.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
    candidates.truncate(max_candidates);
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ColorHistogram, PerceptualHash, HISTOGRAM_BINS};

    fn hash_with_bits(set: usize) -> PerceptualHash {
        let bits: Vec<bool> = (0..256).map(|i| i < set).collect();
        PerceptualHash::from_bits(&bits)
    }

    fn record(name: &str, set_bits: usize, hist_fill: f64, edge: f64) -> PhotoRecord {
        PhotoRecord::new(format!("/ref/{name}"), 100)
            .with_hashes(name, hash_with_bits(set_bits))
            .with_visual_features(
                ColorHistogram::new(vec![hist_fill; HISTOGRAM_BINS]).unwrap(),
                edge,
            )
    }

    #[test]
    fn test_identical_features_score_one() {
        let a = record("a", 10, 5.0, 0.2);
        let b = record("b", 10, 5.0, 0.2);
        let s = score(a.features(), b.features(), &FeatureWeights::default());
        assert!((s - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_missing_features_score_zero() {
        let a = record("a", 10, 5.0, 0.2);
        let bare = PhotoRecord::new("/ref/bare.jpg", 1);
        assert_eq!(score(a.features(), bare.features(), &FeatureWeights::default()), 0.0);
        assert_eq!(score(None, a.features(), &FeatureWeights::default()), 0.0);
    }

    #[test]
    fn test_weights_gate_but_do_not_scale() {
        // visual = 1 - 64/256 = 0.75, edge = 1 - 0.5 = 0.5
        let a = record("a", 0, 5.0, 0.0);
        let b = record("b", 64, 5.0, 0.5);

        let heavy_visual = FeatureWeights { visual: 0.9, color: 0.0, edge: 0.1 };
        let even = FeatureWeights { visual: 0.5, color: 0.0, edge: 0.5 };
        let s1 = score(a.features(), b.features(), &heavy_visual);
        let s2 = score(a.features(), b.features(), &even);
        assert!((s1 - 0.625).abs() < 1e-12);
        assert!((s1 - s2).abs() < 1e-12);

        let visual_only = FeatureWeights::default().without(false, true, true);
        assert!((score(a.features(), b.features(), &visual_only) - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_no_components_enabled_scores_zero() {
        let a = record("a", 0, 5.0, 0.0);
        let none = FeatureWeights { visual: 0.0, color: 0.0, edge: 0.0 };
        assert_eq!(score(a.features(), a.features(), &none), 0.0);
    }

    #[test]
    fn test_color_score_against_empty_target_is_zero() {
        let empty = record("e", 0, 0.0, 0.0);
        let full = record("f", 0, 3.0, 0.0);
        let (t, r) = (empty.features().unwrap(), full.features().unwrap());
        assert_eq!(color_score(&t, &r), 0.0);
    }

    #[test]
    fn test_color_score_disjoint_histograms_is_zero() {
        let mut left = vec![0.0; HISTOGRAM_BINS];
        let mut right = vec![0.0; HISTOGRAM_BINS];
        left[0] = 10.0;
        right[1] = 10.0;
        let a = PhotoRecord::new("/a", 1)
            .with_hashes("a", hash_with_bits(0))
            .with_visual_features(ColorHistogram::new(left).unwrap(), 0.0);
        let b = PhotoRecord::new("/b", 1)
            .with_hashes("b", hash_with_bits(0))
            .with_visual_features(ColorHistogram::new(right).unwrap(), 0.0);
        assert_eq!(color_score(&a.features().unwrap(), &b.features().unwrap()), 0.0);
    }

    #[test]
    fn test_rank_matches_threshold_order_and_cap() {
        let target = record("t", 0, 5.0, 0.0);
        let visual_only = FeatureWeights::default().without(false, true, true);
        // Visual scores: 1 - k/256 for k set bits.
        let refs: Vec<PhotoRecord> = [128usize, 2, 30, 0, 10, 20, 1]
            .iter()
            .enumerate()
            .map(|(i, &k)| record(&format!("r{i}"), k, 5.0, 0.0))
            .collect();

        let ranked = rank_matches(&target, &refs, &visual_only, 0.7, 5);
        let names: Vec<String> = ranked.iter().map(|c| c.reference.file_name()).collect();
        assert_eq!(names, vec!["r3", "r6", "r1", "r4", "r5"]);
        assert!(ranked.windows(2).all(|w| w[0].similarity >= w[1].similarity));
    }

    #[test]
    fn test_rank_matches_skips_self_and_unhashed() {
        let target = record("t", 0, 5.0, 0.0);
        let refs = vec![target.clone(), PhotoRecord::new("/ref/bare.jpg", 1)];
        assert!(rank_matches(&target, &refs, &FeatureWeights::default(), 0.0, 5).is_empty());
    }
}
