use std::collections::HashMap;

use tracing::debug;

use crate::domain::{ClusterKind, DuplicateCluster, PhotoRecord};

/// Length of the truncated hash used as a cluster key.
const KEY_LEN: usize = 8;

/// Group records into duplicate clusters.
///
/// Phase 1 groups byte-identical files by content hash. Phase 2 walks the
/// remaining records in input order; each unprocessed record seeds a
/// cluster and pulls in every later unprocessed record whose perceptual
/// hash is within `threshold` bits of the seed. Membership is decided
/// against the seed only, so two members of one similar cluster can be
/// further apart than `threshold`.
///
/// Exact clusters come first, in order of first appearance. Records without
/// both hashes are ignored, and singletons are never emitted.
pub fn find_clusters(records: &[PhotoRecord], threshold: u32) -> Vec<DuplicateCluster<'_>> {
    let hashed: Vec<&PhotoRecord> = records.iter().filter(|r| r.is_hashed()).collect();
    let mut processed = vec![false; hashed.len()];
    let mut clusters = Vec::new();

    // Phase 1: exact content hash
    let mut order: Vec<&str> = Vec::new();
    let mut by_hash: HashMap<&str, Vec<usize>> = HashMap::new();
    for (i, record) in hashed.iter().enumerate() {
        let Some(hash) = record.content_hash.as_deref() else {
            continue;
        };
        let slot = by_hash.entry(hash).or_default();
        if slot.is_empty() {
            order.push(hash);
        }
        slot.push(i);
    }
    for hash in order {
        let indices = &by_hash[hash];
        if indices.len() < 2 {
            continue;
        }
        for &i in indices {
            processed[i] = true;
        }
        clusters.push(DuplicateCluster {
            kind: ClusterKind::Exact,
            key: truncate_key(hash),
            members: indices.iter().map(|&i| hashed[i]).collect(),
        });
    }
    let exact_count = clusters.len();

    // Phase 2: seed-based perceptual grouping
    for seed in 0..hashed.len() {
        if processed[seed] {
            continue;
        }
        let Some(seed_hash) = hashed[seed].perceptual_hash.as_ref() else {
            continue;
        };
        processed[seed] = true;

        let mut members = vec![hashed[seed]];
        for other in seed + 1..hashed.len() {
            if processed[other] {
                continue;
            }
            let Some(other_hash) = hashed[other].perceptual_hash.as_ref() else {
                continue;
            };
            if seed_hash.distance(other_hash) <= threshold {
                processed[other] = true;
                members.push(hashed[other]);
            }
        }

        if members.len() >= 2 {
            clusters.push(DuplicateCluster {
                kind: ClusterKind::Similar,
                key: truncate_key(&seed_hash.to_hex()),
                members,
            });
        }
    }

    debug!(
        records = hashed.len(),
        exact = exact_count,
        similar = clusters.len() - exact_count,
        "clustering complete"
    );
    clusters
}

fn truncate_key(hash: &str) -> String {
    hash.chars().take(KEY_LEN).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PerceptualHash;

    /// A 256-bit hash whose bits in `set` are 1.
    fn phash(set: &[usize]) -> PerceptualHash {
        let mut bits = vec![false; 256];
        for &i in set {
            bits[i] = true;
        }
        PerceptualHash::from_bits(&bits)
    }

    fn record(name: &str, sha: &str, bits: &[usize]) -> PhotoRecord {
        PhotoRecord::new(format!("/photos/{name}.jpg"), 1000).with_hashes(sha, phash(bits))
    }

    fn names(cluster: &DuplicateCluster<'_>) -> Vec<String> {
        cluster.members.iter().map(|r| r.file_name()).collect()
    }

    #[test]
    fn test_equal_content_hash_is_one_exact_cluster() {
        let records = vec![
            record("a", "aaaaaaaaaaaa", &[]),
            record("b", "aaaaaaaaaaaa", &(0..100).collect::<Vec<_>>()),
        ];
        let clusters = find_clusters(&records, 5);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].kind, ClusterKind::Exact);
        assert_eq!(clusters[0].key, "aaaaaaaa");
        assert_eq!(names(&clusters[0]), vec!["a.jpg", "b.jpg"]);
    }

    #[test]
    fn test_seed_based_membership_is_not_transitive() {
        // A↔B = 3, B↔C = 3, A↔C = 6
        let records = vec![
            record("a", "sha-a", &[]),
            record("b", "sha-b", &[0, 1, 2]),
            record("c", "sha-c", &[0, 1, 2, 3, 4, 5]),
        ];
        let hash = |i: usize| records[i].perceptual_hash.as_ref().unwrap();
        assert_eq!(hash(0).distance(hash(2)), 6);

        let clusters = find_clusters(&records, 5);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].kind, ClusterKind::Similar);
        assert_eq!(names(&clusters[0]), vec!["a.jpg", "b.jpg"]);
    }

    #[test]
    fn test_left_over_record_seeds_its_own_cluster() {
        let records = vec![
            record("a", "sha-a", &[]),
            record("b", "sha-b", &[0, 1, 2]),
            record("c", "sha-c", &[0, 1, 2, 3, 4, 5, 6, 7]),
            record("d", "sha-d", &[0, 1, 2, 3, 4, 5, 6, 7, 8]),
        ];
        let clusters = find_clusters(&records, 5);
        assert_eq!(clusters.len(), 2);
        assert_eq!(names(&clusters[0]), vec!["a.jpg", "b.jpg"]);
        assert_eq!(names(&clusters[1]), vec!["c.jpg", "d.jpg"]);
    }

    #[test]
    fn test_exact_clusters_come_first_and_are_not_reused() {
        let records = vec![
            record("x", "sha-x", &(100..110).collect::<Vec<_>>()),
            record("a", "dup", &[]),
            record("y", "sha-y", &(100..111).collect::<Vec<_>>()),
            record("b", "dup", &[]),
            record("c", "sha-c", &[1]),
        ];
        let clusters = find_clusters(&records, 5);
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].kind, ClusterKind::Exact);
        assert_eq!(names(&clusters[0]), vec!["a.jpg", "b.jpg"]);
        // c is within threshold of a/b, but they are already processed.
        assert_eq!(clusters[1].kind, ClusterKind::Similar);
        assert_eq!(names(&clusters[1]), vec!["x.jpg", "y.jpg"]);
    }

    #[test]
    fn test_each_record_in_at_most_one_cluster() {
        let records: Vec<PhotoRecord> = (0..12)
            .map(|i| record(&format!("p{i}"), &format!("sha{}", i % 5), &(0..i).collect::<Vec<_>>()))
            .collect();
        let clusters = find_clusters(&records, 5);
        let mut seen = std::collections::HashSet::new();
        for c in &clusters {
            assert!(c.members.len() >= 2);
            for m in &c.members {
                assert!(seen.insert(m.path.clone()), "{} appears twice", m.path.display());
            }
        }
    }

    #[test]
    fn test_unhashed_records_are_excluded() {
        let records = vec![
            record("a", "same", &[]),
            PhotoRecord::new("/photos/broken.jpg", 10),
            record("b", "other", &[1]),
        ];
        let clusters = find_clusters(&records, 5);
        assert_eq!(clusters.len(), 1);
        assert!(clusters[0].members.iter().all(|m| m.is_hashed()));
    }

    #[test]
    fn test_similar_key_is_truncated_seed_hash() {
        let records = vec![record("a", "s1", &[255]), record("b", "s2", &[255, 0])];
        let clusters = find_clusters(&records, 5);
        assert_eq!(clusters[0].key, "80000000");
    }

    #[test]
    fn test_empty_and_single_inputs() {
        assert!(find_clusters(&[], 5).is_empty());
        assert!(find_clusters(&[record("a", "s", &[])], 5).is_empty());
    }
}
