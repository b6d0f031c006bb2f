use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::NaiveDateTime;
use tracing::{debug, info, warn};

use crate::domain::{DuplicateCluster, ItemFailure, PhotoRecord};
use crate::error::{Error, Result};
use crate::gateway::MetadataGateway;

/// Which members of a review-mode cluster to keep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewSelection {
    All,
    /// Zero-based member indices. Out-of-range indices are ignored.
    Indices(Vec<usize>),
}

impl FromStr for ReviewSelection {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") {
            return Ok(ReviewSelection::All);
        }
        s.split(',')
            .map(|part| {
                part.trim()
                    .parse::<usize>()
                    .map_err(|_| format!("invalid member index '{}'", part.trim()))
            })
            .collect::<std::result::Result<Vec<_>, _>>()
            .map(ReviewSelection::Indices)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergePolicy {
    /// Nothing moves.
    KeepAll,
    /// Keep the largest file.
    BestQuality,
    /// Keep the earliest dated member, or the largest when none is dated.
    Timeline,
    /// Keep the largest file and align its date with the cluster median.
    SmartMerge,
    /// Same selection as `BestQuality`. Duplicates are moved to the backup
    /// area, never removed.
    Delete,
    /// Keep an explicit selection.
    Review(ReviewSelection),
}

impl MergePolicy {
    pub fn name(&self) -> &'static str {
        match self {
            MergePolicy::KeepAll => "keep_all",
            MergePolicy::BestQuality => "best_quality",
            MergePolicy::Timeline => "timeline",
            MergePolicy::SmartMerge => "smart_merge",
            MergePolicy::Delete => "delete",
            MergePolicy::Review(_) => "review",
        }
    }
}

impl fmt::Display for MergePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parses a policy name. `review` alone keeps every member; callers with an
/// explicit selection build `MergePolicy::Review` directly.
impl FromStr for MergePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "keep_all" => Ok(MergePolicy::KeepAll),
            "best_quality" => Ok(MergePolicy::BestQuality),
            "timeline" => Ok(MergePolicy::Timeline),
            "smart_merge" => Ok(MergePolicy::SmartMerge),
            "delete" => Ok(MergePolicy::Delete),
            "review" => Ok(MergePolicy::Review(ReviewSelection::All)),
            other => Err(format!("unknown merge policy '{other}'")),
        }
    }
}

/// Relocates discarded duplicates. Never deletes.
pub trait BackupSink {
    /// Move `path` into the area for `cluster_key`, returning where it went.
    fn move_to_backup(&mut self, path: &Path, cluster_key: &str) -> Result<PathBuf>;
}

/// Moves duplicates into `<root>/duplicates/group_<key>/`.
#[derive(Debug, Clone)]
pub struct FolderBackupSink {
    root: PathBuf,
}

impl FolderBackupSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn group_dir(&self, cluster_key: &str) -> PathBuf {
        self.root.join("duplicates").join(format!("group_{cluster_key}"))
    }
}

impl BackupSink for FolderBackupSink {
    fn move_to_backup(&mut self, path: &Path, cluster_key: &str) -> Result<PathBuf> {
        let failed = |e: std::io::Error| Error::BackupFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        };

        let dir = self.group_dir(cluster_key);
        fs::create_dir_all(&dir).map_err(failed)?;
        let dest = unique_destination(&dir, path);

        // Rename first; copy + remove covers cross-device moves.
        if fs::rename(path, &dest).is_err() {
            copy_then_remove(path, &dest).map_err(failed)?;
        }
        debug!(from = %path.display(), to = %dest.display(), "moved duplicate");
        Ok(dest)
    }
}

/// Move by copying `from` to `to` and removing `from`. The source is only
/// removed once the copy has fully landed.
fn copy_then_remove(from: &Path, to: &Path) -> std::io::Result<()> {
    fs::copy(from, to)?;
    fs::remove_file(from)
}

/// `dir/<name>`, or `dir/<stem>_N.<ext>` for the first free N.
fn unique_destination(dir: &Path, path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "unnamed".to_string());
    let candidate = dir.join(&name);
    if !candidate.exists() {
        return candidate;
    }

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| name.clone());
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    (1..)
        .map(|n| dir.join(format!("{stem}_{n}{ext}")))
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}

/// The side-effect-free half of a merge: who stays, who moves, and what
/// date the kept member should end up with.
#[derive(Debug, Clone)]
pub struct MergePlan<'a> {
    pub policy: MergePolicy,
    pub kept: Vec<&'a PhotoRecord>,
    pub backed_up: Vec<&'a PhotoRecord>,
    /// Set when smart merge will rewrite the kept member's date.
    pub reconcile_to: Option<NaiveDateTime>,
}

/// Date correction applied to the kept member during smart merge.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub path: PathBuf,
    pub previous: Option<NaiveDateTime>,
    pub consensus: NaiveDateTime,
    /// Where the pre-write copy went. `None` if the backup failed.
    pub backup: Option<PathBuf>,
    pub written: bool,
}

#[derive(Debug, Clone)]
pub struct MergeOutcome<'a> {
    pub policy: MergePolicy,
    pub kept: Vec<&'a PhotoRecord>,
    pub backed_up: Vec<&'a PhotoRecord>,
    /// False when any move into the backup area failed.
    pub success: bool,
    pub failures: Vec<ItemFailure>,
    pub reconciliation: Option<Reconciliation>,
}

/// Median of the dated members, taking the upper middle for even counts.
pub fn consensus_date(members: &[&PhotoRecord]) -> Option<NaiveDateTime> {
    let mut dates: Vec<NaiveDateTime> = members.iter().filter_map(|m| m.capture_datetime).collect();
    if dates.is_empty() {
        return None;
    }
    dates.sort();
    Some(dates[dates.len() / 2])
}

fn by_size_descending<'a>(members: &[&'a PhotoRecord]) -> Vec<&'a PhotoRecord> {
    let mut sorted = members.to_vec();
    sorted.sort_by(|a, b| b.file_size.cmp(&a.file_size));
    sorted
}

fn keep_first(sorted: Vec<&PhotoRecord>) -> (Vec<&PhotoRecord>, Vec<&PhotoRecord>) {
    let mut rest = sorted;
    if rest.is_empty() {
        return (Vec::new(), Vec::new());
    }
    let kept = rest.remove(0);
    (vec![kept], rest)
}

/// Decide the outcome of `policy` on `cluster` without touching disk.
pub fn plan<'a>(
    cluster: &DuplicateCluster<'a>,
    policy: &MergePolicy,
    tolerance_secs: i64,
) -> MergePlan<'a> {
    let members = &cluster.members;
    let mut reconcile_to = None;
    let mut effective = policy.clone();

    let (kept, backed_up) = match policy {
        MergePolicy::KeepAll => (members.clone(), Vec::new()),
        MergePolicy::BestQuality | MergePolicy::Delete => keep_first(by_size_descending(members)),
        MergePolicy::Timeline => {
            let earliest = members
                .iter()
                .filter(|m| m.capture_datetime.is_some())
                .min_by_key(|m| m.capture_datetime);
            match earliest {
                Some(&keeper) => {
                    let rest = members
                        .iter()
                        .copied()
                        .filter(|m| m.path != keeper.path)
                        .collect();
                    (vec![keeper], rest)
                }
                None => {
                    debug!(cluster = %cluster.key, "no dated members, timeline falls back to best_quality");
                    effective = MergePolicy::BestQuality;
                    keep_first(by_size_descending(members))
                }
            }
        }
        MergePolicy::SmartMerge => {
            let (kept, rest) = keep_first(by_size_descending(members));
            if let (Some(consensus), Some(keeper)) = (consensus_date(members), kept.first()) {
                let off = keeper
                    .capture_datetime
                    .map_or(true, |own| (own - consensus).num_seconds().abs() > tolerance_secs);
                if off {
                    reconcile_to = Some(consensus);
                }
            }
            (kept, rest)
        }
        MergePolicy::Review(selection) => match selection {
            ReviewSelection::All => (members.clone(), Vec::new()),
            ReviewSelection::Indices(indices) => {
                let mut kept = Vec::new();
                let mut rest = Vec::new();
                for (i, &m) in members.iter().enumerate() {
                    if indices.contains(&i) {
                        kept.push(m);
                    } else {
                        rest.push(m);
                    }
                }
                (kept, rest)
            }
        },
    };

    MergePlan {
        policy: effective,
        kept,
        backed_up,
        reconcile_to,
    }
}

/// Apply `policy` to `cluster`.
///
/// Smart merge backs up the kept file through the gateway before writing
/// the consensus date. A failed backup is logged and the write still goes
/// ahead. Duplicates are then moved one by one; a failed move is recorded
/// and the remaining members are still processed. Nothing is rolled back.
pub fn resolve<'a, S, G>(
    cluster: &DuplicateCluster<'a>,
    policy: &MergePolicy,
    sink: &mut S,
    gateway: &G,
    tolerance_secs: i64,
) -> MergeOutcome<'a>
where
    S: BackupSink + ?Sized,
    G: MetadataGateway + ?Sized,
{
    let plan = plan(cluster, policy, tolerance_secs);
    let mut failures = Vec::new();

    let reconciliation = match (plan.reconcile_to, plan.kept.first()) {
        (Some(consensus), Some(keeper)) => {
            let backup = match gateway.backup_original(&keeper.path) {
                Ok(p) => Some(p),
                Err(e) => {
                    warn!(path = %keeper.path.display(), error = %e, "backup before date write failed");
                    None
                }
            };
            let written = match gateway.write_capture_datetime(&keeper.path, consensus) {
                Ok(()) => {
                    info!(path = %keeper.path.display(), date = %consensus, "reconciled capture date");
                    true
                }
                Err(e) => {
                    warn!(path = %keeper.path.display(), error = %e, "date write failed");
                    false
                }
            };
            Some(Reconciliation {
                path: keeper.path.clone(),
                previous: keeper.capture_datetime,
                consensus,
                backup,
                written,
            })
        }
        _ => None,
    };

    for member in &plan.backed_up {
        if let Err(e) = sink.move_to_backup(&member.path, &cluster.key) {
            warn!(path = %member.path.display(), error = %e, "backup move failed");
            failures.push(ItemFailure::new(&member.path, e));
        }
    }

    MergeOutcome {
        policy: plan.policy,
        kept: plan.kept,
        backed_up: plan.backed_up,
        success: failures.is_empty(),
        failures,
        reconciliation,
    }
}

/// Policy for unattended runs: screenshots go, a clearly larger copy wins,
/// otherwise merge.
pub fn recommend_policy(cluster: &DuplicateCluster<'_>) -> MergePolicy {
    if !cluster.members.is_empty() && cluster.members.iter().all(|m| m.is_screenshot) {
        return MergePolicy::Delete;
    }
    let sorted = by_size_descending(&cluster.members);
    if let [largest, second, ..] = sorted.as_slice() {
        if largest.file_size as f64 > second.file_size as f64 * 1.5 {
            return MergePolicy::BestQuality;
        }
    }
    MergePolicy::SmartMerge
}
