pub mod config;
pub mod domain;
pub mod error;
pub mod estimate;
pub mod exif;
pub mod features;
pub mod gateway;
pub mod hasher;
pub mod matching;
pub mod merge;
pub mod path_date;
pub mod report;
pub mod restore;
pub mod scanner;
pub mod similarity;

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use tracing::{debug, info, warn};

use config::Config;
use domain::*;
use error::Result;
use gateway::MetadataGateway;
use merge::{BackupSink, MergeOutcome, MergePolicy};
use restore::{FolderPlan, PlannedWrite};
use scanner::ScanResult;

/// Progress events, delivered after each item of a phase.
#[derive(Debug, Clone)]
pub enum Progress {
    /// A phase is about to process `total` items.
    PhaseStart { phase: &'static str, total: usize },
    /// One item of the current phase is done.
    ItemDone { path: PathBuf },
    PhaseComplete { phase: &'static str },
}

fn emit(progress: &mut Option<&mut dyn FnMut(Progress)>, event: Progress) {
    if let Some(cb) = progress {
        cb(event);
    }
}

/// Estimate for one target photo.
#[derive(Debug, Clone)]
pub struct Estimate<'a> {
    pub target: &'a PhotoRecord,
    /// Number of references that cleared the similarity threshold.
    pub candidates: usize,
    pub result: Option<EstimationResult>,
}

/// Drives scan, clustering, merging, estimation and write-back over one
/// gateway. Holds no state beyond its configuration.
pub struct Restorer<G: MetadataGateway> {
    gateway: G,
    config: Config,
}

impl<G: MetadataGateway> Restorer<G> {
    pub fn new(gateway: G, config: Config) -> Self {
        Self { gateway, config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Find photos under `root`, skipping the backup area.
    pub fn scan(&self, root: &Path) -> Result<ScanResult> {
        scanner::scan_directory(root, &self.config.merge.backup_dir)
    }

    /// Build a record per path. A file that vanished counts as failed;
    /// every other extraction problem only degrades that record.
    pub fn load_records(
        &self,
        paths: &[PathBuf],
        mut progress: Option<&mut dyn FnMut(Progress)>,
    ) -> (Vec<PhotoRecord>, BatchReport) {
        emit(&mut progress, Progress::PhaseStart { phase: "indexing", total: paths.len() });

        let mut records = Vec::with_capacity(paths.len());
        let mut report = BatchReport::default();
        for path in paths {
            match features::extract_record(&self.gateway, path, &self.config) {
                Ok(record) => {
                    if record.is_hashed() {
                        report.success += 1;
                    } else {
                        report.skipped += 1;
                    }
                    records.push(record);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "could not index");
                    report.fail(path, e);
                }
            }
            emit(&mut progress, Progress::ItemDone { path: path.clone() });
        }

        info!(
            indexed = report.success,
            degraded = report.skipped,
            failed = report.failed,
            "indexing complete"
        );
        emit(&mut progress, Progress::PhaseComplete { phase: "indexing" });
        (records, report)
    }

    pub fn find_clusters<'a>(&self, records: &'a [PhotoRecord]) -> Vec<DuplicateCluster<'a>> {
        let clusters = matching::find_clusters(records, self.config.clustering.similar_threshold);
        info!(clusters = clusters.len(), "duplicate clusters found");
        clusters
    }

    /// Resolve every cluster. `policy` of `None` picks one per cluster with
    /// [`merge::recommend_policy`].
    pub fn merge_clusters<'a>(
        &self,
        clusters: &[DuplicateCluster<'a>],
        policy: Option<&MergePolicy>,
        sink: &mut dyn BackupSink,
        mut progress: Option<&mut dyn FnMut(Progress)>,
    ) -> Vec<MergeOutcome<'a>> {
        emit(&mut progress, Progress::PhaseStart { phase: "merging", total: clusters.len() });

        let tolerance = self.config.merge.consensus_tolerance_secs;
        let mut outcomes = Vec::with_capacity(clusters.len());
        for cluster in clusters {
            let chosen = policy.cloned().unwrap_or_else(|| merge::recommend_policy(cluster));
            debug!(cluster = %cluster.key, policy = %chosen, members = cluster.members.len(), "resolving");
            let outcome = merge::resolve(cluster, &chosen, &mut *sink, &self.gateway, tolerance);
            if let Some(first) = cluster.members.first() {
                emit(&mut progress, Progress::ItemDone { path: first.path.clone() });
            }
            outcomes.push(outcome);
        }

        let moved: usize = outcomes.iter().map(|o| o.backed_up.len() - o.failures.len()).sum();
        info!(clusters = outcomes.len(), moved, "merge complete");
        emit(&mut progress, Progress::PhaseComplete { phase: "merging" });
        outcomes
    }

    /// Score each target against the references and estimate its date.
    pub fn estimate_visual<'a>(
        &self,
        targets: &'a [PhotoRecord],
        references: &[PhotoRecord],
        progress: Option<&mut dyn FnMut(Progress)>,
    ) -> Vec<Estimate<'a>> {
        self.estimate_each(targets, references, false, progress)
    }

    /// Like [`Restorer::estimate_visual`], but a date in the folder or file
    /// name wins over the visual estimate.
    pub fn estimate_hybrid<'a>(
        &self,
        targets: &'a [PhotoRecord],
        references: &[PhotoRecord],
        progress: Option<&mut dyn FnMut(Progress)>,
    ) -> Vec<Estimate<'a>> {
        self.estimate_each(targets, references, true, progress)
    }

    fn estimate_each<'a>(
        &self,
        targets: &'a [PhotoRecord],
        references: &[PhotoRecord],
        path_first: bool,
        mut progress: Option<&mut dyn FnMut(Progress)>,
    ) -> Vec<Estimate<'a>> {
        emit(&mut progress, Progress::PhaseStart { phase: "matching", total: targets.len() });

        let matching = &self.config.matching;
        let mode = self.config.estimation.mode;
        let mut estimates = Vec::with_capacity(targets.len());
        for target in targets {
            let ranked = similarity::rank_matches(
                target,
                references,
                &matching.weights,
                matching.similarity_threshold,
                matching.max_candidates,
            );
            let result = if path_first {
                restore::estimate_hybrid(target, &ranked, mode)
            } else {
                estimate::estimate(&ranked, mode)
            };
            let candidates = ranked.len();
            debug!(
                path = %target.path.display(),
                candidates,
                estimated = result.is_some(),
                "estimated"
            );
            estimates.push(Estimate {
                target,
                candidates,
                result,
            });
            emit(&mut progress, Progress::ItemDone { path: target.path.clone() });
        }

        emit(&mut progress, Progress::PhaseComplete { phase: "matching" });
        estimates
    }

    pub fn plan_folder_dates<'a>(&self, records: &'a [PhotoRecord], now: NaiveDateTime) -> Vec<FolderPlan<'a>> {
        restore::plan_folder_dates(records, &self.config.folder_dates, now)
    }

    /// Carry out planned writes: backup, then date, then GPS, per item.
    ///
    /// A failed backup is logged and the write still happens. A failed date
    /// write marks the item failed; a failed GPS write is logged only.
    pub fn apply(&self, writes: &[PlannedWrite], mut progress: Option<&mut dyn FnMut(Progress)>) -> BatchReport {
        emit(&mut progress, Progress::PhaseStart { phase: "writing", total: writes.len() });

        let mut report = BatchReport::default();
        for write in writes {
            if write.backup {
                if let Err(e) = self.gateway.backup_original(&write.path) {
                    warn!(path = %write.path.display(), error = %e, "backup failed, writing anyway");
                }
            }

            match self.gateway.write_capture_datetime(&write.path, write.datetime) {
                Ok(()) => {
                    if let Some(gps) = write.gps {
                        if let Err(e) = self.gateway.write_gps(&write.path, gps) {
                            warn!(path = %write.path.display(), error = %e, "GPS write failed");
                        }
                    }
                    debug!(path = %write.path.display(), date = %write.datetime, "written");
                    report.success += 1;
                }
                Err(e) => {
                    warn!(path = %write.path.display(), error = %e, "date write failed");
                    report.fail(&write.path, e);
                }
            }
            emit(&mut progress, Progress::ItemDone { path: write.path.clone() });
        }

        info!(written = report.success, failed = report.failed, "write-back complete");
        emit(&mut progress, Progress::PhaseComplete { phase: "writing" });
        report
    }
}
