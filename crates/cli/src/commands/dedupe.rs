use std::path::Path;

use anyhow::{bail, Result};
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use photodate_core::domain::{ClusterKind, DuplicateCluster, PhotoRecord};
use photodate_core::gateway::FsGateway;
use photodate_core::merge::{self, FolderBackupSink, MergePolicy, ReviewSelection};
use photodate_core::report::{self, MergeRow};
use photodate_core::Restorer;

use super::{format_size, print_failures, progress_bar, track};

/// `auto` means a recommendation per cluster, returned as `None`.
pub fn parse_policy(name: &str, keep: Option<ReviewSelection>) -> Result<Option<MergePolicy>> {
    let policy = match name {
        "auto" => None,
        other => Some(other.parse::<MergePolicy>().map_err(anyhow::Error::msg)?),
    };
    match (policy, keep) {
        (Some(MergePolicy::Review(_)), Some(selection)) => Ok(Some(MergePolicy::Review(selection))),
        (_, Some(_)) => bail!("--keep only applies to --policy review"),
        (policy, None) => Ok(policy),
    }
}

pub fn run(
    restorer: &Restorer<FsGateway>,
    dir: &Path,
    policy: Option<MergePolicy>,
    dry_run: bool,
    report_path: Option<&Path>,
) -> Result<()> {
    let scan = restorer.scan(dir)?;
    if !scan.system_files.is_empty() {
        println!("Ignoring {} system files.", scan.system_files.len());
    }

    let pb = progress_bar();
    let (records, indexed) = restorer.load_records(&scan.photos, Some(&mut |p| track(&pb, p)));
    print_failures(&indexed);

    let clusters = restorer.find_clusters(&records);
    if clusters.is_empty() {
        println!("No duplicates found among {} photos.", records.len());
        return Ok(());
    }

    let mut table = cluster_table();
    let mut rows: Vec<MergeRow> = Vec::new();
    let mut reclaimable = 0u64;

    if dry_run {
        let tolerance = restorer.config().merge.consensus_tolerance_secs;
        for (i, cluster) in clusters.iter().enumerate() {
            let chosen = policy.clone().unwrap_or_else(|| merge::recommend_policy(cluster));
            let plan = merge::plan(cluster, &chosen, tolerance);
            add_cluster_row(&mut table, i, cluster, &plan.policy, &plan.kept, &plan.backed_up);
            reclaimable += plan.backed_up.iter().map(|r| r.file_size).sum::<u64>();
            rows.extend(report::merge_rows(cluster, &plan.kept, &plan.backed_up));
        }
        println!("{table}");
        println!(
            "Dry run: {} clusters, {} would be reclaimed. Nothing was changed.",
            clusters.len(),
            format_size(reclaimable)
        );
    } else {
        let backup_root = dir.join(&restorer.config().merge.backup_dir);
        let mut sink = FolderBackupSink::new(&backup_root);
        let pb = progress_bar();
        let outcomes =
            restorer.merge_clusters(&clusters, policy.as_ref(), &mut sink, Some(&mut |p| track(&pb, p)));

        let mut failed = 0;
        for (i, (cluster, outcome)) in clusters.iter().zip(&outcomes).enumerate() {
            add_cluster_row(&mut table, i, cluster, &outcome.policy, &outcome.kept, &outcome.backed_up);
            reclaimable += outcome
                .backed_up
                .iter()
                .filter(|r| !outcome.failures.iter().any(|f| f.path == r.path))
                .map(|r| r.file_size)
                .sum::<u64>();
            rows.extend(report::merge_rows(cluster, &outcome.kept, &outcome.backed_up));
            if let Some(rec) = &outcome.reconciliation {
                let status = if rec.written { "set" } else { "could not set" };
                println!("  {status} {} to {}", rec.path.display(), rec.consensus);
            }
            for failure in &outcome.failures {
                eprintln!("  failed: {} ({})", failure.path.display(), failure.reason);
                failed += 1;
            }
        }
        println!("{table}");
        println!(
            "{} clusters resolved, {} moved to {}, {failed} failures.",
            clusters.len(),
            format_size(reclaimable),
            backup_root.display()
        );
    }

    if let Some(path) = report_path {
        report::save_merge_report(path, &rows)?;
        println!("Report written to {}", path.display());
    }
    Ok(())
}

fn cluster_table() -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("#"),
        Cell::new("Kind"),
        Cell::new("Key"),
        Cell::new("Policy"),
        Cell::new("Kept"),
        Cell::new("Moved"),
    ]);
    table
}

fn add_cluster_row(
    table: &mut Table,
    index: usize,
    cluster: &DuplicateCluster<'_>,
    policy: &MergePolicy,
    kept: &[&PhotoRecord],
    backed_up: &[&PhotoRecord],
) {
    let kind = match cluster.kind {
        ClusterKind::Exact => Cell::new("exact").fg(Color::Green),
        ClusterKind::Similar => Cell::new("similar").fg(Color::Yellow),
    };
    table.add_row(vec![
        Cell::new(index),
        kind,
        Cell::new(&cluster.key),
        Cell::new(policy),
        Cell::new(file_names(kept)),
        Cell::new(file_names(backed_up)).fg(Color::DarkGrey),
    ]);
}

fn file_names(records: &[&PhotoRecord]) -> String {
    if records.is_empty() {
        return "-".to_string();
    }
    records.iter().map(|r| r.file_name()).collect::<Vec<_>>().join("\n")
}
