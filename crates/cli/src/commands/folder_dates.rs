use std::path::Path;

use anyhow::Result;
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use photodate_core::gateway::FsGateway;
use photodate_core::restore::{FolderPlan, PlannedWrite};
use photodate_core::Restorer;

use super::{print_failures, progress_bar, track};

pub fn run(restorer: &Restorer<FsGateway>, dir: &Path, dry_run: bool) -> Result<()> {
    let scan = restorer.scan(dir)?;
    let pb = progress_bar();
    let (records, indexed) = restorer.load_records(&scan.photos, Some(&mut |p| track(&pb, p)));
    print_failures(&indexed);

    let now = chrono::Local::now().naive_local();
    let plans = restorer.plan_folder_dates(&records, now);
    let planned_files: usize = plans.iter().map(|p| p.assignments.len()).sum();
    let undated = records.len() - planned_files;

    if plans.is_empty() {
        println!("No folder or file names with a recognizable date under {}.", dir.display());
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Folder"),
        Cell::new("Date"),
        Cell::new("Photos"),
        Cell::new("To write"),
        Cell::new("Kept"),
    ]);
    for plan in &plans {
        let to_write = plan.to_write().count();
        let write_cell = if to_write > 0 {
            Cell::new(to_write).fg(Color::Yellow)
        } else {
            Cell::new(to_write).fg(Color::DarkGrey)
        };
        table.add_row(vec![
            Cell::new(folder_name(plan, dir)),
            Cell::new(plan.folder_date.format("%Y-%m-%d").to_string()),
            Cell::new(plan.assignments.len()),
            write_cell,
            Cell::new(plan.skipped()),
        ]);
    }
    println!("{table}");
    if undated > 0 {
        println!("{undated} photos are in folders without a date and were left alone.");
    }

    let backup = restorer.config().folder_dates.backup;
    let writes = planned_writes(&plans, backup);

    if dry_run {
        for plan in &plans {
            for assignment in plan.to_write() {
                if let Some(reason) = assignment.reason {
                    println!(
                        "  {} -> {} ({reason})",
                        assignment.record.path.display(),
                        assignment.datetime
                    );
                }
            }
        }
        println!("Dry run: {} files would be written. Nothing was changed.", writes.len());
        return Ok(());
    }

    let pb = progress_bar();
    let report = restorer.apply(&writes, Some(&mut |p| track(&pb, p)));
    print_failures(&report);
    println!("{} written, {} failed.", report.success, report.failed);
    Ok(())
}

/// One write per assignment that needs it, in folder then file name order.
fn planned_writes(plans: &[FolderPlan<'_>], backup: bool) -> Vec<PlannedWrite> {
    plans
        .iter()
        .flat_map(|plan| plan.to_write())
        .map(|a| PlannedWrite {
            path: a.record.path.clone(),
            datetime: a.datetime,
            gps: None,
            backup,
        })
        .collect()
}

fn folder_name(plan: &FolderPlan<'_>, root: &Path) -> String {
    plan.folder
        .strip_prefix(root)
        .ok()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(plan.folder.as_path())
        .display()
        .to_string()
}
