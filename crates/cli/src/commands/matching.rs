use std::path::{Path, PathBuf};

use anyhow::Result;
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use photodate_core::domain::{PhotoRecord, SourceTag};
use photodate_core::gateway::FsGateway;
use photodate_core::report::{self, EstimateRow};
use photodate_core::restore::PlannedWrite;
use photodate_core::{Estimate, Restorer};

use super::{print_failures, progress_bar, track};

pub struct MatchOptions {
    pub hybrid: bool,
    /// Also re-date targets that already carry a capture date.
    pub overwrite: bool,
    pub dry_run: bool,
    pub report: Option<PathBuf>,
}

pub fn run(restorer: &Restorer<FsGateway>, target_dir: &Path, reference_dir: &Path, options: &MatchOptions) -> Result<()> {
    let pb = progress_bar();

    let ref_scan = restorer.scan(reference_dir)?;
    let (references, ref_report) = restorer.load_records(&ref_scan.photos, Some(&mut |p| track(&pb, p)));
    print_failures(&ref_report);
    let undated = references.iter().filter(|r| r.capture_datetime.is_none()).count();
    if undated > 0 {
        println!("{undated} of {} reference photos carry no date and cannot vote.", references.len());
    }

    let target_scan = restorer.scan(target_dir)?;
    let (targets, target_report) = restorer.load_records(&target_scan.photos, Some(&mut |p| track(&pb, p)));
    print_failures(&target_report);
    let (targets, already_dated) = select_targets(targets, options.overwrite);
    if already_dated > 0 {
        println!("{already_dated} target photos already have a date and were left alone (use --overwrite to re-date them).");
    }

    let estimates = if options.hybrid {
        restorer.estimate_hybrid(&targets, &references, Some(&mut |p| track(&pb, p)))
    } else {
        restorer.estimate_visual(&targets, &references, Some(&mut |p| track(&pb, p)))
    };

    println!("{}", estimate_table(&estimates));
    let rows = estimate_rows(&estimates);
    println!(
        "{} of {} photos dated ({} mode).",
        rows.len(),
        estimates.len(),
        restorer.config().estimation.mode
    );

    if let Some(path) = &options.report {
        report::save_estimates(path, &rows)?;
        println!("Report written to {}", path.display());
    }

    if options.dry_run {
        println!("Dry run: nothing was written.");
        return Ok(());
    }

    let writes: Vec<PlannedWrite> = estimates
        .iter()
        .filter_map(|e| e.result.as_ref().map(|r| PlannedWrite::from_estimate(e.target, r, true)))
        .collect();
    let pb = progress_bar();
    let written = restorer.apply(&writes, Some(&mut |p| track(&pb, p)));
    print_failures(&written);
    println!("{} written, {} failed.", written.success, written.failed);
    Ok(())
}

/// Keep only undated targets unless `overwrite` is set. Returns the kept
/// records and how many were dropped.
fn select_targets(targets: Vec<PhotoRecord>, overwrite: bool) -> (Vec<PhotoRecord>, usize) {
    if overwrite {
        return (targets, 0);
    }
    let total = targets.len();
    let undated: Vec<PhotoRecord> = targets.into_iter().filter(|t| t.capture_datetime.is_none()).collect();
    let dropped = total - undated.len();
    (undated, dropped)
}

fn estimate_rows(estimates: &[Estimate<'_>]) -> Vec<EstimateRow> {
    estimates
        .iter()
        .filter_map(|e| e.result.as_ref().map(|r| EstimateRow::new(&e.target.path, r)))
        .collect()
}

fn estimate_table(estimates: &[Estimate<'_>]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Photo"),
        Cell::new("Matches"),
        Cell::new("Date"),
        Cell::new("Confidence"),
        Cell::new("Source"),
        Cell::new("GPS"),
    ]);

    for estimate in estimates {
        let name = Cell::new(estimate.target.file_name());
        let matches = Cell::new(estimate.candidates);
        let row = match &estimate.result {
            Some(result) => {
                let source = match result.source {
                    SourceTag::FolderDate => Cell::new(result.source).fg(Color::Cyan),
                    _ => Cell::new(result.source),
                };
                vec![
                    name,
                    matches,
                    Cell::new(result.datetime.format("%Y-%m-%d %H:%M:%S").to_string()),
                    Cell::new(format!("{:.2}", result.confidence)),
                    source,
                    Cell::new(result.gps.map(|g| g.to_string()).unwrap_or_default()),
                ]
            }
            None => vec![
                name,
                matches,
                Cell::new("-").fg(Color::DarkGrey),
                Cell::new(""),
                Cell::new(""),
                Cell::new(""),
            ],
        };
        table.add_row(row);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};
    use photodate_core::config::Config;
    use photodate_core::domain::EstimationResult;
    use photodate_core::exif;

    fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn create_jpeg(path: &Path) {
        image::RgbImage::from_fn(64, 64, |x, y| {
            image::Rgb([(x * 3) as u8, (y * 3) as u8, ((x + y) * 2) as u8])
        })
        .save(path)
        .unwrap();
    }

    #[test]
    fn test_select_targets_drops_dated_unless_overwriting() {
        let records = vec![
            PhotoRecord::new("/t/a.jpg", 1),
            PhotoRecord::new("/t/b.jpg", 1).with_capture_datetime(Some(at(2010, 1, 1, 0))),
        ];
        let (kept, dropped) = select_targets(records.clone(), false);
        assert_eq!(dropped, 1);
        assert_eq!(kept[0].path, Path::new("/t/a.jpg"));

        let (kept, dropped) = select_targets(records, true);
        assert_eq!((kept.len(), dropped), (2, 0));
    }

    #[test]
    fn test_run_leaves_dated_targets_untouched() {
        let tmp = tempfile::tempdir().unwrap();
        let refs = tmp.path().join("refs");
        let targets = tmp.path().join("targets");
        std::fs::create_dir_all(&refs).unwrap();
        std::fs::create_dir_all(&targets).unwrap();

        create_jpeg(&refs.join("r1.jpg"));
        std::fs::copy(refs.join("r1.jpg"), refs.join("r2.jpg")).unwrap();
        std::fs::copy(refs.join("r1.jpg"), targets.join("dated.jpg")).unwrap();
        std::fs::copy(refs.join("r1.jpg"), targets.join("undated.jpg")).unwrap();
        exif::write_capture_datetime(&refs.join("r1.jpg"), at(2018, 1, 1, 10)).unwrap();
        exif::write_capture_datetime(&refs.join("r2.jpg"), at(2018, 1, 3, 10)).unwrap();
        exif::write_capture_datetime(&targets.join("dated.jpg"), at(2011, 11, 11, 11)).unwrap();

        let restorer = Restorer::new(FsGateway::default(), Config::default());
        let options = MatchOptions {
            hybrid: false,
            overwrite: false,
            dry_run: false,
            report: None,
        };
        run(&restorer, &targets, &refs, &options).unwrap();

        assert_eq!(
            exif::read_capture_datetime(&targets.join("dated.jpg")).unwrap(),
            Some(at(2011, 11, 11, 11))
        );
        assert_eq!(
            exif::read_capture_datetime(&targets.join("undated.jpg")).unwrap(),
            Some(at(2018, 1, 2, 10))
        );
    }

    #[test]
    fn test_rows_only_for_estimated_photos() {
        let a = PhotoRecord::new("/t/a.jpg", 1);
        let b = PhotoRecord::new("/t/b.jpg", 1);
        let result = EstimationResult {
            datetime: NaiveDate::from_ymd_opt(2017, 3, 3)
                .unwrap()
                .and_hms_opt(3, 3, 3)
                .unwrap(),
            confidence: 0.8,
            source: SourceTag::Interpolated,
            gps: None,
        };
        let estimates = vec![
            Estimate {
                target: &a,
                candidates: 3,
                result: Some(result),
            },
            Estimate {
                target: &b,
                candidates: 0,
                result: None,
            },
        ];

        let rows = estimate_rows(&estimates);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].path, Path::new("/t/a.jpg"));
        assert_eq!(estimate_table(&estimates).row_iter().count(), 2);
    }
}
