//! Date recovery from folder and file names.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use chrono::{Datelike, NaiveDateTime, TimeDelta};
use tracing::warn;

use crate::config::FolderDateConfig;
use crate::domain::{EstimationResult, GpsCoords, MatchCandidate, PhotoRecord, SourceTag};
use crate::estimate::{estimate, EstimationMode};
use crate::path_date::extract_date_from_path;

/// Confidence attached to a date read from a folder or file name.
pub const PATH_CONFIDENCE: f64 = 0.85;

/// Date from the parent directory name, else from the file name. The
/// record's own GPS, if any, is carried along.
pub fn estimate_from_path(record: &PhotoRecord) -> Option<EstimationResult> {
    let datetime = record
        .path
        .parent()
        .and_then(extract_date_from_path)
        .or_else(|| extract_date_from_path(&record.path))?;
    Some(EstimationResult {
        datetime,
        confidence: PATH_CONFIDENCE,
        source: SourceTag::FolderDate,
        gps: record.gps,
    })
}

/// Path date first, visual estimate when the path has none.
pub fn estimate_hybrid(
    record: &PhotoRecord,
    candidates: &[MatchCandidate<'_>],
    mode: EstimationMode,
) -> Option<EstimationResult> {
    estimate_from_path(record).or_else(|| estimate(candidates, mode))
}

/// Why a file's date is going to be rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteReason {
    NoDate,
    ForceOverwrite,
    /// Before the configured minimum year, or in the future.
    InvalidDate,
    /// Too far from the folder date.
    Deviation,
}

impl fmt::Display for WriteReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WriteReason::NoDate => "no date",
            WriteReason::ForceOverwrite => "forced overwrite",
            WriteReason::InvalidDate => "invalid date",
            WriteReason::Deviation => "deviates from folder date",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct FolderAssignment<'a> {
    pub record: &'a PhotoRecord,
    /// Folder date plus the file's slot offset.
    pub datetime: NaiveDateTime,
    /// `None` means the existing date is kept.
    pub reason: Option<WriteReason>,
}

#[derive(Debug, Clone)]
pub struct FolderPlan<'a> {
    pub folder: PathBuf,
    pub folder_date: NaiveDateTime,
    /// In file name order.
    pub assignments: Vec<FolderAssignment<'a>>,
}

impl<'a> FolderPlan<'a> {
    pub fn to_write(&self) -> impl Iterator<Item = &FolderAssignment<'a>> + '_ {
        self.assignments.iter().filter(|a| a.reason.is_some())
    }

    pub fn skipped(&self) -> usize {
        self.assignments.iter().filter(|a| a.reason.is_none()).count()
    }
}

/// Decide whether an existing date must be replaced.
pub fn write_reason(
    existing: Option<NaiveDateTime>,
    folder_date: NaiveDateTime,
    config: &FolderDateConfig,
    now: NaiveDateTime,
) -> Option<WriteReason> {
    let Some(existing) = existing else {
        return Some(WriteReason::NoDate);
    };
    if config.overwrite_existing {
        return Some(WriteReason::ForceOverwrite);
    }
    if existing.year() < config.min_valid_year || existing > now {
        return Some(WriteReason::InvalidDate);
    }
    if (existing - folder_date).num_days().abs() > config.max_deviation_days {
        return Some(WriteReason::Deviation);
    }
    None
}

/// Plan folder-date assignments for every folder that yields a date.
///
/// Records are grouped by parent directory and sorted by file name. The
/// folder date comes from the directory name, else from the first file
/// name that carries one. File `i` is assigned `folder date + i × interval`.
/// Folders without any date are left out, as are folders whose slots would
/// fall outside the representable range. A negative interval plans nothing.
/// Plans are ordered by folder date.
pub fn plan_folder_dates<'a>(
    records: &'a [PhotoRecord],
    config: &FolderDateConfig,
    now: NaiveDateTime,
) -> Vec<FolderPlan<'a>> {
    let mut folders: BTreeMap<PathBuf, Vec<&'a PhotoRecord>> = BTreeMap::new();
    for record in records {
        let folder = record.path.parent().map(PathBuf::from).unwrap_or_default();
        folders.entry(folder).or_default().push(record);
    }

    let interval = match TimeDelta::try_minutes(config.interval_minutes) {
        Some(interval) if config.interval_minutes >= 0 => interval,
        _ => {
            warn!(interval_minutes = config.interval_minutes, "invalid folder date interval");
            return Vec::new();
        }
    };
    let mut plans = Vec::new();
    for (folder, mut members) in folders {
        members.sort_by_key(|r| r.file_name());

        let folder_date = extract_date_from_path(&folder)
            .or_else(|| members.iter().find_map(|r| extract_date_from_path(&r.path)));
        let Some(folder_date) = folder_date else {
            continue;
        };

        let assignments: Option<Vec<_>> = members
            .into_iter()
            .enumerate()
            .map(|(i, record)| {
                let datetime = slot_datetime(folder_date, interval, i)?;
                Some(FolderAssignment {
                    record,
                    datetime,
                    reason: write_reason(record.capture_datetime, folder_date, config, now),
                })
            })
            .collect();
        let Some(assignments) = assignments else {
            warn!(folder = %folder.display(), "folder date slots out of range, skipping folder");
            continue;
        };

        plans.push(FolderPlan {
            folder,
            folder_date,
            assignments,
        });
    }

    plans.sort_by_key(|p| p.folder_date);
    plans
}

/// `folder_date + index × interval`, or `None` on overflow.
fn slot_datetime(folder_date: NaiveDateTime, interval: TimeDelta, index: usize) -> Option<NaiveDateTime> {
    let offset = interval.checked_mul(i32::try_from(index).ok()?)?;
    folder_date.checked_add_signed(offset)
}

/// One metadata write the orchestrator should carry out.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedWrite {
    pub path: PathBuf,
    pub datetime: NaiveDateTime,
    pub gps: Option<GpsCoords>,
    /// Copy the original aside before writing.
    pub backup: bool,
}

impl PlannedWrite {
    /// Write for an estimate. GPS is only written when it differs from
    /// what the file already has.
    pub fn from_estimate(record: &PhotoRecord, result: &EstimationResult, backup: bool) -> Self {
        Self {
            path: record.path.clone(),
            datetime: result.datetime,
            gps: result.gps.filter(|g| Some(*g) != record.gps),
            backup,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    fn now() -> NaiveDateTime {
        at(2026, 1, 1, 0, 0)
    }

    fn rec(path: &str, date: Option<NaiveDateTime>) -> PhotoRecord {
        PhotoRecord::new(path, 1).with_capture_datetime(date)
    }

    #[test]
    fn test_path_estimate_prefers_folder() {
        let r = rec("/p/2019-08-10 lake/IMG_20200101.jpg", None)
            .with_gps(Some(GpsCoords::new(46.0, 7.0)));
        let e = estimate_from_path(&r).unwrap();
        assert_eq!(e.datetime, at(2019, 8, 10, 12, 0));
        assert_eq!(e.confidence, 0.85);
        assert_eq!(e.source, SourceTag::FolderDate);
        assert_eq!(e.gps, Some(GpsCoords::new(46.0, 7.0)));
    }

    #[test]
    fn test_path_estimate_falls_back_to_file_name() {
        let r = rec("/p/misc/IMG20200101.jpg", None);
        assert_eq!(estimate_from_path(&r).unwrap().datetime, at(2020, 1, 1, 12, 0));
        assert!(estimate_from_path(&rec("/p/misc/IMG_0001.jpg", None)).is_none());
    }

    #[test]
    fn test_hybrid_uses_visual_only_without_path_date() {
        let reference = rec("/ref/a.jpg", Some(at(2015, 5, 5, 5, 5)));
        let candidates = [MatchCandidate {
            reference: &reference,
            similarity: 0.9,
        }];

        let dated_path = rec("/p/2010-01-01/x.jpg", None);
        let e = estimate_hybrid(&dated_path, &candidates, EstimationMode::MostSimilar).unwrap();
        assert_eq!(e.source, SourceTag::FolderDate);

        let plain = rec("/p/misc/x.jpg", None);
        let e = estimate_hybrid(&plain, &candidates, EstimationMode::MostSimilar).unwrap();
        assert_eq!(e.source, SourceTag::MostSimilar);
        assert_eq!(e.datetime, at(2015, 5, 5, 5, 5));
    }

    #[test]
    fn test_write_reasons() {
        let config = FolderDateConfig::default();
        let folder = at(2020, 6, 1, 12, 0);
        assert_eq!(write_reason(None, folder, &config, now()), Some(WriteReason::NoDate));
        assert_eq!(
            write_reason(Some(at(1999, 1, 1, 0, 0)), folder, &config, now()),
            Some(WriteReason::InvalidDate)
        );
        assert_eq!(
            write_reason(Some(at(2030, 1, 1, 0, 0)), folder, &config, now()),
            Some(WriteReason::InvalidDate)
        );
        assert_eq!(
            write_reason(Some(at(2022, 1, 1, 0, 0)), folder, &config, now()),
            Some(WriteReason::Deviation)
        );
        assert_eq!(write_reason(Some(at(2020, 9, 1, 0, 0)), folder, &config, now()), None);

        let forced = FolderDateConfig {
            overwrite_existing: true,
            ..FolderDateConfig::default()
        };
        assert_eq!(
            write_reason(Some(at(2020, 9, 1, 0, 0)), folder, &forced, now()),
            Some(WriteReason::ForceOverwrite)
        );
    }

    #[test]
    fn test_folder_plan_spacing_and_skips() {
        let records = vec![
            rec("/p/2021-03-04 party/c.jpg", None),
            rec("/p/2021-03-04 party/a.jpg", None),
            rec("/p/2021-03-04 party/b.jpg", Some(at(2021, 3, 5, 9, 0))),
        ];
        let plans = plan_folder_dates(&records, &FolderDateConfig::default(), now());
        assert_eq!(plans.len(), 1);
        let plan = &plans[0];
        assert_eq!(plan.folder_date, at(2021, 3, 4, 12, 0));

        let names: Vec<String> = plan.assignments.iter().map(|a| a.record.file_name()).collect();
        assert_eq!(names, vec!["a.jpg", "b.jpg", "c.jpg"]);
        assert_eq!(plan.assignments[0].datetime, at(2021, 3, 4, 12, 0));
        assert_eq!(plan.assignments[2].datetime, at(2021, 3, 4, 12, 4));
        assert_eq!(plan.assignments[1].reason, None);
        assert_eq!(plan.to_write().count(), 2);
        assert_eq!(plan.skipped(), 1);
    }

    #[test]
    fn test_folder_date_from_first_dated_file_name() {
        let records = vec![
            rec("/p/misc/z_20190707.jpg", None),
            rec("/p/misc/IMG_0002.jpg", None),
            rec("/p/misc/m_20180101.jpg", None),
            rec("/p/undated/IMG_0001.jpg", None),
        ];
        let plans = plan_folder_dates(&records, &FolderDateConfig::default(), now());
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].folder, PathBuf::from("/p/misc"));
        assert_eq!(plans[0].folder_date, at(2018, 1, 1, 12, 0));
    }

    #[test]
    fn test_oversized_interval_skips_folder() {
        let records = vec![
            rec("/p/2021-03-04/a.jpg", None),
            rec("/p/2021-03-04/b.jpg", None),
            rec("/p/2022-01-01/c.jpg", None),
        ];
        let config = FolderDateConfig {
            interval_minutes: 1_000_000_000_000,
            ..FolderDateConfig::default()
        };
        // A single file sits at offset zero, so only the two-file folder overflows.
        let plans = plan_folder_dates(&records, &config, now());
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].folder, PathBuf::from("/p/2022-01-01"));
    }

    #[test]
    fn test_negative_interval_plans_nothing() {
        let records = vec![rec("/p/2021-03-04/a.jpg", None), rec("/p/2021-03-04/b.jpg", None)];
        let config = FolderDateConfig {
            interval_minutes: -2,
            ..FolderDateConfig::default()
        };
        assert!(plan_folder_dates(&records, &config, now()).is_empty());
    }

    #[test]
    fn test_plans_ordered_by_folder_date() {
        let records = vec![
            rec("/p/a 2022-01-01/x.jpg", None),
            rec("/p/b 2001-01-01/y.jpg", None),
        ];
        let plans = plan_folder_dates(&records, &FolderDateConfig::default(), now());
        assert_eq!(plans[0].folder_date.year(), 2001);
        assert_eq!(plans[1].folder_date.year(), 2022);
    }

    #[test]
    fn test_planned_write_skips_unchanged_gps() {
        let here = GpsCoords::new(1.0, 2.0);
        let r = rec("/p/a.jpg", None).with_gps(Some(here));
        let result = EstimationResult {
            datetime: at(2020, 1, 1, 0, 0),
            confidence: 0.85,
            source: SourceTag::FolderDate,
            gps: Some(here),
        };
        assert_eq!(PlannedWrite::from_estimate(&r, &result, true).gps, None);

        let bare = rec("/p/b.jpg", None);
        assert_eq!(PlannedWrite::from_estimate(&bare, &result, true).gps, Some(here));
    }
}
