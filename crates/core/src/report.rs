//! Tab-separated exports of estimates and merge results.

use std::fmt;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;

use crate::domain::{ClusterKind, DuplicateCluster, EstimationResult, GpsCoords, PhotoRecord, SourceTag};
use crate::error::Result;

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq)]
pub struct EstimateRow {
    pub path: PathBuf,
    pub datetime: NaiveDateTime,
    pub confidence: f64,
    pub source: SourceTag,
    pub gps: Option<GpsCoords>,
}

impl EstimateRow {
    pub fn new(path: impl Into<PathBuf>, result: &EstimationResult) -> Self {
        Self {
            path: path.into(),
            datetime: result.datetime,
            confidence: result.confidence,
            source: result.source,
            gps: result.gps,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeAction {
    Kept,
    BackedUp,
}

impl fmt::Display for MergeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeAction::Kept => f.write_str("kept"),
            MergeAction::BackedUp => f.write_str("backed_up"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeRow {
    pub cluster: String,
    pub kind: ClusterKind,
    pub action: MergeAction,
    pub path: PathBuf,
}

/// One row per member of `cluster`, kept members first.
pub fn merge_rows(
    cluster: &DuplicateCluster<'_>,
    kept: &[&PhotoRecord],
    backed_up: &[&PhotoRecord],
) -> Vec<MergeRow> {
    let row = |action, record: &&PhotoRecord| MergeRow {
        cluster: cluster.key.clone(),
        kind: cluster.kind,
        action,
        path: record.path.clone(),
    };
    kept.iter()
        .map(|r| row(MergeAction::Kept, r))
        .chain(backed_up.iter().map(|r| row(MergeAction::BackedUp, r)))
        .collect()
}

fn tsv_writer<W: Write>(out: W) -> csv::Writer<W> {
    csv::WriterBuilder::new().delimiter(b'\t').from_writer(out)
}

pub fn write_estimates<W: Write>(out: W, rows: &[EstimateRow]) -> Result<()> {
    let mut wtr = tsv_writer(out);
    wtr.write_record(["path", "datetime", "confidence", "source", "latitude", "longitude"])?;
    for row in rows {
        let (lat, lon) = match row.gps {
            Some(g) => (format!("{:.6}", g.lat), format!("{:.6}", g.lon)),
            None => (String::new(), String::new()),
        };
        wtr.write_record([
            row.path.to_string_lossy().to_string(),
            row.datetime.format(DATETIME_FORMAT).to_string(),
            format!("{:.3}", row.confidence),
            row.source.to_string(),
            lat,
            lon,
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_merge_report<W: Write>(out: W, rows: &[MergeRow]) -> Result<()> {
    let mut wtr = tsv_writer(out);
    wtr.write_record(["cluster", "kind", "action", "path"])?;
    for row in rows {
        wtr.write_record([
            row.cluster.clone(),
            row.kind.to_string(),
            row.action.to_string(),
            row.path.to_string_lossy().to_string(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn save_estimates(path: &Path, rows: &[EstimateRow]) -> Result<()> {
    write_estimates(File::create(path)?, rows)
}

pub fn save_merge_report(path: &Path, rows: &[MergeRow]) -> Result<()> {
    write_merge_report(File::create(path)?, rows)
}
