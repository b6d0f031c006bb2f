pub mod dedupe;
pub mod folder_dates;
pub mod matching;

use indicatif::{ProgressBar, ProgressStyle};
use photodate_core::domain::BatchReport;
use photodate_core::Progress;

pub(crate) fn progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .expect("progress template is valid")
            .progress_chars("=>-"),
    );
    pb
}

/// Feed core progress events into `pb`.
pub(crate) fn track(pb: &ProgressBar, progress: Progress) {
    match progress {
        Progress::PhaseStart { phase, total } => {
            pb.reset();
            pb.set_length(total as u64);
            pb.set_message(format!("{phase}..."));
        }
        Progress::ItemDone { path } => {
            pb.inc(1);
            if let Some(name) = path.file_name() {
                pb.set_message(name.to_string_lossy().to_string());
            }
        }
        Progress::PhaseComplete { phase } => {
            pb.finish_with_message(format!("{phase} done"));
        }
    }
}

pub(crate) fn print_failures(report: &BatchReport) {
    for failure in &report.failures {
        eprintln!("  failed: {} ({})", failure.path.display(), failure.reason);
    }
}

pub(crate) fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    match bytes {
        b if b >= GB => format!("{:.1} GB", b as f64 / GB as f64),
        b if b >= MB => format!("{:.1} MB", b as f64 / MB as f64),
        b if b >= KB => format!("{:.1} KB", b as f64 / KB as f64),
        b => format!("{} B", b),
    }
}
