mod commands;
mod logging;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use photodate_core::config::Config;
use photodate_core::estimate::EstimationMode;
use photodate_core::gateway::FsGateway;
use photodate_core::merge::ReviewSelection;
use photodate_core::Restorer;

/// photodate: recover lost capture dates and clean up duplicate photos
#[derive(Parser)]
#[command(name = "photodate", version, about)]
struct Cli {
    /// TOML config file (default: <config dir>/photodate/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Also write logs to a daily rolling file in this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Find exact and near-duplicate photos and resolve each cluster
    Dedupe {
        /// Directory to scan
        dir: PathBuf,
        /// keep_all, best_quality, timeline, smart_merge, delete, review, or auto
        #[arg(long, default_value = "auto")]
        policy: String,
        /// Members to keep under the review policy, e.g. "0,2" or "all"
        #[arg(long)]
        keep: Option<ReviewSelection>,
        /// Show what would happen without moving or writing anything
        #[arg(long)]
        dry_run: bool,
        /// Write a tab-separated report of kept and moved files
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Date photos from the date in their folder or file name
    FolderDates {
        /// Directory to scan
        dir: PathBuf,
        /// Replace dates that already look valid
        #[arg(long)]
        overwrite: bool,
        /// Do not copy originals aside before writing
        #[arg(long)]
        no_backup: bool,
        /// Show the plan without writing
        #[arg(long)]
        dry_run: bool,
    },
    /// Date photos from the most similar dated reference photos
    Match {
        /// Photos to date
        target: PathBuf,
        /// Photos with trusted dates
        #[arg(long)]
        reference: PathBuf,
        /// most_similar, weighted_avg, or interpolate
        #[arg(long)]
        mode: Option<EstimationMode>,
        /// Minimum combined similarity (0.0 to 1.0)
        #[arg(long)]
        threshold: Option<f64>,
        /// Ignore the perceptual hash component
        #[arg(long)]
        no_visual: bool,
        /// Ignore the color histogram component
        #[arg(long)]
        no_color: bool,
        /// Ignore the edge density component
        #[arg(long)]
        no_edge: bool,
        /// Prefer a date found in the folder or file name
        #[arg(long)]
        hybrid: bool,
        /// Also re-date targets that already have a capture date
        #[arg(long)]
        overwrite: bool,
        /// Show estimates without writing
        #[arg(long)]
        dry_run: bool,
        /// Write a tab-separated report of the estimates
        #[arg(long)]
        report: Option<PathBuf>,
    },
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("photodate").join("config.toml"))
}

fn load_config(explicit: Option<&Path>) -> Result<Config> {
    if let Some(path) = explicit {
        return Config::load(path).with_context(|| format!("reading config {}", path.display()));
    }
    match default_config_path() {
        Some(path) if path.exists() => {
            Config::load(&path).with_context(|| format!("reading config {}", path.display()))
        }
        _ => Ok(Config::default()),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_dir.as_deref())?;

    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Dedupe {
            dir,
            policy,
            keep,
            dry_run,
            report,
        } => {
            let policy = commands::dedupe::parse_policy(&policy, keep)?;
            let restorer = restorer(config);
            commands::dedupe::run(&restorer, &dir, policy, dry_run, report.as_deref())?;
        }
        Commands::FolderDates {
            dir,
            overwrite,
            no_backup,
            dry_run,
        } => {
            config.folder_dates.overwrite_existing |= overwrite;
            if no_backup {
                config.folder_dates.backup = false;
            }
            let restorer = restorer(config);
            commands::folder_dates::run(&restorer, &dir, dry_run)?;
        }
        Commands::Match {
            target,
            reference,
            mode,
            threshold,
            no_visual,
            no_color,
            no_edge,
            hybrid,
            overwrite,
            dry_run,
            report,
        } => {
            if let Some(mode) = mode {
                config.estimation.mode = mode;
            }
            if let Some(threshold) = threshold {
                anyhow::ensure!(
                    (0.0..=1.0).contains(&threshold),
                    "threshold must be between 0 and 1, got {threshold}"
                );
                config.matching.similarity_threshold = threshold;
            }
            config.matching.weights = config.matching.weights.without(no_visual, no_color, no_edge);
            let restorer = restorer(config);
            let options = commands::matching::MatchOptions {
                hybrid,
                overwrite,
                dry_run,
                report,
            };
            commands::matching::run(&restorer, &target, &reference, &options)?;
        }
    }

    Ok(())
}

fn restorer(config: Config) -> Restorer<FsGateway> {
    let gateway = FsGateway::new(config.merge.backup_dir.clone());
    Restorer::new(gateway, config)
}
