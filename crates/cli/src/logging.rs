//! Tracing setup for the CLI.

use std::path::Path;
use std::sync::OnceLock;

use anyhow::Result;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Install the global subscriber.
///
/// The level comes from `PHOTODATE_LOG` (for example `PHOTODATE_LOG=debug`),
/// defaulting to `info`. Events go to stderr, and also to a daily rolling
/// `photodate.log` in `log_dir` when one is given.
pub fn init(log_dir: Option<&Path>) -> Result<()> {
    let env_filter = EnvFilter::try_from_env("PHOTODATE_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, "photodate.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            // Dropping the guard stops the writer thread.
            let _ = FILE_GUARD.set(guard);
            Some(fmt::layer().with_writer(writer).with_ansi(false))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(file_layer)
        .init();

    if let Some(dir) = log_dir {
        tracing::debug!("logging to {}", dir.display());
    }
    Ok(())
}
