//! yieldlab - Terminal Entry Point
//!
//! Starts one run right away, then treats every line on stdin as another
//! tap. Taps that arrive while a run is in flight are ignored. Exits once
//! stdin is closed and the last started run has finished.
//!
//! `--once` skips stdin and exits after the first run.
//! `YIELDLAB_WORK_SIZE` and `YIELDLAB_CHECK` override the defaults;
//! `RUST_LOG` controls diagnostics on stderr.

mod terminal;

use std::rc::Rc;

use tracing_subscriber::EnvFilter;
use yieldlab_sched::{Config, LabError, MainContext, RunReport, TaskDriver};

use terminal::{TerminalDisplay, stdin_taps};

/// Totals over every finished run
#[derive(Debug, Default)]
struct Summary {
    runs: usize,
    aborted: usize,
    mismatches: usize,
    fatal: Option<LabError>,
}

impl Summary {
    fn record(&mut self, report: RunReport) {
        self.runs += 1;
        self.mismatches += report.mismatches().len();
        if !report.completed() {
            self.aborted += 1;
        }
        if self.fatal.is_none() {
            self.fatal = report.fatal;
        }
    }
}

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let once = std::env::args().skip(1).any(|arg| arg == "--once");
    let config = Config::from_env()?;
    tracing::info!(
        version = yieldlab_sched::VERSION,
        size = %config.work_size,
        check = config.check_classification,
        "starting yieldlab"
    );

    let main = MainContext::new();
    let terminal = Rc::new(TerminalDisplay::new());
    let driver = TaskDriver::new(main.clone(), terminal.clone(), config);

    let summary = main.block_on(async {
        let mut summary = Summary::default();
        // Only one run is ever in flight, so only the latest task is kept.
        let mut current = driver.trigger();

        if !once {
            let taps = stdin_taps();
            while taps.recv().await.is_ok() {
                if let Some(run) = driver.trigger() {
                    if let Some(previous) = current.replace(run) {
                        summary.record(previous.await);
                    }
                }
            }
        }

        if let Some(run) = current {
            summary.record(run.await);
        }
        summary
    });

    let printed = terminal.lines();
    tracing::info!(
        runs = summary.runs,
        lines = printed,
        aborted = summary.aborted,
        mismatches = summary.mismatches,
        "done"
    );

    if let Some(fatal) = summary.fatal {
        anyhow::bail!("run aborted: {fatal}");
    }
    Ok(())
}
