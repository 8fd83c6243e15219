//! Run coordination: sequential row iteration, resume, ledger, summary.

use std::collections::BTreeSet;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::core::types::{RowAction, RowContext, RowOutcome, Stage, Summary};
use crate::engine::{process_row, EngineSettings};
use crate::io::config::RunConfig;
use crate::io::driver::{self, Driver};
use crate::io::ledger::{self, RunIndexEntry, RunLedger};
use crate::io::notify::{Notifier, RunReport, WebhookNotifier};
use crate::io::sheet;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStop {
    /// Every row in range reached a terminal (or was skipped by resume).
    Completed,
    /// `--stop-on-error` halted the run at the first ERROR terminal.
    HaltedOnError,
}

/// Process rows strictly in order, appending each terminal to the ledger
/// before moving on.
///
/// Rows in `skip` were OK in a prior run; they are counted as skipped and
/// not re-logged, so this run's ledger holds exactly the rows it
/// attempted.
pub fn run_rows(
    driver: &mut dyn Driver,
    rows: &[RowContext],
    skip: &BTreeSet<u32>,
    ledger: &mut RunLedger,
    settings: &EngineSettings,
    config: &RunConfig,
    mut on_row: impl FnMut(&RowOutcome),
) -> Result<(Summary, RunStop)> {
    let mut summary = Summary::default();
    for row in rows {
        if skip.contains(&row.row_index) {
            debug!(row = row.row_index, "skipping row finished in a prior run");
            summary.skipped += 1;
            continue;
        }

        let outcome = process_row(
            driver,
            row,
            &config.selectors,
            &config.status_mapper,
            settings,
        );
        ledger.append(&outcome)?;
        summary.record(outcome.stage);
        on_row(&outcome);

        if config.stop_on_error && outcome.stage == Stage::Error {
            info!(row = row.row_index, "halting run on first error");
            return Ok((summary, RunStop::HaltedOnError));
        }
    }
    Ok((summary, RunStop::Completed))
}

/// Full command wiring: preconditions, browser attach, iteration,
/// report, index, notification.
pub fn execute(config: &RunConfig, action: RowAction) -> Result<Summary> {
    // Fatal preconditions come first, before any artifact is created.
    let cwd = std::env::current_dir().context("resolve working directory")?;
    let excel = sheet::resolve_excel(config.excel.as_deref(), &cwd)?;
    let (rows, start_display, end_display) = sheet::load_rows(
        &excel,
        config.sheet,
        config.match_by,
        config.start,
        config.end,
    )?;
    let mut driver = driver::attach(&config.endpoint, config.max_wait)?;

    let paths = ledger::prepare_run(
        &config.artifacts,
        action,
        config.run_label.as_deref(),
        config.keep_runs,
    )?;
    let mut run_ledger = RunLedger::create(&paths)?;

    let skip = if config.resume {
        let source = config
            .resume_from
            .clone()
            .or_else(|| ledger::find_resume_source(&paths, action, config.run_label.as_deref()));
        match source {
            Some(source) => {
                let eligible =
                    ledger::load_resume_rows(&source, start_display, end_display)?;
                println!(
                    "[Resume] skipping {} row(s) already OK in {}",
                    eligible.len(),
                    source.display()
                );
                eligible
            }
            None => {
                println!("[Resume] no prior row log found; processing every row");
                BTreeSet::new()
            }
        }
    } else {
        BTreeSet::new()
    };

    let settings = EngineSettings {
        match_by: config.match_by,
        action,
        dry_run: config.dry_run,
        skip_status: config.skip_status,
        screenshot_on_ok: config.screenshot_on_ok,
        screenshot_dir: paths.screenshot_dir.clone(),
        settle: config.settle,
        retry: config.retry,
    };

    println!(
        "Run {} ({}): rows {start_display}..={end_display} from {}",
        paths.label,
        action.command_name(),
        excel.display()
    );
    let (summary, stop) = run_rows(
        driver.as_mut(),
        &rows,
        &skip,
        &mut run_ledger,
        &settings,
        config,
        |outcome| {
            println!(
                "  row {:>4} {:<8} {}{}",
                outcome.row_index,
                outcome.stage.as_str(),
                outcome.reason.map(|r| r.as_str()).unwrap_or(""),
                if outcome.note.is_empty() {
                    String::new()
                } else {
                    format!(" ({})", outcome.note)
                }
            );
        },
    )?;

    run_ledger.finish(&summary)?;
    ledger::append_run_index(
        &paths.index_path,
        &RunIndexEntry {
            run_label: paths.label.clone(),
            started_at: paths.started_at.clone(),
            command: action.command_name().to_string(),
            resume: config.resume,
            dry_run: config.dry_run,
            skip_status: config.skip_status,
            summary,
            log_csv: run_ledger.csv_path().display().to_string(),
        },
    )?;

    if let Some(url) = &config.notify_url {
        let report = RunReport {
            run_label: paths.label.clone(),
            command: action.command_name().to_string(),
            started_at: paths.started_at.clone(),
            finished_at: ledger::now_iso(),
            dry_run: config.dry_run,
            summary,
            log_csv: run_ledger.csv_path().display().to_string(),
        };
        match WebhookNotifier::new(url) {
            Ok(notifier) => {
                if let Err(err) = notifier.notify(&report) {
                    tracing::warn!(error = %err, "run notification failed");
                }
            }
            Err(err) => tracing::warn!(error = %err, "could not build webhook client"),
        }
    }

    if stop == RunStop::HaltedOnError {
        println!("Halted on first error (--stop-on-error).");
    }
    println!(
        "Done: ok={} warn={} error={} skipped={} (log: {})",
        summary.ok,
        summary.warn,
        summary.error,
        summary.skipped,
        run_ledger.csv_path().display()
    );
    Ok(summary)
}
