//! Durable run artifacts: row log CSV, HTML report, run index.
//!
//! The row log is append-only and flushed after every row so a crash or
//! operator interrupt loses at most the row in flight. The HTML report and
//! run index are written once, at the end of the run.

use std::collections::BTreeSet;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use minijinja::{context, Environment};

use crate::core::csvline;
use crate::core::normalize::{norm_space, sanitize_label};
use crate::core::resume::{self, ROW_LOG_COLUMNS};
use crate::core::types::{RowAction, RowOutcome, Stage, Summary};
use crate::io::retention;

const REPORT_TEMPLATE: &str = include_str!("report.html.j2");

/// Timestamp for ledger rows and the run index.
pub fn now_iso() -> String {
    Local::now().format("%Y-%m-%dT%H:%M:%S").to_string()
}

/// Filesystem-friendly timestamp for screenshot names.
pub fn now_compact() -> String {
    Local::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Where one run's artifacts live.
#[derive(Debug, Clone)]
pub struct RunPaths {
    pub label: String,
    pub day_folder: String,
    pub started_at: String,
    pub log_dir: PathBuf,
    pub screenshot_dir: PathBuf,
    pub csv_path: PathBuf,
    pub report_path: PathBuf,
    pub index_path: PathBuf,
}

/// Create the dated artifact directories for a new run and prune runs
/// beyond the retention limit. The label is sanitized and deduplicated so
/// two runs never share a ledger file.
pub fn prepare_run(
    artifacts: &Path,
    action: RowAction,
    label: Option<&str>,
    keep_runs: usize,
) -> Result<RunPaths> {
    let now = Local::now();
    let day_folder = now.format("%Y-%m-%d").to_string();
    let time_label = now.format("%H-%M-%S").to_string();

    let log_root = artifacts.join("logs");
    let screenshot_root = match action {
        RowAction::FillAndSubmit => artifacts.join("screenshots"),
        RowAction::CancelSubmit => artifacts.join("screenshots_cancel"),
    };

    let log_dir = log_root.join(&day_folder);
    let screenshot_dir = screenshot_root.join(&day_folder);
    for dir in [&log_dir, &screenshot_dir] {
        fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    }

    let base = sanitize_label(label.unwrap_or(""), &time_label);
    let command = action.command_name();
    let mut candidate = base.clone();
    let mut counter = 2u32;
    while ledger_exists(&log_dir, command, &candidate) {
        candidate = format!("{base}-{counter:02}");
        counter += 1;
    }

    // Current day is reserved: pruning must never eat the run it serves.
    for root in [
        &log_root,
        &artifacts.join("screenshots"),
        &artifacts.join("screenshots_cancel"),
    ] {
        retention::prune_runs(root, keep_runs, &day_folder)?;
    }

    let csv_path = log_dir.join(format!("log_sbr_{command}_{candidate}.csv"));
    let report_path = log_dir.join(format!("log_sbr_{command}_{candidate}.html"));
    Ok(RunPaths {
        label: candidate,
        day_folder,
        started_at: now.format("%Y-%m-%dT%H:%M:%S").to_string(),
        log_dir,
        screenshot_dir,
        csv_path,
        report_path,
        index_path: log_root.join("index.csv"),
    })
}

fn ledger_exists(log_dir: &Path, command: &str, label: &str) -> bool {
    log_dir.join(format!("log_sbr_{command}_{label}.csv")).exists()
        || log_dir.join(format!("log_sbr_{command}_{label}.html")).exists()
}

/// Append-only row log plus the end-of-run HTML report.
pub struct RunLedger {
    file: File,
    csv_path: PathBuf,
    report_path: PathBuf,
    events: Vec<RowOutcome>,
}

impl RunLedger {
    /// Create the CSV with its header row, flushed immediately.
    pub fn create(paths: &RunPaths) -> Result<Self> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&paths.csv_path)
            .with_context(|| format!("create row log {}", paths.csv_path.display()))?;
        let mut header = ROW_LOG_COLUMNS.join(",");
        header.push('\n');
        file.write_all(header.as_bytes())
            .with_context(|| format!("write header to {}", paths.csv_path.display()))?;
        file.flush()?;
        Ok(Self {
            file,
            csv_path: paths.csv_path.clone(),
            report_path: paths.report_path.clone(),
            events: Vec::new(),
        })
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }

    /// Append one terminal row record and flush it to disk.
    pub fn append(&mut self, outcome: &RowOutcome) -> Result<()> {
        let fields = vec![
            outcome.ts.clone(),
            outcome.row_index.to_string(),
            outcome.stage.as_str().to_string(),
            outcome.reason.map(|r| r.as_str().to_string()).unwrap_or_default(),
            outcome.idsbr.clone(),
            outcome.name.clone(),
            outcome.match_value.clone(),
            norm_space(&outcome.note),
            outcome
                .screenshot
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
        ];
        let mut line = csvline::join(&fields);
        line.push('\n');
        self.file
            .write_all(line.as_bytes())
            .with_context(|| format!("append to {}", self.csv_path.display()))?;
        self.file
            .flush()
            .with_context(|| format!("flush {}", self.csv_path.display()))?;
        self.events.push(outcome.clone());
        Ok(())
    }

    /// Render the HTML report next to the CSV.
    pub fn finish(&self, summary: &Summary) -> Result<()> {
        let mut env = Environment::new();
        env.add_template("report", REPORT_TEMPLATE)
            .context("compile report template")?;
        let template = env.get_template("report").context("load report template")?;

        let log_dir = self.csv_path.parent().unwrap_or_else(|| Path::new("."));
        let rows: Vec<_> = self
            .events
            .iter()
            .map(|e| {
                let screenshot = e.screenshot.as_ref().map(|p| ReportLink {
                    href: relative_href(p, log_dir),
                    name: p
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                });
                context! {
                    ts => e.ts.clone(),
                    row_index => e.row_index,
                    stage => e.stage.as_str(),
                    reason => e.reason.map(|r| r.as_str()).unwrap_or(""),
                    idsbr => e.idsbr.clone(),
                    nama => e.name.clone(),
                    match_value => e.match_value.clone(),
                    note => e.note.clone(),
                    screenshot_href => screenshot.as_ref().map(|s| s.href.clone()),
                    screenshot_name => screenshot.as_ref().map(|s| s.name.clone()),
                }
            })
            .collect();

        let csv_name = self
            .csv_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let html = template
            .render(context! {
                generated_at => now_iso(),
                ok => summary.ok,
                warn => summary.warn,
                error => summary.error,
                skipped => summary.skipped,
                csv_source => csv_name,
                rows => rows,
            })
            .context("render report template")?;
        fs::write(&self.report_path, html)
            .with_context(|| format!("write report {}", self.report_path.display()))?;
        Ok(())
    }
}

struct ReportLink {
    href: String,
    name: String,
}

fn relative_href(target: &Path, base: &Path) -> String {
    match target.strip_prefix(base) {
        Ok(rel) => rel.to_string_lossy().replace('\\', "/"),
        Err(_) => target.to_string_lossy().replace('\\', "/"),
    }
}

/// Locate the row log a `--resume` run should skip from.
///
/// Preference order: exact label match in the daily namespace, then the
/// most recently modified log of the same command there, then the most
/// recent log in any older day folder. The current run's own (empty) file
/// is never a candidate.
pub fn find_resume_source(paths: &RunPaths, action: RowAction, label: Option<&str>) -> Option<PathBuf> {
    let command = action.command_name();
    if let Some(label) = label {
        let exact = paths
            .log_dir
            .join(format!("log_sbr_{command}_{}.csv", sanitize_label(label, "")));
        if exact.exists() && exact != paths.csv_path {
            return Some(exact);
        }
    }

    if let Some(found) = latest_log(&paths.log_dir, command, &paths.csv_path) {
        return Some(found);
    }

    // Older day folders, newest first.
    let log_root = paths.log_dir.parent()?;
    let mut days: Vec<PathBuf> = fs::read_dir(log_root)
        .ok()?
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    days.sort();
    for day in days.iter().rev() {
        if day == &paths.log_dir {
            continue;
        }
        if let Some(found) = latest_log(day, command, &paths.csv_path) {
            return Some(found);
        }
    }
    None
}

fn latest_log(dir: &Path, command: &str, exclude: &Path) -> Option<PathBuf> {
    let prefix = format!("log_sbr_{command}_");
    let mut candidates: Vec<(std::time::SystemTime, PathBuf)> = fs::read_dir(dir)
        .ok()?
        .flatten()
        .map(|e| e.path())
        .filter(|p| {
            p != exclude
                && p.extension().and_then(|e| e.to_str()) == Some("csv")
                && p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(&prefix))
        })
        .filter_map(|p| {
            let mtime = p.metadata().ok()?.modified().ok()?;
            Some((mtime, p))
        })
        .collect();
    candidates.sort();
    candidates.pop().map(|(_, p)| p)
}

/// Read a prior row log and return the display indices to skip.
pub fn load_resume_rows(path: &Path, start: u32, end: u32) -> Result<BTreeSet<u32>> {
    let text =
        fs::read_to_string(path).with_context(|| format!("read resume log {}", path.display()))?;
    let records = resume::parse_row_log(&text);
    Ok(resume::eligible_rows(&records, start, end))
}

/// One line of `artifacts/logs/index.csv`.
#[derive(Debug, Clone)]
pub struct RunIndexEntry {
    pub run_label: String,
    pub started_at: String,
    pub command: String,
    pub resume: bool,
    pub dry_run: bool,
    pub skip_status: bool,
    pub summary: Summary,
    pub log_csv: String,
}

const INDEX_COLUMNS: [&str; 12] = [
    "run_label",
    "started_at",
    "command",
    "resume",
    "dry_run",
    "skip_status",
    "ok",
    "warn",
    "error",
    "skipped",
    "total",
    "log_csv",
];

/// Append one run to the cross-run index, creating it with a header when
/// missing. Existing lines are never rewritten.
pub fn append_run_index(index_path: &Path, entry: &RunIndexEntry) -> Result<()> {
    if let Some(parent) = index_path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let is_new = !index_path.exists();
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(index_path)
        .with_context(|| format!("open run index {}", index_path.display()))?;
    if is_new {
        let mut header = INDEX_COLUMNS.join(",");
        header.push('\n');
        file.write_all(header.as_bytes())?;
    }
    let fields = vec![
        entry.run_label.clone(),
        entry.started_at.clone(),
        entry.command.clone(),
        entry.resume.to_string(),
        entry.dry_run.to_string(),
        entry.skip_status.to_string(),
        entry.summary.ok.to_string(),
        entry.summary.warn.to_string(),
        entry.summary.error.to_string(),
        entry.summary.skipped.to_string(),
        entry.summary.total().to_string(),
        entry.log_csv.clone(),
    ];
    let mut line = csvline::join(&fields);
    line.push('\n');
    file.write_all(line.as_bytes())
        .with_context(|| format!("append to {}", index_path.display()))?;
    file.flush()?;
    Ok(())
}

/// Screenshot destination for one row terminal.
pub fn screenshot_path(dir: &Path, row_index: u32, stage: Stage) -> PathBuf {
    dir.join(format!(
        "{}_row{row_index:04}_{}.png",
        now_compact(),
        stage.as_str()
    ))
}
