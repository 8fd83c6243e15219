//! CLI entry point for the SBR row automation runner.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};

use sbr_runner::core::types::{MatchBy, RowAction};
use sbr_runner::io::config::{self, RunConfig, RunOverrides};
use sbr_runner::{exit_codes, logging, run};

#[derive(Parser)]
#[command(
    name = "sbr-runner",
    version,
    about = "Spreadsheet-driven row automation for the SBR directory UI"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fill and submit the edit form for each spreadsheet row.
    Fill(CommonArgs),
    /// Cancel prior submissions for each spreadsheet row.
    Cancel(CommonArgs),
}

#[derive(Args)]
struct CommonArgs {
    /// Spreadsheet path (.xlsx). Omit to auto-discover a single file in
    /// the working directory or its data/ folder.
    #[arg(long)]
    excel: Option<PathBuf>,

    /// Zero-based sheet index.
    #[arg(long)]
    sheet: Option<usize>,

    /// How rows are matched against the directory table.
    #[arg(long, value_enum)]
    match_by: Option<MatchBy>,

    /// First row to process (1-based, inclusive).
    #[arg(long)]
    start: Option<u32>,

    /// Last row to process (1-based, inclusive).
    #[arg(long)]
    end: Option<u32>,

    /// Halt the run at the first ERROR terminal.
    #[arg(long)]
    stop_on_error: bool,

    /// Skip rows already OK in a prior run's row log.
    #[arg(long)]
    resume: bool,

    /// Explicit row log to resume from (overrides auto-discovery).
    #[arg(long, value_name = "CSV")]
    resume_from: Option<PathBuf>,

    /// Locate and open each row without writing or submitting anything.
    #[arg(long)]
    dry_run: bool,

    /// Do not drive the status option from the status column.
    #[arg(long)]
    skip_status: bool,

    /// JSON file with status -> option id overrides.
    #[arg(long, value_name = "JSON")]
    status_map: Option<PathBuf>,

    /// JSON file with selector overrides ("fields" / "select2" groups).
    #[arg(long, value_name = "JSON")]
    selectors: Option<PathBuf>,

    /// JSON profile supplying defaults for any unset option.
    #[arg(long, value_name = "JSON")]
    profile: Option<PathBuf>,

    /// DevTools endpoint of the already-authenticated browser.
    #[arg(long)]
    endpoint: Option<String>,

    /// Upper bound for UI waits, in milliseconds.
    #[arg(long, value_name = "MS")]
    max_wait: Option<u64>,

    /// Pause after each mutation, in milliseconds.
    #[arg(long, value_name = "MS")]
    settle: Option<u64>,

    /// Label for this run's artifacts (defaults to the start time).
    #[arg(long)]
    run_label: Option<String>,

    /// Dated artifact folders to retain per artifact kind.
    #[arg(long, value_name = "N")]
    keep_days: Option<usize>,

    /// Also capture screenshots for OK and DRY_RUN terminals.
    #[arg(long)]
    screenshot_on_ok: bool,

    /// Root directory for logs and screenshots.
    #[arg(long, value_name = "DIR")]
    artifacts: Option<PathBuf>,

    /// Webhook URL receiving a JSON summary when the run finishes.
    #[arg(long, value_name = "URL")]
    notify_url: Option<String>,
}

impl CommonArgs {
    fn into_config(self) -> anyhow::Result<RunConfig> {
        let profile = config::load_profile(self.profile.as_deref())?;
        let overrides = RunOverrides {
            excel: self.excel,
            sheet: self.sheet,
            match_by: self.match_by,
            start: self.start,
            end: self.end,
            stop_on_error: self.stop_on_error,
            resume: self.resume,
            resume_from: self.resume_from,
            dry_run: self.dry_run,
            skip_status: self.skip_status,
            status_map: self.status_map,
            selectors: self.selectors,
            endpoint: self.endpoint,
            max_wait_ms: self.max_wait,
            settle_ms: self.settle,
            run_label: self.run_label,
            keep_days: self.keep_days,
            screenshot_on_ok: self.screenshot_on_ok,
            artifacts: self.artifacts,
            notify_url: self.notify_url,
        };
        RunConfig::resolve(overrides, &profile)
    }
}

fn main() -> ExitCode {
    logging::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Fill(args) => args
            .into_config()
            .and_then(|config| run::execute(&config, RowAction::FillAndSubmit)),
        Command::Cancel(args) => args
            .into_config()
            .and_then(|config| run::execute(&config, RowAction::CancelSubmit)),
    };

    match result {
        // Row-level failures live in the ledger; the process itself
        // succeeded.
        Ok(_) => ExitCode::from(exit_codes::OK as u8),
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::from(exit_codes::PRECONDITION as u8)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_fill_defaults() {
        let cli = Cli::parse_from(["sbr-runner", "fill"]);
        let Command::Fill(args) = cli.command else {
            panic!("expected fill");
        };
        assert!(!args.dry_run);
        assert!(!args.stop_on_error);
        assert_eq!(args.match_by, None);
    }

    #[test]
    fn parse_fill_with_options() {
        let cli = Cli::parse_from([
            "sbr-runner",
            "fill",
            "--excel",
            "rows.xlsx",
            "--match-by",
            "idsbr",
            "--start",
            "5",
            "--end",
            "20",
            "--dry-run",
            "--stop-on-error",
            "--run-label",
            "batch one",
        ]);
        let Command::Fill(args) = cli.command else {
            panic!("expected fill");
        };
        assert_eq!(args.excel, Some(PathBuf::from("rows.xlsx")));
        assert_eq!(args.match_by, Some(MatchBy::Idsbr));
        assert_eq!(args.start, Some(5));
        assert_eq!(args.end, Some(20));
        assert!(args.dry_run);
        assert!(args.stop_on_error);
        assert_eq!(args.run_label.as_deref(), Some("batch one"));
    }

    #[test]
    fn parse_cancel_subcommand() {
        let cli = Cli::parse_from(["sbr-runner", "cancel", "--resume"]);
        let Command::Cancel(args) = cli.command else {
            panic!("expected cancel");
        };
        assert!(args.resume);
    }

    #[test]
    fn args_resolve_into_config() {
        let cli = Cli::parse_from(["sbr-runner", "fill", "--endpoint", "http://x:9222"]);
        let Command::Fill(args) = cli.command else {
            panic!("expected fill");
        };
        let config = args.into_config().expect("config");
        assert_eq!(config.endpoint, "http://x:9222");
        assert_eq!(config.match_by, MatchBy::Index);
    }
}
