//! End-to-end run lifecycle over a scripted browser double: ledger
//! contents, stop-on-error, dry runs, duplicate handling, and resume.

use std::collections::BTreeSet;
use std::time::Duration;

use pretty_assertions::assert_eq;

use sbr_runner::core::retry::RetryPolicy;
use sbr_runner::core::types::{MatchBy, RowAction, RowContext};
use sbr_runner::engine::EngineSettings;
use sbr_runner::io::config::{ProfileDefaults, RunConfig, RunOverrides};
use sbr_runner::io::driver::{ActionKind, ActionOutcome, DriverError};
use sbr_runner::io::ledger::{self, prepare_run, RunLedger, RunPaths};
use sbr_runner::run::{run_rows, RunStop};
use sbr_runner::test_support::{row, row_with_field, Call, ScriptedDriver};

fn config() -> RunConfig {
    RunConfig::resolve(RunOverrides::default(), &ProfileDefaults::default()).expect("config")
}

fn settings(paths: &RunPaths, action: RowAction) -> EngineSettings {
    EngineSettings {
        match_by: MatchBy::Index,
        action,
        dry_run: false,
        skip_status: false,
        screenshot_on_ok: false,
        screenshot_dir: paths.screenshot_dir.clone(),
        settle: Duration::ZERO,
        retry: RetryPolicy::immediate(2),
    }
}

fn three_rows() -> Vec<RowContext> {
    vec![
        row_with_field(row(1, "101", "Toko Satu", "Aktif"), "website", "https://a.id"),
        row(2, "102", "Toko Dua", "Aktif"),
        row(3, "103", "Toko Tiga", "Aktif"),
    ]
}

#[test]
fn failed_row_lands_in_ledger_with_screenshot() {
    let temp = tempfile::tempdir().expect("tempdir");
    let paths = prepare_run(temp.path(), RowAction::FillAndSubmit, None, 10).expect("prepare");
    let mut run_ledger = RunLedger::create(&paths).expect("ledger");

    let mut driver = ScriptedDriver::new();
    driver.push_open(Ok(sbr_runner::io::driver::FormState::Editable));
    driver.push_open(Err(DriverError::NotFound("no match in table".to_string())));

    let (summary, stop) = run_rows(
        &mut driver,
        &three_rows(),
        &BTreeSet::new(),
        &mut run_ledger,
        &settings(&paths, RowAction::FillAndSubmit),
        &config(),
        |_| {},
    )
    .expect("run");

    assert_eq!(stop, RunStop::Completed);
    assert_eq!(summary.ok, 2);
    assert_eq!(summary.error, 1);

    let text = std::fs::read_to_string(&paths.csv_path).expect("read log");
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 4);
    assert!(lines[0].starts_with("ts,row_index,stage"));
    assert!(text.contains("ROW_NOT_FOUND"));

    // The error row carries a screenshot path, and the file is real.
    let error_line = lines.iter().find(|l| l.contains("ERROR")).expect("error row");
    let shot = error_line.rsplit(',').next().expect("screenshot cell");
    assert!(shot.ends_with(".png"));
    assert!(std::path::Path::new(shot).exists());
}

#[test]
fn stop_on_error_leaves_later_rows_untouched() {
    let temp = tempfile::tempdir().expect("tempdir");
    let paths = prepare_run(temp.path(), RowAction::FillAndSubmit, None, 10).expect("prepare");
    let mut run_ledger = RunLedger::create(&paths).expect("ledger");

    let mut driver = ScriptedDriver::new();
    driver.push_open(Ok(sbr_runner::io::driver::FormState::Editable));
    driver.push_open(Err(DriverError::NotFound("no match in table".to_string())));

    let mut config = config();
    config.stop_on_error = true;

    let (summary, stop) = run_rows(
        &mut driver,
        &three_rows(),
        &BTreeSet::new(),
        &mut run_ledger,
        &settings(&paths, RowAction::FillAndSubmit),
        &config,
        |_| {},
    )
    .expect("run");

    assert_eq!(stop, RunStop::HaltedOnError);
    assert_eq!(summary.ok, 1);
    assert_eq!(summary.error, 1);

    // Row 3 was never opened.
    let opens = driver
        .calls
        .iter()
        .filter(|c| matches!(c, Call::OpenForm(_)))
        .count();
    assert_eq!(opens, 2);
    let text = std::fs::read_to_string(&paths.csv_path).expect("read log");
    assert_eq!(text.lines().count(), 3);
}

#[test]
fn dry_run_opens_every_form_and_writes_nothing() {
    let temp = tempfile::tempdir().expect("tempdir");
    let paths = prepare_run(temp.path(), RowAction::FillAndSubmit, None, 10).expect("prepare");
    let mut run_ledger = RunLedger::create(&paths).expect("ledger");

    let mut driver = ScriptedDriver::new();
    let mut settings = settings(&paths, RowAction::FillAndSubmit);
    settings.dry_run = true;

    let (summary, _) = run_rows(
        &mut driver,
        &three_rows(),
        &BTreeSet::new(),
        &mut run_ledger,
        &settings,
        &config(),
        |_| {},
    )
    .expect("run");

    // Dry-run terminals count as ok.
    assert_eq!(summary.ok, 3);
    assert_eq!(summary.error, 0);
    assert!(driver.written_fields().is_empty());
    assert!(driver.invoked().is_empty());
    let opens = driver
        .calls
        .iter()
        .filter(|c| matches!(c, Call::OpenForm(_)))
        .count();
    assert_eq!(opens, 3);

    let text = std::fs::read_to_string(&paths.csv_path).expect("read log");
    assert_eq!(text.matches("DRY_RUN").count(), 3);
}

#[test]
fn duplicate_rows_link_before_submit_and_mismatch_is_fatal_for_the_row() {
    let temp = tempfile::tempdir().expect("tempdir");
    let paths = prepare_run(temp.path(), RowAction::FillAndSubmit, None, 10).expect("prepare");
    let mut run_ledger = RunLedger::create(&paths).expect("ledger");

    let rows = vec![
        row_with_field(row(1, "101", "Toko Satu", "Duplikat"), "idsbr_master", "999"),
        row_with_field(row(2, "102", "Toko Dua", "Duplikat"), "idsbr_master", "888"),
    ];
    let mut driver = ScriptedDriver::new();
    // Row 1 links cleanly; row 2's master IDSBR is rejected by the check.
    driver.push_invoke(ActionKind::CheckDuplicate, Ok(ActionOutcome::Completed));
    driver.push_invoke(
        ActionKind::CheckDuplicate,
        Ok(ActionOutcome::Rejected("IDSBR tidak ditemukan".to_string())),
    );

    let (summary, _) = run_rows(
        &mut driver,
        &rows,
        &BTreeSet::new(),
        &mut run_ledger,
        &settings(&paths, RowAction::FillAndSubmit),
        &config(),
        |_| {},
    )
    .expect("run");

    assert_eq!(summary.ok, 1);
    assert_eq!(summary.error, 1);

    // Row 1: check, accept, then the submit pair. Row 2 stops at the check.
    assert_eq!(
        driver.invoked(),
        vec![
            ActionKind::CheckDuplicate,
            ActionKind::AcceptDuplicate,
            ActionKind::SubmitFinal,
            ActionKind::ConfirmSubmit,
            ActionKind::CheckDuplicate,
        ]
    );
    let text = std::fs::read_to_string(&paths.csv_path).expect("read log");
    assert!(text.contains("DUPLICATE_CHECK_MISMATCH"));
    assert!(text.contains("IDSBR tidak ditemukan"));
}

#[test]
fn resume_skips_rows_already_ok_in_the_previous_log() {
    let temp = tempfile::tempdir().expect("tempdir");

    // First run: row 2 fails, rows 1 and 3 succeed.
    let first = prepare_run(temp.path(), RowAction::FillAndSubmit, None, 10).expect("prepare");
    let mut first_ledger = RunLedger::create(&first).expect("ledger");
    let mut driver = ScriptedDriver::new();
    driver.push_open(Ok(sbr_runner::io::driver::FormState::Editable));
    driver.push_open(Err(DriverError::NotFound("no match in table".to_string())));
    run_rows(
        &mut driver,
        &three_rows(),
        &BTreeSet::new(),
        &mut first_ledger,
        &settings(&first, RowAction::FillAndSubmit),
        &config(),
        |_| {},
    )
    .expect("first run");

    // Second run discovers the first log and skips its OK rows.
    let second = prepare_run(temp.path(), RowAction::FillAndSubmit, None, 10).expect("prepare");
    let source = ledger::find_resume_source(&second, RowAction::FillAndSubmit, None)
        .expect("resume source");
    assert_eq!(source, first.csv_path);
    let skip = ledger::load_resume_rows(&source, 1, 3).expect("load resume rows");
    assert_eq!(skip.iter().copied().collect::<Vec<_>>(), vec![1, 3]);

    let mut second_ledger = RunLedger::create(&second).expect("ledger");
    let mut retry_driver = ScriptedDriver::new();
    let (summary, stop) = run_rows(
        &mut retry_driver,
        &three_rows(),
        &skip,
        &mut second_ledger,
        &settings(&second, RowAction::FillAndSubmit),
        &config(),
        |_| {},
    )
    .expect("second run");

    assert_eq!(stop, RunStop::Completed);
    assert_eq!(summary.ok, 1);
    assert_eq!(summary.skipped, 2);
    // Only row 2 was attempted this time.
    let opens = retry_driver
        .calls
        .iter()
        .filter(|c| matches!(c, Call::OpenForm(_)))
        .count();
    assert_eq!(opens, 1);
    let text = std::fs::read_to_string(&second.csv_path).expect("read log");
    assert_eq!(text.lines().count(), 2);
}

#[test]
fn cancel_run_uses_its_own_screenshot_namespace() {
    let temp = tempfile::tempdir().expect("tempdir");
    let paths = prepare_run(temp.path(), RowAction::CancelSubmit, None, 10).expect("prepare");
    assert!(paths
        .screenshot_dir
        .starts_with(temp.path().join("screenshots_cancel")));
    assert!(paths
        .csv_path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with("log_sbr_cancel_")));

    let mut run_ledger = RunLedger::create(&paths).expect("ledger");
    let mut driver = ScriptedDriver::new();
    driver.push_open(Ok(sbr_runner::io::driver::FormState::Final));
    let rows = vec![row(1, "101", "Toko Satu", "")];

    let (summary, _) = run_rows(
        &mut driver,
        &rows,
        &BTreeSet::new(),
        &mut run_ledger,
        &settings(&paths, RowAction::CancelSubmit),
        &config(),
        |_| {},
    )
    .expect("run");

    assert_eq!(summary.ok, 1);
    assert_eq!(
        driver.invoked(),
        vec![ActionKind::CancelSubmit, ActionKind::ConfirmCancel]
    );
}
