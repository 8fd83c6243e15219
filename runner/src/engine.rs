//! Per-row state machine: match, open, fill, confirm, terminal.
//!
//! A row always reaches exactly one terminal. Driver failures never escape
//! as errors; they are mapped to WARN/ERROR terminals with a reason code,
//! and the coordinator decides whether the run continues. Field values are
//! written but never cleared: an empty spreadsheet cell means "leave the
//! form value alone".

use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, warn};

use crate::core::retry::RetryPolicy;
use crate::core::status_map::{ResolvedStatus, StatusMapper};
use crate::core::types::{MatchBy, ReasonCode, RowAction, RowContext, RowOutcome, Stage};
use crate::io::config::SelectorMap;
use crate::io::driver::{
    ActionKind, ActionOutcome, Driver, DriverError, FieldLocator, FormState, MatchTarget,
};
use crate::io::ledger;

/// Per-run knobs the engine needs for every row.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub match_by: MatchBy,
    pub action: RowAction,
    pub dry_run: bool,
    pub skip_status: bool,
    pub screenshot_on_ok: bool,
    pub screenshot_dir: PathBuf,
    pub settle: Duration,
    pub retry: RetryPolicy,
}

/// Field names the generic fill loop must not touch: status is driven via
/// its option id, the master IDSBR belongs to the duplicate flow.
const RESERVED_FIELDS: [&str; 2] = ["keberadaan_usaha", "idsbr_master"];

/// Process one row to its terminal. Infallible by design; every failure
/// mode is a terminal, not an `Err`.
pub fn process_row(
    driver: &mut dyn Driver,
    row: &RowContext,
    selectors: &SelectorMap,
    status_mapper: &StatusMapper,
    settings: &EngineSettings,
) -> RowOutcome {
    RowRun {
        driver,
        row,
        selectors,
        status_mapper,
        settings,
        match_value: String::new(),
        notes: Vec::new(),
        degrade: None,
        form_open: false,
    }
    .run()
}

struct RowRun<'a> {
    driver: &'a mut dyn Driver,
    row: &'a RowContext,
    selectors: &'a SelectorMap,
    status_mapper: &'a StatusMapper,
    settings: &'a EngineSettings,
    match_value: String,
    notes: Vec<String>,
    degrade: Option<ReasonCode>,
    form_open: bool,
}

impl RowRun<'_> {
    fn run(mut self) -> RowOutcome {
        // Matching: decide how to find the record before touching the UI.
        let Some(match_value) = self.row.match_value(self.settings.match_by) else {
            self.note("row has no usable match value for the chosen strategy");
            return self.terminal(Stage::Error, Some(ReasonCode::EmptyMatchValue));
        };
        self.match_value = match_value;

        // Status resolution happens up front so a bad status never mutates
        // the form.
        let status = match self.resolve_status() {
            Ok(status) => status,
            Err(outcome) => return outcome,
        };

        // Opening.
        let target = MatchTarget::new(self.settings.match_by, &self.match_value);
        let state = match self.retry(|driver| driver.open_form(&target)) {
            Ok(state) => {
                self.form_open = true;
                state
            }
            Err(err) => return self.open_failed(err),
        };

        if state == FormState::Final && self.settings.action == RowAction::FillAndSubmit {
            self.note("form is already finalized; nothing to fill");
            return self.terminal(Stage::Warn, Some(ReasonCode::AlreadyFinal));
        }

        if self.settings.dry_run {
            self.note("dry run: record located and form opened; no changes applied");
            return self.terminal(Stage::DryRun, None);
        }

        match self.settings.action {
            RowAction::FillAndSubmit => self.fill_and_submit(status),
            RowAction::CancelSubmit => self.cancel_submit(state),
        }
    }

    // Filling then Confirming for the fill command.
    fn fill_and_submit(mut self, status: Option<ResolvedStatus>) -> RowOutcome {
        if let Some(status) = &status {
            let locator = FieldLocator::StatusOption(status.option_id.clone());
            match self.retry(|driver| driver.write_field("keberadaan_usaha", &locator, "1")) {
                Ok(()) => self.settle(),
                Err(DriverError::Session(text)) => {
                    self.note(&text);
                    return self.terminal(Stage::Error, Some(ReasonCode::SessionLost));
                }
                Err(err) => {
                    self.note(&format!("status option {}: {err}", status.option_id));
                    self.degrade(ReasonCode::StatusSelectFailed);
                }
            }

            if status.is_duplicate() && self.degrade != Some(ReasonCode::StatusSelectFailed) {
                if let Err(outcome) = self.duplicate_flow() {
                    return outcome;
                }
            }
        }

        self.write_fields();

        // Confirming.
        match self.retry(|driver| driver.invoke(ActionKind::SubmitFinal)) {
            Ok(ActionOutcome::Completed) => {}
            Ok(ActionOutcome::Rejected(message)) => {
                self.note(&message);
                return self.terminal(Stage::Error, Some(ReasonCode::SubmitErrorFill));
            }
            Ok(ActionOutcome::FormFinal) => {
                self.note("form reported final at submit time");
                return self.terminal(Stage::Error, Some(ReasonCode::SubmitErrorLocked));
            }
            Err(err) => {
                let reason = match &err {
                    DriverError::Session(_) => ReasonCode::SessionLost,
                    DriverError::Locked => ReasonCode::SubmitErrorLocked,
                    _ => ReasonCode::SubmitErrorTimeout,
                };
                self.note(&err.to_string());
                return self.terminal(Stage::Error, Some(reason));
            }
        }
        self.settle();

        match self.retry(|driver| driver.invoke(ActionKind::ConfirmSubmit)) {
            Ok(ActionOutcome::Completed) => {}
            Ok(ActionOutcome::Rejected(message)) => {
                self.note(&message);
                return self.terminal(Stage::Error, Some(ReasonCode::SubmitNoSuccessSignal));
            }
            Ok(ActionOutcome::FormFinal) | Err(_) => {
                self.note("confirmation dialog did not complete");
                return self.terminal(Stage::Error, Some(ReasonCode::SubmitNoConfirm));
            }
        }

        match self.degrade {
            Some(reason) => self.terminal(Stage::Warn, Some(reason)),
            None => {
                self.note("submitted");
                self.terminal(Stage::Ok, None)
            }
        }
    }

    fn cancel_submit(mut self, state: FormState) -> RowOutcome {
        if state == FormState::Editable {
            self.note("form was never submitted; nothing to cancel");
            return self.terminal(Stage::Warn, Some(ReasonCode::NothingToCancel));
        }

        match self.retry(|driver| driver.invoke(ActionKind::CancelSubmit)) {
            Ok(ActionOutcome::Completed) => {}
            Ok(_) | Err(DriverError::NotFound(_)) => {
                self.note("form was never submitted; nothing to cancel");
                return self.terminal(Stage::Warn, Some(ReasonCode::NothingToCancel));
            }
            Err(err) => {
                let reason = match &err {
                    DriverError::Session(_) => ReasonCode::SessionLost,
                    _ => ReasonCode::CancelNoConfirm,
                };
                self.note(&err.to_string());
                return self.terminal(Stage::Error, Some(reason));
            }
        }
        self.settle();

        match self.retry(|driver| driver.invoke(ActionKind::ConfirmCancel)) {
            Ok(ActionOutcome::Completed) => {
                self.note("submission cancelled");
                self.terminal(Stage::Ok, None)
            }
            Ok(ActionOutcome::Rejected(message)) => {
                self.note(&message);
                self.terminal(Stage::Error, Some(ReasonCode::CancelNoConfirm))
            }
            Ok(ActionOutcome::FormFinal) | Err(_) => {
                self.note("cancel confirmation dialog did not complete");
                self.terminal(Stage::Error, Some(ReasonCode::CancelNoConfirm))
            }
        }
    }

    /// Check then Accept for rows marked as duplicates. Failures here are
    /// hard errors: submitting a half-linked duplicate corrupts the record.
    fn duplicate_flow(&mut self) -> Result<(), RowOutcome> {
        let Some(master) = self.row.fields.get("idsbr_master").cloned() else {
            self.note("duplicate row without idsbr_master value");
            return Err(self.terminal_ref(Stage::Error, Some(ReasonCode::DuplicateCheckMismatch)));
        };

        let locator = self
            .selectors
            .locator_for("idsbr_master")
            .unwrap_or_else(|| FieldLocator::Css("input#idsbr_master".to_string()));
        if let Err(err) = self.retry(|driver| driver.write_field("idsbr_master", &locator, &master))
        {
            self.note(&format!("idsbr_master: {err}"));
            return Err(self.terminal_ref(Stage::Error, Some(ReasonCode::DuplicateCheckMismatch)));
        }
        self.settle();

        match self.retry(|driver| driver.invoke(ActionKind::CheckDuplicate)) {
            Ok(ActionOutcome::Completed) => {}
            Ok(ActionOutcome::Rejected(message)) => {
                self.note(&message);
                return Err(self.terminal_ref(Stage::Error, Some(ReasonCode::DuplicateCheckMismatch)));
            }
            Ok(ActionOutcome::FormFinal) | Err(_) => {
                self.note("duplicate check did not complete");
                return Err(self.terminal_ref(Stage::Error, Some(ReasonCode::DuplicateCheckMismatch)));
            }
        }

        match self.retry(|driver| driver.invoke(ActionKind::AcceptDuplicate)) {
            Ok(ActionOutcome::Completed) => Ok(()),
            Ok(_) | Err(_) => {
                self.note("accept control failed after a successful check");
                Err(self.terminal_ref(Stage::Error, Some(ReasonCode::DuplicateAcceptFailed)))
            }
        }
    }

    /// Write every non-reserved field. Failures degrade the terminal to
    /// WARN (first reason wins) but never stop the loop.
    fn write_fields(&mut self) {
        for (name, value) in &self.row.fields {
            if RESERVED_FIELDS.contains(&name.as_str()) {
                continue;
            }
            let Some(locator) = self.selectors.locator_for(name) else {
                warn!(field = %name, "no selector mapped for field; skipping");
                self.notes.push(format!("no selector for {name}"));
                continue;
            };
            debug!(field = %name, "filling field");
            match self.retry(|driver| driver.write_field(name, &locator, value)) {
                Ok(()) => self.settle(),
                Err(err) => {
                    self.notes.push(format!("{name}: {err}"));
                    self.degrade(ReasonCode::FieldWriteFailed);
                }
            }
        }
    }

    fn resolve_status(&mut self) -> Result<Option<ResolvedStatus>, RowOutcome> {
        // Dry runs still resolve: catching a bad status cell without
        // touching the UI is half the point of a dry run.
        if self.settings.action != RowAction::FillAndSubmit || self.settings.skip_status {
            return Ok(None);
        }
        // A blank status cell means "leave the status alone", like any
        // other empty field value.
        if self.row.status_raw.trim().is_empty() {
            return Ok(None);
        }
        match self.status_mapper.resolve(&self.row.status_raw) {
            Ok(status) => Ok(Some(status)),
            Err(err) => {
                self.note(&err.to_string());
                Err(self.terminal_ref(Stage::Error, Some(ReasonCode::UnknownStatus)))
            }
        }
    }

    fn open_failed(mut self, err: DriverError) -> RowOutcome {
        let (stage, reason) = match &err {
            DriverError::NotFound(_) => (Stage::Error, ReasonCode::RowNotFound),
            DriverError::Locked => (Stage::Warn, ReasonCode::FormLocked),
            DriverError::Session(_) => (Stage::Error, ReasonCode::SessionLost),
            DriverError::Timeout(_) | DriverError::Other(_) => {
                (Stage::Error, ReasonCode::ClickEditTimeout)
            }
        };
        self.note(&err.to_string());
        self.terminal(stage, Some(reason))
    }

    fn retry<T>(
        &mut self,
        mut op: impl FnMut(&mut dyn Driver) -> Result<T, DriverError>,
    ) -> Result<T, DriverError> {
        let driver = &mut *self.driver;
        self.settings
            .retry
            .run(move || op(driver), DriverError::is_transient)
    }

    fn settle(&mut self) {
        self.driver.settle(self.settings.settle);
    }

    fn note(&mut self, text: &str) {
        self.notes.push(text.to_string());
    }

    fn degrade(&mut self, reason: ReasonCode) {
        if self.degrade.is_none() {
            self.degrade = Some(reason);
        }
    }

    fn terminal(mut self, stage: Stage, reason: Option<ReasonCode>) -> RowOutcome {
        self.terminal_ref(stage, reason)
    }

    /// Capture the screenshot, close the form, and assemble the outcome.
    fn terminal_ref(&mut self, stage: Stage, reason: Option<ReasonCode>) -> RowOutcome {
        let must_shoot = matches!(stage, Stage::Warn | Stage::Error);
        let want_shoot = must_shoot || self.settings.screenshot_on_ok;
        let screenshot = if want_shoot {
            let path = ledger::screenshot_path(&self.settings.screenshot_dir, self.row.row_index, stage);
            match self.driver.screenshot(&path) {
                Ok(()) => Some(path),
                Err(err) => {
                    self.notes.push(format!("screenshot failed: {err}"));
                    None
                }
            }
        } else {
            None
        };

        if self.form_open {
            // Best effort; the terminal is already decided.
            if let Err(err) = self.driver.close_form() {
                debug!(error = %err, "failed to close form after terminal");
            }
            self.form_open = false;
        }

        RowOutcome {
            row_index: self.row.row_index,
            idsbr: self.row.idsbr.clone(),
            name: self.row.name.clone(),
            match_value: self.match_value.clone(),
            stage,
            reason,
            note: self.notes.join("; "),
            screenshot,
            ts: ledger::now_iso(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::status_map::StatusMapper;
    use crate::test_support::{row, row_with_field, Call, ScriptedDriver};
    use pretty_assertions::assert_eq;

    fn settings(temp: &std::path::Path) -> EngineSettings {
        EngineSettings {
            match_by: MatchBy::Idsbr,
            action: RowAction::FillAndSubmit,
            dry_run: false,
            skip_status: false,
            screenshot_on_ok: false,
            screenshot_dir: temp.to_path_buf(),
            settle: Duration::ZERO,
            retry: RetryPolicy::immediate(3),
        }
    }

    fn process(
        driver: &mut ScriptedDriver,
        row: &RowContext,
        settings: &EngineSettings,
    ) -> RowOutcome {
        let selectors = SelectorMap::default();
        let mapper = StatusMapper::default();
        process_row(driver, row, &selectors, &mapper, settings)
    }

    #[test]
    fn happy_path_fills_and_submits() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut driver = ScriptedDriver::new();
        let row = row_with_field(row(1, "101", "Toko Satu", "Aktif"), "website", "https://a.id");

        let outcome = process(&mut driver, &row, &settings(temp.path()));

        assert_eq!(outcome.stage, Stage::Ok);
        assert_eq!(outcome.reason, None);
        assert_eq!(
            driver.written_fields(),
            vec!["keberadaan_usaha", "website"]
        );
        assert_eq!(
            driver.invoked(),
            vec![ActionKind::SubmitFinal, ActionKind::ConfirmSubmit]
        );
        // No screenshot on OK unless asked for.
        assert_eq!(outcome.screenshot, None);
        assert!(driver.calls.contains(&Call::CloseForm));
    }

    #[test]
    fn empty_match_value_is_error_before_any_ui_work() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut driver = ScriptedDriver::new();
        let row = row(1, "", "Toko", "Aktif");

        let outcome = process(&mut driver, &row, &settings(temp.path()));

        assert_eq!(outcome.stage, Stage::Error);
        assert_eq!(outcome.reason, Some(ReasonCode::EmptyMatchValue));
        assert!(driver.written_fields().is_empty());
        assert!(!driver.calls.iter().any(|c| matches!(c, Call::OpenForm(_))));
    }

    #[test]
    fn unknown_status_is_error_before_the_form_opens() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut driver = ScriptedDriver::new();
        let row = row(1, "101", "Toko", "Bangkrut");

        let outcome = process(&mut driver, &row, &settings(temp.path()));

        assert_eq!(outcome.stage, Stage::Error);
        assert_eq!(outcome.reason, Some(ReasonCode::UnknownStatus));
        assert!(!driver.calls.iter().any(|c| matches!(c, Call::OpenForm(_))));
    }

    #[test]
    fn blank_status_cell_fills_without_touching_the_status_option() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut driver = ScriptedDriver::new();
        let row = row_with_field(row(1, "101", "Toko", ""), "website", "https://a.id");

        let outcome = process(&mut driver, &row, &settings(temp.path()));

        assert_eq!(outcome.stage, Stage::Ok);
        assert_eq!(outcome.reason, None);
        // Only the regular field is written; the status option is untouched.
        assert_eq!(driver.written_fields(), vec!["website"]);
        assert_eq!(
            driver.invoked(),
            vec![ActionKind::SubmitFinal, ActionKind::ConfirmSubmit]
        );
    }

    #[test]
    fn skip_status_tolerates_unknown_status_text() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut driver = ScriptedDriver::new();
        let row = row(1, "101", "Toko", "Bangkrut");
        let mut cfg = settings(temp.path());
        cfg.skip_status = true;

        let outcome = process(&mut driver, &row, &cfg);

        assert_eq!(outcome.stage, Stage::Ok);
        assert!(driver.written_fields().is_empty());
    }

    #[test]
    fn row_not_found_is_error_with_screenshot() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut driver = ScriptedDriver::new();
        driver.push_open(Err(DriverError::NotFound("row".to_string())));
        let row = row(2, "102", "Toko Dua", "Aktif");

        let outcome = process(&mut driver, &row, &settings(temp.path()));

        assert_eq!(outcome.stage, Stage::Error);
        assert_eq!(outcome.reason, Some(ReasonCode::RowNotFound));
        let shot = outcome.screenshot.expect("screenshot on ERROR");
        assert!(shot.exists());
    }

    #[test]
    fn locked_form_is_warn_skip() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut driver = ScriptedDriver::new();
        driver.push_open(Err(DriverError::Locked));
        let row = row(1, "101", "Toko", "Aktif");

        let outcome = process(&mut driver, &row, &settings(temp.path()));

        assert_eq!(outcome.stage, Stage::Warn);
        assert_eq!(outcome.reason, Some(ReasonCode::FormLocked));
        assert!(outcome.screenshot.is_some());
        assert!(driver.written_fields().is_empty());
    }

    #[test]
    fn transient_open_failure_is_retried_then_succeeds() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut driver = ScriptedDriver::new();
        driver.push_open(Err(DriverError::Timeout("edit".to_string())));
        driver.push_open(Ok(FormState::Editable));
        let row = row(1, "101", "Toko", "Aktif");

        let outcome = process(&mut driver, &row, &settings(temp.path()));

        assert_eq!(outcome.stage, Stage::Ok);
        let opens = driver
            .calls
            .iter()
            .filter(|c| matches!(c, Call::OpenForm(_)))
            .count();
        assert_eq!(opens, 2);
    }

    #[test]
    fn field_write_failure_degrades_to_warn_but_continues() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut driver = ScriptedDriver::new();
        // First write is the status option; then kodepos (sorts before
        // website) fails all three attempts.
        driver.push_write(Ok(()));
        for _ in 0..3 {
            driver.push_write(Err(DriverError::Timeout("kodepos".to_string())));
        }
        let row = row_with_field(
            row_with_field(row(1, "101", "Toko", "Aktif"), "kodepos", "12345"),
            "website",
            "https://a.id",
        );

        let outcome = process(&mut driver, &row, &settings(temp.path()));

        assert!(driver.written_fields().contains(&"website"));
        assert_eq!(outcome.stage, Stage::Warn);
        assert_eq!(outcome.reason, Some(ReasonCode::FieldWriteFailed));
        assert!(outcome.note.contains("kodepos"));
        assert!(outcome.screenshot.is_some());
    }

    #[test]
    fn unmapped_field_is_noted_but_not_degraded() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut driver = ScriptedDriver::new();
        let row = row_with_field(row(1, "101", "Toko", "Aktif"), "kolom_misterius", "x");

        let outcome = process(&mut driver, &row, &settings(temp.path()));

        assert_eq!(outcome.stage, Stage::Ok);
        assert!(outcome.note.contains("kolom_misterius"));
        assert!(!driver.written_fields().contains(&"kolom_misterius"));
    }

    #[test]
    fn submit_rejection_is_submit_error_fill() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut driver = ScriptedDriver::new();
        driver.push_invoke(
            ActionKind::SubmitFinal,
            Ok(ActionOutcome::Rejected("perbaiki isian".to_string())),
        );
        let row = row(1, "101", "Toko", "Aktif");

        let outcome = process(&mut driver, &row, &settings(temp.path()));

        assert_eq!(outcome.stage, Stage::Error);
        assert_eq!(outcome.reason, Some(ReasonCode::SubmitErrorFill));
        assert!(outcome.note.contains("perbaiki isian"));
    }

    #[test]
    fn missing_success_signal_is_its_own_reason() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut driver = ScriptedDriver::new();
        driver.push_invoke(
            ActionKind::ConfirmSubmit,
            Ok(ActionOutcome::Rejected("no signal".to_string())),
        );
        let row = row(1, "101", "Toko", "Aktif");

        let outcome = process(&mut driver, &row, &settings(temp.path()));

        assert_eq!(outcome.stage, Stage::Error);
        assert_eq!(outcome.reason, Some(ReasonCode::SubmitNoSuccessSignal));
    }

    #[test]
    fn already_final_form_is_warn_for_fill() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut driver = ScriptedDriver::new();
        driver.push_open(Ok(FormState::Final));
        let row = row(1, "101", "Toko", "Aktif");

        let outcome = process(&mut driver, &row, &settings(temp.path()));

        assert_eq!(outcome.stage, Stage::Warn);
        assert_eq!(outcome.reason, Some(ReasonCode::AlreadyFinal));
        assert!(driver.invoked().is_empty());
    }

    #[test]
    fn dry_run_opens_but_never_writes_or_submits() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut driver = ScriptedDriver::new();
        let row = row_with_field(row(1, "101", "Toko", "Aktif"), "website", "https://a.id");
        let mut cfg = settings(temp.path());
        cfg.dry_run = true;

        let outcome = process(&mut driver, &row, &cfg);

        assert_eq!(outcome.stage, Stage::DryRun);
        assert!(driver.written_fields().is_empty());
        assert!(driver.invoked().is_empty());
        assert!(driver.calls.iter().any(|c| matches!(c, Call::OpenForm(_))));
        assert!(driver.calls.contains(&Call::CloseForm));
    }

    #[test]
    fn duplicate_row_checks_and_accepts_before_submit() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut driver = ScriptedDriver::new();
        let row = row_with_field(row(1, "101", "Toko", "Duplikat"), "idsbr_master", "999");

        let outcome = process(&mut driver, &row, &settings(temp.path()));

        assert_eq!(outcome.stage, Stage::Ok);
        assert_eq!(
            driver.invoked(),
            vec![
                ActionKind::CheckDuplicate,
                ActionKind::AcceptDuplicate,
                ActionKind::SubmitFinal,
                ActionKind::ConfirmSubmit,
            ]
        );
        assert!(driver.written_fields().contains(&"idsbr_master"));
    }

    #[test]
    fn duplicate_check_mismatch_is_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut driver = ScriptedDriver::new();
        driver.push_invoke(
            ActionKind::CheckDuplicate,
            Ok(ActionOutcome::Rejected("tidak ditemukan".to_string())),
        );
        let row = row_with_field(row(1, "101", "Toko", "Duplikat"), "idsbr_master", "999");

        let outcome = process(&mut driver, &row, &settings(temp.path()));

        assert_eq!(outcome.stage, Stage::Error);
        assert_eq!(outcome.reason, Some(ReasonCode::DuplicateCheckMismatch));
        assert!(!driver.invoked().contains(&ActionKind::SubmitFinal));
    }

    #[test]
    fn duplicate_without_master_id_never_opens_submit() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut driver = ScriptedDriver::new();
        let row = row(1, "101", "Toko", "Duplikat");

        let outcome = process(&mut driver, &row, &settings(temp.path()));

        assert_eq!(outcome.stage, Stage::Error);
        assert_eq!(outcome.reason, Some(ReasonCode::DuplicateCheckMismatch));
        assert!(!driver.invoked().contains(&ActionKind::SubmitFinal));
    }

    #[test]
    fn cancel_on_final_form_confirms_and_succeeds() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut driver = ScriptedDriver::new();
        driver.push_open(Ok(FormState::Final));
        let row = row(1, "101", "Toko", "");
        let mut cfg = settings(temp.path());
        cfg.action = RowAction::CancelSubmit;

        let outcome = process(&mut driver, &row, &cfg);

        assert_eq!(outcome.stage, Stage::Ok);
        assert_eq!(
            driver.invoked(),
            vec![ActionKind::CancelSubmit, ActionKind::ConfirmCancel]
        );
    }

    #[test]
    fn cancel_on_editable_form_is_nothing_to_cancel() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut driver = ScriptedDriver::new();
        let row = row(1, "101", "Toko", "");
        let mut cfg = settings(temp.path());
        cfg.action = RowAction::CancelSubmit;

        let outcome = process(&mut driver, &row, &cfg);

        assert_eq!(outcome.stage, Stage::Warn);
        assert_eq!(outcome.reason, Some(ReasonCode::NothingToCancel));
        assert!(driver.invoked().is_empty());
    }

    #[test]
    fn screenshot_failure_is_noted_without_changing_the_stage() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut driver = ScriptedDriver::new();
        driver.push_open(Err(DriverError::NotFound("row".to_string())));
        driver.fail_screenshots();
        let row = row(1, "101", "Toko", "Aktif");

        let outcome = process(&mut driver, &row, &settings(temp.path()));

        assert_eq!(outcome.stage, Stage::Error);
        assert_eq!(outcome.screenshot, None);
        assert!(outcome.note.contains("screenshot failed"));
    }

    #[test]
    fn screenshot_on_ok_when_configured() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut driver = ScriptedDriver::new();
        let row = row(1, "101", "Toko", "Aktif");
        let mut cfg = settings(temp.path());
        cfg.screenshot_on_ok = true;

        let outcome = process(&mut driver, &row, &cfg);

        assert_eq!(outcome.stage, Stage::Ok);
        assert!(outcome.screenshot.is_some());
    }

    #[test]
    fn session_loss_during_fill_is_session_lost() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut driver = ScriptedDriver::new();
        for _ in 0..3 {
            driver.push_write(Err(DriverError::Session("gone".to_string())));
        }
        let row = row(1, "101", "Toko", "Aktif");

        let outcome = process(&mut driver, &row, &settings(temp.path()));

        assert_eq!(outcome.stage, Stage::Error);
        assert_eq!(outcome.reason, Some(ReasonCode::SessionLost));
    }
}
