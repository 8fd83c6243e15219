//! Row, outcome, and summary types shared across the engine and ledger.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// How a spreadsheet row is matched against the directory table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MatchBy {
    /// Positional: spreadsheet row N maps to table row N.
    Index,
    /// Filter the table by the row's IDSBR identifier.
    Idsbr,
    /// Filter the table by the row's business name.
    Name,
}

/// What the engine does once the edit form is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowAction {
    /// Fill fields, then Submit Final with confirmation.
    FillAndSubmit,
    /// Cancel a prior submission (Cancel Submit with confirmation).
    CancelSubmit,
}

impl RowAction {
    /// Command name used in ledger file names and the run index.
    pub fn command_name(self) -> &'static str {
        match self {
            Self::FillAndSubmit => "autofill",
            Self::CancelSubmit => "cancel",
        }
    }
}

/// One spreadsheet row, normalized and ready for the engine.
///
/// `row_index` is the 1-based display index used in logs and resume
/// bookkeeping; `table_index` is the 0-based position in the sheet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowContext {
    pub table_index: usize,
    pub row_index: u32,
    pub idsbr: String,
    pub name: String,
    /// Raw status cell after whitespace normalization (may be a numeric code).
    pub status_raw: String,
    /// Logical field name -> normalized value. Empty values are omitted
    /// upstream; anything present here is intended to be written.
    pub fields: BTreeMap<String, String>,
}

impl RowContext {
    /// Value used to locate this row in the directory table, per strategy.
    /// `None` means the row cannot be matched (empty identifier).
    pub fn match_value(&self, match_by: MatchBy) -> Option<String> {
        match match_by {
            MatchBy::Index => Some(self.row_index.to_string()),
            MatchBy::Idsbr => {
                if self.idsbr.is_empty() {
                    None
                } else {
                    Some(self.idsbr.clone())
                }
            }
            MatchBy::Name => {
                if self.name.is_empty() {
                    None
                } else {
                    Some(self.name.clone())
                }
            }
        }
    }
}

/// Terminal classification of a processed row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Ok,
    Warn,
    Error,
    DryRun,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::DryRun => "DRY_RUN",
        }
    }

    /// Parse a ledger cell back into a stage. Unknown text yields `None`.
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_ascii_uppercase().as_str() {
            "OK" => Some(Self::Ok),
            "WARN" => Some(Self::Warn),
            "ERROR" => Some(Self::Error),
            "DRY_RUN" => Some(Self::DryRun),
            _ => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Machine-readable reason for a WARN/ERROR terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    /// The match strategy needs an identifier the row does not have.
    EmptyMatchValue,
    /// Status cell did not resolve to any known status option.
    UnknownStatus,
    /// Table filter matched no row.
    RowNotFound,
    /// Edit control never became clickable.
    ClickEditTimeout,
    /// The form opened read-only (another operator holds the lock).
    FormLocked,
    /// The form was already finalized; nothing left to fill.
    AlreadyFinal,
    /// At least one field write failed; remaining fields were still attempted.
    FieldWriteFailed,
    /// The status option could not be selected.
    StatusSelectFailed,
    /// Duplicate check rejected the provided master IDSBR.
    DuplicateCheckMismatch,
    /// Duplicate accept control failed after a successful check.
    DuplicateAcceptFailed,
    /// Submit rejected with a validation message ("isian yang harus diperbaiki").
    SubmitErrorFill,
    /// Submit control never responded.
    SubmitErrorTimeout,
    /// The UI reported the form is already final at submit time.
    SubmitErrorLocked,
    /// Confirmation dialog never appeared.
    SubmitNoConfirm,
    /// Confirmed, but no success signal was observed.
    SubmitNoSuccessSignal,
    /// Cancel flow could not be confirmed.
    CancelNoConfirm,
    /// Cancel requested but the form was never submitted.
    NothingToCancel,
    /// Browser session went away mid-row.
    SessionLost,
}

impl ReasonCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EmptyMatchValue => "EMPTY_MATCH_VALUE",
            Self::UnknownStatus => "UNKNOWN_STATUS",
            Self::RowNotFound => "ROW_NOT_FOUND",
            Self::ClickEditTimeout => "CLICK_EDIT_TIMEOUT",
            Self::FormLocked => "FORM_LOCKED",
            Self::AlreadyFinal => "ALREADY_FINAL",
            Self::FieldWriteFailed => "FIELD_WRITE_FAILED",
            Self::StatusSelectFailed => "STATUS_SELECT_FAILED",
            Self::DuplicateCheckMismatch => "DUPLICATE_CHECK_MISMATCH",
            Self::DuplicateAcceptFailed => "DUPLICATE_ACCEPT_FAILED",
            Self::SubmitErrorFill => "SUBMIT_ERROR_FILL",
            Self::SubmitErrorTimeout => "SUBMIT_ERROR_TIMEOUT",
            Self::SubmitErrorLocked => "SUBMIT_ERROR_LOCKED",
            Self::SubmitNoConfirm => "SUBMIT_NO_CONFIRM",
            Self::SubmitNoSuccessSignal => "SUBMIT_NO_SUCCESS_SIGNAL",
            Self::CancelNoConfirm => "CANCEL_NO_CONFIRM",
            Self::NothingToCancel => "NOTHING_TO_CANCEL",
            Self::SessionLost => "SESSION_LOST",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal record for one processed row. Exactly one per attempted row
/// lands in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowOutcome {
    pub row_index: u32,
    pub idsbr: String,
    pub name: String,
    pub match_value: String,
    pub stage: Stage,
    pub reason: Option<ReasonCode>,
    pub note: String,
    pub screenshot: Option<PathBuf>,
    pub ts: String,
}

/// Per-run tallies. Dry-run terminals count as `ok`: the row was fully
/// verified even though nothing was written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub ok: u32,
    pub warn: u32,
    pub error: u32,
    pub skipped: u32,
}

impl Summary {
    pub fn record(&mut self, stage: Stage) {
        match stage {
            Stage::Ok | Stage::DryRun => self.ok += 1,
            Stage::Warn => self.warn += 1,
            Stage::Error => self.error += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.ok + self.warn + self.error + self.skipped
    }
}
