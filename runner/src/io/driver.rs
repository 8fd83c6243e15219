//! Browser capability boundary.
//!
//! The engine talks to the directory UI exclusively through [`Driver`].
//! The production implementation attaches to a running Chromium over the
//! DevTools protocol (feature `browser`, see [`crate::io::cdp`]); tests use
//! the scripted double from [`crate::test_support`].

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use thiserror::Error;

use crate::core::types::MatchBy;

/// How to locate one record in the directory table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchTarget {
    /// Positional table row (1-based, mirrors the spreadsheet display index).
    Index(u32),
    /// Filter the table by IDSBR.
    Idsbr(String),
    /// Filter the table by business name.
    Name(String),
}

impl MatchTarget {
    pub fn new(match_by: MatchBy, value: &str) -> Self {
        match match_by {
            MatchBy::Index => Self::Index(value.parse().unwrap_or(0)),
            MatchBy::Idsbr => Self::Idsbr(value.to_string()),
            MatchBy::Name => Self::Name(value.to_string()),
        }
    }
}

/// How a logical field is driven in the form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldLocator {
    /// Plain input/textarea reached by CSS selector.
    Css(String),
    /// select2 widget: click the container, type, confirm with Enter.
    Select2(String),
    /// Status radio/option identified by its option id.
    StatusOption(String),
}

/// State of the edit form right after opening.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormState {
    Editable,
    /// Already submitted; only the cancel control is available.
    Final,
}

/// Named controls the engine can invoke on an open form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    SubmitFinal,
    ConfirmSubmit,
    CancelSubmit,
    ConfirmCancel,
    CheckDuplicate,
    AcceptDuplicate,
}

/// Result of invoking a form control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Completed,
    /// The UI refused with a message (validation errors, check mismatch,
    /// missing success signal).
    Rejected(String),
    /// The UI reported the form is already finalized.
    FormFinal,
}

/// Failures surfaced by a [`Driver`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("form is locked by another operator")]
    Locked,
    #[error("timed out: {0}")]
    Timeout(String),
    #[error("browser session lost: {0}")]
    Session(String),
    #[error("{0}")]
    Other(String),
}

impl DriverError {
    /// Whether a retry could plausibly succeed. `NotFound` and `Locked`
    /// are definitive answers from the UI, not flakiness.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Session(_) | Self::Other(_))
    }
}

/// Everything the engine needs from the browser session.
///
/// Implementations own navigation details (filter inputs, edit buttons,
/// modal waits); the engine only sees logical operations and their
/// outcomes.
pub trait Driver {
    /// Locate the record and open its edit form. Covers filtering the
    /// table, finding the row, and clicking the edit control.
    fn open_form(&mut self, target: &MatchTarget) -> Result<FormState, DriverError>;

    /// Write one field value. Must not clear anything when it fails.
    fn write_field(
        &mut self,
        name: &str,
        locator: &FieldLocator,
        value: &str,
    ) -> Result<(), DriverError>;

    /// Invoke a named form control and report how the UI responded.
    fn invoke(&mut self, action: ActionKind) -> Result<ActionOutcome, DriverError>;

    /// Return to the directory table. Best effort; the engine ignores
    /// failures here once a terminal is decided.
    fn close_form(&mut self) -> Result<(), DriverError>;

    /// Capture a full-page screenshot to `path`.
    fn screenshot(&mut self, path: &Path) -> Result<(), DriverError>;

    /// Let the page settle after a mutation. Default: no-op.
    fn settle(&mut self, wait: Duration) {
        let _ = wait;
    }
}

/// Probe the CDP endpoint and return the `webSocketDebuggerUrl`.
///
/// This is the fatal-precondition check: without a reachable, debuggable
/// session no row can be attempted.
pub fn probe_session(endpoint: &str) -> Result<String> {
    let url = format!("{}/json/version", endpoint.trim_end_matches('/'));
    let response = reqwest::blocking::get(&url)
        .with_context(|| format!("browser session unreachable at {url}"))?;
    if !response.status().is_success() {
        bail!("browser session at {url} answered {}", response.status());
    }
    let body: serde_json::Value = response
        .json()
        .with_context(|| format!("parse {url} response"))?;
    match body.get("webSocketDebuggerUrl").and_then(|v| v.as_str()) {
        Some(ws) => Ok(ws.to_string()),
        None => bail!("{url} did not report webSocketDebuggerUrl; start the browser with --remote-debugging-port"),
    }
}

/// Attach to the browser session behind `endpoint`.
#[cfg(feature = "browser")]
pub fn attach(endpoint: &str, max_wait: Duration) -> Result<Box<dyn Driver>> {
    let ws_url = probe_session(endpoint)?;
    let driver = crate::io::cdp::CdpDriver::connect(&ws_url, max_wait)?;
    Ok(Box::new(driver))
}

/// Without the `browser` feature only dry scripted runs are possible.
#[cfg(not(feature = "browser"))]
pub fn attach(endpoint: &str, _max_wait: Duration) -> Result<Box<dyn Driver>> {
    let _ = probe_session(endpoint)?;
    bail!("this build has no browser backend; rebuild with --features browser")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_target_from_strategy() {
        assert_eq!(MatchTarget::new(MatchBy::Index, "4"), MatchTarget::Index(4));
        assert_eq!(
            MatchTarget::new(MatchBy::Idsbr, "123"),
            MatchTarget::Idsbr("123".to_string())
        );
        assert_eq!(
            MatchTarget::new(MatchBy::Name, "Toko"),
            MatchTarget::Name("Toko".to_string())
        );
    }

    #[test]
    fn transient_classification() {
        assert!(DriverError::Timeout("t".to_string()).is_transient());
        assert!(DriverError::Session("s".to_string()).is_transient());
        assert!(DriverError::Other("o".to_string()).is_transient());
        assert!(!DriverError::NotFound("n".to_string()).is_transient());
        assert!(!DriverError::Locked.is_transient());
    }
}
