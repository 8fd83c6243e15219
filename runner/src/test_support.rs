//! Test-only helpers: a scripted [`Driver`] double and row builders.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::types::RowContext;
use crate::io::driver::{
    ActionKind, ActionOutcome, Driver, DriverError, FieldLocator, FormState, MatchTarget,
};

/// Everything a [`ScriptedDriver`] was asked to do, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    OpenForm(MatchTarget),
    WriteField { name: String, value: String },
    Invoke(ActionKind),
    CloseForm,
    Screenshot(PathBuf),
}

/// Deterministic [`Driver`] double.
///
/// Responses are scripted per operation; when a queue runs dry the call
/// succeeds (open yields an editable form, invokes complete). Screenshots
/// write a small placeholder file so path bookkeeping is exercised for
/// real.
#[derive(Debug, Default)]
pub struct ScriptedDriver {
    open_results: VecDeque<Result<FormState, DriverError>>,
    write_results: VecDeque<Result<(), DriverError>>,
    invoke_results: Vec<(ActionKind, Result<ActionOutcome, DriverError>)>,
    fail_screenshots: bool,
    pub calls: Vec<Call>,
}

impl ScriptedDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the next `open_form` result.
    pub fn push_open(&mut self, result: Result<FormState, DriverError>) -> &mut Self {
        self.open_results.push_back(result);
        self
    }

    /// Script the next `write_field` result (applied in call order).
    pub fn push_write(&mut self, result: Result<(), DriverError>) -> &mut Self {
        self.write_results.push_back(result);
        self
    }

    /// Script the next invocation of `action`.
    pub fn push_invoke(
        &mut self,
        action: ActionKind,
        result: Result<ActionOutcome, DriverError>,
    ) -> &mut Self {
        self.invoke_results.push((action, result));
        self
    }

    /// Make every screenshot attempt fail.
    pub fn fail_screenshots(&mut self) -> &mut Self {
        self.fail_screenshots = true;
        self
    }

    /// Field names written so far, in order.
    pub fn written_fields(&self) -> Vec<&str> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::WriteField { name, .. } => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Actions invoked so far, in order.
    pub fn invoked(&self) -> Vec<ActionKind> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Invoke(action) => Some(*action),
                _ => None,
            })
            .collect()
    }
}

impl Driver for ScriptedDriver {
    fn open_form(&mut self, target: &MatchTarget) -> Result<FormState, DriverError> {
        self.calls.push(Call::OpenForm(target.clone()));
        self.open_results
            .pop_front()
            .unwrap_or(Ok(FormState::Editable))
    }

    fn write_field(
        &mut self,
        name: &str,
        _locator: &FieldLocator,
        value: &str,
    ) -> Result<(), DriverError> {
        self.calls.push(Call::WriteField {
            name: name.to_string(),
            value: value.to_string(),
        });
        self.write_results.pop_front().unwrap_or(Ok(()))
    }

    fn invoke(&mut self, action: ActionKind) -> Result<ActionOutcome, DriverError> {
        self.calls.push(Call::Invoke(action));
        if let Some(pos) = self.invoke_results.iter().position(|(a, _)| *a == action) {
            self.invoke_results.remove(pos).1
        } else {
            Ok(ActionOutcome::Completed)
        }
    }

    fn close_form(&mut self) -> Result<(), DriverError> {
        self.calls.push(Call::CloseForm);
        Ok(())
    }

    fn screenshot(&mut self, path: &Path) -> Result<(), DriverError> {
        self.calls.push(Call::Screenshot(path.to_path_buf()));
        if self.fail_screenshots {
            return Err(DriverError::Other("screenshot refused".to_string()));
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|err| DriverError::Other(err.to_string()))?;
        }
        std::fs::write(path, b"png").map_err(|err| DriverError::Other(err.to_string()))
    }

    fn settle(&mut self, _wait: Duration) {}
}

/// A minimal row with identity columns filled in.
pub fn row(row_index: u32, idsbr: &str, name: &str, status: &str) -> RowContext {
    RowContext {
        table_index: row_index.saturating_sub(1) as usize,
        row_index,
        idsbr: idsbr.to_string(),
        name: name.to_string(),
        status_raw: status.to_string(),
        ..RowContext::default()
    }
}

/// Copy of `base` with one field value added.
pub fn row_with_field(base: RowContext, field: &str, value: &str) -> RowContext {
    let mut row = base;
    row.fields.insert(field.to_string(), value.to_string());
    row
}
