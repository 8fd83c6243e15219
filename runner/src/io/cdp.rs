//! Chromium-backed [`Driver`] over the DevTools protocol (feature `browser`).
//!
//! Attaches to an already-running, already-authenticated browser; it never
//! launches or logs in. All async work runs on an internal current-thread
//! runtime so the engine keeps its blocking call discipline.
#![cfg(feature = "browser")]

use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Browser, Page};
use futures_util::StreamExt;
use tracing::debug;

use crate::io::driver::{
    ActionKind, ActionOutcome, Driver, DriverError, FieldLocator, FormState, MatchTarget,
};

const SEARCH_INPUT: &str = "#table_direktori_usaha_filter input[type='search']";
const EDIT_BUTTON: &str = "a.btn-edit-perusahaan";
const TABLE_ROWS: &str = "#table_direktori_usaha tbody > tr";
const CANCEL_SUBMIT_BUTTON: &str = "#cancel-submit-final";
const CHECK_IDSBR_BUTTON: &str = "#button-check-idsbr";
const ACCEPT_IDSBR_BUTTON: &str = "#accept-idsbr";

const POLL_INTERVAL: Duration = Duration::from_millis(120);

pub struct CdpDriver {
    rt: tokio::runtime::Runtime,
    _browser: Browser,
    page: Page,
    max_wait: Duration,
}

impl CdpDriver {
    /// Attach to the page behind `ws_url`. Uses the first open tab; the
    /// operator is expected to have the directory table in front.
    pub fn connect(ws_url: &str, max_wait: Duration) -> Result<Self> {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("build tokio runtime")?;

        let (browser, mut handler) = rt
            .block_on(Browser::connect(ws_url))
            .with_context(|| format!("connect to {ws_url}"))?;
        // The handler stream must be polled for the connection to make
        // progress; it runs whenever we are inside block_on.
        rt.spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        let pages = rt.block_on(browser.pages()).context("list browser tabs")?;
        let page = pages
            .into_iter()
            .next()
            .context("no open tab in the attached browser")?;

        Ok(Self {
            rt,
            _browser: browser,
            page,
            max_wait,
        })
    }

    fn map_err(err: impl std::fmt::Display) -> DriverError {
        let text = err.to_string();
        let lowered = text.to_lowercase();
        if lowered.contains("closed") || lowered.contains("disconnect") {
            DriverError::Session(text)
        } else {
            DriverError::Other(text)
        }
    }

    fn eval_bool(&mut self, script: &str) -> Result<bool, DriverError> {
        let value = self
            .rt
            .block_on(self.page.evaluate(script))
            .map_err(Self::map_err)?;
        Ok(value.into_value::<bool>().unwrap_or(false))
    }

    fn eval_unit(&mut self, script: &str) -> Result<(), DriverError> {
        self.rt
            .block_on(self.page.evaluate(script))
            .map_err(Self::map_err)?;
        Ok(())
    }

    /// Poll a JS predicate until it holds or `max_wait` elapses.
    fn wait_until(&mut self, script: &str, what: &str) -> Result<(), DriverError> {
        let deadline = Instant::now() + self.max_wait;
        loop {
            if self.eval_bool(script)? {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(DriverError::Timeout(what.to_string()));
            }
            self.rt.block_on(tokio::time::sleep(POLL_INTERVAL));
        }
    }

    fn click_selector(&mut self, selector: &str) -> Result<(), DriverError> {
        let element = self
            .rt
            .block_on(self.page.find_element(selector))
            .map_err(|_| DriverError::NotFound(selector.to_string()))?;
        self.rt
            .block_on(element.click())
            .map_err(Self::map_err)?;
        Ok(())
    }

    /// Click the first visible button or link whose text contains `label`.
    fn click_by_text(&mut self, label: &str) -> Result<bool, DriverError> {
        let script = format!(
            r#"(() => {{
                const needle = {label:?}.toLowerCase();
                const nodes = document.querySelectorAll('button, a');
                for (const el of nodes) {{
                    if (el.offsetParent === null) continue;
                    if ((el.textContent || '').toLowerCase().includes(needle)) {{
                        el.click();
                        return true;
                    }}
                }}
                return false;
            }})()"#
        );
        self.eval_bool(&script)
    }

    fn visible(&mut self, selector: &str) -> Result<bool, DriverError> {
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({selector:?});
                return !!el && el.offsetParent !== null;
            }})()"#
        );
        self.eval_bool(&script)
    }

    fn text_visible(&mut self, needle: &str) -> Result<bool, DriverError> {
        let script = format!(
            r#"(() => (document.body ? document.body.innerText : '').toLowerCase()
                  .includes({needle:?}.toLowerCase()))()"#
        );
        self.eval_bool(&script)
    }

    fn filter_table(&mut self, text: &str) -> Result<(), DriverError> {
        let element = self
            .rt
            .block_on(self.page.find_element(SEARCH_INPUT))
            .map_err(|_| DriverError::NotFound(SEARCH_INPUT.to_string()))?;
        self.rt.block_on(element.click()).map_err(Self::map_err)?;
        // Clear any previous filter before typing the new one.
        self.eval_unit(&format!(
            r#"(() => {{
                const input = document.querySelector({SEARCH_INPUT:?});
                if (input) {{
                    input.value = '';
                    input.dispatchEvent(new Event('input', {{ bubbles: true }}));
                }}
            }})()"#
        ))?;
        self.rt
            .block_on(element.type_str(text))
            .map_err(Self::map_err)?;
        self.wait_until(
            &format!(
                r#"(() => document.querySelectorAll({TABLE_ROWS:?}).length > 0
                    && !document.querySelector('#table_direktori_usaha_processing'))()"#
            ),
            "directory table filter results",
        )
    }

    fn click_edit_on_row(&mut self, row_index_1based: u32) -> Result<(), DriverError> {
        let script = format!(
            r#"(() => {{
                const rows = document.querySelectorAll({TABLE_ROWS:?});
                const row = rows[{index}];
                if (!row) return false;
                const btn = row.querySelector({EDIT_BUTTON:?}) || row.querySelector('td a');
                if (!btn) return false;
                btn.click();
                return true;
            }})()"#,
            index = row_index_1based.saturating_sub(1),
        );
        if !self.eval_bool(&script)? {
            return Err(DriverError::NotFound(format!(
                "table row {row_index_1based} or its edit control"
            )));
        }
        Ok(())
    }
}

impl Driver for CdpDriver {
    fn open_form(&mut self, target: &MatchTarget) -> Result<FormState, DriverError> {
        match target {
            MatchTarget::Index(row) => self.click_edit_on_row(*row)?,
            MatchTarget::Idsbr(value) | MatchTarget::Name(value) => {
                self.filter_table(value)?;
                // After filtering the wanted record is the first row.
                if self.eval_bool(
                    r#"(() => !!document.querySelector('#table_direktori_usaha tbody tr td.dataTables_empty'))()"#,
                )? {
                    return Err(DriverError::NotFound(format!("no table row matches '{value}'")));
                }
                self.click_edit_on_row(1)?;
            }
        }

        // Form ready: either editable controls or the finalized marker.
        self.wait_until(
            &format!(
                r#"(() => !!document.querySelector({CANCEL_SUBMIT_BUTTON:?})
                    || (document.body ? document.body.innerText : '').includes('Submit Final')
                    || (document.body ? document.body.innerText : '').includes('Back to Home'))()"#
            ),
            "edit form",
        )
        .map_err(|_| DriverError::Timeout("edit form never appeared".to_string()))?;

        if self.text_visible("Back to Home")? {
            return Err(DriverError::Locked);
        }
        let cancel_visible = self.visible(CANCEL_SUBMIT_BUTTON)?;
        let submit_visible = self.text_visible("Submit Final")?;
        if cancel_visible && !submit_visible {
            debug!("form is already finalized");
            return Ok(FormState::Final);
        }
        Ok(FormState::Editable)
    }

    fn write_field(
        &mut self,
        name: &str,
        locator: &FieldLocator,
        value: &str,
    ) -> Result<(), DriverError> {
        debug!(field = name, "writing field");
        match locator {
            FieldLocator::Css(selector) => {
                let script = format!(
                    r#"(() => {{
                        const el = document.querySelector({selector:?});
                        if (!el) return false;
                        el.focus();
                        el.value = {value:?};
                        el.dispatchEvent(new Event('input', {{ bubbles: true }}));
                        el.dispatchEvent(new Event('change', {{ bubbles: true }}));
                        return true;
                    }})()"#
                );
                if !self.eval_bool(&script)? {
                    return Err(DriverError::NotFound(format!("field {name} ({selector})")));
                }
                Ok(())
            }
            FieldLocator::Select2(selector) => {
                self.click_selector(selector)?;
                let search = self
                    .rt
                    .block_on(self.page.find_element("input.select2-search__field"))
                    .map_err(|_| DriverError::NotFound(format!("select2 search for {name}")))?;
                self.rt
                    .block_on(search.type_str(value))
                    .map_err(Self::map_err)?;
                self.wait_until(
                    r#"(() => !!document.querySelector('.select2-results__option--highlighted'))()"#,
                    "select2 suggestions",
                )?;
                self.rt
                    .block_on(search.press_key("Enter"))
                    .map_err(Self::map_err)?;
                Ok(())
            }
            FieldLocator::StatusOption(option_id) => {
                let script = format!(
                    r#"(() => {{
                        const el = document.getElementById({option_id:?})
                            || document.querySelector('label[for=' + JSON.stringify({option_id:?}) + ']');
                        if (!el) return false;
                        el.click();
                        return true;
                    }})()"#
                );
                if !self.eval_bool(&script)? {
                    return Err(DriverError::NotFound(format!("status option {option_id}")));
                }
                Ok(())
            }
        }
    }

    fn invoke(&mut self, action: ActionKind) -> Result<ActionOutcome, DriverError> {
        match action {
            ActionKind::SubmitFinal => {
                if !self.click_by_text("Submit Final")? {
                    if self.visible(CANCEL_SUBMIT_BUTTON)? {
                        return Ok(ActionOutcome::FormFinal);
                    }
                    return Err(DriverError::Timeout(
                        "Submit Final control not clickable".to_string(),
                    ));
                }
                self.settle(POLL_INTERVAL);
                if self.text_visible("isian yang harus diperbaiki")? {
                    // Dismiss the validation modal so the form stays usable.
                    let _ = self.click_by_text("OK");
                    return Ok(ActionOutcome::Rejected(
                        "validation rejected the submission".to_string(),
                    ));
                }
                Ok(ActionOutcome::Completed)
            }
            ActionKind::ConfirmSubmit => {
                if !self.click_by_text("Ya, Submit")? {
                    return Err(DriverError::Timeout(
                        "Submit Final confirmation dialog".to_string(),
                    ));
                }
                let _ = self.click_by_text("OK");
                match self.wait_until(
                    r#"(() => !!document.querySelector('.toast, .alert-success, .swal2-popup'))()"#,
                    "submit success signal",
                ) {
                    Ok(()) => Ok(ActionOutcome::Completed),
                    Err(DriverError::Timeout(_)) => Ok(ActionOutcome::Rejected(
                        "no success signal after confirmation".to_string(),
                    )),
                    Err(other) => Err(other),
                }
            }
            ActionKind::CancelSubmit => {
                if self.visible(CANCEL_SUBMIT_BUTTON)? {
                    self.click_selector(CANCEL_SUBMIT_BUTTON)?;
                    Ok(ActionOutcome::Completed)
                } else if self.click_by_text("Cancel Submit")? {
                    Ok(ActionOutcome::Completed)
                } else {
                    Err(DriverError::NotFound("Cancel Submit control".to_string()))
                }
            }
            ActionKind::ConfirmCancel => {
                if !self.click_by_text("Ya, batalkan")? {
                    return Err(DriverError::Timeout(
                        "Cancel Submit confirmation dialog".to_string(),
                    ));
                }
                let _ = self.click_by_text("OK");
                Ok(ActionOutcome::Completed)
            }
            ActionKind::CheckDuplicate => {
                self.click_selector(CHECK_IDSBR_BUTTON)?;
                match self.wait_until(
                    &format!(
                        r#"(() => !!document.querySelector({ACCEPT_IDSBR_BUTTON:?})
                            || (document.body ? document.body.innerText : '')
                                .toLowerCase().includes('tidak ditemukan'))()"#
                    ),
                    "duplicate check result",
                ) {
                    Ok(()) => {
                        if self.visible(ACCEPT_IDSBR_BUTTON)? {
                            Ok(ActionOutcome::Completed)
                        } else {
                            Ok(ActionOutcome::Rejected(
                                "master IDSBR was not accepted by the check".to_string(),
                            ))
                        }
                    }
                    Err(err) => Err(err),
                }
            }
            ActionKind::AcceptDuplicate => {
                self.click_selector(ACCEPT_IDSBR_BUTTON)?;
                Ok(ActionOutcome::Completed)
            }
        }
    }

    fn close_form(&mut self) -> Result<(), DriverError> {
        self.eval_unit("window.history.back()")?;
        self.wait_until(
            &format!(r#"(() => !!document.querySelector({SEARCH_INPUT:?}))()"#),
            "directory table",
        )
    }

    fn screenshot(&mut self, path: &Path) -> Result<(), DriverError> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(true)
            .build();
        let bytes = self
            .rt
            .block_on(self.page.screenshot(params))
            .map_err(Self::map_err)?;
        std::fs::write(path, bytes)
            .map_err(|err| DriverError::Other(format!("write {}: {err}", path.display())))
    }

    fn settle(&mut self, wait: Duration) {
        if !wait.is_zero() {
            self.rt.block_on(tokio::time::sleep(wait));
        }
    }
}
