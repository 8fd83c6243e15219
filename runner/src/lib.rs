//! Spreadsheet-driven row automation for the SBR business directory UI.
//!
//! The crate drives an already-authenticated browser session (attached over
//! the Chrome DevTools Protocol) through the directory table and per-record
//! edit form, one spreadsheet row at a time. The architecture enforces a
//! strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (status mapping, normalization,
//!   resume filtering, retry policy). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (browser driver, spreadsheet
//!   reading, ledger files, retention, webhooks). Isolated to enable
//!   scripted doubles in tests.
//!
//! Orchestration modules ([`engine`], [`run`]) coordinate core logic with
//! I/O to implement the `fill` and `cancel` CLI commands.

pub mod core;
pub mod engine;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod run;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
