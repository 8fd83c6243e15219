//! I/O for runner commands: browser driver, spreadsheet, ledger, webhooks.

pub mod cdp;
pub mod config;
pub mod driver;
pub mod ledger;
pub mod notify;
pub mod retention;
pub mod sheet;
