//! Stable exit codes for runner CLI commands.
//!
//! Row-level failures are recorded in the ledger and do not change the exit
//! code. Only preconditions that prevent any row from being attempted
//! (unreachable session, missing/ambiguous spreadsheet, invalid config) are
//! fatal.

/// Run finished; per-row results live in the ledger.
pub const OK: i32 = 0;
/// A fatal precondition failed before any row could be attempted.
pub const PRECONDITION: i32 = 1;
