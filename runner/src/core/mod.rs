//! Deterministic, pure logic shared by the runner.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod csvline;
pub mod normalize;
pub mod resume;
pub mod retry;
pub mod status_map;
pub mod types;
