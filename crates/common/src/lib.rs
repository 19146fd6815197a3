//! vmgate Common Library
//!
//! Shared types and utilities for the vmgate release-acceptance gate.

pub mod digest;
pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::*;

/// vmgate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Exit code for a passed gate / successful operation
pub const EXIT_PASS: i32 = 0;
/// Exit code for a failed gate (evidence validation rejected the run)
pub const EXIT_FAIL: i32 = 1;
/// Exit code for a fatal operational error, distinct from a fail verdict
pub const EXIT_FATAL: i32 = 2;
