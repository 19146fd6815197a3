//! CLI command implementations

pub mod lifecycle;
pub mod preflight;
pub mod run;
pub mod typetext;
pub mod validate;
