//! vmgate Gate Library
//!
//! Sequential release-acceptance gate orchestration: host preflight,
//! VM snapshot lifecycle, keystroke injection, evidence validation.

pub mod control;
pub mod evidence;
pub mod keystroke;
pub mod lifecycle;
pub mod orchestrator;
pub mod preflight;

pub use control::{CommandOutput, ControlPlane, VirshControl};
pub use evidence::{validate_evidence, EvidenceSchema, ValidationReport};
pub use lifecycle::SnapshotLifecycle;
pub use orchestrator::{run_gate, GateRunConfig};
