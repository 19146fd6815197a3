//! Control-plane command interface
//!
//! The virtualization control plane is an opaque dependency behind one
//! narrow contract: `run(args)` returns a structured result, and any
//! non-zero exit code is a failure whose captured output is surfaced
//! verbatim.

use std::process::Command;
use tracing::debug;
use vmgate_common::{Error, Result};

/// Captured result of one control-plane invocation
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Diagnostic text for error reporting: stderr when present, stdout
    /// otherwise.
    pub fn diagnostic(&self) -> &str {
        let err = self.stderr.trim();
        if err.is_empty() {
            self.stdout.trim()
        } else {
            err
        }
    }

    /// Turn a failed invocation into an Operation error for `action`.
    pub fn into_result(self, action: &str) -> Result<CommandOutput> {
        if self.success() {
            Ok(self)
        } else {
            Err(Error::operation(action, self.diagnostic()))
        }
    }
}

/// Narrow seam to the virtualization control plane
pub trait ControlPlane {
    fn run(&self, args: &[&str]) -> Result<CommandOutput>;
}

/// Production control plane: shells out to `virsh`
pub struct VirshControl {
    connect_uri: Option<String>,
}

impl VirshControl {
    pub fn new(connect_uri: Option<String>) -> Self {
        Self { connect_uri }
    }
}

impl ControlPlane for VirshControl {
    fn run(&self, args: &[&str]) -> Result<CommandOutput> {
        let mut cmd = Command::new("virsh");
        if let Some(uri) = &self.connect_uri {
            cmd.args(["-c", uri.as_str()]);
        }
        cmd.args(args);

        debug!("virsh invocation: {:?}", args);

        let output = cmd
            .output()
            .map_err(|e| Error::operation(args.join(" "), format!("failed to spawn virsh: {}", e)))?;

        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
