//! Run Command - the full gate sequence

use anyhow::Result;
use clap::Args;
use std::path::PathBuf;
use std::time::Duration;
use vmgate_gate::{run_gate, ControlPlane, GateRunConfig};

use crate::commands::preflight::default_firmware_dirs;
use crate::output::{print_error, print_success};

#[derive(Args)]
pub struct RunArgs {
    /// Domain (VM) name
    pub domain: String,

    /// Baseline snapshot name
    pub snapshot: String,

    /// Guest display endpoint as host:port
    #[arg(long)]
    pub display: Option<String>,

    /// Text typed into the guest to launch the application under test
    #[arg(long)]
    pub launch: String,

    /// Do not press enter after the launch text
    #[arg(long)]
    pub no_enter: bool,

    /// Milliseconds between keystrokes
    #[arg(long, default_value_t = 100)]
    pub delay_ms: i64,

    /// Evidence directory to assemble and validate
    #[arg(long)]
    pub evidence_dir: PathBuf,

    /// Path to a JSON schema document (built-in defaults when omitted)
    #[arg(long)]
    pub schema: Option<PathBuf>,

    /// Screen recording artifact to digest into the manifest
    #[arg(long)]
    pub artifact: PathBuf,

    /// Checklist document the operator fills in during the run
    #[arg(long)]
    pub checklist: PathBuf,

    /// Commit id of the build under test
    #[arg(long, env = "VMGATE_COMMIT")]
    pub commit: String,

    /// Operator name recorded in the manifest
    #[arg(long, env = "VMGATE_OPERATOR")]
    pub operator: String,

    /// VM platform recorded in the manifest
    #[arg(long, default_value = "kvm")]
    pub platform: String,

    /// Guest image id recorded in the manifest
    #[arg(long)]
    pub image_id: String,

    /// Guest Windows version recorded in the manifest
    #[arg(long)]
    pub windows_version: String,

    /// Path to the host meminfo document
    #[arg(long, default_value = "/proc/meminfo")]
    pub meminfo: PathBuf,

    /// Firmware search directories, in priority order
    #[arg(long = "firmware-dir", default_values_os_t = default_firmware_dirs())]
    pub firmware_dirs: Vec<PathBuf>,

    /// Minimum available host memory in KiB
    #[arg(long, default_value_t = 4 * 1024 * 1024)]
    pub min_available_kib: u64,

    /// Seconds to wait for the operator's checklist decision
    #[arg(long, default_value_t = 1800)]
    pub decision_timeout_secs: u64,

    /// Seconds between checklist polls
    #[arg(long, default_value_t = 5)]
    pub decision_poll_secs: u64,
}

impl From<RunArgs> for GateRunConfig {
    fn from(args: RunArgs) -> Self {
        GateRunConfig {
            domain: args.domain,
            snapshot: args.snapshot,
            display: args.display,
            launch_text: args.launch,
            press_enter: !args.no_enter,
            key_delay_ms: args.delay_ms,
            evidence_dir: args.evidence_dir,
            schema_path: args.schema,
            artifact: args.artifact,
            checklist: args.checklist,
            commit: args.commit,
            operator: args.operator,
            platform: args.platform,
            image_id: args.image_id,
            windows_version: args.windows_version,
            meminfo_path: args.meminfo,
            firmware_dirs: args.firmware_dirs,
            min_available_kib: args.min_available_kib,
            decision_timeout: Duration::from_secs(args.decision_timeout_secs),
            decision_poll: Duration::from_secs(args.decision_poll_secs),
        }
    }
}

pub fn execute<C: ControlPlane>(args: RunArgs, control: &C) -> Result<i32> {
    let cfg = GateRunConfig::from(args);
    let code = run_gate(control, &cfg)?;
    if code == 0 {
        print_success("gate PASS");
    } else {
        print_error("gate FAIL");
    }
    Ok(code)
}
