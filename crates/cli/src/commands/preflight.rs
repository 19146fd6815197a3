//! Preflight Command

use anyhow::Result;
use clap::Args;
use std::path::PathBuf;
use vmgate_gate::preflight;
use vmgate_gate::ControlPlane;
use vmgate_common::EXIT_PASS;

use crate::output::{print_report, print_success, OutputFormat};

#[derive(Args)]
pub struct PreflightArgs {
    /// Path to the host meminfo document
    #[arg(long, default_value = "/proc/meminfo")]
    pub meminfo: PathBuf,

    /// Firmware search directories, in priority order
    #[arg(long = "firmware-dir", default_values_os_t = default_firmware_dirs())]
    pub firmware_dirs: Vec<PathBuf>,

    /// Minimum available host memory in KiB
    #[arg(long, default_value_t = 4 * 1024 * 1024)]
    pub min_available_kib: u64,
}

pub fn default_firmware_dirs() -> Vec<PathBuf> {
    vec![
        PathBuf::from("/usr/share/OVMF"),
        PathBuf::from("/usr/share/edk2/ovmf"),
    ]
}

pub fn execute<C: ControlPlane>(
    args: PreflightArgs,
    control: &C,
    format: OutputFormat,
) -> Result<i32> {
    let meminfo = std::fs::read_to_string(&args.meminfo)?;
    let caps_xml = control
        .run(&["domcapabilities"])?
        .into_result("domcapabilities")?
        .stdout;

    let report = preflight::capability_report(&meminfo, &args.firmware_dirs, &caps_xml)?;
    preflight::check_capabilities(&report, args.min_available_kib)?;

    print_report(&report, format, |r| {
        print_success(&format!(
            "host ok: {} KiB available of {} KiB",
            r.memory.available_kib, r.memory.total_kib
        ));
        println!(
            "firmware: {} + {} (secure boot: {})",
            r.firmware.code.display(),
            r.firmware.vars.display(),
            r.firmware.secure_boot
        );
        println!(
            "domain: secure loader {}, TPM {} (models: {:?}, backends: {:?})",
            r.domain.secure_loader_supported,
            r.domain.tpm_supported,
            r.domain.tpm_models,
            r.domain.tpm_backends
        );
    });
    Ok(EXIT_PASS)
}
