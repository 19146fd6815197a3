//! Baseline and Reset Commands

use anyhow::Result;
use clap::Args;
use std::time::Duration;
use vmgate_common::EXIT_PASS;
use vmgate_gate::{ControlPlane, SnapshotLifecycle};

use crate::output::print_success;

#[derive(Args)]
pub struct BaselineArgs {
    /// Domain (VM) name
    pub domain: String,

    /// Snapshot name to create
    pub snapshot: String,

    /// Seconds to wait for the guest to shut off
    #[arg(long, default_value_t = 180)]
    pub timeout_secs: u64,

    /// Seconds between shutdown-state polls
    #[arg(long, default_value_t = 5)]
    pub poll_secs: u64,
}

#[derive(Args)]
pub struct ResetArgs {
    /// Domain (VM) name
    pub domain: String,

    /// Baseline snapshot name to revert to
    pub snapshot: String,
}

pub fn baseline<C: ControlPlane>(args: BaselineArgs, control: &C) -> Result<i32> {
    let lifecycle = SnapshotLifecycle::new(control, args.domain.clone());
    lifecycle.create_baseline(
        &args.snapshot,
        Duration::from_secs(args.timeout_secs),
        Duration::from_secs(args.poll_secs),
    )?;
    print_success(&format!(
        "baseline snapshot '{}' created for domain '{}'",
        args.snapshot, args.domain
    ));
    Ok(EXIT_PASS)
}

pub fn reset<C: ControlPlane>(args: ResetArgs, control: &C) -> Result<i32> {
    let lifecycle = SnapshotLifecycle::new(control, args.domain.clone());
    lifecycle.reset_to_baseline(&args.snapshot)?;
    print_success(&format!(
        "domain '{}' running at baseline '{}'",
        args.domain, args.snapshot
    ));
    Ok(EXIT_PASS)
}
