//! Validate Command

use anyhow::Result;
use clap::Args;
use std::path::PathBuf;
use vmgate_gate::{validate_evidence, EvidenceSchema};

use crate::output::{print_error, print_report, print_success, OutputFormat};

#[derive(Args)]
pub struct ValidateArgs {
    /// Evidence directory to validate
    pub evidence_dir: PathBuf,

    /// Path to a JSON schema document (built-in defaults when omitted)
    #[arg(long)]
    pub schema: Option<PathBuf>,
}

pub fn execute(args: ValidateArgs, format: OutputFormat) -> Result<i32> {
    let schema = match &args.schema {
        Some(path) => EvidenceSchema::load(path)?,
        None => EvidenceSchema::default(),
    };

    let report = validate_evidence(&args.evidence_dir, &schema)?;
    print_report(&report, format, |r| {
        if r.passed() {
            print_success("evidence validated: gate PASS");
        } else {
            for failure in &r.failures {
                print_error(failure);
            }
            print_error("gate FAIL");
        }
    });
    Ok(report.exit_code())
}
