//! Type Command

use anyhow::Result;
use clap::Args;
use vmgate_common::EXIT_PASS;
use vmgate_gate::{keystroke, ControlPlane};

use crate::output::print_success;

#[derive(Args)]
pub struct TypeArgs {
    /// Domain (VM) name
    pub domain: String,

    /// Text to type into the guest's focused input
    pub text: String,

    /// Press enter after the text
    #[arg(long)]
    pub enter: bool,

    /// Milliseconds to pause between keystrokes
    #[arg(long, default_value_t = 100)]
    pub delay_ms: i64,
}

pub fn execute<C: ControlPlane>(args: TypeArgs, control: &C) -> Result<i32> {
    keystroke::type_text(control, &args.domain, &args.text, args.enter, args.delay_ms)?;
    print_success(&format!(
        "typed {} characters into domain '{}'",
        args.text.chars().count(),
        args.domain
    ));
    Ok(EXIT_PASS)
}
