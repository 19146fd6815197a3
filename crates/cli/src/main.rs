//! vmgate CLI - Main Entry Point
//!
//! Command-line interface for the release-acceptance gate: host
//! preflight, baseline snapshots, guest input injection, evidence
//! validation, and the full gate run.

use clap::{Parser, Subcommand};

mod commands;
mod output;

use commands::{lifecycle, preflight, run, typetext, validate};
use vmgate_common::EXIT_FATAL;
use vmgate_gate::VirshControl;

/// vmgate - release-acceptance gate for KVM guest testing
#[derive(Parser)]
#[command(name = "vmgate")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Control-plane connection URI
    #[arg(long, env = "VMGATE_CONNECT", global = true)]
    connect: Option<String>,

    /// Output format
    #[arg(long, default_value = "plain", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Probe host capabilities (memory, firmware, domain features)
    Preflight(preflight::PreflightArgs),

    /// Shut a domain down and create the baseline snapshot
    Baseline(lifecycle::BaselineArgs),

    /// Revert a domain to its baseline and start it
    Reset(lifecycle::ResetArgs),

    /// Type text into a domain's focused input
    Type(typetext::TypeArgs),

    /// Validate an evidence directory
    Validate(validate::ValidateArgs),

    /// Execute the full gate run
    Run(run::RunArgs),

    /// Show version information
    Version,
}

fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .init();

    let control = VirshControl::new(cli.connect.clone());

    let result = match cli.command {
        Commands::Preflight(args) => preflight::execute(args, &control, cli.format),
        Commands::Baseline(args) => lifecycle::baseline(args, &control),
        Commands::Reset(args) => lifecycle::reset(args, &control),
        Commands::Type(args) => typetext::execute(args, &control),
        Commands::Validate(args) => validate::execute(args, cli.format),
        Commands::Run(args) => run::execute(args, &control),
        Commands::Version => {
            println!("vmgate v{}", vmgate_common::VERSION);
            Ok(0)
        }
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            output::print_error(&format!("{:#}", e));
            std::process::exit(EXIT_FATAL);
        }
    }
}
