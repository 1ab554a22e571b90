use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "tidemark",
    about = "Tidemark: ledger-anchored DID operations",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Validate a node configuration file
    CheckConfig(CheckConfigArgs),
    /// Show the protocol version in force at a ledger time
    VersionAt(VersionAtArgs),
    /// Run a node against an in-memory ledger and CAS
    Demo(DemoArgs),
}

#[derive(Args)]
pub struct CheckConfigArgs {
    pub path: PathBuf,
}

#[derive(Args)]
pub struct VersionAtArgs {
    pub path: PathBuf,
    #[arg(long)]
    pub time: u64,
}

#[derive(Args)]
pub struct DemoArgs {
    /// DIDs to create
    #[arg(short = 'n', long, default_value = "3")]
    pub operations: usize,
    /// Reorganize the ledger under an anchored batch and show the recovery
    #[arg(long)]
    pub fork: bool,
    /// Optional node configuration; defaults apply otherwise
    #[arg(long)]
    pub config: Option<PathBuf>,
}
