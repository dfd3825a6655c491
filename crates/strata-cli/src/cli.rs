use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "strata",
    about = "Strata: partitioned, chain-of-trust data repository",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Node configuration file (TOML)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run a node through writes, a conflict, a deletion and forced maintenance
    Demo(DemoArgs),
    /// Replay every partition log in a directory and summarise it
    Inspect(InspectArgs),
    /// Print the effective configuration
    Config(ConfigArgs),
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum Mode {
    Ram,
    Log,
}

#[derive(Args)]
pub struct DemoArgs {
    #[arg(long, value_enum)]
    pub mode: Option<Mode>,
    /// Directory for partition logs in log mode
    #[arg(long)]
    pub dir: Option<PathBuf>,
    /// Number of child objects written under the demo root
    #[arg(short = 'n', long, default_value = "3")]
    pub children: usize,
}

#[derive(Args)]
pub struct InspectArgs {
    pub dir: PathBuf,
}

#[derive(Args)]
pub struct ConfigArgs {
    /// Also check that the configuration is usable
    #[arg(long)]
    pub validate: bool,
}
