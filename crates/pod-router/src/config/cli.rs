use clap::Parser;
use clap::Subcommand;

use crate::config::run::RunArgs;

#[derive(Parser)]
#[command(about, long_about, version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Watch pods and route their events to registered clusters
    Run(Box<RunArgs>),
}
