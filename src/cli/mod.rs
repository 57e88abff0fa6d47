pub mod commands;
pub mod formatter;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "plasticome",
    version,
    about = "Screen fungal proteomes for plastic-degrading enzymes",
    long_about = "Plasticome annotates a protein FASTA with containerized annotation tools \
                  (dbCAN, ECPred), keeps the predictions supported by a curated enzyme corpus, \
                  aligns the survivors against reference enzymes and reports which plastics \
                  they may degrade."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (defaults to PLASTICOME_HOME/config.toml)
    #[arg(short, long, global = true, env = "PLASTICOME_CONFIG")]
    pub config: Option<PathBuf>,

    /// Verbosity level (can be repeated)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the analysis pipeline on a protein FASTA
    Analyze(commands::analyze::AnalyzeArgs),

    /// Manage the reference alignment database
    Database(commands::database::DatabaseArgs),

    /// Show the configured pipeline stages
    Stages(commands::stages::StagesArgs),

    /// Manage the configuration file
    Config(commands::config::ConfigArgs),
}
