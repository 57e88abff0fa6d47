use crate::cli::formatter::{info, success};
use crate::core::config::{default_config, save_config};
use crate::core::paths;
use clap::{Args, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Write the default configuration
    Init {
        /// Destination (defaults to the global --config path or PLASTICOME_HOME/config.toml)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration and directories
    Show,
}

pub fn run(args: ConfigArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    match args.command {
        ConfigCommands::Init { output, force } => {
            let target = output
                .or_else(|| config_path.map(Path::to_path_buf))
                .unwrap_or_else(paths::config_path);
            if target.exists() && !force {
                anyhow::bail!("{} already exists (use --force to overwrite)", target.display());
            }
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            save_config(&target, &default_config())?;
            success(&format!("Wrote default configuration to {}", target.display()));
        }
        ConfigCommands::Show => {
            let mut shown = super::load_config(config_path)?;
            info(&paths::describe_paths());
            println!();
            // Secrets stay out of the terminal
            if !shown.metadata.secret.is_empty() {
                shown.metadata.secret = "********".to_string();
            }
            print!("{}", toml::to_string_pretty(&shown)?);
        }
    }
    Ok(())
}
