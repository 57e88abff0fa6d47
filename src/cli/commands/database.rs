use crate::cli::formatter::{print_stats_table, section_header, styled_table, success, warning};
use crate::index::ReferenceDatabaseBuilder;
use crate::metadata::MetadataClient;
use crate::tools::{Aligner, BlastAligner};
use anyhow::Context;
use clap::{Args, Subcommand};
use std::path::Path;
use std::sync::Arc;

#[derive(Args)]
pub struct DatabaseArgs {
    #[command(subcommand)]
    pub command: DatabaseCommands,
}

#[derive(Subcommand)]
pub enum DatabaseCommands {
    /// Build (or reuse) the reference database over the whole corpus
    Build,

    /// List published reference databases
    Status {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Remove leftovers of interrupted builds
    Clean,
}

pub async fn run(args: DatabaseArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = super::load_config(config_path)?;
    let aligner: Arc<dyn Aligner> = Arc::new(BlastAligner::new(&config.alignment));
    let builder = ReferenceDatabaseBuilder::new(config.database_dir(), aligner.clone());

    match args.command {
        DatabaseCommands::Build => {
            aligner
                .verify_installation()
                .context("BLAST+ is required to build the reference database")?;

            let client = MetadataClient::new(config.metadata.clone())?;
            let corpus = client
                .fetch_corpus()
                .await
                .context("Reference corpus is unavailable")?;

            let database = tokio::task::spawn_blocking(move || builder.ensure_database(&corpus)).await??;
            if database.reused {
                success("Reference database is up to date");
            } else {
                success("Reference database built");
            }
            print_stats_table(
                "Reference Database",
                vec![
                    ("Location", database.location.display().to_string()),
                    ("Sequences", database.fingerprint.sequence_count.to_string()),
                    ("Fingerprint", database.fingerprint.short().to_string()),
                    ("Index", database.index_prefix.display().to_string()),
                ],
            );
        }
        DatabaseCommands::Status { json } => {
            let databases = builder.status()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&databases)?);
                return Ok(());
            }
            if databases.is_empty() {
                warning(&format!("No reference database under {}", builder.root().display()));
                return Ok(());
            }

            section_header("Reference Databases");
            let mut table = styled_table(&["Fingerprint", "Sequences", "Built", "Aligner", "Index", "Current"]);
            for db in &databases {
                table.add_row(vec![
                    db.fingerprint.short().to_string(),
                    db.fingerprint.sequence_count.to_string(),
                    db.built_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                    db.aligner.clone(),
                    if db.index_complete { "complete" } else { "incomplete" }.to_string(),
                    if db.is_current { "*" } else { "" }.to_string(),
                ]);
            }
            println!("{}", table);
        }
        DatabaseCommands::Clean => {
            let removed = builder.cleanup_temp_dirs()?;
            success(&format!("Removed {} interrupted build(s)", removed));
        }
    }

    Ok(())
}
