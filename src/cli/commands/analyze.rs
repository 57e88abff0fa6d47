use crate::cli::formatter::{failure, info, section_header, success, warning};
use crate::core::Topology;
use crate::pipeline::{AnalysisRequest, Orchestrator, StageResult};
use crate::report::{self, Format};
use clap::Args;
use std::path::{Path, PathBuf};

#[derive(Args)]
pub struct AnalyzeArgs {
    /// Protein FASTA to analyse
    pub sequence: PathBuf,

    /// Recipient of the result
    #[arg(long, env = "PLASTICOME_USER_EMAIL")]
    pub email: String,

    /// Recipient name
    #[arg(long)]
    pub name: String,

    /// Organism the proteome belongs to
    #[arg(long)]
    pub organism: Option<String>,

    /// Run annotation tools side by side instead of one after the other
    #[arg(long)]
    pub parallel: bool,

    /// Worker slots (overrides the configuration; 0 = all CPUs)
    #[arg(short = 'j', long)]
    pub workers: Option<usize>,

    /// Output format (text, json)
    #[arg(long, default_value = "text")]
    pub format: Format,

    /// Keep the working directory after delivery
    #[arg(long)]
    pub keep_work_dir: bool,
}

pub async fn run(args: AnalyzeArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let mut config = super::load_config(config_path)?;
    if args.parallel {
        config.pipeline.topology = Topology::Parallel;
    }
    if let Some(workers) = args.workers {
        config.pipeline.workers = workers;
    }
    if args.keep_work_dir {
        config.pipeline.cleanup_after_delivery = false;
    }

    let mut request = AnalysisRequest::new(args.email, args.name, args.sequence);
    if let Some(organism) = args.organism {
        request = request.with_organism(organism);
    }

    let orchestrator = Orchestrator::from_config(config)?;
    let pending = orchestrator.submit(request)?;
    info(&format!(
        "{} (request {})",
        pending.acknowledgement.message, pending.acknowledgement.request_id
    ));

    let outcome = pending.wait().await?;
    orchestrator.shutdown().await;
    match &outcome.result {
        StageResult::Success(report) => {
            if args.format == Format::Text {
                section_header("Result");
            }
            print!("{}", report::generate(report, args.format)?);
            if args.format == Format::Text {
                if report.is_positive() {
                    success(&format!(
                        "Results written to {}",
                        report.artifacts().results_dir.display()
                    ));
                } else {
                    warning("No plastic-degrading enzyme candidates found");
                }
            }
            Ok(())
        }
        StageResult::Failure(stage_failure) => {
            failure(&stage_failure.to_string());
            anyhow::bail!("analysis {} failed at stage {}", outcome.request_id, stage_failure.stage)
        }
    }
}
