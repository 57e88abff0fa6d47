use crate::cli::formatter::{section_header, styled_table};
use crate::core::{Config, Topology};
use crate::pipeline::{PipelinePlan, PlanStep, StageDescriptor, StageKind};
use clap::Args;
use std::path::Path;

#[derive(Args)]
pub struct StagesArgs {
    /// Show the parallel topology regardless of the configuration
    #[arg(long)]
    pub parallel: bool,

    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

fn detail(config: &Config, stage: &StageDescriptor) -> String {
    match stage.kind {
        StageKind::Annotate(idx) => config
            .annotation
            .get(idx)
            .map(|s| format!("{} via {}", s.image, s.runtime))
            .unwrap_or_default(),
        StageKind::Filter(idx) => config
            .annotation
            .get(idx)
            .map(|s| format!("rewrites {}", s.result_table))
            .unwrap_or_default(),
        StageKind::Align => config.alignment.blastp.display().to_string(),
        StageKind::Aggregate => "report.json, report.txt".to_string(),
        StageKind::Notify => config.outbox_dir().display().to_string(),
    }
}

pub fn run(args: StagesArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let mut config = super::load_config(config_path)?;
    if args.parallel {
        config.pipeline.topology = Topology::Parallel;
    }
    let plan = PipelinePlan::from_config(&config);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    section_header("Pipeline Stages");
    let mut table = styled_table(&["Step", "Stage", "Kind", "Detail"]);
    for (idx, step) in plan.steps().iter().enumerate() {
        match step {
            PlanStep::Stage(stage) => {
                table.add_row(vec![
                    (idx + 1).to_string(),
                    stage.name.clone(),
                    stage.kind.to_string(),
                    detail(&config, stage),
                ]);
            }
            PlanStep::Parallel(branches) => {
                for (branch, stages) in branches.iter().enumerate() {
                    for stage in stages {
                        table.add_row(vec![
                            format!("{}{}", idx + 1, (b'a' + branch as u8) as char),
                            stage.name.clone(),
                            stage.kind.to_string(),
                            detail(&config, stage),
                        ]);
                    }
                }
            }
        }
    }
    println!("{}", table);
    Ok(())
}
