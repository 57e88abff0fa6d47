//! Annotation stage: runs one containerized tool over a sequence file.
//!
//! Mount, input and output placeholders in the tool's argument template are
//! filled per invocation; failed runs are retried with a fixed delay.

use crate::core::{AnnotationTool, ContainerStageConfig};
use crate::pipeline::stage::StageResult;
use crate::proceed;
use crate::tools::{ContainerInvocation, ContainerRuntime};
use crate::PlasticomeError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Where an annotation tool left its raw output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationOutput {
    pub tool: AnnotationTool,
    pub output_dir: PathBuf,
    /// Raw result table the matching filter reads
    pub table: PathBuf,
    /// Sequence file the tool annotated
    pub sequence_file: PathBuf,
}

/// Placeholder values for one invocation
#[derive(Debug, Clone)]
struct TemplateVars {
    mount: String,
    input: String,
    input_stem: String,
    output: String,
}

impl TemplateVars {
    fn render(&self, template: &str) -> String {
        template
            .replace("{mount}", &self.mount)
            .replace("{input_stem}", &self.input_stem)
            .replace("{input}", &self.input)
            .replace("{output}", &self.output)
    }
}

/// Runs one containerized annotation tool
pub struct AnnotationExecutor {
    config: ContainerStageConfig,
    runtime: Arc<dyn ContainerRuntime>,
}

impl AnnotationExecutor {
    pub fn new(config: ContainerStageConfig, runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self { config, runtime }
    }

    pub fn tool(&self) -> AnnotationTool {
        self.config.tool
    }

    pub fn stage_name(&self) -> String {
        self.config.tool.name().to_string()
    }

    pub fn config(&self) -> &ContainerStageConfig {
        &self.config
    }

    /// Annotate `sequence_file`; an incoming failure is returned untouched
    pub async fn execute(&self, sequence_file: StageResult<PathBuf>) -> StageResult<AnnotationOutput> {
        let sequence_file = proceed!(sequence_file);
        let stage = self.stage_name();

        let (invocation, output) = match self.prepare(&sequence_file) {
            Ok(prepared) => prepared,
            Err(e) => return StageResult::failure(stage, e.to_string()),
        };

        let attempts = self.config.retry.max_attempts.max(1);
        for attempt in 1..=attempts {
            match self.runtime.run(&invocation).await {
                Ok(_) => {
                    info!(
                        tool = %self.config.tool,
                        output = %output.output_dir.display(),
                        "Annotation finished"
                    );
                    return StageResult::Success(output);
                }
                Err(e) if attempt < attempts => {
                    warn!(tool = %self.config.tool, attempt, error = %e, "Annotation attempt failed; retrying");
                    if self.config.retry.backoff_secs > 0 {
                        tokio::time::sleep(Duration::from_secs(self.config.retry.backoff_secs)).await;
                    }
                }
                Err(e) => {
                    return StageResult::failure(
                        stage,
                        format!("{} step failed: {}", self.config.tool, e),
                    );
                }
            }
        }

        StageResult::failure(stage, "annotation was never attempted")
    }

    /// Resolve templates and create the output directory on the host
    fn prepare(&self, sequence_file: &Path) -> Result<(ContainerInvocation, AnnotationOutput), PlasticomeError> {
        if !sequence_file.is_file() {
            return Err(PlasticomeError::Pipeline(format!(
                "sequence file {} not found",
                sequence_file.display()
            )));
        }

        let mount_source = sequence_file
            .parent()
            .ok_or_else(|| PlasticomeError::Pipeline("sequence file has no parent directory".to_string()))?
            .to_path_buf();
        let file_name = |p: &Path| p.file_name().map(|n| n.to_string_lossy().to_string());
        let mount = file_name(&mount_source)
            .ok_or_else(|| PlasticomeError::Pipeline("cannot mount the filesystem root".to_string()))?;
        let input = file_name(sequence_file)
            .ok_or_else(|| PlasticomeError::Pipeline("sequence file has no name".to_string()))?;
        let input_stem = input.split('.').next().unwrap_or(&input).to_string();

        let mut vars = TemplateVars {
            mount: mount.clone(),
            input,
            input_stem,
            output: String::new(),
        };
        vars.output = vars.render(&self.config.output_dir);

        let output_dir = mount_source.join(&vars.output);
        std::fs::create_dir_all(&output_dir)?;

        let invocation = ContainerInvocation {
            image: self.config.image.clone(),
            mount_target: format!("{}/{}", self.config.working_dir.trim_end_matches('/'), mount),
            mount_source,
            volume_mode: self.config.volume_mode.clone(),
            working_dir: self.config.working_dir.clone(),
            args: self.config.command.iter().map(|arg| vars.render(arg)).collect(),
            timeout: Duration::from_secs(self.config.timeout_secs),
        };

        let output = AnnotationOutput {
            tool: self.config.tool,
            table: output_dir.join(vars.render(&self.config.result_table)),
            output_dir,
            sequence_file: sequence_file.to_path_buf(),
        };

        Ok((invocation, output))
    }
}
