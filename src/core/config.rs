//! Configuration types for Plasticome

use crate::PlasticomeError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default = "default_annotation_stages")]
    pub annotation: Vec<ContainerStageConfig>,
    #[serde(default)]
    pub alignment: AlignmentConfig,
}

/// Connection to the reference metadata service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub secret: String,
    #[serde(default = "default_metadata_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topology {
    /// Annotation tools run one after the other, each on the previous filter's output
    Sequential,
    /// Annotation branches run side by side on the request input and join before alignment
    Parallel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_topology")]
    pub topology: Topology,
    /// Worker slots consuming stage jobs (0 = all available CPUs)
    #[serde(default)]
    pub workers: usize,
    /// Root of per-request working directories (None = PLASTICOME_HOME/work)
    #[serde(default)]
    pub work_dir: Option<PathBuf>,
    /// Delivery outbox (None = PLASTICOME_HOME/outbox)
    #[serde(default)]
    pub outbox_dir: Option<PathBuf>,
    /// Remove the request working directory once the outcome is delivered
    #[serde(default = "default_cleanup_after_delivery")]
    pub cleanup_after_delivery: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationTool {
    Dbcan,
    Ecpred,
}

impl AnnotationTool {
    pub fn name(&self) -> &'static str {
        match self {
            AnnotationTool::Dbcan => "dbcan",
            AnnotationTool::Ecpred => "ecpred",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            AnnotationTool::Dbcan => "DBCAN",
            AnnotationTool::Ecpred => "ECPRED",
        }
    }
}

impl std::fmt::Display for AnnotationTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl std::str::FromStr for AnnotationTool {
    type Err = PlasticomeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dbcan" | "run_dbcan" => Ok(AnnotationTool::Dbcan),
            "ecpred" => Ok(AnnotationTool::Ecpred),
            _ => Err(PlasticomeError::Config(format!("Unknown annotation tool: {}", s))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default)]
    pub backoff_secs: u64,
}

/// One containerized annotation tool.
///
/// `command`, `output_dir` and `result_table` are templates; the executor
/// substitutes `{mount}` (name of the mounted directory), `{input}` (input
/// file name), `{input_stem}` (input file name up to its first dot) and
/// `{output}` (resolved output directory name).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerStageConfig {
    pub tool: AnnotationTool,
    pub image: String,
    #[serde(default = "default_runtime")]
    pub runtime: String,
    #[serde(default = "default_volume_mode")]
    pub volume_mode: String,
    #[serde(default = "default_container_workdir")]
    pub working_dir: String,
    pub command: Vec<String>,
    pub output_dir: String,
    pub result_table: String,
    /// Intermediate files the filter deletes from the output directory
    #[serde(default)]
    pub scratch_files: Vec<String>,
    #[serde(default = "default_container_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlignmentConfig {
    #[serde(default = "default_blastp")]
    pub blastp: PathBuf,
    #[serde(default = "default_makeblastdb")]
    pub makeblastdb: PathBuf,
    #[serde(default = "default_evalue")]
    pub evalue: f64,
    #[serde(default = "default_max_target_seqs")]
    pub max_target_seqs: usize,
    #[serde(default = "default_threads")]
    pub threads: usize,
    #[serde(default = "default_alignment_timeout")]
    pub timeout_secs: u64,
    /// Reference database root (None = PLASTICOME_HOME/databases)
    #[serde(default)]
    pub database_dir: Option<PathBuf>,
}

// Default value functions
fn default_base_url() -> String { "http://localhost:8000".to_string() }
fn default_metadata_timeout() -> u64 { 60 }
fn default_topology() -> Topology { Topology::Sequential }
fn default_cleanup_after_delivery() -> bool { true }
fn default_max_attempts() -> u32 { 1 }
fn default_runtime() -> String { "docker".to_string() }
fn default_volume_mode() -> String { "rw".to_string() }
fn default_container_workdir() -> String { "/app".to_string() }
fn default_container_timeout() -> u64 { 4 * 60 * 60 }
fn default_blastp() -> PathBuf { PathBuf::from("blastp") }
fn default_makeblastdb() -> PathBuf { PathBuf::from("makeblastdb") }
fn default_evalue() -> f64 { 1e-5 }
fn default_max_target_seqs() -> usize { 500 }
fn default_threads() -> usize { 1 }
fn default_alignment_timeout() -> u64 { 60 * 60 }

fn default_annotation_stages() -> Vec<ContainerStageConfig> {
    vec![ContainerStageConfig::dbcan(), ContainerStageConfig::ecpred()]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            metadata: MetadataConfig::default(),
            pipeline: PipelineConfig::default(),
            annotation: default_annotation_stages(),
            alignment: AlignmentConfig::default(),
        }
    }
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            username: String::new(),
            secret: String::new(),
            timeout_secs: default_metadata_timeout(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            topology: default_topology(),
            workers: 0,
            work_dir: None,
            outbox_dir: None,
            cleanup_after_delivery: default_cleanup_after_delivery(),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_secs: 0,
        }
    }
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            blastp: default_blastp(),
            makeblastdb: default_makeblastdb(),
            evalue: default_evalue(),
            max_target_seqs: default_max_target_seqs(),
            threads: default_threads(),
            timeout_secs: default_alignment_timeout(),
            database_dir: None,
        }
    }
}

impl ContainerStageConfig {
    pub fn dbcan() -> Self {
        Self {
            tool: AnnotationTool::Dbcan,
            image: "haidyi/run_dbcan:latest".to_string(),
            runtime: default_runtime(),
            volume_mode: default_volume_mode(),
            working_dir: default_container_workdir(),
            command: vec![
                "./{mount}/{input}".to_string(),
                "protein".to_string(),
                "--out_dir".to_string(),
                "./{mount}/{output}".to_string(),
            ],
            output_dir: "{input_stem}_dbcan_output".to_string(),
            result_table: "overview.txt".to_string(),
            scratch_files: vec![
                "diamond.out".to_string(),
                "hmmer.out".to_string(),
                "eCAMI.out".to_string(),
                "uniInput".to_string(),
            ],
            timeout_secs: default_container_timeout(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn ecpred() -> Self {
        Self {
            tool: AnnotationTool::Ecpred,
            image: "blueevee/ecpred:latest".to_string(),
            runtime: default_runtime(),
            volume_mode: default_volume_mode(),
            working_dir: default_container_workdir(),
            command: vec![
                "spmap".to_string(),
                "./{mount}/{input}".to_string(),
                "./".to_string(),
                "/temp".to_string(),
                "./{mount}/{output}/{output}.tsv".to_string(),
            ],
            output_dir: "{input_stem}_ecpred_output".to_string(),
            result_table: "{output}.tsv".to_string(),
            scratch_files: Vec::new(),
            timeout_secs: default_container_timeout(),
            retry: RetryPolicy::default(),
        }
    }
}

impl Config {
    /// Load from an explicit path, the default location, or fall back to defaults.
    /// Environment overrides are applied last.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, PlasticomeError> {
        let mut config = match path {
            Some(p) => load_config(p)?,
            None => {
                let default_path = crate::core::paths::config_path();
                if default_path.exists() {
                    load_config(&default_path)?
                } else {
                    Config::default()
                }
            }
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("PLASTICOME_METADATA_URL") {
            self.metadata.base_url = url;
        }
        if let Ok(user) = std::env::var("PLASTICOME_USER") {
            self.metadata.username = user;
        }
        if let Ok(secret) = std::env::var("PLASTICOME_PASSWORD") {
            self.metadata.secret = secret;
        }
    }

    pub fn validate(&self) -> Result<(), PlasticomeError> {
        if self.annotation.is_empty() {
            return Err(PlasticomeError::Config(
                "at least one [[annotation]] stage is required".to_string(),
            ));
        }
        for stage in &self.annotation {
            if stage.image.trim().is_empty() {
                return Err(PlasticomeError::Config(format!("{} stage has no image", stage.tool)));
            }
            if stage.command.is_empty() {
                return Err(PlasticomeError::Config(format!("{} stage has no command", stage.tool)));
            }
            if stage.retry.max_attempts == 0 {
                return Err(PlasticomeError::Config(format!(
                    "{} stage retry.max_attempts must be at least 1",
                    stage.tool
                )));
            }
        }
        Ok(())
    }

    pub fn work_dir(&self) -> PathBuf {
        self.pipeline
            .work_dir
            .clone()
            .unwrap_or_else(crate::core::paths::plasticome_work_dir)
    }

    pub fn outbox_dir(&self) -> PathBuf {
        self.pipeline
            .outbox_dir
            .clone()
            .unwrap_or_else(crate::core::paths::plasticome_outbox_dir)
    }

    pub fn database_dir(&self) -> PathBuf {
        self.alignment
            .database_dir
            .clone()
            .unwrap_or_else(crate::core::paths::plasticome_databases_dir)
    }

    pub fn worker_count(&self) -> usize {
        if self.pipeline.workers == 0 {
            num_cpus::get()
        } else {
            self.pipeline.workers
        }
    }
}

pub fn default_config() -> Config {
    Config::default()
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, PlasticomeError> {
    let contents = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&contents)
        .map_err(|e| PlasticomeError::Config(format!("Failed to parse config: {}", e)))?;
    Ok(config)
}

pub fn save_config<P: AsRef<Path>>(path: P, config: &Config) -> Result<(), PlasticomeError> {
    let contents = toml::to_string_pretty(config)
        .map_err(|e| PlasticomeError::Config(format!("Failed to serialize config: {}", e)))?;
    std::fs::write(path, contents)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.pipeline.topology, Topology::Sequential);
        assert!(config.pipeline.cleanup_after_delivery);
        assert_eq!(config.annotation.len(), 2);
        assert_eq!(config.annotation[0].tool, AnnotationTool::Dbcan);
        assert_eq!(config.annotation[1].tool, AnnotationTool::Ecpred);
        assert_eq!(config.annotation[0].retry.max_attempts, 1);
        assert_eq!(config.alignment.blastp, PathBuf::from("blastp"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[pipeline]
topology = "parallel"
workers = 3

[metadata]
base_url = "https://metadata.example.org"
"#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.pipeline.topology, Topology::Parallel);
        assert_eq!(config.worker_count(), 3);
        assert_eq!(config.metadata.base_url, "https://metadata.example.org");
        assert_eq!(config.metadata.timeout_secs, 60);
        assert_eq!(config.annotation.len(), 2);
    }

    #[test]
    fn test_custom_annotation_stage() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[[annotation]]
tool = "ecpred"
image = "registry.local/ecpred:2"
command = ["spmap", "./{{mount}}/{{input}}"]
output_dir = "{{input_stem}}_ec"
result_table = "{{output}}.tsv"
timeout_secs = 30

[annotation.retry]
max_attempts = 3
backoff_secs = 2
"#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.annotation.len(), 1);
        let stage = &config.annotation[0];
        assert_eq!(stage.tool, AnnotationTool::Ecpred);
        assert_eq!(stage.runtime, "docker");
        assert_eq!(stage.timeout_secs, 30);
        assert_eq!(stage.retry, RetryPolicy { max_attempts: 3, backoff_secs: 2 });
    }

    #[test]
    fn test_validate_rejects_empty_pipeline() {
        let mut config = Config::default();
        config.annotation.clear();
        assert!(matches!(config.validate(), Err(PlasticomeError::Config(_))));

        let mut config = Config::default();
        config.annotation[0].retry.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_reload() {
        let file = NamedTempFile::new().unwrap();
        let mut config = Config::default();
        config.alignment.threads = 8;
        save_config(file.path(), &config).unwrap();

        let loaded = load_config(file.path()).unwrap();
        assert_eq!(loaded.alignment.threads, 8);
        assert_eq!(loaded.annotation[1].image, "blueevee/ecpred:latest");
    }

    #[test]
    fn test_tool_from_str() {
        assert_eq!("DBCAN".parse::<AnnotationTool>().unwrap(), AnnotationTool::Dbcan);
        assert_eq!("ecpred".parse::<AnnotationTool>().unwrap(), AnnotationTool::Ecpred);
        assert!("hmmer".parse::<AnnotationTool>().is_err());
    }
}
