//! Shared setup for the pipeline integration tests
//!
//! Every test gets its own temporary home so work, outbox and database
//! directories never leak between tests.
#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use plasticome::bio::fasta::parse_fasta;
use plasticome::core::{Config, ContainerStageConfig};
use plasticome::metadata::{CorpusSource, Enzyme, ReferenceCorpus, ReferenceProtein};
use plasticome::pipeline::{Notifier, Orchestrator, Outcome};
use plasticome::tools::{ContainerInvocation, FakeRuntime, MockAligner};
use plasticome::PlasticomeError;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

pub const CUTINASE_REFERENCE: &str = "sp|P11373|CUTI1";

pub struct TestEnvironment {
    _temp_dir: TempDir,
    pub root: PathBuf,
}

impl TestEnvironment {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let root = temp_dir.path().to_path_buf();
        TestEnvironment {
            _temp_dir: temp_dir,
            root,
        }
    }

    /// Configuration rooted in this environment with the given tools
    pub fn config(&self, tools: Vec<ContainerStageConfig>) -> Config {
        let mut config = Config::default();
        config.annotation = tools;
        config.pipeline.workers = 2;
        config.pipeline.work_dir = Some(self.root.join("work"));
        config.pipeline.outbox_dir = Some(self.root.join("outbox"));
        config.pipeline.cleanup_after_delivery = false;
        config.alignment.database_dir = Some(self.root.join("databases"));
        config
    }

    /// A submitted proteome, outside of the work directory
    pub fn proteome(&self) -> PathBuf {
        let path = self.root.join("uploads").join("genome.faa");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(
            &path,
            ">gene1 putative cutinase\nMKFFALTTLLAATASALPTSNPAQELEARQLGRTTRDDLINGNSASCADVIFIYARGSTETGNLGTLGPSIASNLESAFGKDGVWIQGVGGAYRATLGDNALPRGTSSAAIREMLGLFQQANTKCPDATLIAGGYSQGAALAAASIEDLDSAIRDKIAGTVLFGYTKNLQNRGRIPNYPADRTKVFCNTGDLVCTGSLIVAAPHLAYGPDARGPAPEFLIEKVRAVRGSA\n\
             >gene2 hypothetical protein\nMSSLLKKAVEELLRKHGIDTSAAPQAGSKLVAKLEEALRLG\n",
        )
        .unwrap();
        path
    }

    pub fn outbox(&self) -> PathBuf {
        self.root.join("outbox")
    }

    pub fn work_root(&self) -> PathBuf {
        self.root.join("work")
    }
}

/// Corpus with one cutinase: EC 3.1.1.74, CAZy CE5, degrades PET
pub fn cutinase_corpus() -> ReferenceCorpus {
    ReferenceCorpus::new(
        vec![Enzyme {
            id: 1,
            ec_number: Some("3.1.1.74".to_string()),
            cazy_family: Some("CE5".to_string()),
            plastics: vec!["PET".to_string()],
            reference: ReferenceProtein::parse(
                ">sp|P11373|CUTI1 Cutinase 1 MKFFALTTLLAATASALPTSNPAQELEARQLGRTTRDDLINGNSASC",
            ),
        }],
        vec!["PET".to_string(), "PE".to_string()],
    )
}

/// Canned tool predictions, keyed by protein id
#[derive(Debug, Clone, Default)]
pub struct ToolOutputs {
    /// (EC#, HMMER, eCAMI, DIAMOND)
    pub dbcan: HashMap<String, [String; 4]>,
    pub ecpred: HashMap<String, String>,
}

impl ToolOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dbcan(mut self, id: &str, ec: &str, hmmer: &str, ecami: &str, diamond: &str) -> Self {
        self.dbcan.insert(
            id.to_string(),
            [ec.to_string(), hmmer.to_string(), ecami.to_string(), diamond.to_string()],
        );
        self
    }

    pub fn with_ecpred(mut self, id: &str, ec: &str) -> Self {
        self.ecpred.insert(id.to_string(), ec.to_string());
        self
    }
}

fn mapped(invocation: &ContainerInvocation, idx: usize) -> Result<PathBuf, PlasticomeError> {
    invocation
        .args
        .get(idx)
        .and_then(|arg| invocation.host_path(arg))
        .ok_or_else(|| PlasticomeError::Tool(format!("argument {} is outside the mount", idx)))
}

fn write_overview(input: &Path, out_dir: &Path, outputs: &ToolOutputs) -> Result<(), PlasticomeError> {
    std::fs::create_dir_all(out_dir)?;
    let mut table = std::fs::File::create(out_dir.join("overview.txt"))?;
    writeln!(table, "Gene ID\tEC#\tHMMER\teCAMI\tDIAMOND\t#ofTools")?;
    for sequence in parse_fasta(input)? {
        if let Some([ec, hmmer, ecami, diamond]) = outputs.dbcan.get(&sequence.id) {
            let tools = [hmmer, ecami, diamond].iter().filter(|c| c.as_str() != "-").count();
            writeln!(table, "{}\t{}\t{}\t{}\t{}\t{}", sequence.id, ec, hmmer, ecami, diamond, tools)?;
        }
    }
    // dbCAN intermediates the filter removes
    std::fs::write(out_dir.join("hmmer.out"), "")?;
    std::fs::write(out_dir.join("uniInput"), "")?;
    Ok(())
}

fn write_ecpred(input: &Path, table_path: &Path, outputs: &ToolOutputs) -> Result<(), PlasticomeError> {
    if let Some(parent) = table_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut table = std::fs::File::create(table_path)?;
    writeln!(table, "Protein ID\tEC Number\tConfidence Score(max 1.0)")?;
    for sequence in parse_fasta(input)? {
        match outputs.ecpred.get(&sequence.id) {
            Some(ec) => writeln!(table, "{} {}\t{}\t0.61", sequence.id, sequence.description.as_deref().unwrap_or(""), ec)?,
            None => writeln!(table, "{}\tno Prediction\t0", sequence.id)?,
        }
    }
    Ok(())
}

/// Runtime that writes the canned outputs where the real containers would
pub fn fake_tools(outputs: ToolOutputs) -> Arc<FakeRuntime> {
    Arc::new(FakeRuntime::new(move |invocation| {
        if invocation.image.contains("dbcan") {
            write_overview(&mapped(invocation, 0)?, &mapped(invocation, 3)?, &outputs)
        } else if invocation.image.contains("ecpred") {
            write_ecpred(&mapped(invocation, 1)?, &mapped(invocation, 4)?, &outputs)
        } else {
            Err(PlasticomeError::Tool(format!("unexpected image {}", invocation.image)))
        }
    }))
}

/// Notifier that keeps every outcome it is handed
#[derive(Default)]
pub struct RecordingNotifier {
    outcomes: Mutex<Vec<Outcome>>,
}

impl RecordingNotifier {
    pub fn outcomes(&self) -> Vec<Outcome> {
        self.outcomes.lock().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn deliver(&self, outcome: &mut Outcome) -> Result<(), PlasticomeError> {
        self.outcomes.lock().push(outcome.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

pub struct Harness {
    pub orchestrator: Orchestrator,
    pub runtime: Arc<FakeRuntime>,
    pub aligner: Arc<MockAligner>,
    pub notifier: Arc<RecordingNotifier>,
}

pub fn harness(
    config: Config,
    runtime: Arc<FakeRuntime>,
    aligner: MockAligner,
    corpus: Arc<dyn CorpusSource>,
    extra_notifiers: Vec<Arc<dyn Notifier>>,
) -> Harness {
    let aligner = Arc::new(aligner);
    let notifier = Arc::new(RecordingNotifier::default());

    let mut builder = Orchestrator::builder(config)
        .with_runtime(runtime.clone())
        .with_aligner(aligner.clone())
        .with_corpus_source(corpus);
    for extra in extra_notifiers {
        builder = builder.with_notifier(extra);
    }
    let orchestrator = builder
        .with_notifier(notifier.clone())
        .build()
        .expect("orchestrator should start");

    Harness {
        orchestrator,
        runtime,
        aligner,
        notifier,
    }
}
