use crate::bio::fasta::parse_fasta;
use crate::tools::blast::parse_blast_tab;
use crate::tools::container::{ContainerInvocation, ContainerOutput, ContainerRuntime};
use crate::tools::traits::{AlignmentHit, Aligner};
use crate::PlasticomeError;
use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Clone)]
struct MockHit {
    reference_id: String,
    identity: f64,
    bit_score: f64,
}

/// Aligner that "indexes" by copying the reference FASTA and answers
/// searches from configured hits, restricted to references in the index
#[derive(Default)]
pub struct MockAligner {
    hits: HashMap<String, Vec<MockHit>>,
    index_failure: Option<String>,
    search_failure: Option<String>,
    index_builds: AtomicUsize,
    searched: Mutex<Vec<String>>,
}

impl MockAligner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report a hit of `query` against `reference`
    pub fn with_hit(mut self, query: &str, reference: &str, identity: f64, bit_score: f64) -> Self {
        self.hits.entry(query.to_string()).or_default().push(MockHit {
            reference_id: reference.to_string(),
            identity,
            bit_score,
        });
        self
    }

    pub fn with_index_failure(mut self, message: &str) -> Self {
        self.index_failure = Some(message.to_string());
        self
    }

    pub fn with_search_failure(mut self, message: &str) -> Self {
        self.search_failure = Some(message.to_string());
        self
    }

    /// Number of indexes built so far
    pub fn index_builds(&self) -> usize {
        self.index_builds.load(Ordering::SeqCst)
    }

    /// Query ids searched so far, in call order
    pub fn searched(&self) -> Vec<String> {
        self.searched.lock().clone()
    }

    fn index_file(index_prefix: &Path) -> PathBuf {
        let mut name = index_prefix.as_os_str().to_os_string();
        name.push(".mockdb");
        PathBuf::from(name)
    }
}

impl Aligner for MockAligner {
    fn build_index(&self, reference: &Path, index_prefix: &Path) -> Result<()> {
        if let Some(message) = &self.index_failure {
            anyhow::bail!("{}", message);
        }
        std::fs::copy(reference, Self::index_file(index_prefix))?;
        self.index_builds.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn search(&self, query: &Path, index_prefix: &Path, output: &Path) -> Result<Vec<AlignmentHit>> {
        let queries = parse_fasta(query)?;
        self.searched
            .lock()
            .extend(queries.iter().map(|q| q.id.clone()));
        if let Some(message) = &self.search_failure {
            anyhow::bail!("{}", message);
        }

        let references: HashSet<String> = parse_fasta(Self::index_file(index_prefix))?
            .into_iter()
            .map(|s| s.id)
            .collect();

        let mut out = std::fs::File::create(output)?;
        for q in &queries {
            for hit in self.hits.get(&q.id).into_iter().flatten() {
                if references.contains(&hit.reference_id) {
                    writeln!(
                        out,
                        "{}\t{}\t{:.2}\t100\t0\t0\t1\t100\t1\t100\t1e-30\t{:.1}",
                        q.id, hit.reference_id, hit.identity, hit.bit_score
                    )?;
                }
            }
        }
        drop(out);

        parse_blast_tab(output)
    }

    fn index_files(&self, index_prefix: &Path) -> Vec<PathBuf> {
        vec![Self::index_file(index_prefix)]
    }

    fn verify_installation(&self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

type Handler = dyn Fn(&ContainerInvocation) -> Result<(), PlasticomeError> + Send + Sync;

/// Container runtime that runs a closure instead of a container
pub struct FakeRuntime {
    handler: Box<Handler>,
    calls: Mutex<Vec<ContainerInvocation>>,
}

impl FakeRuntime {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&ContainerInvocation) -> Result<(), PlasticomeError> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        let message = message.to_string();
        Self::new(move |_| Err(PlasticomeError::Tool(message.clone())))
    }

    pub fn calls(&self) -> Vec<ContainerInvocation> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn run(&self, invocation: &ContainerInvocation) -> Result<ContainerOutput, PlasticomeError> {
        self.calls.lock().push(invocation.clone());
        (self.handler)(invocation)?;
        Ok(ContainerOutput::default())
    }

    fn name(&self) -> &str {
        "fake"
    }
}
