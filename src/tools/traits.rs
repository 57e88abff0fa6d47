/// Trait definitions for the alignment tool seam
///
/// The alignment engine and the reference database builder only talk to
/// an `Aligner`; BLAST+ is the production implementation and tests swap in
/// an in-process fake.
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One tabular (outfmt 6) similarity hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentHit {
    pub query_id: String,
    pub reference_id: String,
    pub identity: f64,
    pub alignment_length: usize,
    pub mismatches: usize,
    pub gap_opens: usize,
    pub query_start: usize,
    pub query_end: usize,
    pub subject_start: usize,
    pub subject_end: usize,
    pub evalue: f64,
    pub bit_score: f64,
}

/// Common interface for protein similarity search tools
pub trait Aligner: Send + Sync {
    /// Build a searchable index for `reference` under `index_prefix`
    fn build_index(&self, reference: &Path, index_prefix: &Path) -> Result<()>;

    /// Search `query` against the index, writing raw output to `output`
    fn search(&self, query: &Path, index_prefix: &Path, output: &Path) -> Result<Vec<AlignmentHit>>;

    /// Files that make up a built index; all must exist for the index to be usable
    fn index_files(&self, index_prefix: &Path) -> Vec<PathBuf>;

    /// Verify that the tool is properly installed
    fn verify_installation(&self) -> Result<()>;

    fn name(&self) -> &str;
}
