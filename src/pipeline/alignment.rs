//! Alignment engine: one search per surviving query against a reference
//! database scoped to the query's label, reduced to the best hit per
//! reference protein.

use crate::bio::annotation::AnnotationRecord;
use crate::bio::fasta::{parse_fasta, write_fasta};
use crate::index::ReferenceDatabaseBuilder;
use crate::metadata::{fetch_or_permissive, CorpusSource, ReferenceCorpus};
use crate::pipeline::filter::FilteredOutput;
use crate::pipeline::stage::StageResult;
use crate::proceed;
use crate::tools::{AlignmentHit, Aligner};
use crate::PlasticomeError;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

pub const ALIGNMENT_TABLE: &str = "blast_align.csv";
pub const STAGE_NAME: &str = "align";

/// One row of the emitted alignment table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentRow {
    pub query_id: String,
    pub reference_id: String,
    pub reference_name: String,
    pub identity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentOutput {
    pub table: PathBuf,
    pub rows: Vec<AlignmentRow>,
    /// Filtered annotations the alignment was run for
    pub records: Vec<AnnotationRecord>,
    /// Queries that had a reference database to search
    pub queries: usize,
    pub results_dir: PathBuf,
}

/// Keep the highest-scoring hit per reference id.
///
/// Hits are stable-sorted by bit score, descending, and the first hit seen
/// for each reference id survives, so ties keep their input order.
pub fn best_hits(mut hits: Vec<AlignmentHit>) -> Vec<AlignmentHit> {
    hits.sort_by(|a, b| b.bit_score.total_cmp(&a.bit_score));
    let mut seen = HashSet::new();
    hits.retain(|hit| seen.insert(hit.reference_id.clone()));
    hits
}

pub struct AlignmentEngine {
    builder: Arc<ReferenceDatabaseBuilder>,
    aligner: Arc<dyn Aligner>,
    corpus: Arc<dyn CorpusSource>,
}

impl AlignmentEngine {
    pub fn new(
        builder: Arc<ReferenceDatabaseBuilder>,
        aligner: Arc<dyn Aligner>,
        corpus: Arc<dyn CorpusSource>,
    ) -> Self {
        Self {
            builder,
            aligner,
            corpus,
        }
    }

    /// Align the filtered sequences; the table lands in `results_dir`
    pub async fn align(&self, input: StageResult<FilteredOutput>, results_dir: &Path) -> StageResult<AlignmentOutput> {
        let filtered = proceed!(input);
        if !filtered.sequence_file.is_file() {
            return StageResult::failure(
                STAGE_NAME,
                format!("expected sequence file {} is missing", filtered.sequence_file.display()),
            );
        }

        let corpus = fetch_or_permissive(self.corpus.as_ref()).await;
        let builder = self.builder.clone();
        let aligner = self.aligner.clone();
        let results_dir = results_dir.to_path_buf();

        let joined = tokio::task::spawn_blocking(move || {
            align_blocking(&builder, aligner.as_ref(), &corpus, filtered, &results_dir)
        })
        .await;

        match joined {
            Ok(result) => StageResult::from_result(STAGE_NAME, result),
            Err(e) => StageResult::failure(STAGE_NAME, format!("alignment task aborted: {}", e)),
        }
    }
}

/// First label of the record with reference proteins to search against
fn searchable_label<'a>(record: &'a AnnotationRecord, corpus: &ReferenceCorpus) -> Option<&'a str> {
    record.labels().into_iter().find(|label| {
        corpus
            .subset_for_label(label)
            .iter()
            .any(|enzyme| enzyme.reference.is_some())
    })
}

fn align_blocking(
    builder: &ReferenceDatabaseBuilder,
    aligner: &dyn Aligner,
    corpus: &ReferenceCorpus,
    filtered: FilteredOutput,
    results_dir: &Path,
) -> Result<AlignmentOutput, PlasticomeError> {
    std::fs::create_dir_all(results_dir)?;
    let records: HashMap<&str, &AnnotationRecord> =
        filtered.records.iter().map(|r| (r.id.as_str(), r)).collect();

    let mut raw_hits = Vec::new();
    let mut queries = 0;
    for sequence in parse_fasta(&filtered.sequence_file)? {
        let Some(record) = records.get(sequence.id.as_str()) else {
            continue;
        };
        let Some(label) = searchable_label(record, corpus) else {
            debug!(query = %sequence.id, "No reference proteins for query label");
            continue;
        };

        let database = builder.ensure_for_label(corpus, label)?;

        // Removed on drop, including when the search fails
        let scratch = tempfile::Builder::new()
            .prefix(".query_")
            .tempdir_in(results_dir)?;
        let query_path = scratch.path().join("query.fasta");
        write_fasta(&query_path, std::slice::from_ref(&sequence))?;
        let hits = aligner
            .search(&query_path, &database.index_prefix, &scratch.path().join("hits.tsv"))
            .map_err(|e| {
                PlasticomeError::Tool(format!("{} search for {} failed: {:#}", aligner.name(), sequence.id, e))
            })?;

        debug!(query = %sequence.id, label, hits = hits.len(), "Query aligned");
        raw_hits.extend(hits);
        queries += 1;
    }

    let raw = raw_hits.len();
    let rows: Vec<AlignmentRow> = best_hits(raw_hits)
        .into_iter()
        .map(|hit| AlignmentRow {
            reference_name: corpus
                .reference_name(&hit.reference_id)
                .unwrap_or(&hit.reference_id)
                .to_string(),
            query_id: hit.query_id,
            reference_id: hit.reference_id,
            identity: hit.identity,
        })
        .collect();

    let table = results_dir.join(ALIGNMENT_TABLE);
    let mut writer = csv::Writer::from_path(&table)?;
    for row in &rows {
        writer.serialize(row)?;
    }
    writer.flush()?;

    info!(queries, raw_hits = raw, kept = rows.len(), table = %table.display(), "Alignment finished");

    Ok(AlignmentOutput {
        table,
        rows,
        records: filtered.records,
        queries,
        results_dir: results_dir.to_path_buf(),
    })
}
