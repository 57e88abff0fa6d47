//! Aggregator: turns the alignment table and the filtered annotations into
//! the terminal report of a run.

use crate::metadata::{fetch_or_permissive, CorpusSource, ReferenceCorpus};
use crate::pipeline::alignment::{AlignmentOutput, AlignmentRow};
use crate::pipeline::stage::StageResult;
use crate::proceed;
use crate::report::text;
use crate::PlasticomeError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

pub const STAGE_NAME: &str = "aggregate";
pub const REPORT_JSON: &str = "report.json";
pub const REPORT_TEXT: &str = "report.txt";

/// One protein and the plastic categories its annotation is associated with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnzymeFinding {
    pub protein_id: String,
    pub labels: Vec<String>,
    pub plastics: Vec<String>,
}

/// Files a report refers to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportArtifacts {
    pub results_dir: PathBuf,
    pub alignment_table: Option<PathBuf>,
    pub report_json: PathBuf,
    pub report_text: PathBuf,
}

impl ReportArtifacts {
    fn in_dir(results_dir: &Path, alignment_table: Option<PathBuf>) -> Self {
        Self {
            results_dir: results_dir.to_path_buf(),
            alignment_table,
            report_json: results_dir.join(REPORT_JSON),
            report_text: results_dir.join(REPORT_TEXT),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Report {
    Positive {
        findings: Vec<EnzymeFinding>,
        /// Plastic categories the corpus covers
        categories: Vec<String>,
        alignments: Vec<AlignmentRow>,
        artifacts: ReportArtifacts,
    },
    Negative {
        message: String,
        categories: Vec<String>,
        artifacts: ReportArtifacts,
    },
}

impl Report {
    pub fn is_positive(&self) -> bool {
        matches!(self, Report::Positive { .. })
    }

    pub fn categories(&self) -> &[String] {
        match self {
            Report::Positive { categories, .. } | Report::Negative { categories, .. } => categories,
        }
    }

    pub fn artifacts(&self) -> &ReportArtifacts {
        match self {
            Report::Positive { artifacts, .. } | Report::Negative { artifacts, .. } => artifacts,
        }
    }

    /// Point artifact paths under `to` after the results directory moved from `from`
    pub fn relocate(&mut self, from: &Path, to: &Path) {
        let artifacts = match self {
            Report::Positive { artifacts, .. } | Report::Negative { artifacts, .. } => artifacts,
        };
        let rebase = |path: &mut PathBuf| {
            if let Ok(relative) = path.strip_prefix(from) {
                *path = to.join(relative);
            }
        };
        rebase(&mut artifacts.results_dir);
        rebase(&mut artifacts.report_json);
        rebase(&mut artifacts.report_text);
        if let Some(table) = artifacts.alignment_table.as_mut() {
            rebase(table);
        }
    }
}

/// Fixed explanation sent when no enzyme relates to a known plastic
pub fn negative_message(categories: &[String]) -> String {
    let covered = if categories.is_empty() {
        "none (the reference corpus was unavailable)".to_string()
    } else {
        categories.join(", ")
    };
    format!(
        "The enzyme analysis for plastic degradation is complete. The analysis currently \
         covers the following plastic types: {}.\n\n\
         No enzyme found in this analysis has an identifiable relation to these plastic \
         types. Research in this field keeps evolving and new evidence may change this \
         result in the future.",
        covered
    )
}

/// Protein id to plastic categories, in record order; proteins without any
/// associated category are left out
fn plastic_mapping(alignment: &AlignmentOutput, corpus: &ReferenceCorpus) -> IndexMap<String, EnzymeFinding> {
    let mut mapping = IndexMap::new();
    for record in &alignment.records {
        let plastics: BTreeSet<String> = record
            .labels()
            .into_iter()
            .flat_map(|label| corpus.plastics_for_label(label))
            .collect();
        if plastics.is_empty() {
            continue;
        }
        mapping.insert(
            record.id.clone(),
            EnzymeFinding {
                protein_id: record.id.clone(),
                labels: record.labels().into_iter().map(str::to_string).collect(),
                plastics: plastics.into_iter().collect(),
            },
        );
    }
    mapping
}

pub struct Aggregator {
    corpus: Arc<dyn CorpusSource>,
}

impl Aggregator {
    pub fn new(corpus: Arc<dyn CorpusSource>) -> Self {
        Self { corpus }
    }

    /// `None` marks a run whose filtering left nothing to align
    pub async fn aggregate(&self, input: StageResult<Option<AlignmentOutput>>, results_dir: &Path) -> StageResult<Report> {
        let alignment = proceed!(input);
        let corpus = fetch_or_permissive(self.corpus.as_ref()).await;
        StageResult::from_result(STAGE_NAME, build_report(alignment, &corpus, results_dir))
    }
}

fn build_report(
    alignment: Option<AlignmentOutput>,
    corpus: &ReferenceCorpus,
    results_dir: &Path,
) -> Result<Report, PlasticomeError> {
    std::fs::create_dir_all(results_dir)?;
    let categories: Vec<String> = corpus.categories().iter().cloned().collect();

    let report = match alignment {
        Some(alignment) => {
            let mapping = plastic_mapping(&alignment, corpus);
            let artifacts = ReportArtifacts::in_dir(results_dir, Some(alignment.table.clone()));
            if mapping.is_empty() {
                Report::Negative {
                    message: negative_message(&categories),
                    categories,
                    artifacts,
                }
            } else {
                Report::Positive {
                    findings: mapping.into_values().collect(),
                    categories,
                    alignments: alignment.rows,
                    artifacts,
                }
            }
        }
        None => Report::Negative {
            message: negative_message(&categories),
            categories,
            artifacts: ReportArtifacts::in_dir(results_dir, None),
        },
    };

    let artifacts = report.artifacts();
    let json = std::fs::File::create(&artifacts.report_json)?;
    serde_json::to_writer_pretty(json, &report)?;
    std::fs::write(&artifacts.report_text, text::render(&report)?)?;

    info!(
        positive = report.is_positive(),
        categories = report.categories().len(),
        results = %artifacts.results_dir.display(),
        "Report written"
    );
    Ok(report)
}
