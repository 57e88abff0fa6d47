//! Result filters: join a tool's raw predictions against the reference
//! corpus and trim the companion sequence file to the surviving ids.

use crate::bio::annotation::{is_no_prediction, AnnotationRecord, AnnotationTable, Prediction};
use crate::bio::fasta::{parse_fasta, write_fasta};
use crate::core::{AnnotationTool, ContainerStageConfig};
use crate::metadata::{fetch_or_permissive, CorpusSource, ReferenceCorpus};
use crate::pipeline::annotation::AnnotationOutput;
use crate::pipeline::stage::StageResult;
use crate::proceed;
use crate::PlasticomeError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info};

pub const DBCAN_ID_COLUMN: &str = "Gene ID";
pub const DBCAN_EC_COLUMN: &str = "EC#";
/// Predictor columns in priority order
pub const DBCAN_PREDICTORS: [&str; 3] = ["HMMER", "eCAMI", "DIAMOND"];
pub const DBCAN_TOOL_COUNT_COLUMN: &str = "#ofTools";
pub const CAZYME_COLUMN: &str = "plasticome_cazyme";
pub const ECPRED_ID_COLUMN: &str = "Protein ID";
pub const ECPRED_EC_COLUMN: &str = "EC Number";

/// Filtered annotations and the trimmed sequence file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilteredOutput {
    pub tool: AnnotationTool,
    pub sequence_file: PathBuf,
    pub annotation_table: PathBuf,
    pub records: Vec<AnnotationRecord>,
    /// Filtering ran without a corpus and let everything through
    pub permissive: bool,
}

impl FilteredOutput {
    pub fn ids(&self) -> HashSet<String> {
        self.records.iter().map(|r| r.id.clone()).collect()
    }
}

/// Drop a parenthesised coordinate suffix: `GH5_7(23-300)` -> `GH5_7`
pub fn strip_coordinates(family: &str) -> String {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    let stripped = match PATTERN.get_or_init(|| Regex::new(r"\(.*\)").ok()) {
        Some(pattern) => pattern.replace_all(family, "").to_string(),
        None => family.to_string(),
    };
    stripped.trim().to_string()
}

/// First `+`-delimited family the corpus knows
fn first_known_family(cell: &str, corpus: &ReferenceCorpus) -> Option<String> {
    cell.split('+')
        .map(strip_coordinates)
        .find(|family| !family.is_empty() && corpus.match_family(family))
}

/// First `|`-delimited EC number the corpus knows
fn first_known_ec(cell: &str, corpus: &ReferenceCorpus) -> Option<String> {
    cell.split('|')
        .map(str::trim)
        .find(|ec| !ec.is_empty() && corpus.match_ec(ec))
        .map(str::to_string)
}

fn first_candidate(cell: &str, separator: char) -> Option<String> {
    if is_no_prediction(cell) {
        return None;
    }
    cell.split(separator)
        .map(strip_coordinates)
        .find(|c| !c.is_empty() && !is_no_prediction(c))
}

/// dbCAN overview filter. Returns the surviving records; the table is
/// rewritten with a `plasticome_cazyme` column replacing the predictors.
pub fn filter_dbcan(table: &mut AnnotationTable, corpus: &ReferenceCorpus) -> Result<Vec<AnnotationRecord>, PlasticomeError> {
    let id_col = table.column(DBCAN_ID_COLUMN)?;
    let ec_col = table.column(DBCAN_EC_COLUMN)?;
    let predictor_cols = DBCAN_PREDICTORS
        .iter()
        .map(|name| table.column(name).map(|idx| (*name, idx)))
        .collect::<Result<Vec<_>, _>>()?;

    let permissive = corpus.is_empty();
    let mut records = Vec::new();
    let mut cazymes = Vec::new();
    let mut ec_cells = Vec::new();
    let mut keep = Vec::with_capacity(table.len());

    for row in table.rows() {
        let mut record = AnnotationRecord::new(row[id_col].trim());
        record.predictions = predictor_cols
            .iter()
            .filter(|(_, idx)| !is_no_prediction(&row[*idx]))
            .map(|(name, idx)| Prediction {
                predictor: name.to_string(),
                value: row[*idx].trim().to_string(),
            })
            .collect();

        let (cazyme, ec) = if permissive {
            let cazyme = predictor_cols
                .iter()
                .find_map(|(_, idx)| first_candidate(&row[*idx], '+'));
            (cazyme, first_candidate(&row[ec_col], '|'))
        } else {
            let cazyme = predictor_cols
                .iter()
                .filter(|(_, idx)| !is_no_prediction(&row[*idx]))
                .find_map(|(_, idx)| first_known_family(&row[*idx], corpus));
            (cazyme, first_known_ec(&row[ec_col], corpus))
        };

        let kept = permissive || cazyme.is_some();
        keep.push(kept);
        if !kept {
            continue;
        }

        cazymes.push(cazyme.clone().unwrap_or_else(|| "-".to_string()));
        ec_cells.push(if permissive {
            row[ec_col].clone()
        } else {
            ec.clone().unwrap_or_else(|| "-".to_string())
        });
        record.label = cazyme;
        record.ec_number = ec;
        records.push(record);
    }

    let mut flags = keep.into_iter();
    table.retain_rows(|_| flags.next().unwrap_or(false));
    for (row, ec) in ec_cells.into_iter().enumerate() {
        table.set_cell(row, ec_col, ec);
    }
    table.push_column(CAZYME_COLUMN, cazymes);
    let mut dropped = vec![DBCAN_TOOL_COUNT_COLUMN];
    dropped.extend(DBCAN_PREDICTORS);
    table.drop_columns(&dropped);

    Ok(records)
}

/// ECPred filter: one EC candidate per protein; rejected rows are removed.
/// An empty corpus keeps every row, as for dbCAN. Rows without a protein id
/// stay in the table but yield no record.
pub fn filter_ecpred(table: &mut AnnotationTable, corpus: &ReferenceCorpus) -> Result<Vec<AnnotationRecord>, PlasticomeError> {
    let id_col = table.column(ECPRED_ID_COLUMN)?;
    let ec_col = table.column(ECPRED_EC_COLUMN)?;
    let permissive = corpus.is_empty();

    let mut records = Vec::new();
    let mut keep = Vec::with_capacity(table.len());
    for row in table.rows() {
        let id = row[id_col].split_whitespace().next().unwrap_or_default();
        let ec = row[ec_col].trim();
        let known = !is_no_prediction(ec) && corpus.match_ec(ec);
        keep.push(permissive || (known && !id.is_empty()));
        if id.is_empty() || !(permissive || known) {
            continue;
        }

        let mut record = AnnotationRecord::new(id);
        if !is_no_prediction(ec) {
            record.predictions.push(Prediction {
                predictor: ECPRED_EC_COLUMN.to_string(),
                value: ec.to_string(),
            });
            record.label = Some(ec.to_string());
        }
        records.push(record);
    }

    let mut flags = keep.into_iter();
    table.retain_rows(|_| flags.next().unwrap_or(false));
    Ok(records)
}

/// Filtered FASTA location: the tool output directory, same file name as the input
fn filtered_sequence_path(output: &AnnotationOutput) -> Result<PathBuf, PlasticomeError> {
    let name = output
        .sequence_file
        .file_name()
        .ok_or_else(|| PlasticomeError::Pipeline("sequence file has no name".to_string()))?;
    Ok(output.output_dir.join(name))
}

/// Write the sequences whose id survived into `target`; returns how many were kept
pub fn write_surviving_sequences(source: &Path, target: &Path, ids: &HashSet<String>) -> Result<usize, PlasticomeError> {
    let kept: Vec<_> = parse_fasta(source)?
        .into_iter()
        .filter(|seq| ids.contains(&seq.id))
        .collect();
    write_fasta(target, &kept)?;
    Ok(kept.len())
}

fn remove_scratch_files(output_dir: &Path, scratch: &[String]) {
    for name in scratch {
        let path = output_dir.join(name);
        let removed = if path.is_dir() {
            std::fs::remove_dir_all(&path).is_ok()
        } else if path.is_file() {
            std::fs::remove_file(&path).is_ok()
        } else {
            false
        };
        if removed {
            debug!(file = %path.display(), "Removed scratch output");
        }
    }
}

/// Result filter for one annotation tool
pub struct ResultFilter {
    config: ContainerStageConfig,
    corpus: Arc<dyn CorpusSource>,
}

impl ResultFilter {
    pub fn new(config: ContainerStageConfig, corpus: Arc<dyn CorpusSource>) -> Self {
        Self { config, corpus }
    }

    pub fn stage_name(&self) -> String {
        format!("{}_filter", self.config.tool.name())
    }

    pub async fn filter(&self, input: StageResult<AnnotationOutput>) -> StageResult<FilteredOutput> {
        let output = proceed!(input);
        let stage = self.stage_name();

        if output.tool != self.config.tool {
            return StageResult::failure(
                stage,
                format!("received {} output, expected {}", output.tool, self.config.tool),
            );
        }
        if !output.table.is_file() {
            return StageResult::failure(
                stage,
                format!("expected result table {} is missing", output.table.display()),
            );
        }
        if !output.sequence_file.is_file() {
            return StageResult::failure(
                stage,
                format!("expected sequence file {} is missing", output.sequence_file.display()),
            );
        }

        let corpus = fetch_or_permissive(self.corpus.as_ref()).await;
        StageResult::from_result(&stage, self.apply(&output, &corpus))
    }

    fn apply(&self, output: &AnnotationOutput, corpus: &ReferenceCorpus) -> Result<FilteredOutput, PlasticomeError> {
        remove_scratch_files(&output.output_dir, &self.config.scratch_files);

        let mut table = AnnotationTable::read(&output.table)?;
        let before = table.len();
        let records = match self.config.tool {
            AnnotationTool::Dbcan => filter_dbcan(&mut table, corpus)?,
            AnnotationTool::Ecpred => filter_ecpred(&mut table, corpus)?,
        };
        table.write(&output.table)?;

        let ids: HashSet<String> = records.iter().map(|r| r.id.clone()).collect();
        let sequence_file = filtered_sequence_path(output)?;
        let sequences = write_surviving_sequences(&output.sequence_file, &sequence_file, &ids)?;

        info!(
            tool = %self.config.tool,
            before,
            after = records.len(),
            sequences,
            permissive = corpus.is_empty(),
            "Filtered annotations"
        );

        Ok(FilteredOutput {
            tool: self.config.tool,
            sequence_file,
            annotation_table: output.table.clone(),
            records,
            permissive: corpus.is_empty(),
        })
    }
}

fn table_ids(table: &AnnotationTable, tool: AnnotationTool) -> Result<Vec<String>, PlasticomeError> {
    let column = match tool {
        AnnotationTool::Dbcan => DBCAN_ID_COLUMN,
        AnnotationTool::Ecpred => ECPRED_ID_COLUMN,
    };
    Ok(table
        .values(column)?
        .into_iter()
        .map(|v| v.split_whitespace().next().unwrap_or_default().to_string())
        .collect())
}

/// Join parallel branches: the first failure in declared order wins;
/// otherwise the last branch's output restricted to ids every branch kept.
pub fn join_branches(stage: &str, branches: Vec<StageResult<FilteredOutput>>) -> StageResult<FilteredOutput> {
    let mut outputs = Vec::with_capacity(branches.len());
    for branch in branches {
        outputs.push(proceed!(branch));
    }

    let mut last = match outputs.pop() {
        Some(last) => last,
        None => return StageResult::failure(stage, "no branches to join"),
    };

    let mut surviving = last.ids();
    for other in &outputs {
        let ids = other.ids();
        surviving.retain(|id| ids.contains(id));
    }

    if surviving.len() == last.records.len() {
        return StageResult::Success(last);
    }

    let restrict = || -> Result<(), PlasticomeError> {
        let mut table = AnnotationTable::read(&last.annotation_table)?;
        let ids = table_ids(&table, last.tool)?;
        table.retain_rows(|idx| ids.get(idx).map(|id| surviving.contains(id)).unwrap_or(false));
        table.write(&last.annotation_table)?;
        let source = last.sequence_file.clone();
        write_surviving_sequences(&source, &last.sequence_file, &surviving)?;
        Ok(())
    };
    if let Err(e) = restrict() {
        return StageResult::failure(stage, e.to_string());
    }

    last.records.retain(|r| surviving.contains(&r.id));
    StageResult::Success(last)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{Enzyme, StaticCorpus};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn corpus() -> ReferenceCorpus {
        ReferenceCorpus::new(
            vec![
                Enzyme {
                    id: 1,
                    ec_number: Some("3.1.1.74".to_string()),
                    cazy_family: Some("CE5".to_string()),
                    plastics: vec!["PET".to_string()],
                    reference: None,
                },
                Enzyme {
                    id: 2,
                    ec_number: Some("1.11.1.14".to_string()),
                    cazy_family: Some("AA2".to_string()),
                    plastics: vec!["PE".to_string()],
                    reference: None,
                },
            ],
            Vec::new(),
        )
    }

    fn overview() -> AnnotationTable {
        let row = |cells: &[&str]| cells.iter().map(|c| c.to_string()).collect::<Vec<_>>();
        AnnotationTable::new(
            row(&["Gene ID", "EC#", "HMMER", "eCAMI", "DIAMOND", "#ofTools"]),
            vec![
                row(&["gene1", "9.9.9.9|3.1.1.74", "GH5_7(10-200)+CE5(210-400)", "CE5", "-", "2"]),
                row(&["gene2", "-", "-", "-", "AA2", "1"]),
                row(&["gene3", "3.2.1.4", "GH5_7(1-300)", "GH5", "GH5_7", "3"]),
            ],
        )
    }

    #[test]
    fn test_strip_coordinates() {
        assert_eq!(strip_coordinates("GH5_7(23-300)"), "GH5_7");
        assert_eq!(strip_coordinates("CE5"), "CE5");
    }

    #[test]
    fn test_dbcan_filter_keeps_known_families() {
        let mut table = overview();
        let records = filter_dbcan(&mut table, &corpus()).unwrap();

        let ids: Vec<_> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["gene1", "gene2"]);
        assert_eq!(records[0].label.as_deref(), Some("CE5"));
        assert_eq!(records[0].ec_number.as_deref(), Some("3.1.1.74"));
        assert_eq!(records[1].label.as_deref(), Some("AA2"));
        assert_eq!(records[1].ec_number, None);

        assert_eq!(table.headers(), &["Gene ID", "EC#", "plasticome_cazyme"]);
        assert_eq!(table.values("EC#").unwrap(), vec!["3.1.1.74", "-"]);
        assert_eq!(table.values(CAZYME_COLUMN).unwrap(), vec!["CE5", "AA2"]);
    }

    #[test]
    fn test_dbcan_predictor_priority() {
        let row = |cells: &[&str]| cells.iter().map(|c| c.to_string()).collect::<Vec<_>>();
        let mut table = AnnotationTable::new(
            row(&["Gene ID", "EC#", "HMMER", "eCAMI", "DIAMOND", "#ofTools"]),
            vec![row(&["gene9", "-", "GH5", "AA2", "CE5", "3"])],
        );
        let records = filter_dbcan(&mut table, &corpus()).unwrap();
        // HMMER has nothing known, eCAMI outranks DIAMOND
        assert_eq!(records[0].label.as_deref(), Some("AA2"));
    }

    #[test]
    fn test_dbcan_permissive_keeps_everything() {
        let mut table = overview();
        let records = filter_dbcan(&mut table, &ReferenceCorpus::empty()).unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(table.len(), 3);
        assert_eq!(records[0].label.as_deref(), Some("GH5_7"));
        assert_eq!(table.values("EC#").unwrap(), vec!["9.9.9.9|3.1.1.74", "-", "3.2.1.4"]);
    }

    #[test]
    fn test_ecpred_filter() {
        let row = |cells: &[&str]| cells.iter().map(|c| c.to_string()).collect::<Vec<_>>();
        let mut table = AnnotationTable::new(
            row(&["Protein ID", "EC Number", "Status"]),
            vec![
                row(&["gene1 cutinase [Fusarium]", "3.1.1.74", "weak"]),
                row(&["gene2", "9.9.9.9", "weak"]),
                row(&["gene3", "no Prediction", "-"]),
            ],
        );

        let records = filter_ecpred(&mut table, &corpus()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "gene1");
        assert_eq!(records[0].label.as_deref(), Some("3.1.1.74"));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_ecpred_permissive_keeps_rows_without_id() {
        let row = |cells: &[&str]| cells.iter().map(|c| c.to_string()).collect::<Vec<_>>();
        let mut table = AnnotationTable::new(
            row(&["Protein ID", "EC Number"]),
            vec![
                row(&["gene1", "1.1.1.1"]),
                row(&["", "3.1.1.74"]),
                row(&["gene3", "no Prediction"]),
            ],
        );

        let records = filter_ecpred(&mut table, &ReferenceCorpus::empty()).unwrap();
        let ids: Vec<_> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["gene1", "gene3"]);
        assert_eq!(records[1].label, None);
        assert_eq!(table.len(), 3);
        assert_eq!(
            table.values("EC Number").unwrap(),
            vec!["1.1.1.1", "3.1.1.74", "no Prediction"]
        );
    }

    async fn run_filter(corpus_source: StaticCorpus) -> (TempDir, StageResult<FilteredOutput>) {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("genome.faa");
        std::fs::write(&input, ">gene1 a\nMKTAYIAKQR\n>gene2\nMSSLLKK\n>gene3\nMQQ\n").unwrap();
        let out = dir.path().join("genome_ecpred_output");
        std::fs::create_dir_all(&out).unwrap();
        let table = out.join("genome_ecpred_output.tsv");
        std::fs::write(&table, "Protein ID\tEC Number\ngene1 a\t3.1.1.74\ngene2\t9.9.9.9\n").unwrap();

        let filter = ResultFilter::new(ContainerStageConfig::ecpred(), Arc::new(corpus_source));
        let result = filter
            .filter(StageResult::Success(AnnotationOutput {
                tool: AnnotationTool::Ecpred,
                output_dir: out,
                table,
                sequence_file: input,
            }))
            .await;
        (dir, result)
    }

    #[tokio::test]
    async fn test_filter_trims_sequences() {
        let (_dir, result) = run_filter(StaticCorpus::new(corpus())).await;
        let output = result.into_result().unwrap();

        assert!(!output.permissive);
        assert_eq!(output.records.len(), 1);
        let seqs = parse_fasta(&output.sequence_file).unwrap();
        assert_eq!(seqs.len(), 1);
        assert_eq!(seqs[0].id, "gene1");
        assert_eq!(AnnotationTable::read(&output.annotation_table).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_corpus_is_permissive() {
        let (_dir, result) = run_filter(StaticCorpus::unavailable()).await;
        let output = result.into_result().unwrap();

        assert!(output.permissive);
        assert_eq!(output.records.len(), 2);
        assert_eq!(output.records[1].label.as_deref(), Some("9.9.9.9"));
    }

    #[tokio::test]
    async fn test_missing_table_is_failure() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("genome.faa");
        std::fs::write(&input, ">gene1\nMKT\n").unwrap();

        let filter = ResultFilter::new(ContainerStageConfig::dbcan(), Arc::new(StaticCorpus::new(corpus())));
        let result = filter
            .filter(StageResult::Success(AnnotationOutput {
                tool: AnnotationTool::Dbcan,
                output_dir: dir.path().to_path_buf(),
                table: dir.path().join("overview.txt"),
                sequence_file: input,
            }))
            .await;

        let failure = result.into_result().unwrap_err();
        assert_eq!(failure.stage, "dbcan_filter");
        assert!(failure.message.contains("overview.txt"));
    }

    #[tokio::test]
    async fn test_dbcan_scratch_cleanup() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("genome.faa");
        std::fs::write(&input, ">gene2\nMSSLLKK\n").unwrap();
        let out = dir.path().join("genome_dbcan_output");
        std::fs::create_dir_all(out.join("uniInput")).unwrap();
        std::fs::write(out.join("hmmer.out"), "raw").unwrap();
        let table = out.join("overview.txt");
        std::fs::write(&table, "Gene ID\tEC#\tHMMER\teCAMI\tDIAMOND\t#ofTools\ngene2\t-\t-\t-\tAA2\t1\n").unwrap();

        let filter = ResultFilter::new(ContainerStageConfig::dbcan(), Arc::new(StaticCorpus::new(corpus())));
        let output = filter
            .filter(StageResult::Success(AnnotationOutput {
                tool: AnnotationTool::Dbcan,
                output_dir: out.clone(),
                table,
                sequence_file: input,
            }))
            .await
            .into_result()
            .unwrap();

        assert!(!out.join("hmmer.out").exists());
        assert!(!out.join("uniInput").exists());
        assert_eq!(output.sequence_file, out.join("genome.faa"));
        assert_eq!(output.records[0].label.as_deref(), Some("AA2"));
    }

    #[test]
    fn test_join_branches() {
        let dir = TempDir::new().unwrap();
        let fasta = dir.path().join("genome.faa");
        std::fs::write(&fasta, ">gene1\nMKT\n>gene2\nMSS\n").unwrap();
        let table = dir.path().join("ec.tsv");
        std::fs::write(&table, "Protein ID\tEC Number\ngene1\t3.1.1.74\ngene2\t1.11.1.14\n").unwrap();

        let dbcan = FilteredOutput {
            tool: AnnotationTool::Dbcan,
            sequence_file: dir.path().join("unused.faa"),
            annotation_table: dir.path().join("overview.txt"),
            records: vec![AnnotationRecord::new("gene2").with_label("AA2")],
            permissive: false,
        };
        let ecpred = FilteredOutput {
            tool: AnnotationTool::Ecpred,
            sequence_file: fasta.clone(),
            annotation_table: table.clone(),
            records: vec![
                AnnotationRecord::new("gene1").with_label("3.1.1.74"),
                AnnotationRecord::new("gene2").with_label("1.11.1.14"),
            ],
            permissive: false,
        };

        let joined = join_branches(
            "join",
            vec![StageResult::Success(dbcan.clone()), StageResult::Success(ecpred.clone())],
        )
        .into_result()
        .unwrap();
        assert_eq!(joined.records.len(), 1);
        assert_eq!(joined.records[0].id, "gene2");
        assert_eq!(parse_fasta(&fasta).unwrap().len(), 1);
        assert_eq!(AnnotationTable::read(&table).unwrap().values("Protein ID").unwrap(), vec!["gene2"]);

        let failed = join_branches(
            "join",
            vec![
                StageResult::failure("dbcan", "first"),
                StageResult::failure("ecpred", "second"),
            ],
        );
        assert_eq!(failed.into_result().unwrap_err().stage, "dbcan");
    }
}
