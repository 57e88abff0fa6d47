//! Annotation tables produced by the containerized annotation tools.
//!
//! Both dbCAN (`overview.txt`) and ECPred (`*.tsv`) emit tab-separated
//! tables with a header row. Tables are kept as plain string cells so a
//! filter can rewrite them without knowing every column a tool version emits.

use crate::PlasticomeError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Cell values the tools use for "no prediction"
pub fn is_no_prediction(value: &str) -> bool {
    let value = value.trim();
    value.is_empty() || value == "-" || value.eq_ignore_ascii_case("no prediction")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prediction {
    /// Predictor column the candidate came from (e.g. "HMMER", "EC Number")
    pub predictor: String,
    pub value: String,
}

/// One annotated gene/protein after filtering
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationRecord {
    pub id: String,
    /// Raw candidates in predictor priority order
    pub predictions: Vec<Prediction>,
    /// Consensus label that survived the filter (family code or EC number)
    pub label: Option<String>,
    /// EC number carried alongside a family label, when the tool reports one
    pub ec_number: Option<String>,
}

impl AnnotationRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            predictions: Vec::new(),
            label: None,
            ec_number: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Every label the record can be matched on against the reference corpus
    pub fn labels(&self) -> Vec<&str> {
        let mut labels = Vec::new();
        if let Some(label) = &self.label {
            labels.push(label.as_str());
        }
        if let Some(ec) = &self.ec_number {
            if Some(ec) != self.label.as_ref() {
                labels.push(ec.as_str());
            }
        }
        labels
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl AnnotationTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    /// Read a tab-separated table with a header row
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self, PlasticomeError> {
        let path = path.as_ref();
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .flexible(true)
            .has_headers(true)
            .from_path(path)
            .map_err(|e| {
                PlasticomeError::Parse(format!("Cannot read table {}: {}", path.display(), e))
            })?;

        let headers = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect::<Vec<_>>();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            let mut row: Vec<String> = record.iter().map(|c| c.to_string()).collect();
            row.resize(headers.len(), String::new());
            rows.push(row);
        }

        Ok(Self { headers, rows })
    }

    /// Write as a tab-separated table, replacing any existing file
    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<(), PlasticomeError> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_path(path.as_ref())?;
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column(&self, name: &str) -> Result<usize, PlasticomeError> {
        self.headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| PlasticomeError::Parse(format!("Table has no '{}' column", name)))
    }

    /// Values of one column, in row order
    pub fn values(&self, name: &str) -> Result<Vec<&str>, PlasticomeError> {
        let idx = self.column(name)?;
        Ok(self.rows.iter().map(|row| row[idx].as_str()).collect())
    }

    pub fn set_cell(&mut self, row: usize, column: usize, value: String) {
        if let Some(cell) = self.rows.get_mut(row).and_then(|r| r.get_mut(column)) {
            *cell = value;
        }
    }

    /// Append a column, filling with `values` (missing values become empty)
    pub fn push_column(&mut self, name: &str, values: Vec<String>) {
        self.headers.push(name.to_string());
        let mut values = values.into_iter();
        for row in &mut self.rows {
            row.push(values.next().unwrap_or_default());
        }
    }

    pub fn drop_columns(&mut self, names: &[&str]) {
        let keep: Vec<bool> = self
            .headers
            .iter()
            .map(|h| !names.contains(&h.as_str()))
            .collect();
        let filter = |cells: &mut Vec<String>| {
            let mut flags = keep.iter();
            cells.retain(|_| *flags.next().unwrap_or(&true));
        };
        filter(&mut self.headers);
        for row in &mut self.rows {
            filter(row);
        }
    }

    /// Keep rows for which `keep(row_index)` is true
    pub fn retain_rows<F: FnMut(usize) -> bool>(&mut self, mut keep: F) {
        let mut idx = 0;
        self.rows.retain(|_| {
            let kept = keep(idx);
            idx += 1;
            kept
        });
    }
}
