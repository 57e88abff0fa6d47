use crate::core::AlignmentConfig;
use crate::tools::process::run_checked;
use crate::tools::traits::{AlignmentHit, Aligner};
use anyhow::{Context, Result};
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tracing::debug;

/// Protein index file extensions written by `makeblastdb -dbtype prot`
const PROTEIN_INDEX_EXTENSIONS: &[&str] = &["phr", "pin", "psq"];

/// BLAST+ integration (`makeblastdb` + `blastp`)
pub struct BlastAligner {
    blastp: PathBuf,
    makeblastdb: PathBuf,
    evalue: f64,
    max_target_seqs: usize,
    threads: usize,
    timeout: Duration,
}

impl BlastAligner {
    pub fn new(config: &AlignmentConfig) -> Self {
        Self {
            blastp: config.blastp.clone(),
            makeblastdb: config.makeblastdb.clone(),
            evalue: config.evalue,
            max_target_seqs: config.max_target_seqs,
            threads: config.threads.max(1),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    fn check_version(&self, binary: &Path) -> Result<String> {
        let mut cmd = Command::new(binary);
        cmd.arg("-version");
        let output = run_checked(&mut cmd, Duration::from_secs(30), &binary.display().to_string())
            .with_context(|| format!("Failed to run {}", binary.display()))?;
        let version = String::from_utf8_lossy(&output.stdout);
        Ok(version.lines().next().unwrap_or_default().trim().to_string())
    }
}

impl Aligner for BlastAligner {
    fn build_index(&self, reference: &Path, index_prefix: &Path) -> Result<()> {
        let mut cmd = Command::new(&self.makeblastdb);
        cmd.arg("-in")
            .arg(reference)
            .arg("-dbtype")
            .arg("prot")
            .arg("-out")
            .arg(index_prefix);

        debug!(?cmd, "Running makeblastdb");
        run_checked(&mut cmd, self.timeout, "makeblastdb")?;
        Ok(())
    }

    fn search(&self, query: &Path, index_prefix: &Path, output: &Path) -> Result<Vec<AlignmentHit>> {
        let mut cmd = Command::new(&self.blastp);
        cmd.arg("-query")
            .arg(query)
            .arg("-db")
            .arg(index_prefix)
            .arg("-out")
            .arg(output)
            .arg("-outfmt")
            .arg("6")
            .arg("-evalue")
            .arg(self.evalue.to_string())
            .arg("-max_target_seqs")
            .arg(self.max_target_seqs.to_string())
            .arg("-num_threads")
            .arg(self.threads.to_string());

        debug!(?cmd, "Running blastp");
        run_checked(&mut cmd, self.timeout, "blastp")?;
        parse_blast_tab(output)
    }

    fn index_files(&self, index_prefix: &Path) -> Vec<PathBuf> {
        PROTEIN_INDEX_EXTENSIONS
            .iter()
            .map(|ext| {
                let mut name = index_prefix.as_os_str().to_os_string();
                name.push(".");
                name.push(ext);
                PathBuf::from(name)
            })
            .collect()
    }

    fn verify_installation(&self) -> Result<()> {
        let blastp = self.check_version(&self.blastp)?;
        let makeblastdb = self.check_version(&self.makeblastdb)?;
        debug!(%blastp, %makeblastdb, "BLAST+ available");
        Ok(())
    }

    fn name(&self) -> &str {
        "BLAST+"
    }
}

/// Parse BLAST tabular output (outfmt 6, 12 standard columns)
pub fn parse_blast_tab(output_path: &Path) -> Result<Vec<AlignmentHit>> {
    let file = fs::File::open(output_path)
        .with_context(|| format!("Missing alignment output {}", output_path.display()))?;
    let reader = BufReader::new(file);
    let mut results = Vec::new();

    for line in reader.lines() {
        let line = line?;
        if line.starts_with('#') || line.trim().is_empty() {
            continue;
        }

        let parts: Vec<&str> = line.split('\t').collect();
        if parts.len() < 12 {
            continue;
        }

        results.push(AlignmentHit {
            query_id: parts[0].to_string(),
            reference_id: parts[1].to_string(),
            identity: parts[2].parse().unwrap_or(0.0),
            alignment_length: parts[3].parse().unwrap_or(0),
            mismatches: parts[4].parse().unwrap_or(0),
            gap_opens: parts[5].parse().unwrap_or(0),
            query_start: parts[6].parse().unwrap_or(0),
            query_end: parts[7].parse().unwrap_or(0),
            subject_start: parts[8].parse().unwrap_or(0),
            subject_end: parts[9].parse().unwrap_or(0),
            evalue: parts[10].parse().unwrap_or(1.0),
            bit_score: parts[11].trim().parse().unwrap_or(0.0),
        });
    }

    Ok(results)
}
