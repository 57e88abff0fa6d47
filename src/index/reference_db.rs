//! Content-addressed reference protein databases.
//!
//! Every database lives in `<root>/<digest prefix>/` and holds the reference
//! FASTA, the aligner's index files and a `manifest.json` recording the
//! fingerprint it was built from. Builds happen in a `.tmp_<uuid>` sibling and
//! are published by rename, so readers never see a partial index. A rebuild
//! moves the previous build to `.old_<uuid>` before the new one takes its
//! place, and deletes it only afterwards.

use crate::bio::fasta::{count_sequences, write_fasta};
use crate::bio::Sequence;
use crate::metadata::ReferenceCorpus;
use crate::tools::Aligner;
use crate::PlasticomeError;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::SystemTime;
use tracing::{debug, info, warn};

pub const REFERENCE_FASTA: &str = "proteins_to_db.fasta";
pub const INDEX_NAME: &str = "plasticome_protein_db";
const MANIFEST: &str = "manifest.json";
const CURRENT: &str = "current";
const TEMP_PREFIX: &str = ".tmp_";
const RETIRED_PREFIX: &str = ".old_";

/// Builders for the same directory are serialized process-wide
static BUILD_LOCKS: OnceLock<DashMap<PathBuf, Arc<Mutex<()>>>> = OnceLock::new();

fn build_lock(path: &Path) -> Arc<Mutex<()>> {
    BUILD_LOCKS
        .get_or_init(DashMap::new)
        .entry(path.to_path_buf())
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone()
}

/// Identity of a reference sequence set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub sequence_count: usize,
    /// SHA-256 over the sorted `id\tresidues` lines
    pub digest: String,
}

impl Fingerprint {
    pub fn of(sequences: &[Sequence]) -> Self {
        let mut entries: Vec<(&str, &[u8])> = sequences
            .iter()
            .map(|s| (s.id.as_str(), s.sequence.as_slice()))
            .collect();
        entries.sort();

        let mut hasher = Sha256::new();
        for (id, residues) in entries {
            hasher.update(id.as_bytes());
            hasher.update(b"\t");
            hasher.update(residues);
            hasher.update(b"\n");
        }

        Self {
            sequence_count: sequences.len(),
            digest: hex::encode(hasher.finalize()),
        }
    }

    /// Directory name for this fingerprint
    pub fn short(&self) -> &str {
        &self.digest[..16.min(self.digest.len())]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BuildManifest {
    fingerprint: Fingerprint,
    built_at: DateTime<Utc>,
    aligner: String,
}

/// A ready-to-search reference database
#[derive(Debug, Clone)]
pub struct ReferenceDatabase {
    pub location: PathBuf,
    pub fasta: PathBuf,
    pub index_prefix: PathBuf,
    pub fingerprint: Fingerprint,
    /// True when an existing build was reused unchanged
    pub reused: bool,
}

/// Summary of one published database, for `database status`
#[derive(Debug, Clone, Serialize)]
pub struct DatabaseStatus {
    pub location: PathBuf,
    pub fingerprint: Fingerprint,
    pub built_at: DateTime<Utc>,
    pub aligner: String,
    pub index_complete: bool,
    pub is_current: bool,
}

pub struct ReferenceDatabaseBuilder {
    root: PathBuf,
    aligner: Arc<dyn Aligner>,
}

impl ReferenceDatabaseBuilder {
    pub fn new(root: impl Into<PathBuf>, aligner: Arc<dyn Aligner>) -> Self {
        Self {
            root: root.into(),
            aligner,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Database over every reference protein in the corpus; marked as `current`
    pub fn ensure_database(&self, corpus: &ReferenceCorpus) -> Result<ReferenceDatabase, PlasticomeError> {
        let database = self.ensure_for_sequences(corpus.reference_sequences())?;
        if let Err(e) = self.publish_current(&database) {
            warn!(error = %e, "Could not update current database pointer");
        }
        Ok(database)
    }

    /// Database over the corpus subset sharing `label`
    pub fn ensure_for_label(
        &self,
        corpus: &ReferenceCorpus,
        label: &str,
    ) -> Result<ReferenceDatabase, PlasticomeError> {
        let mut seen = std::collections::HashSet::new();
        let sequences: Vec<Sequence> = corpus
            .subset_for_label(label)
            .into_iter()
            .filter_map(|e| e.reference.as_ref())
            .filter(|r| seen.insert(r.id.clone()))
            .map(|r| r.to_sequence())
            .collect();
        self.ensure_for_sequences(sequences)
    }

    pub fn ensure_for_sequences(&self, sequences: Vec<Sequence>) -> Result<ReferenceDatabase, PlasticomeError> {
        if sequences.is_empty() {
            return Err(PlasticomeError::Database(
                "reference corpus has no protein sequences".to_string(),
            ));
        }

        let fingerprint = Fingerprint::of(&sequences);
        let location = self.root.join(fingerprint.short());
        let lock = build_lock(&location);
        let _guard = lock.lock();

        match self.rebuild_reason(&location, &fingerprint) {
            None => {
                debug!(location = %location.display(), "Reusing reference database");
                Ok(self.database_at(location, fingerprint, true))
            }
            Some(reason) => {
                info!(
                    location = %location.display(),
                    sequences = fingerprint.sequence_count,
                    %reason,
                    "Building reference database"
                );
                self.build(&location, &fingerprint, &sequences)?;
                Ok(self.database_at(location, fingerprint, false))
            }
        }
    }

    fn database_at(&self, location: PathBuf, fingerprint: Fingerprint, reused: bool) -> ReferenceDatabase {
        ReferenceDatabase {
            fasta: location.join(REFERENCE_FASTA),
            index_prefix: location.join(INDEX_NAME),
            location,
            fingerprint,
            reused,
        }
    }

    /// Why the database at `location` cannot be reused, if it cannot
    fn rebuild_reason(&self, location: &Path, fingerprint: &Fingerprint) -> Option<String> {
        let manifest = match read_manifest(location) {
            Ok(Some(manifest)) => manifest,
            Ok(None) => return Some("no existing build".to_string()),
            Err(e) => return Some(format!("unreadable manifest: {}", e)),
        };
        if &manifest.fingerprint != fingerprint {
            return Some("fingerprint changed".to_string());
        }

        let fasta = location.join(REFERENCE_FASTA);
        match count_sequences(&fasta) {
            Ok(count) if count == fingerprint.sequence_count => {}
            Ok(count) => {
                return Some(format!(
                    "sequence count {} differs from {}",
                    count, fingerprint.sequence_count
                ))
            }
            Err(_) => return Some("reference FASTA missing".to_string()),
        }

        let source_mtime = match modified(&fasta) {
            Some(t) => t,
            None => return Some("reference FASTA missing".to_string()),
        };
        for file in self.aligner.index_files(&location.join(INDEX_NAME)) {
            match modified(&file) {
                None => return Some(format!("index file {} missing", file.display())),
                Some(t) if t < source_mtime => {
                    return Some(format!("index file {} older than its source", file.display()))
                }
                Some(_) => {}
            }
        }

        None
    }

    fn build(&self, location: &Path, fingerprint: &Fingerprint, sequences: &[Sequence]) -> Result<(), PlasticomeError> {
        fs::create_dir_all(&self.root)?;
        let temp_dir = self.root.join(format!("{}{}", TEMP_PREFIX, uuid::Uuid::new_v4()));
        fs::create_dir_all(&temp_dir)?;

        let result = self
            .build_in(&temp_dir, fingerprint, sequences)
            .and_then(|_| self.swap_into_place(&temp_dir, location));

        if result.is_err() && temp_dir.exists() {
            fs::remove_dir_all(&temp_dir).ok();
        }
        result
    }

    /// Replace `location` with `built`; the previous build is removed last
    fn swap_into_place(&self, built: &Path, location: &Path) -> Result<(), PlasticomeError> {
        let retired = if location.exists() {
            let aside = self.root.join(format!("{}{}", RETIRED_PREFIX, uuid::Uuid::new_v4()));
            fs::rename(location, &aside)?;
            Some(aside)
        } else {
            None
        };

        if let Err(e) = fs::rename(built, location) {
            if let Some(aside) = &retired {
                fs::rename(aside, location).ok();
            }
            return Err(e.into());
        }

        if let Some(aside) = retired {
            if let Err(e) = fs::remove_dir_all(&aside) {
                warn!(path = %aside.display(), error = %e, "Could not remove replaced database");
            }
        }
        Ok(())
    }

    fn build_in(&self, dir: &Path, fingerprint: &Fingerprint, sequences: &[Sequence]) -> Result<(), PlasticomeError> {
        let fasta = dir.join(REFERENCE_FASTA);
        write_fasta(&fasta, sequences)?;

        self.aligner
            .build_index(&fasta, &dir.join(INDEX_NAME))
            .map_err(|e| PlasticomeError::Database(format!("index build failed: {:#}", e)))?;

        let manifest = BuildManifest {
            fingerprint: fingerprint.clone(),
            built_at: Utc::now(),
            aligner: self.aligner.name().to_string(),
        };
        fs::write(dir.join(MANIFEST), serde_json::to_string_pretty(&manifest)?)?;
        Ok(())
    }

    /// Point `<root>/current` at the given build
    fn publish_current(&self, database: &ReferenceDatabase) -> Result<(), PlasticomeError> {
        let name = database.fingerprint.short();
        let pointer = self.root.join(CURRENT);
        let temp = self.root.join(format!("{}{}", TEMP_PREFIX, uuid::Uuid::new_v4()));
        fs::write(&temp, name)?;
        fs::rename(&temp, &pointer)?;
        Ok(())
    }

    fn current_name(&self) -> Option<String> {
        fs::read_to_string(self.root.join(CURRENT))
            .ok()
            .map(|s| s.trim().to_string())
    }

    /// Every published database under the root, newest first
    pub fn status(&self) -> Result<Vec<DatabaseStatus>, PlasticomeError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let current = self.current_name();
        let mut entries = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => name.to_string(),
                None => continue,
            };
            if !path.is_dir() || is_scratch(&name) {
                continue;
            }
            if let Ok(Some(manifest)) = read_manifest(&path) {
                let index_complete = self
                    .aligner
                    .index_files(&path.join(INDEX_NAME))
                    .iter()
                    .all(|f| f.exists());
                entries.push(DatabaseStatus {
                    is_current: current.as_deref() == Some(name.as_str()),
                    location: path,
                    fingerprint: manifest.fingerprint,
                    built_at: manifest.built_at,
                    aligner: manifest.aligner,
                    index_complete,
                });
            }
        }

        entries.sort_by(|a, b| b.built_at.cmp(&a.built_at));
        Ok(entries)
    }

    /// Remove leftovers of interrupted builds and replaced databases
    pub fn cleanup_temp_dirs(&self) -> Result<usize, PlasticomeError> {
        if !self.root.exists() {
            return Ok(0);
        }
        let mut removed = 0;
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            let is_temp = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(is_scratch)
                .unwrap_or(false);
            if is_temp && path.is_dir() {
                debug!(path = %path.display(), "Cleaning up temporary directory");
                fs::remove_dir_all(&path).ok();
                removed += 1;
            }
        }
        Ok(removed)
    }
}

fn is_scratch(name: &str) -> bool {
    name.starts_with(TEMP_PREFIX) || name.starts_with(RETIRED_PREFIX)
}

fn read_manifest(location: &Path) -> Result<Option<BuildManifest>, PlasticomeError> {
    let path = location.join(MANIFEST);
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&contents)?))
}

fn modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{Enzyme, ReferenceProtein};
    use crate::tools::testing::MockAligner;
    use std::time::Duration;
    use tempfile::TempDir;

    fn corpus(entries: &[(&str, &str)]) -> ReferenceCorpus {
        let enzymes = entries
            .iter()
            .enumerate()
            .map(|(i, (ec, raw))| Enzyme {
                id: i as i64,
                ec_number: Some(ec.to_string()),
                cazy_family: None,
                plastics: vec!["PET".to_string()],
                reference: ReferenceProtein::parse(raw),
            })
            .collect();
        ReferenceCorpus::new(enzymes, Vec::new())
    }

    fn two_enzymes() -> ReferenceCorpus {
        corpus(&[
            ("3.1.1.74", ">ref1 Cutinase MKFFALTTLLAATAS"),
            ("3.1.1.101", ">ref2 PETase MNFPRASRLMQAAVL"),
        ])
    }

    fn set_mtime(path: &Path, time: SystemTime) {
        let file = fs::File::options().write(true).open(path).unwrap();
        file.set_modified(time).unwrap();
    }

    #[test]
    fn test_fingerprint_is_order_independent() {
        let a = Sequence::new("a".to_string(), b"MKV".to_vec());
        let b = Sequence::new("b".to_string(), b"MQQ".to_vec());
        let forward = Fingerprint::of(&[a.clone(), b.clone()]);
        let reverse = Fingerprint::of(&[b, a.clone()]);
        assert_eq!(forward, reverse);
        assert_ne!(forward, Fingerprint::of(&[a]));
        assert_eq!(forward.short().len(), 16);
    }

    #[test]
    fn test_build_then_reuse() {
        let dir = TempDir::new().unwrap();
        let aligner = Arc::new(MockAligner::new());
        let builder = ReferenceDatabaseBuilder::new(dir.path(), aligner.clone());

        let first = builder.ensure_database(&two_enzymes()).unwrap();
        assert!(!first.reused);
        assert_eq!(first.fingerprint.sequence_count, 2);
        assert_eq!(count_sequences(&first.fasta).unwrap(), 2);

        let index_before = fs::read(aligner.index_files(&first.index_prefix)[0].clone()).unwrap();
        let second = builder.ensure_database(&two_enzymes()).unwrap();
        assert!(second.reused);
        assert_eq!(second.location, first.location);
        assert_eq!(aligner.index_builds(), 1);
        let index_after = fs::read(aligner.index_files(&second.index_prefix)[0].clone()).unwrap();
        assert_eq!(index_before, index_after);

        let status = builder.status().unwrap();
        assert_eq!(status.len(), 1);
        assert!(status[0].is_current);
        assert!(status[0].index_complete);
    }

    #[test]
    fn test_changed_corpus_builds_new_database() {
        let dir = TempDir::new().unwrap();
        let aligner = Arc::new(MockAligner::new());
        let builder = ReferenceDatabaseBuilder::new(dir.path(), aligner.clone());

        let first = builder.ensure_database(&two_enzymes()).unwrap();
        let grown = corpus(&[
            ("3.1.1.74", ">ref1 Cutinase MKFFALTTLLAATAS"),
            ("3.1.1.101", ">ref2 PETase MNFPRASRLMQAAVL"),
            ("3.1.1.3", ">ref3 Lipase MSSLLKKAAAGGVVLQ"),
        ]);
        let second = builder.ensure_database(&grown).unwrap();

        assert!(!second.reused);
        assert_ne!(first.location, second.location);
        assert_eq!(second.fingerprint.sequence_count, 3);
        assert_eq!(aligner.index_builds(), 2);
    }

    #[test]
    fn test_rebuild_when_sequence_count_drifts() {
        let dir = TempDir::new().unwrap();
        let aligner = Arc::new(MockAligner::new());
        let builder = ReferenceDatabaseBuilder::new(dir.path(), aligner.clone());

        let first = builder.ensure_database(&two_enzymes()).unwrap();
        let mut fasta = fs::read_to_string(&first.fasta).unwrap();
        fasta.push_str(">stray\nMKVLAAGGTTQQ\n");
        fs::write(&first.fasta, fasta).unwrap();
        for file in aligner.index_files(&first.index_prefix) {
            set_mtime(&file, SystemTime::now() + Duration::from_secs(60));
        }

        let second = builder.ensure_database(&two_enzymes()).unwrap();
        assert!(!second.reused);
        assert_eq!(count_sequences(&second.fasta).unwrap(), 2);
        assert_eq!(aligner.index_builds(), 2);
    }

    #[test]
    fn test_rebuild_when_index_older_than_source() {
        let dir = TempDir::new().unwrap();
        let aligner = Arc::new(MockAligner::new());
        let builder = ReferenceDatabaseBuilder::new(dir.path(), aligner.clone());

        let first = builder.ensure_database(&two_enzymes()).unwrap();
        let past = SystemTime::now() - Duration::from_secs(3600);
        for file in aligner.index_files(&first.index_prefix) {
            set_mtime(&file, past);
        }

        let second = builder.ensure_database(&two_enzymes()).unwrap();
        assert!(!second.reused);
        assert_eq!(aligner.index_builds(), 2);
    }

    #[test]
    fn test_rebuild_swaps_in_place_without_leftovers() {
        let dir = TempDir::new().unwrap();
        let aligner = Arc::new(MockAligner::new());
        let builder = ReferenceDatabaseBuilder::new(dir.path(), aligner.clone());

        let first = builder.ensure_database(&two_enzymes()).unwrap();
        let stale = first.location.join("stale.marker");
        fs::write(&stale, "from the first build").unwrap();
        let past = SystemTime::now() - Duration::from_secs(3600);
        for file in aligner.index_files(&first.index_prefix) {
            set_mtime(&file, past);
        }

        let second = builder.ensure_database(&two_enzymes()).unwrap();
        assert!(!second.reused);
        assert_eq!(second.location, first.location);
        assert!(!stale.exists());
        assert!(aligner.index_files(&second.index_prefix).iter().all(|f| f.exists()));

        let leftovers: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.unwrap().file_name().into_string().ok())
            .filter(|name| is_scratch(name))
            .collect();
        assert!(leftovers.is_empty(), "leftovers: {:?}", leftovers);
    }

    #[test]
    fn test_cleanup_removes_replaced_databases() {
        let dir = TempDir::new().unwrap();
        let builder = ReferenceDatabaseBuilder::new(dir.path(), Arc::new(MockAligner::new()));
        let database = builder.ensure_database(&two_enzymes()).unwrap();

        fs::create_dir_all(dir.path().join(".old_0000")).unwrap();
        fs::create_dir_all(dir.path().join(".tmp_0000")).unwrap();
        assert_eq!(builder.status().unwrap().len(), 1);

        assert_eq!(builder.cleanup_temp_dirs().unwrap(), 2);
        assert!(database.location.is_dir());
        assert!(!dir.path().join(".old_0000").exists());
    }

    #[test]
    fn test_failed_build_leaves_no_partial_state() {
        let dir = TempDir::new().unwrap();
        let aligner = Arc::new(MockAligner::new().with_index_failure("makeblastdb crashed"));
        let builder = ReferenceDatabaseBuilder::new(dir.path(), aligner);

        let err = builder.ensure_database(&two_enzymes()).unwrap_err();
        assert!(matches!(err, PlasticomeError::Database(_)));
        assert!(builder.status().unwrap().is_empty());
        assert_eq!(builder.cleanup_temp_dirs().unwrap(), 0);
    }

    #[test]
    fn test_label_scoped_database() {
        let dir = TempDir::new().unwrap();
        let aligner = Arc::new(MockAligner::new());
        let builder = ReferenceDatabaseBuilder::new(dir.path(), aligner);

        let scoped = builder.ensure_for_label(&two_enzymes(), "3.1.1.101").unwrap();
        assert_eq!(scoped.fingerprint.sequence_count, 1);
        assert!(builder.ensure_for_label(&two_enzymes(), "9.9.9.9").is_err());
    }

    #[test]
    fn test_concurrent_builders_share_one_build() {
        let dir = TempDir::new().unwrap();
        let aligner = Arc::new(MockAligner::new());
        let builder = Arc::new(ReferenceDatabaseBuilder::new(dir.path(), aligner.clone()));
        let corpus = Arc::new(two_enzymes());

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let builder = builder.clone();
                let corpus = corpus.clone();
                std::thread::spawn(move || builder.ensure_database(&corpus).unwrap())
            })
            .collect();
        let results: Vec<ReferenceDatabase> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(aligner.index_builds(), 1);
        assert_eq!(results.iter().filter(|db| !db.reused).count(), 1);
    }
}
