//! Notification boundary. The terminal result of every run, report or
//! failure, is handed to a `Notifier` exactly once.

use crate::pipeline::aggregate::Report;
use crate::pipeline::stage::StageResult;
use crate::PlasticomeError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

pub const OUTCOME_FILE: &str = "outcome.json";

/// Who the result goes to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryInfo {
    pub user_email: String,
    pub user_name: String,
    pub organism_name: Option<String>,
}

/// Terminal state of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub request_id: String,
    pub delivery: DeliveryInfo,
    pub result: StageResult<Report>,
    /// Per-request working directory
    pub work_dir: PathBuf,
    pub finished_at: DateTime<Utc>,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver the outcome; may move artifacts and update their paths
    async fn deliver(&self, outcome: &mut Outcome) -> Result<(), PlasticomeError>;

    fn name(&self) -> &str;
}

/// Writes the outcome to the log
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver(&self, outcome: &mut Outcome) -> Result<(), PlasticomeError> {
        match &outcome.result {
            StageResult::Success(report) => info!(
                request_id = %outcome.request_id,
                recipient = %outcome.delivery.user_email,
                positive = report.is_positive(),
                results = %report.artifacts().results_dir.display(),
                "Analysis finished"
            ),
            StageResult::Failure(failure) => error!(
                request_id = %outcome.request_id,
                recipient = %outcome.delivery.user_email,
                stage = %failure.stage,
                "Analysis failed: {}",
                failure.message
            ),
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

/// Drops each outcome into `<outbox>/<request_id>/` for an external
/// delivery agent: `outcome.json` plus the moved results directory.
pub struct OutboxNotifier {
    outbox: PathBuf,
    cleanup_work_dir: bool,
}

impl OutboxNotifier {
    pub fn new(outbox: impl Into<PathBuf>, cleanup_work_dir: bool) -> Self {
        Self {
            outbox: outbox.into(),
            cleanup_work_dir,
        }
    }

    pub fn request_dir(&self, request_id: &str) -> PathBuf {
        self.outbox.join(request_id)
    }
}

#[async_trait]
impl Notifier for OutboxNotifier {
    async fn deliver(&self, outcome: &mut Outcome) -> Result<(), PlasticomeError> {
        let target = self.request_dir(&outcome.request_id);
        std::fs::create_dir_all(&target)?;

        if let StageResult::Success(report) = &mut outcome.result {
            let from = report.artifacts().results_dir.clone();
            if from.is_dir() {
                let to = target.join("results");
                move_dir(&from, &to)?;
                report.relocate(&from, &to);
            }
        }

        let file = std::fs::File::create(target.join(OUTCOME_FILE))?;
        serde_json::to_writer_pretty(file, &*outcome)?;

        if self.cleanup_work_dir && outcome.work_dir.exists() {
            if let Err(e) = std::fs::remove_dir_all(&outcome.work_dir) {
                warn!(dir = %outcome.work_dir.display(), error = %e, "Could not remove working directory");
            } else {
                debug!(dir = %outcome.work_dir.display(), "Removed working directory");
            }
        }

        info!(request_id = %outcome.request_id, outbox = %target.display(), "Outcome delivered to outbox");
        Ok(())
    }

    fn name(&self) -> &str {
        "outbox"
    }
}

/// Rename, falling back to copy + remove across filesystems
fn move_dir(from: &Path, to: &Path) -> Result<(), PlasticomeError> {
    if to.exists() {
        std::fs::remove_dir_all(to)?;
    }
    if std::fs::rename(from, to).is_ok() {
        return Ok(());
    }
    copy_dir_all(from, to)?;
    std::fs::remove_dir_all(from)?;
    Ok(())
}

fn copy_dir_all(from: &Path, to: &Path) -> Result<(), PlasticomeError> {
    std::fs::create_dir_all(to)?;
    for entry in std::fs::read_dir(from)? {
        let entry = entry?;
        let target = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_all(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
