//! Stage results and the artifacts that travel between stages.
//!
//! A failed stage produces a `StageFailure` value. Every later stage forwards
//! it unchanged, so each run reaches the notification boundary exactly once.

use crate::pipeline::aggregate::Report;
use crate::pipeline::alignment::AlignmentOutput;
use crate::pipeline::annotation::AnnotationOutput;
use crate::pipeline::filter::FilteredOutput;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Unwrap a successful `StageResult` or return the incoming failure unchanged
#[macro_export]
macro_rules! proceed {
    ($result:expr) => {
        match $result {
            $crate::pipeline::StageResult::Success(value) => value,
            $crate::pipeline::StageResult::Failure(failure) => {
                return $crate::pipeline::StageResult::Failure(failure)
            }
        }
    };
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFailure {
    /// Stage that produced the failure
    pub stage: String,
    pub message: String,
}

impl StageFailure {
    pub fn new(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.stage, self.message)
    }
}

#[must_use]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageResult<T> {
    Success(T),
    Failure(StageFailure),
}

impl<T> StageResult<T> {
    pub fn failure(stage: impl Into<String>, message: impl Into<String>) -> Self {
        StageResult::Failure(StageFailure::new(stage, message))
    }

    /// Tag an error from ordinary fallible code with the stage it happened in
    pub fn from_result<E: fmt::Display>(stage: &str, result: Result<T, E>) -> Self {
        match result {
            Ok(value) => StageResult::Success(value),
            Err(e) => StageResult::failure(stage, e.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, StageResult::Success(_))
    }

    pub fn success(&self) -> Option<&T> {
        match self {
            StageResult::Success(value) => Some(value),
            StageResult::Failure(_) => None,
        }
    }

    pub fn failure_ref(&self) -> Option<&StageFailure> {
        match self {
            StageResult::Success(_) => None,
            StageResult::Failure(failure) => Some(failure),
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> StageResult<U> {
        match self {
            StageResult::Success(value) => StageResult::Success(f(value)),
            StageResult::Failure(failure) => StageResult::Failure(failure),
        }
    }

    pub fn and_then<U, F: FnOnce(T) -> StageResult<U>>(self, f: F) -> StageResult<U> {
        match self {
            StageResult::Success(value) => f(value),
            StageResult::Failure(failure) => StageResult::Failure(failure),
        }
    }

    pub fn into_result(self) -> Result<T, StageFailure> {
        match self {
            StageResult::Success(value) => Ok(value),
            StageResult::Failure(failure) => Err(failure),
        }
    }
}

/// Payload carried between queued stages
#[derive(Debug, Clone)]
pub enum Artifact {
    /// Request input sequence file
    Input { sequence_file: PathBuf },
    Annotated(AnnotationOutput),
    Filtered(FilteredOutput),
    Aligned(AlignmentOutput),
    /// Filtering left nothing to align; the aggregator emits a negative report
    NoFindings,
    Report(Report),
}

impl Artifact {
    pub fn kind(&self) -> &'static str {
        match self {
            Artifact::Input { .. } => "input",
            Artifact::Annotated(_) => "annotation output",
            Artifact::Filtered(_) => "filtered annotations",
            Artifact::Aligned(_) => "alignment table",
            Artifact::NoFindings => "no-findings marker",
            Artifact::Report(_) => "report",
        }
    }
}

impl StageResult<Artifact> {
    /// Narrow to the artifact a stage expects; a different artifact is a failure
    pub fn expect_artifact<T, F>(self, stage: &str, expected: &str, pick: F) -> StageResult<T>
    where
        F: FnOnce(Artifact) -> Result<T, Artifact>,
    {
        let artifact = proceed!(self);
        match pick(artifact) {
            Ok(value) => StageResult::Success(value),
            Err(other) => StageResult::failure(
                stage,
                format!("expected {}, received {}", expected, other.kind()),
            ),
        }
    }
}
