pub mod bio;
pub mod cli;
pub mod core;
pub mod index;
pub mod metadata;
pub mod pipeline;
pub mod report;
pub mod tools;

pub use crate::core::Config;
pub use crate::pipeline::{AnalysisRequest, Orchestrator, Report, StageFailure, StageResult};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlasticomeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    /// Rejected request fields (missing or malformed)
    #[error("Validation error: {0}")]
    Validation(String),

    /// The input sequence could not be obtained
    #[error("Input error: {0}")]
    InputAcquisition(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Metadata service error: {0}")]
    Metadata(String),

    #[error("Tool error: {0}")]
    Tool(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Pipeline error: {0}")]
    Pipeline(String),

    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for PlasticomeError {
    fn from(err: serde_json::Error) -> Self {
        PlasticomeError::Parse(err.to_string())
    }
}

impl From<csv::Error> for PlasticomeError {
    fn from(err: csv::Error) -> Self {
        PlasticomeError::Parse(err.to_string())
    }
}

impl From<anyhow::Error> for PlasticomeError {
    fn from(err: anyhow::Error) -> Self {
        PlasticomeError::Other(format!("{:#}", err))
    }
}

pub type Result<T> = std::result::Result<T, PlasticomeError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_error_display() {
        let err = PlasticomeError::Validation("missing fields: user_email".to_string());
        assert_eq!(err.to_string(), "Validation error: missing fields: user_email");

        let err = PlasticomeError::Tool("container exited with 1".to_string());
        assert_eq!(err.to_string(), "Tool error: container exited with 1");

        let err = PlasticomeError::Other("plain".to_string());
        assert_eq!(err.to_string(), "plain");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let err: PlasticomeError = io_err.into();
        match err {
            PlasticomeError::Io(e) => assert_eq!(e.kind(), io::ErrorKind::PermissionDenied),
            _ => panic!("Expected Io error variant"),
        }
    }

    #[test]
    fn test_anyhow_conversion_keeps_context() {
        let err = anyhow::anyhow!("root cause").context("while building index");
        let converted: PlasticomeError = err.into();
        let message = converted.to_string();
        assert!(message.contains("while building index"));
        assert!(message.contains("root cause"));
    }
}
