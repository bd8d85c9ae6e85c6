use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("report not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("report {report} is missing field {field}")]
    MissingField { report: String, field: String },

    #[error("report {report} is malformed: {reason}")]
    Malformed { report: String, reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ReportError>;
