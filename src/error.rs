use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("missing column: {0}")]
    MissingColumn(String),

    #[error("missing input: {}", .0.display())]
    MissingInput(PathBuf),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("degenerate statistic: {0}")]
    Degenerate(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ReviewError>;
