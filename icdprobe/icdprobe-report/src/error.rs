use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("input file not found: {}", path.display())]
    InputMissing { path: PathBuf },

    #[error("failed to read '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no TestCaseResult entries found in '{}'", path.display())]
    NoResults { path: PathBuf },

    #[error("test case {case} has a non-numeric duration '{value}'")]
    InvalidDuration { case: String, value: String },

    #[error("malformed test case XML: {0}")]
    Xml(#[from] xml::reader::Error),

    #[error("invalid block pattern: {0}")]
    Pattern(#[from] regex::Error),
}
