use std::fmt;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum OrganizerError {
    #[error("invalid category: {0:?}")]
    InvalidCategory(String),

    #[error("invalid acquisition line: {0:?}")]
    InvalidAcquisitionLine(String),

    #[error("invalid visit id: {0:?}")]
    InvalidVisitId(String),

    #[error("invalid exam id: {0:?}")]
    InvalidExamId(String),

    #[error("source path {path} {defect}")]
    #[diagnostic(help("pass an existing directory with --source"))]
    InvalidSource {
        path: Utf8PathBuf,
        defect: SourceDefect,
    },

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("metadata ledger error: {0}")]
    Ledger(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),
}

/// Which source precondition failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceDefect {
    Missing,
    NotDirectory,
}

impl fmt::Display for SourceDefect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceDefect::Missing => write!(f, "does not exist"),
            SourceDefect::NotDirectory => write!(f, "is not a directory"),
        }
    }
}
