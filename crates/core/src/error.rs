// crates/core/src/error.rs
//! Core error types surfaced to the server crate.

use std::path::PathBuf;
use thiserror::Error;

/// Errors reading or parsing a transcript log file.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("transcript not found: {path}")]
    NotFound { path: PathBuf },

    #[error("permission denied reading {path}")]
    PermissionDenied { path: PathBuf },

    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ParseError {
    /// Classify an io error against the path it occurred on.
    pub fn from_io(path: PathBuf, source: std::io::Error) -> Self {
        match source.kind() {
            std::io::ErrorKind::NotFound => ParseError::NotFound { path },
            std::io::ErrorKind::PermissionDenied => ParseError::PermissionDenied { path },
            _ => ParseError::Io { path, source },
        }
    }
}
