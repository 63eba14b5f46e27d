//! Errors that stop an analysis run.
//!
//! Findings are never errors; they are returned as diagnostics.

use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum AnalysisError {
    /// A source file could not be read
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A source file of the analyzed unit could not be parsed
    Parse { path: PathBuf, message: String },

    /// Invalid configuration
    Config(String),

    /// A serialized program is malformed
    Program(String),
}

impl fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "cannot read {}: {}", path.display(), source),
            Self::Parse { path, message } => write!(f, "cannot parse {}: {}", path.display(), message),
            Self::Config(msg) => write!(f, "invalid configuration: {}", msg),
            Self::Program(msg) => write!(f, "invalid program: {}", msg),
        }
    }
}

impl std::error::Error for AnalysisError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for AnalysisError {
    fn from(err: serde_json::Error) -> Self {
        Self::Program(err.to_string())
    }
}
