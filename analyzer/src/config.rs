//! `chainlint.toml` parsing.
//!
//! Every field has a default, so an empty file (or no file at all) gives
//! the stock gorm configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::AnalysisError;

/// Analyzer settings. Keys are kebab-case at the top level of the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct AnalyzerConfig {
    /// Directive prefix, as in `//chainlint:ignore`
    pub tag: String,
    /// Import path of the ORM package; vendored copies ending in it match too
    pub orm_path: String,
    /// Named type whose pointer is the handle (`DB` for `*gorm.DB`)
    pub handle_type: String,
    /// Immutable-returning method used by session-wrapping fixes
    pub session_method: String,
    /// Configuration type passed to the session method
    pub session_type: String,
    /// Methods and package functions whose result is a fresh handle
    pub immutable_methods: Vec<String>,
    /// Chain methods whose result is normally discarded
    pub finishers: Vec<String>,
    /// Attach fixes to reuse diagnostics
    pub fix: bool,
    /// Analyze functions on the rayon thread pool
    pub parallel: bool,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            tag: "chainlint".to_string(),
            orm_path: "gorm.io/gorm".to_string(),
            handle_type: "DB".to_string(),
            session_method: "Session".to_string(),
            session_type: "Session".to_string(),
            immutable_methods: ["Session", "WithContext", "Debug", "Open", "Begin", "Transaction"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            finishers: [
                "Find", "First", "Last", "Take", "Count", "Pluck", "Scan", "Row", "Rows", "ScanRows",
                "Create", "Save", "Update", "Updates", "Delete", "Exec", "Transaction",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            fix: true,
            parallel: true,
        }
    }
}

impl AnalyzerConfig {
    /// Parse a configuration from TOML text.
    pub fn parse(content: &str) -> Result<Self, AnalysisError> {
        let config: AnalyzerConfig = toml::from_str(content)
            .map_err(|e| AnalysisError::Config(format!("failed to parse chainlint.toml: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, AnalysisError> {
        if !path.exists() {
            log::debug!("no config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| AnalysisError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    fn validate(&self) -> Result<(), AnalysisError> {
        if self.tag.is_empty() || self.tag.contains(char::is_whitespace) {
            return Err(AnalysisError::Config(format!("invalid directive tag {:?}", self.tag)));
        }
        if self.orm_path.is_empty() || self.handle_type.is_empty() {
            return Err(AnalysisError::Config("orm-path and handle-type must not be empty".to_string()));
        }
        if !self.immutable_methods.contains(&self.session_method) {
            return Err(AnalysisError::Config(format!(
                "session-method {} is not an immutable method",
                self.session_method
            )));
        }
        Ok(())
    }
}
