//! chainlint analyzer
//!
//! Finds `*gorm.DB` handles that are consumed again after a chain method
//! mutated their shared statement, checks the contract of functions
//! declared `pure`, and synthesizes source edits that make reused handles
//! safe.

pub mod catalogue;
pub mod cfg;
pub mod checker;
pub mod config;
pub mod directives;
pub mod error;
pub mod error_codes;
pub mod fix;
pub mod logging;
pub mod pipeline;
pub mod pollution;
pub mod purity;
pub mod source;
pub mod ssa;
pub mod tracer;

#[cfg(test)]
mod testing;

pub use catalogue::Catalogue;
pub use config::AnalyzerConfig;
pub use directives::DirectiveStore;
pub use error::AnalysisError;
pub use pipeline::{AnalysisStats, Analyzer, Finding, Report, UseSite};
pub use pollution::{UseKind, Violation};
pub use purity::PurityState;
pub use source::SourceUnit;
