//! Whole-program analysis: SSA + sources -> diagnostics
//!
//! The pipeline runs in these stages:
//! 1. Build the catalogue and collect directives from the unit's comments
//! 2. Preload the source files of callees declared outside the unit
//! 3. Check every top-level function (in parallel when configured), and
//!    validate the ones declared `pure`
//! 4. Turn violations into diagnostics, synthesizing fixes for reuses
//! 5. Sort and de-duplicate, then apply ignore directives
//! 6. Report directives that did nothing

use diagnostics::{Diagnostic, DiagnosticBuilder, Diagnostics, Pos};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::catalogue::Catalogue;
use crate::checker::{FunctionChecker, FunctionReport};
use crate::config::AnalyzerConfig;
use crate::directives::DirectiveStore;
use crate::error::AnalysisError;
use crate::error_codes::{
    help_for, ErrorCode, HANDLE_REUSE, PURE_LEAKS, PURE_POLLUTES, PURE_RETURNS_POLLUTED, UNUSED_ATTRIBUTE,
    UNUSED_IGNORE,
};
use crate::fix::FixSynthesizer;
use crate::pollution::{UseKind, Violation};
use crate::purity::{validate_pure_function, PurityViolation, PurityViolationKind};
use crate::source::SourceUnit;
use crate::ssa::{Function, Program, ValueId};

/// A consumption of the reported root
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UseSite {
    pub pos: Pos,
    pub kind: UseKind,
}

/// One reported diagnostic with the analysis facts behind it
#[derive(Debug, Clone, Serialize)]
pub struct Finding {
    pub diagnostic: Diagnostic,
    /// Root of a reuse finding
    pub root: Option<ValueId>,
    /// Uses of `root` in position order
    pub uses: Vec<UseSite>,
}

impl Finding {
    fn new(diagnostic: Diagnostic) -> Self {
        Self {
            diagnostic,
            root: None,
            uses: Vec::new(),
        }
    }

    pub fn pos(&self) -> Pos {
        self.diagnostic.pos
    }

    pub fn message(&self) -> &str {
        &self.diagnostic.message
    }

    pub fn code(&self) -> Option<&str> {
        self.diagnostic.code.as_deref()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AnalysisStats {
    pub functions_analyzed: usize,
    pub pure_functions: usize,
    pub violations: usize,
    /// Findings dropped by ignore directives
    pub suppressed: usize,
    pub fixes: usize,
    pub external_files: usize,
    pub analysis_time: Duration,
}

/// Findings of one analysis run, sorted by position
#[derive(Debug, Clone, Default, Serialize)]
pub struct Report {
    pub findings: Vec<Finding>,
    pub stats: AnalysisStats,
}

impl Report {
    pub fn is_empty(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn diagnostics(&self) -> Diagnostics {
        let mut diagnostics = Diagnostics::new();
        for finding in &self.findings {
            diagnostics.push(finding.diagnostic.clone());
        }
        diagnostics
    }

    pub fn with_code<'r>(&'r self, code: &'r str) -> impl Iterator<Item = &'r Finding> + 'r {
        self.findings.iter().filter(move |f| f.code() == Some(code))
    }
}

/// Per-function outcome of the parallel phase
struct FunctionOutcome {
    report: FunctionReport,
    purity: Vec<PurityViolation>,
    pure: bool,
}

pub struct Analyzer {
    config: AnalyzerConfig,
    catalogue: Catalogue,
}

impl Analyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        let catalogue = Catalogue::new(&config);
        Self { config, catalogue }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn catalogue(&self) -> &Catalogue {
        &self.catalogue
    }

    /// Analyze every function of `program`. Only unreadable external source
    /// files abort the run.
    pub fn analyze(&self, program: &Program, unit: &SourceUnit) -> Result<Report, AnalysisError> {
        let start = Instant::now();
        let directives = DirectiveStore::build(&self.config.tag, unit, program, &self.catalogue);

        let external = self.external_sources(program, unit);
        directives.preload_external(external.iter().map(PathBuf::as_path))?;

        let functions: Vec<&Function> = program
            .top_level_functions()
            .filter(|func| !func.is_external())
            .collect();
        log::info!(
            "analyzing {} function(s), {} external source file(s)",
            functions.len(),
            external.len()
        );

        let outcomes: Vec<FunctionOutcome> = if self.config.parallel {
            functions
                .par_iter()
                .map(|func| self.analyze_function(program, &directives, func))
                .collect()
        } else {
            functions
                .iter()
                .map(|func| self.analyze_function(program, &directives, func))
                .collect()
        };

        let mut stats = AnalysisStats {
            functions_analyzed: outcomes.len(),
            external_files: external.len(),
            ..AnalysisStats::default()
        };
        let mut synthesizer = FixSynthesizer::new(program, &self.catalogue, unit);
        let mut findings = Vec::new();
        for outcome in &outcomes {
            stats.violations += outcome.report.violations.len() + outcome.purity.len();
            if outcome.pure {
                stats.pure_functions += 1;
            }
            for violation in &outcome.report.violations {
                findings.push(self.reuse_finding(program, unit, &mut synthesizer, violation));
            }
            for violation in &outcome.purity {
                findings.push(self.purity_finding(unit, violation));
            }
        }
        stats.fixes = synthesizer.stats().fixes;

        sort_findings(&mut findings);
        findings.dedup_by(|later, earlier| later.pos() == earlier.pos() && later.message() == earlier.message());

        // Every finding is offered to the ignores so each covering one is marked used
        let before = findings.len();
        findings.retain(|finding| {
            let pos = finding.pos();
            !directives.is_suppressed(pos, unit.source_map.line_of(pos))
        });
        stats.suppressed = before - findings.len();

        findings.extend(self.directive_findings(unit, &directives));
        sort_findings(&mut findings);

        stats.analysis_time = start.elapsed();
        log::info!(
            "{} finding(s), {} suppressed, in {:?}",
            findings.len(),
            stats.suppressed,
            stats.analysis_time
        );
        Ok(Report { findings, stats })
    }

    fn analyze_function(&self, program: &Program, directives: &DirectiveStore, func: &Function) -> FunctionOutcome {
        let report = FunctionChecker::new(program, &self.catalogue, directives, func.id).check();
        let pure = directives.is_pure_function(func);
        let purity = if pure {
            validate_pure_function(program, &self.catalogue, directives, func)
        } else {
            Vec::new()
        };
        log::debug!(
            "{}: {} reuse(s), {} contract violation(s) in {:?}",
            func.name,
            report.violations.len(),
            purity.len(),
            report.stats.analysis_time
        );
        FunctionOutcome { report, purity, pure }
    }

    /// Source files of callees declared outside the unit
    fn external_sources(&self, program: &Program, unit: &SourceUnit) -> BTreeSet<PathBuf> {
        program
            .values
            .iter()
            .filter_map(|value| value.kind.call_common())
            .filter_map(|call| call.static_callee())
            .filter(|func| func.body.is_none() && !self.catalogue.is_orm_package(&func.package))
            .filter_map(|func| func.source_file.clone())
            .filter(|path| unit.file_by_path(path).is_none())
            .collect()
    }

    fn builder(&self, unit: &SourceUnit, message: String, pos: Pos, code: &ErrorCode) -> DiagnosticBuilder {
        let code = code.format_code();
        let mut builder = DiagnosticBuilder::warning(message, pos, unit.source_map.span_at(pos));
        if let Some(help) = help_for(&code) {
            builder = builder.help(help);
        }
        builder.code(code)
    }

    fn reuse_finding(
        &self,
        program: &Program,
        unit: &SourceUnit,
        synthesizer: &mut FixSynthesizer<'_>,
        violation: &Violation,
    ) -> Finding {
        let span = unit.source_map.span_at(violation.pos);
        let mut builder = self
            .builder(unit, self.catalogue.reuse_message(), violation.pos, &HANDLE_REUSE)
            .label(span, "reused here");
        if let Some(root_pos) = program.value(violation.root).pos {
            builder = builder.secondary_label(unit.source_map.span_at(root_pos), "query built here");
        }
        if self.config.fix {
            if let Some(fix) = synthesizer.synthesize(violation) {
                builder = builder.fix(fix);
            }
        }
        Finding {
            diagnostic: builder.build(),
            root: Some(violation.root),
            uses: violation
                .uses
                .iter()
                .map(|u| UseSite { pos: u.pos, kind: u.kind })
                .collect(),
        }
    }

    fn purity_finding(&self, unit: &SourceUnit, violation: &PurityViolation) -> Finding {
        let code = match violation.kind {
            PurityViolationKind::Pollutes { .. } => &PURE_POLLUTES,
            PurityViolationKind::LeaksToImpure { .. } => &PURE_LEAKS,
            PurityViolationKind::ReturnsPolluted => &PURE_RETURNS_POLLUTED,
        };
        let message = violation.message(&self.catalogue);
        Finding::new(self.builder(unit, message, violation.pos, code).build())
    }

    fn directive_findings(&self, unit: &SourceUnit, directives: &DirectiveStore) -> Vec<Finding> {
        let tag = &self.config.tag;
        let ignores = directives.unused_ignores().into_iter().map(|pos| {
            let message = format!("unused {}:ignore directive", tag);
            Finding::new(self.builder(unit, message, pos, &UNUSED_IGNORE).build())
        });
        let attributes = directives.unused_attributes().iter().map(|attr| {
            let message = format!("unused {}:{} directive", tag, attr.kind);
            Finding::new(self.builder(unit, message, attr.pos, &UNUSED_ATTRIBUTE).build())
        });
        ignores.chain(attributes).collect()
    }
}

fn sort_findings(findings: &mut [Finding]) {
    findings.sort_by(|a, b| {
        a.pos()
            .cmp(&b.pos())
            .then_with(|| a.code().cmp(&b.code()))
            .then_with(|| a.message().cmp(b.message()))
    });
}
