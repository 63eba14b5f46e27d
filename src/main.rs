//! chainlint - finds reused gorm query handles
//!
//! # Usage
//!
//! ```bash
//! # Report findings for a program exported by the SSA host
//! chainlint check program.json
//!
//! # Sources are resolved against a root directory
//! chainlint check --root ./repo program.json
//!
//! # Apply the synthesized fixes in place
//! chainlint check --fix program.json
//!
//! # Machine-readable output
//! chainlint check --format json program.json
//! ```

use analyzer::ssa::Program;
use analyzer::{logging, AnalysisError, Analyzer, AnalyzerConfig, Report, SourceUnit};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use diagnostics::{apply_edits, ErrorFormatter, FileId, TextEdit};
use log::LevelFilter;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process;

#[derive(Parser)]
#[command(name = "chainlint")]
#[command(version = "0.1.0")]
#[command(about = "Detects reuse of mutable gorm query handles", long_about = None)]
struct Cli {
    /// More logging (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a serialized SSA program
    Check {
        /// Program exported by the SSA host
        program: PathBuf,

        /// Directory the program's file paths are relative to
        #[arg(long, default_value = ".")]
        root: PathBuf,

        /// Configuration file
        #[arg(long, default_value = "chainlint.toml")]
        config: PathBuf,

        /// Rewrite source files with the synthesized fixes
        #[arg(long)]
        fix: bool,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum OutputFormat {
    /// One `file:line:col: message` line per finding
    Text,
    /// Source snippets with labels and help
    Pretty,
    Json,
}

fn main() {
    let cli = Cli::parse();

    if std::env::var_os("RUST_LOG").is_some() {
        logging::init_from_env();
    } else {
        logging::init_with_level(match cli.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            _ => LevelFilter::Debug,
        });
    }

    let result = match cli.command {
        Commands::Check {
            program,
            root,
            config,
            fix,
            format,
        } => check(&program, &root, &config, fix, format),
    };

    match result {
        Ok(true) => process::exit(1),
        Ok(false) => {}
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(2);
        }
    }
}

/// Returns whether anything was reported
fn check(program_path: &Path, root: &Path, config_path: &Path, fix: bool, format: OutputFormat) -> Result<bool, AnalysisError> {
    let config = AnalyzerConfig::load(config_path)?;
    let json = read(program_path)?;
    let program = Program::from_json(&json)?;

    let mut unit = SourceUnit::new();
    for file in &program.files {
        let path = root.join(&file.path);
        let text = read(&path)?;
        // A file that does not parse still gets its findings, without
        // directives or fixes
        if let Err(err) = unit.add_source(file.id, file.path.clone(), file.package.clone(), text) {
            log::warn!("{}", err);
        }
    }

    let analyzer = Analyzer::new(config);
    let report = analyzer.analyze(&program, &unit)?;
    print_report(&report, &unit, format)?;

    if fix {
        apply_fixes(&report, &unit, root)?;
    }
    Ok(!report.is_empty())
}

fn read(path: &Path) -> Result<String, AnalysisError> {
    std::fs::read_to_string(path).map_err(|source| AnalysisError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn print_report(report: &Report, unit: &SourceUnit, format: OutputFormat) -> Result<(), AnalysisError> {
    match format {
        OutputFormat::Text => {
            let formatter = ErrorFormatter::new();
            for finding in &report.findings {
                println!("{}", formatter.format_short(&finding.diagnostic, &unit.source_map));
            }
        }
        OutputFormat::Pretty => {
            let formatter = ErrorFormatter::with_colors();
            println!("{}", formatter.format_diagnostics(&report.diagnostics(), &unit.source_map));
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&report.findings)?);
        }
    }
    log::info!(
        "{} function(s), {} finding(s), {} suppressed",
        report.stats.functions_analyzed,
        report.findings.len(),
        report.stats.suppressed
    );
    Ok(())
}

/// Apply every fix of the report, adding the imports the fixes ask for
fn apply_fixes(report: &Report, unit: &SourceUnit, root: &Path) -> Result<(), AnalysisError> {
    let mut per_file: BTreeMap<FileId, Vec<TextEdit>> = BTreeMap::new();
    let mut imports: BTreeMap<FileId, Vec<(String, String)>> = BTreeMap::new();
    for fix in report.findings.iter().flat_map(|f| f.diagnostic.fixes.iter()) {
        for edit in &fix.edits {
            per_file.entry(edit.file_id).or_default().push(edit.clone());
        }
        for import in &fix.imports {
            let wanted = (import.name.clone(), import.path.clone());
            let entry = imports.entry(import.file_id).or_default();
            if !entry.contains(&wanted) {
                entry.push(wanted);
            }
        }
    }

    for (file_id, mut edits) in per_file {
        let (Some(file), Some(text)) = (unit.file(file_id), unit.text(file_id)) else {
            log::warn!("no source for {}, fixes skipped", file_id);
            continue;
        };
        let at = file.ast.import_insert_offset();
        for (name, path) in imports.remove(&file_id).unwrap_or_default() {
            let default_name = path.rsplit('/').next().unwrap_or(&path);
            let line = if name == default_name {
                format!("\n\nimport {:?}", path)
            } else {
                format!("\n\nimport {} {:?}", name, path)
            };
            edits.push(TextEdit::insert(file_id, at, line));
        }

        let fixed = match apply_edits(text, &edits) {
            Ok(fixed) => fixed,
            Err(err) => {
                log::warn!("{}: {}", file.path.display(), err);
                continue;
            }
        };
        let path = root.join(&file.path);
        std::fs::write(&path, fixed).map_err(|source| AnalysisError::Io { path: path.clone(), source })?;
        eprintln!("fixed {}", file.path.display());
    }
    Ok(())
}
