//! Source files of the analyzed unit
//!
//! The analyzer reads directives from comments and locates rewrite targets
//! in syntax, so every file the program was built from is parsed once and
//! kept next to its text.

use parser::{parse_go_file, SourceFile};
use source_map::{FileId, SourceMap};
use std::path::{Path, PathBuf};

use crate::error::AnalysisError;

/// A parsed file of the unit
#[derive(Debug, Clone)]
pub struct UnitFile {
    pub file_id: FileId,
    pub path: PathBuf,
    /// Import path of the file's package
    pub package: String,
    pub ast: SourceFile,
}

/// Parsed sources of one translation unit
#[derive(Debug, Default)]
pub struct SourceUnit {
    pub source_map: SourceMap,
    pub files: Vec<UnitFile>,
}

impl SourceUnit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register and parse one file under the id the program uses for it
    pub fn add_source(
        &mut self,
        file_id: FileId,
        path: impl Into<PathBuf>,
        package: impl Into<String>,
        text: impl Into<String>,
    ) -> Result<(), AnalysisError> {
        let path = path.into();
        let text = text.into();
        let name = path.display().to_string();
        let ast = parse_go_file(&name, &text).map_err(|err| AnalysisError::Parse {
            path: path.clone(),
            message: err.to_string(),
        })?;
        self.source_map.insert_file(file_id, name, text);
        self.files.retain(|file| file.file_id != file_id);
        self.files.push(UnitFile {
            file_id,
            path,
            package: package.into(),
            ast,
        });
        Ok(())
    }

    pub fn file(&self, file_id: FileId) -> Option<&UnitFile> {
        self.files.iter().find(|file| file.file_id == file_id)
    }

    pub fn file_by_path(&self, path: &Path) -> Option<&UnitFile> {
        self.files.iter().find(|file| file.path == path)
    }

    /// Text of a file
    pub fn text(&self, file_id: FileId) -> Option<&str> {
        self.source_map
            .get_file(file_id)
            .map(|file| file.content.as_str())
    }
}
