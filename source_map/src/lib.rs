//! Source mapping utilities for multi-file analysis
//!
//! This library provides source file tracking and position mapping for the
//! analyzer. It manages file identifiers, source text storage, and efficient
//! line/column calculation from byte offsets. SSA positions (`Pos`) are plain
//! `(file, byte offset)` pairs and only become line/column pairs when a
//! diagnostic is rendered or an ignore directive is matched.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Represents a position in source code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourcePosition {
    pub line: usize,
    pub column: usize,
    pub byte_offset: usize,
}

impl SourcePosition {
    pub fn new(line: usize, column: usize, byte_offset: usize) -> Self {
        Self { line, column, byte_offset }
    }
}

/// Represents a span of source code
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceSpan {
    pub start: SourcePosition,
    pub end: SourcePosition,
    pub file_id: FileId,
}

impl SourceSpan {
    pub fn new(start: SourcePosition, end: SourcePosition, file_id: FileId) -> Self {
        Self { start, end, file_id }
    }

}

/// Unique identifier for a source file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(usize);

impl FileId {
    pub fn new(id: usize) -> Self {
        Self(id)
    }

    pub fn as_usize(self) -> usize {
        self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileId({})", self.0)
    }
}

/// A byte position inside one file.
///
/// Ordered by file first and offset second, which gives the deterministic
/// "source order" used for sorting uses and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Pos {
    pub file_id: FileId,
    pub offset: usize,
}

impl Pos {
    pub fn new(file_id: FileId, offset: usize) -> Self {
        Self { file_id, offset }
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.file_id.0, self.offset)
    }
}

/// Information about a source file
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub content: String,
    pub line_starts: Vec<usize>,
}

impl SourceFile {
    /// Create a new source file with precomputed line starts
    pub fn new(name: String, content: String) -> Self {
        let line_starts = compute_line_starts(&content);
        Self {
            name,
            content,
            line_starts,
        }
    }

    /// Get a specific line from the source file (1-based line numbers)
    pub fn get_line(&self, line_number: usize) -> Option<&str> {
        if line_number == 0 || line_number > self.line_starts.len() {
            return None;
        }

        let start = self.line_starts[line_number - 1];
        let end = if line_number < self.line_starts.len() {
            self.line_starts[line_number]
        } else {
            self.content.len()
        };

        Some(self.content[start..end].trim_end_matches(&['\n', '\r']))
    }

    /// Convert a byte offset to line and column (1-based)
    pub fn offset_to_line_col(&self, offset: usize) -> (usize, usize) {
        let line_index = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i.saturating_sub(1),
        };

        let line_start = self.line_starts.get(line_index).copied().unwrap_or(0);
        let column = offset.saturating_sub(line_start) + 1;
        let line = line_index + 1;

        (line, column)
    }

    /// Line (1-based) containing a byte offset
    pub fn line_of(&self, offset: usize) -> usize {
        self.offset_to_line_col(offset).0
    }
}

/// Manages source files and their content for multi-file analysis
#[derive(Debug, Clone)]
pub struct SourceMap {
    files: HashMap<FileId, SourceFile>,
    by_name: HashMap<String, FileId>,
    next_id: usize,
}

impl SourceMap {
    /// Create a new empty source map
    pub fn new() -> Self {
        Self {
            files: HashMap::new(),
            by_name: HashMap::new(),
            next_id: 0,
        }
    }

    /// Add a source file and return its FileId.
    ///
    /// Adding a file name twice replaces the content but keeps the id.
    pub fn add_file(&mut self, name: String, content: String) -> FileId {
        if let Some(&existing) = self.by_name.get(&name) {
            self.files.insert(existing, SourceFile::new(name, content));
            return existing;
        }

        let file_id = FileId(self.next_id);
        self.next_id += 1;

        self.by_name.insert(name.clone(), file_id);
        self.files.insert(file_id, SourceFile::new(name, content));

        file_id
    }

    /// Register a file under a caller-chosen id (used when ids come from a
    /// serialized program).
    pub fn insert_file(&mut self, file_id: FileId, name: String, content: String) {
        self.next_id = self.next_id.max(file_id.0 + 1);
        self.by_name.insert(name.clone(), file_id);
        self.files.insert(file_id, SourceFile::new(name, content));
    }

    /// Get a source file by its FileId
    pub fn get_file(&self, file_id: FileId) -> Option<&SourceFile> {
        self.files.get(&file_id)
    }

    /// Get a specific line from a file (1-based line numbers)
    pub fn get_line(&self, file_id: FileId, line_number: usize) -> Option<&str> {
        self.get_file(file_id)?.get_line(line_number)
    }

    /// Line (1-based) of a position, if its file is known
    pub fn line_of(&self, pos: Pos) -> Option<usize> {
        self.get_file(pos.file_id).map(|file| file.line_of(pos.offset))
    }

    /// Single-character span at a position. Unknown files get a span with
    /// line 0 so the diagnostic can still be emitted.
    pub fn span_at(&self, pos: Pos) -> SourceSpan {
        let (line, column) = self
            .get_file(pos.file_id)
            .map_or((0, 0), |file| file.offset_to_line_col(pos.offset));
        SourceSpan::new(
            SourcePosition::new(line, column, pos.offset),
            SourcePosition::new(line, column + 1, pos.offset + 1),
            pos.file_id,
        )
    }

    /// Get the number of files in the source map
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Check if the source map is empty
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl Default for SourceMap {
    fn default() -> Self {
        Self::new()
    }
}

/// Compute line start offsets for a source text
fn compute_line_starts(source: &str) -> Vec<usize> {
    let mut line_starts = vec![0];

    for (i, ch) in source.char_indices() {
        if ch == '\n' {
            line_starts.push(i + 1);
        }
    }

    line_starts
}

/// Integration with parser byte spans
pub mod parser_integration {
    use serde::{Deserialize, Serialize};

    /// Half-open byte range produced by the parser
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct ByteSpan {
        pub start: usize,
        pub end: usize,
    }

    impl ByteSpan {
        pub fn new(start: usize, end: usize) -> Self {
            Self { start, end }
        }

        pub fn merge(self, other: ByteSpan) -> ByteSpan {
            ByteSpan::new(self.start.min(other.start), self.end.max(other.end))
        }

        pub fn contains(&self, offset: usize) -> bool {
            self.start <= offset && offset < self.end
        }

        pub fn len(&self) -> usize {
            self.end.saturating_sub(self.start)
        }

        pub fn is_empty(&self) -> bool {
            self.end <= self.start
        }
    }
}
