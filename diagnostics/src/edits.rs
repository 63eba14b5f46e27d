//! Text edits attached to fixes
//!
//! Edits are byte ranges in the original file text. A fix is a group of
//! edits that must be applied together, plus any imports the edited code
//! needs.

use std::fmt;

use serde::Serialize;
use source_map::FileId;

/// Replace `start..end` in a file with `new_text`. An empty range is an
/// insertion.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TextEdit {
    pub file_id: FileId,
    pub start: usize,
    pub end: usize,
    pub new_text: String,
}

impl TextEdit {
    pub fn insert(file_id: FileId, at: usize, text: impl Into<String>) -> Self {
        Self {
            file_id,
            start: at,
            end: at,
            new_text: text.into(),
        }
    }

    pub fn replace(file_id: FileId, start: usize, end: usize, text: impl Into<String>) -> Self {
        Self {
            file_id,
            start,
            end,
            new_text: text.into(),
        }
    }

    pub fn is_insertion(&self) -> bool {
        self.start == self.end
    }
}

impl fmt::Display for TextEdit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_insertion() {
            write!(f, "insert {:?} at {}", self.new_text, self.start)
        } else {
            write!(f, "replace {}..{} with {:?}", self.start, self.end, self.new_text)
        }
    }
}

/// An import the fixed code needs in the file it edits
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ImportRequest {
    pub file_id: FileId,
    pub path: String,
    /// Local name the edit text refers to the package by
    pub name: String,
}

/// A machine-applicable fix
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fix {
    pub message: String,
    pub edits: Vec<TextEdit>,
    pub imports: Vec<ImportRequest>,
}

impl Fix {
    pub fn new(message: impl Into<String>, edits: Vec<TextEdit>) -> Self {
        Self {
            message: message.into(),
            edits,
            imports: Vec::new(),
        }
    }

    pub fn with_import(mut self, import: ImportRequest) -> Self {
        if !self.imports.contains(&import) {
            self.imports.push(import);
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditError {
    OutOfBounds { start: usize, end: usize, len: usize },
    Overlap { first: (usize, usize), second: (usize, usize) },
    NotCharBoundary { offset: usize },
}

impl fmt::Display for EditError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EditError::OutOfBounds { start, end, len } => {
                write!(f, "edit {}..{} is outside a file of {} bytes", start, end, len)
            }
            EditError::Overlap { first, second } => write!(
                f,
                "edits {}..{} and {}..{} overlap",
                first.0, first.1, second.0, second.1
            ),
            EditError::NotCharBoundary { offset } => {
                write!(f, "edit offset {} is not on a character boundary", offset)
            }
        }
    }
}

impl std::error::Error for EditError {}

/// Sort edits by start offset and drop exact duplicates. Insertions at the
/// same offset keep their relative order.
pub fn normalize_edits(edits: &mut Vec<TextEdit>) {
    edits.sort_by(|a, b| {
        a.file_id
            .cmp(&b.file_id)
            .then(a.start.cmp(&b.start))
            .then(a.end.cmp(&b.end))
    });
    let mut seen: Vec<TextEdit> = Vec::with_capacity(edits.len());
    edits.retain(|edit| {
        if seen.contains(edit) {
            false
        } else {
            seen.push(edit.clone());
            true
        }
    });
}

/// Apply edits for a single file to its text.
pub fn apply_edits(source: &str, edits: &[TextEdit]) -> Result<String, EditError> {
    let mut edits = edits.to_vec();
    normalize_edits(&mut edits);

    for edit in &edits {
        if edit.start > edit.end || edit.end > source.len() {
            return Err(EditError::OutOfBounds {
                start: edit.start,
                end: edit.end,
                len: source.len(),
            });
        }
        for offset in [edit.start, edit.end] {
            if !source.is_char_boundary(offset) {
                return Err(EditError::NotCharBoundary { offset });
            }
        }
    }
    for pair in edits.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        if b.start < a.end {
            return Err(EditError::Overlap {
                first: (a.start, a.end),
                second: (b.start, b.end),
            });
        }
    }

    let mut output = String::with_capacity(source.len());
    let mut cursor = 0;
    for edit in &edits {
        output.push_str(&source[cursor..edit.start]);
        output.push_str(&edit.new_text);
        cursor = edit.end;
    }
    output.push_str(&source[cursor..]);
    Ok(output)
}
