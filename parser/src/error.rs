//! Parse errors
//!
//! `ContextualError` is the nom error type used by every parser in this
//! crate. It remembers the `context()` strings that were active when a
//! parser failed together with how much input was left, so that the error
//! finally reported is the one that got furthest into the file.

use std::fmt;

use diagnostics::{Diagnostic, DiagnosticBuilder, FileId, Pos, SourceMap};
use nom::error::{ContextError, ErrorKind, FromExternalError, ParseError as NomParseError};

/// A context string and the amount of input that was left when it failed
#[derive(Debug, Clone, PartialEq)]
pub struct ContextWithLocation {
    pub context: &'static str,
    pub remaining: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContextualError<I> {
    pub input: I,
    pub code: ErrorKind,
    pub contexts: Vec<ContextWithLocation>,
}

impl<I: AsRef<str>> ContextualError<I> {
    pub fn new(input: I, code: ErrorKind) -> Self {
        Self {
            input,
            code,
            contexts: Vec::new(),
        }
    }

    /// Input left at the deepest failure point
    fn remaining(&self) -> usize {
        self.contexts
            .iter()
            .map(|c| c.remaining)
            .min()
            .unwrap_or(usize::MAX)
            .min(self.input.as_ref().len())
    }

    /// Context string of the deepest failure point
    pub fn deepest_context(&self) -> Option<&'static str> {
        self.contexts
            .iter()
            .min_by_key(|c| c.remaining)
            .map(|c| c.context)
    }

    /// Byte offset of the failure in `full`
    pub fn offset_in(&self, full: &str) -> usize {
        full.len().saturating_sub(self.remaining())
    }
}

impl<I: AsRef<str>> NomParseError<I> for ContextualError<I> {
    fn from_error_kind(input: I, kind: ErrorKind) -> Self {
        Self::new(input, kind)
    }

    fn append(input: I, kind: ErrorKind, other: Self) -> Self {
        // Keep whichever error got further
        if other.remaining() <= input.as_ref().len() {
            other
        } else {
            Self::new(input, kind)
        }
    }

    fn or(self, other: Self) -> Self {
        let (mine, theirs) = (self.remaining(), other.remaining());
        if mine < theirs || (mine == theirs && self.contexts.len() >= other.contexts.len()) {
            self
        } else {
            other
        }
    }
}

impl<I: AsRef<str>> ContextError<I> for ContextualError<I> {
    fn add_context(input: I, ctx: &'static str, mut other: Self) -> Self {
        let remaining = other.input.as_ref().len().min(input.as_ref().len());
        other.contexts.push(ContextWithLocation {
            context: ctx,
            remaining,
        });
        other
    }
}

impl<I: AsRef<str>, E> FromExternalError<I, E> for ContextualError<I> {
    fn from_external_error(input: I, kind: ErrorKind, _e: E) -> Self {
        Self::new(input, kind)
    }
}

impl<I: AsRef<str>> fmt::Display for ContextualError<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.deepest_context() {
            Some(context) => write!(f, "{}", context),
            None => write!(f, "unexpected input ({:?})", self.code),
        }
    }
}

/// A failed parse of one file
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub file: String,
    pub message: String,
    pub offset: usize,
}

impl ParseError {
    pub fn new(file: impl Into<String>, message: impl Into<String>, offset: usize) -> Self {
        Self {
            file: file.into(),
            message: message.into(),
            offset,
        }
    }

    pub(crate) fn from_nom(file: &str, full: &str, err: nom::Err<ContextualError<&str>>) -> Self {
        match err {
            nom::Err::Error(e) | nom::Err::Failure(e) => {
                ParseError::new(file, e.to_string(), e.offset_in(full))
            }
            nom::Err::Incomplete(_) => ParseError::new(file, "unexpected end of file", full.len()),
        }
    }

    pub fn to_diagnostic(&self, file_id: FileId, source_map: &SourceMap) -> Diagnostic {
        let pos = Pos::new(file_id, self.offset);
        let span = source_map.span_at(pos);
        DiagnosticBuilder::error(format!("cannot parse {}: {}", self.file, self.message), pos, span.clone())
            .code("E001")
            .label(span, "parsing stopped here")
            .build()
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: offset {}: {}", self.file, self.offset, self.message)
    }
}

impl std::error::Error for ParseError {}

#[cfg(test)]
mod tests {
    use super::*;
    use nom::{bytes::complete::tag, error::context, IResult, Parser};

    type TestResult<'a, T> = IResult<&'a str, T, ContextualError<&'a str>>;

    fn hello(input: &str) -> TestResult<'_, &str> {
        context("expected 'hello'", tag("hello")).parse(input)
    }

    #[test]
    fn test_context_capture() {
        match hello("world") {
            Err(nom::Err::Error(e)) => {
                assert_eq!(e.deepest_context(), Some("expected 'hello'"));
                assert_eq!(e.offset_in("world"), 0);
            }
            _ => panic!("expected error with context"),
        }
    }

    #[test]
    fn test_offset_of_deeper_failure() {
        let full = "abc hello";
        match hello(&full[4..]) {
            Ok(_) => {}
            Err(_) => panic!("should parse"),
        }
        match hello(&full[1..]) {
            Err(nom::Err::Error(e)) => assert_eq!(e.offset_in(full), 1),
            _ => panic!("expected error"),
        }
    }
}
