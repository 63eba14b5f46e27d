//! Diagnostic code registry
//!
//! Every diagnostic chainlint emits carries one of these codes. The letter
//! names the family, the number the individual check.
//!
//! # Code Families
//!
//! - E: source files that cannot be parsed (emitted by the parser crate)
//! - R: handle reuse
//! - P: `pure` contract violations
//! - D: directive hygiene

use std::collections::HashMap;
use std::fmt;

/// A diagnostic code with its human-readable description
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ErrorCode {
    /// Family letter (e.g., 'R')
    pub family: char,
    /// Number within the family (e.g., 1)
    pub code: u16,
    /// Human-readable category
    pub category: &'static str,
    /// Brief description of what the diagnostic means
    pub description: &'static str,
    /// Optional help text with suggestions for fixing the problem
    pub help: Option<&'static str>,
}

impl ErrorCode {
    pub const fn new(
        family: char,
        code: u16,
        category: &'static str,
        description: &'static str,
        help: Option<&'static str>,
    ) -> Self {
        Self {
            family,
            code,
            category,
            description,
            help,
        }
    }

    /// Format the code as "{family}{code:03}" (e.g., "R001")
    pub fn format_code(&self) -> String {
        format!("{}{:03}", self.family, self.code)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}]: {}",
            self.format_code(),
            self.category,
            self.description
        )
    }
}

pub const PARSE_ERROR: ErrorCode = ErrorCode::new(
    'E',
    1,
    "Parser",
    "Source file cannot be parsed",
    Some("Directives and fixes for this file are unavailable until it parses"),
);

pub const HANDLE_REUSE: ErrorCode = ErrorCode::new(
    'R',
    1,
    "Reuse",
    "Mutable handle reused after a chain method",
    Some("Reassign the chain result or derive the handle from a Session"),
);

pub const PURE_POLLUTES: ErrorCode = ErrorCode::new(
    'P',
    1,
    "Purity",
    "Function declared pure calls a chain method on a parameter",
    Some("Call Session on the parameter first or drop the pure directive"),
);

pub const PURE_LEAKS: ErrorCode = ErrorCode::new(
    'P',
    2,
    "Purity",
    "Function declared pure passes a parameter to a non-pure function",
    Some("Mark the callee pure or pass a Session-derived handle"),
);

pub const PURE_RETURNS_POLLUTED: ErrorCode = ErrorCode::new(
    'P',
    3,
    "Purity",
    "Function declared pure returns a polluted handle",
    None,
);

pub const UNUSED_IGNORE: ErrorCode = ErrorCode::new(
    'D',
    1,
    "Directive",
    "Ignore directive suppresses nothing",
    Some("Remove the directive"),
);

pub const UNUSED_ATTRIBUTE: ErrorCode = ErrorCode::new(
    'D',
    2,
    "Directive",
    "Attribute directive does not apply to a handle-typed function",
    Some("Attach the directive to a function whose signature mentions the handle type"),
);

/// Registry containing all defined codes
pub struct ErrorCodeRegistry {
    codes: HashMap<String, ErrorCode>,
}

impl ErrorCodeRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            codes: HashMap::new(),
        };
        for code in [
            PARSE_ERROR,
            HANDLE_REUSE,
            PURE_POLLUTES,
            PURE_LEAKS,
            PURE_RETURNS_POLLUTED,
            UNUSED_IGNORE,
            UNUSED_ATTRIBUTE,
        ] {
            registry.codes.insert(code.format_code(), code);
        }
        registry
    }

    /// Look a code up by its formatted string (e.g., "R001")
    pub fn get(&self, code: &str) -> Option<&ErrorCode> {
        self.codes.get(code)
    }

    pub fn is_valid_code(&self, code: &str) -> bool {
        self.codes.contains_key(code)
    }

    /// All codes of one family, sorted by number
    pub fn family(&self, family: char) -> Vec<&ErrorCode> {
        let mut codes: Vec<_> = self.codes.values().filter(|c| c.family == family).collect();
        codes.sort_by_key(|c| c.code);
        codes
    }
}

impl Default for ErrorCodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

static REGISTRY: std::sync::OnceLock<ErrorCodeRegistry> = std::sync::OnceLock::new();

/// Global registry instance
pub fn error_registry() -> &'static ErrorCodeRegistry {
    REGISTRY.get_or_init(ErrorCodeRegistry::new)
}

/// Help text for a formatted code, if the registry has any
pub fn help_for(code: &str) -> Option<&'static str> {
    error_registry().get(code).and_then(|c| c.help)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_code() {
        assert_eq!(HANDLE_REUSE.format_code(), "R001");
        assert_eq!(PURE_RETURNS_POLLUTED.format_code(), "P003");
        assert_eq!(PARSE_ERROR.format_code(), "E001");
    }

    #[test]
    fn test_registry_lookup() {
        let registry = error_registry();
        assert!(registry.is_valid_code("D002"));
        assert!(!registry.is_valid_code("R999"));
        assert_eq!(registry.get("P002").unwrap().category, "Purity");

        let purity: Vec<u16> = registry.family('P').iter().map(|c| c.code).collect();
        assert_eq!(purity, vec![1, 2, 3]);
    }

    #[test]
    fn test_help_for() {
        assert!(help_for("R001").is_some());
        assert!(help_for("P003").is_none());
        assert!(help_for("nope").is_none());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            UNUSED_IGNORE.to_string(),
            "D001 [Directive]: Ignore directive suppresses nothing"
        );
    }
}
