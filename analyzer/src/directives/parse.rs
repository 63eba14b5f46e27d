//! Directive comment grammar
//!
//! `//<tag>:ignore`, `//<tag>:pure`, `//<tag>:immutable-return`, or a
//! comma-separated combination, optionally followed by `// note`.

use parser::{Comment, CommentKind};
use smallvec::SmallVec;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DirectiveKind {
    Ignore,
    Pure,
    ImmutableReturn,
}

impl DirectiveKind {
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "ignore" => Some(Self::Ignore),
            "pure" => Some(Self::Pure),
            "immutable-return" => Some(Self::ImmutableReturn),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ignore => "ignore",
            Self::Pure => "pure",
            Self::ImmutableReturn => "immutable-return",
        }
    }
}

impl fmt::Display for DirectiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type DirectiveKinds = SmallVec<[DirectiveKind; 2]>;

/// Directives named by one line comment. A comment with any unknown token
/// is not a directive at all.
pub fn parse_directive(tag: &str, comment: &Comment) -> Option<DirectiveKinds> {
    if comment.kind != CommentKind::Line {
        return None;
    }
    parse_directive_text(tag, comment.body())
}

/// Same as [`parse_directive`], on the comment text after `//`
pub fn parse_directive_text(tag: &str, body: &str) -> Option<DirectiveKinds> {
    let rest = body.trim().strip_prefix(tag)?.strip_prefix(':')?;
    let list = match rest.find("//") {
        Some(note) => &rest[..note],
        None => rest,
    };

    let mut kinds = DirectiveKinds::new();
    for token in list.split(',') {
        let kind = DirectiveKind::from_token(token.trim())?;
        if !kinds.contains(&kind) {
            kinds.push(kind);
        }
    }
    Some(kinds)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(body: &str) -> Option<Vec<DirectiveKind>> {
        parse_directive_text("chainlint", body).map(|k| k.into_vec())
    }

    #[test]
    fn test_single_directives() {
        assert_eq!(parse("chainlint:ignore"), Some(vec![DirectiveKind::Ignore]));
        assert_eq!(parse(" chainlint:pure "), Some(vec![DirectiveKind::Pure]));
        assert_eq!(
            parse("chainlint:immutable-return"),
            Some(vec![DirectiveKind::ImmutableReturn])
        );
    }

    #[test]
    fn test_combined_with_note() {
        assert_eq!(
            parse("chainlint:pure, immutable-return // returns a session"),
            Some(vec![DirectiveKind::Pure, DirectiveKind::ImmutableReturn])
        );
        assert_eq!(
            parse("chainlint:ignore // known false positive"),
            Some(vec![DirectiveKind::Ignore])
        );
    }

    #[test]
    fn test_rejected_forms() {
        assert_eq!(parse("chainlint:ignored"), None);
        assert_eq!(parse("chainlint:"), None);
        assert_eq!(parse("chainlint ignore"), None);
        assert_eq!(parse("nolint:ignore"), None);
        assert_eq!(parse("chainlint:pure,"), None);
        assert_eq!(parse("see chainlint:ignore"), None);
    }

    #[test]
    fn test_block_comments_are_not_directives() {
        let comment = Comment {
            kind: CommentKind::Block,
            text: "/*chainlint:ignore*/".to_string(),
            span: parser::Span::new(0, 20),
        };
        assert!(parse_directive("chainlint", &comment).is_none());
    }
}
