//! Go source parser with full span tracking
//!
//! The parser works directly on `&str` with nom. Every parser takes the
//! parse context (`Cx`, holding the full input) next to the remaining input
//! so that byte offsets can be recovered with `position`.
//!
//! Go terminates statements at line ends. Instead of inserting semicolons
//! up front, operators that would continue an expression (binary operators,
//! `.`, `(`, `[`, `{`, `++`) are only accepted when they sit on the same line
//! as the end of the operand before them; see `same_line`.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_until, take_while},
    character::complete::{multispace1, satisfy},
    combinator::{not, opt, peek, recognize, value},
    error::context,
    multi::many0,
    IResult, Parser,
};

use crate::error::{ContextualError, ParseError};
use crate::go_ast::*;
use crate::go_parser_decls::{func_decl, gen_decl};
use crate::go_parser_expr::string_lit;

/// Parser result type with contextual errors
pub type PResult<'a, T> = IResult<&'a str, T, ContextualError<&'a str>>;

/// Parse context threaded through every parser
#[derive(Debug, Clone, Copy)]
pub struct Cx<'a> {
    pub full: &'a str,
    /// Whether `T{...}` may be read as a composite literal. Off in the
    /// headers of `if`, `for` and `switch` where `{` opens the body.
    pub composite: bool,
}

impl<'a> Cx<'a> {
    pub fn new(full: &'a str) -> Self {
        Self { full, composite: true }
    }

    pub fn pos(&self, input: &str) -> usize {
        position(self.full, input)
    }

    pub fn span_from(&self, start: usize, input: &str) -> Span {
        Span::new(start, self.pos(input))
    }

    pub fn no_composite(self) -> Self {
        Self { composite: false, ..self }
    }

    pub fn with_composite(self) -> Self {
        Self { composite: true, ..self }
    }
}

/// Get current position in the original input
pub fn position(full: &str, current: &str) -> usize {
    full.len() - current.len()
}

/// Parse a complete Go source file
pub fn parse_go_file(file_name: &str, input: &str) -> Result<SourceFile, ParseError> {
    let cx = Cx::new(input);
    let comments = group_comments(input, collect_comments(input));

    let (rest, mut file) = go_file(cx, file_name, input).map_err(|e| ParseError::from_nom(file_name, input, e))?;
    let (rest, _) = ws(rest).map_err(|e| ParseError::from_nom(file_name, input, e))?;
    if !rest.is_empty() {
        let offset = position(input, rest);
        return Err(ParseError::new(file_name, "expected declaration", offset));
    }

    attach_docs(input, &mut file, &comments);
    file.comments = comments;
    Ok(file)
}

fn go_file<'a>(cx: Cx<'a>, file_name: &str, input: &'a str) -> PResult<'a, SourceFile> {
    let (input, package) = package_clause(cx, input)?;
    let (input, _) = opt(symbol(";")).parse(input)?;

    let mut imports = Vec::new();
    let mut input = input;
    while let Ok((rest, specs)) = import_decl(cx, input) {
        imports.extend(specs);
        let (rest, _) = opt(symbol(";")).parse(rest)?;
        input = rest;
    }

    let mut decls = Vec::new();
    loop {
        let (rest, _) = ws(input)?;
        if rest.is_empty() {
            input = rest;
            break;
        }
        let (rest, decl) = context("expected top-level declaration", |i| top_level_decl(cx, i)).parse(rest)?;
        decls.push(decl);
        let (rest, _) = opt(symbol(";")).parse(rest)?;
        input = rest;
    }

    Ok((
        input,
        SourceFile {
            name: file_name.to_string(),
            package,
            imports,
            decls,
            comments: Vec::new(),
            span: Span::new(0, cx.full.len()),
        },
    ))
}

fn top_level_decl<'a>(cx: Cx<'a>, input: &'a str) -> PResult<'a, Decl> {
    alt((
        |i| func_decl(cx, i).map(|(rest, func)| (rest, Decl::Func(func))),
        |i| gen_decl(cx, i).map(|(rest, decl)| (rest, Decl::Gen(decl))),
    ))
    .parse(input)
}

/// `package name`
pub fn package_clause<'a>(cx: Cx<'a>, input: &'a str) -> PResult<'a, PackageClause> {
    let (input, _) = ws(input)?;
    let start = cx.pos(input);
    let (input, _) = context("expected 'package' clause", keyword("package")).parse(input)?;
    let (input, name) = context("expected package name", |i| ident(cx, i)).parse(input)?;
    Ok((
        input,
        PackageClause {
            name,
            doc: None,
            span: cx.span_from(start, input),
        },
    ))
}

/// `import "path"` or `import ( ... )`
pub fn import_decl<'a>(cx: Cx<'a>, input: &'a str) -> PResult<'a, Vec<ImportSpec>> {
    let (input, _) = ws(input)?;
    let start = cx.pos(input);
    let (input, _) = keyword("import")(input)?;

    let (input, mut specs) = if let Ok((rest, _)) = symbol("(").parse(input) {
        let mut specs = Vec::new();
        let mut rest = rest;
        loop {
            if let Ok((after, _)) = symbol(")").parse(rest) {
                rest = after;
                break;
            }
            let (after, spec) = context("expected import path", |i| import_spec(cx, i)).parse(rest)?;
            specs.push(spec);
            let (after, _) = opt(symbol(";")).parse(after)?;
            rest = after;
        }
        (rest, specs)
    } else {
        let (rest, spec) = context("expected import path", |i| import_spec(cx, i)).parse(input)?;
        (rest, vec![spec])
    };

    let decl_span = cx.span_from(start, input);
    for spec in &mut specs {
        spec.decl_span = decl_span;
    }
    Ok((input, specs))
}

fn import_spec<'a>(cx: Cx<'a>, input: &'a str) -> PResult<'a, ImportSpec> {
    let (input, _) = ws(input)?;
    let start = cx.pos(input);
    let (input, name) = opt(alt((|i| ident(cx, i), |i| dot_import(cx, i)))).parse(input)?;
    let (input, _) = ws(input)?;
    let (input, path) = string_lit(input)?;
    Ok((
        input,
        ImportSpec {
            name,
            path: unquote(path),
            span: cx.span_from(start, input),
            decl_span: Span::default(),
        },
    ))
}

/// `.` in `import . "path"`
fn dot_import<'a>(cx: Cx<'a>, input: &'a str) -> PResult<'a, Ident> {
    let at = cx.pos(input);
    let (rest, _) = tag(".")(input)?;
    Ok((rest, Ident::new(".", Span::new(at, at + 1))))
}

/// Strip the quotes of a string literal. Escapes are left alone; import
/// paths never contain any.
pub fn unquote(lit: &str) -> String {
    lit.trim_matches(|c| c == '"' || c == '`').to_string()
}

// =============================================================================
// Whitespace and Comments
// =============================================================================

/// Skip whitespace and comments
pub fn ws(input: &str) -> PResult<'_, ()> {
    value(
        (),
        many0(alt((
            value((), multispace1),
            value((), line_comment),
            value((), block_comment),
        ))),
    )
    .parse(input)
}

/// Line comment, without the terminating newline
fn line_comment(input: &str) -> PResult<'_, &str> {
    recognize((tag("//"), take_while(|c: char| c != '\n'))).parse(input)
}

/// Block comment: /* comment */
fn block_comment(input: &str) -> PResult<'_, &str> {
    recognize((tag("/*"), take_until("*/"), tag("*/"))).parse(input)
}

/// Skip blanks and single-line block comments. Returns the rest of the
/// input if the next token is on the current line.
pub fn same_line(input: &str) -> Option<&str> {
    let mut rest = input;
    loop {
        rest = rest.trim_start_matches([' ', '\t', '\r']);
        if rest.starts_with("/*") {
            let end = rest.find("*/")?;
            if rest[..end].contains('\n') {
                return None;
            }
            rest = &rest[end + 2..];
            continue;
        }
        if rest.is_empty() || rest.starts_with('\n') || rest.starts_with("//") {
            return None;
        }
        return Some(rest);
    }
}

/// A symbol that must be on the same line as what precedes it
pub fn inline_symbol<'a>(sym: &'static str) -> impl FnMut(&'a str) -> PResult<'a, &'a str> {
    move |input: &'a str| match same_line(input) {
        Some(rest) => tag(sym)(rest),
        None => Err(nom::Err::Error(ContextualError::new(input, nom::error::ErrorKind::Tag))),
    }
}

/// Collect every comment in the source, skipping string and rune literals
pub fn collect_comments(source: &str) -> Vec<Comment> {
    let bytes = source.as_bytes();
    let mut comments = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                let end = source[i..].find('\n').map(|n| i + n).unwrap_or(source.len());
                comments.push(Comment {
                    kind: CommentKind::Line,
                    text: source[i..end].to_string(),
                    span: Span::new(i, end),
                });
                i = end;
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                let end = source[i + 2..]
                    .find("*/")
                    .map(|n| i + 2 + n + 2)
                    .unwrap_or(source.len());
                comments.push(Comment {
                    kind: CommentKind::Block,
                    text: source[i..end].to_string(),
                    span: Span::new(i, end),
                });
                i = end;
            }
            b'`' => {
                i = source[i + 1..].find('`').map(|n| i + 1 + n + 1).unwrap_or(source.len());
            }
            quote @ (b'"' | b'\'') => {
                i += 1;
                while i < bytes.len() && bytes[i] != quote && bytes[i] != b'\n' {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
                i += 1;
            }
            _ => i += 1,
        }
    }

    comments
}

/// Group comments separated by nothing but whitespace with at most one
/// line break
pub fn group_comments(source: &str, comments: Vec<Comment>) -> Vec<CommentGroup> {
    let mut groups: Vec<CommentGroup> = Vec::new();

    for comment in comments {
        if let Some(group) = groups.last_mut() {
            let between = &source[group.span.end..comment.span.start];
            let adjacent = between.trim().is_empty() && between.matches('\n').count() <= 1;
            if adjacent {
                group.span = group.span.merge(comment.span);
                group.comments.push(comment);
                continue;
            }
        }
        groups.push(CommentGroup {
            span: comment.span,
            comments: vec![comment],
        });
    }

    groups
}

/// The comment group that ends on the line right before `decl_start`
fn doc_before(source: &str, groups: &[CommentGroup], decl_start: usize) -> Option<CommentGroup> {
    groups
        .iter()
        .rev()
        .find(|g| g.span.end <= decl_start)
        .filter(|g| {
            let between = &source[g.span.end..decl_start];
            between.trim().is_empty() && between.matches('\n').count() == 1
        })
        .filter(|g| {
            // A trailing comment after code is not a doc comment
            let line_start = source[..g.span.start].rfind('\n').map(|n| n + 1).unwrap_or(0);
            source[line_start..g.span.start].trim().is_empty()
        })
        .cloned()
}

fn attach_docs(source: &str, file: &mut SourceFile, groups: &[CommentGroup]) {
    file.package.doc = doc_before(source, groups, file.package.span.start);
    for decl in &mut file.decls {
        if let Decl::Func(func) = decl {
            func.doc = doc_before(source, groups, func.span.start);
        }
    }
}

// =============================================================================
// Basic Elements
// =============================================================================

/// Reserved keywords
pub fn is_keyword(s: &str) -> bool {
    matches!(
        s,
        "break" | "case" | "chan" | "const" | "continue" | "default" | "defer" | "else"
            | "fallthrough" | "for" | "func" | "go" | "goto" | "if" | "import" | "interface"
            | "map" | "package" | "range" | "return" | "select" | "struct" | "switch" | "type"
            | "var"
    )
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Parse a keyword
pub fn keyword<'a>(kw: &'static str) -> impl FnMut(&'a str) -> PResult<'a, &'a str> {
    move |input: &'a str| {
        let (input, _) = ws(input)?;
        let (input, word) = tag(kw)(input)?;
        let (input, _) = not(peek(satisfy(is_ident_char))).parse(input)?;
        Ok((input, word))
    }
}

/// Check for a keyword without consuming input
pub fn at_keyword(input: &str, kw: &'static str) -> bool {
    keyword(kw)(input).is_ok()
}

/// Raw identifier text, keywords included
pub fn name(input: &str) -> PResult<'_, &str> {
    let (input, _) = ws(input)?;
    recognize((satisfy(is_ident_start), take_while(is_ident_char))).parse(input)
}

/// Parse an identifier
pub fn ident<'a>(cx: Cx<'a>, input: &'a str) -> PResult<'a, Ident> {
    let (input, _) = ws(input)?;
    let start = cx.pos(input);
    let (rest, word) = name(input)?;
    if is_keyword(word) {
        return Err(nom::Err::Error(ContextualError::new(input, nom::error::ErrorKind::Verify)));
    }
    Ok((rest, Ident::new(word, cx.span_from(start, rest))))
}

/// Parse a symbol with whitespace
pub fn symbol<'a>(sym: &'static str) -> impl FnMut(&'a str) -> PResult<'a, &'a str> {
    move |input: &'a str| {
        let (input, _) = ws(input)?;
        tag(sym)(input)
    }
}

/// Check for a symbol without consuming input
pub fn at_symbol(input: &str, sym: &'static str) -> bool {
    symbol(sym)(input).is_ok()
}

/// Always fails; paired with `context` to report a message
pub fn fail_verify<T>(input: &str) -> PResult<'_, T> {
    Err(nom::Err::Error(ContextualError::new(input, nom::error::ErrorKind::Verify)))
}

/// Comma separated list up to (not including) `close`, trailing comma
/// allowed
pub fn comma_list<'a, T>(
    input: &'a str,
    close: &'static str,
    mut item: impl FnMut(&'a str) -> PResult<'a, T>,
) -> PResult<'a, Vec<T>> {
    let mut items = Vec::new();
    let mut input = input;
    loop {
        if at_symbol(input, close) {
            break;
        }
        let (rest, parsed) = item(input)?;
        items.push(parsed);
        match symbol(",").parse(rest) {
            Ok((rest, _)) => input = rest,
            Err(_) => {
                input = rest;
                break;
            }
        }
    }
    Ok((input, items))
}
