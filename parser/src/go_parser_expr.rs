//! Expression parsing for Go
//!
//! Binary expressions use precedence climbing over Go's five precedence
//! levels. Postfix operators (selectors, calls, indexing, type assertions)
//! and binary operators only continue an expression on the same line.

use nom::{
    bytes::complete::{tag, take_until, take_while, take_while1},
    character::complete::satisfy,
    combinator::{opt, recognize},
    error::context,
    Parser,
};

use crate::error::ContextualError;
use crate::go_ast::*;
use crate::go_parser::{
    at_keyword, at_symbol, comma_list, ident, inline_symbol, keyword, same_line, symbol, ws, Cx, PResult,
};
use crate::go_parser_stmt::block;
use crate::go_parser_types::{signature, type_expr};

fn fail<T>(input: &str, kind: nom::error::ErrorKind) -> PResult<'_, T> {
    Err(nom::Err::Error(ContextualError::new(input, kind)))
}

/// Parse any expression
pub fn expression<'a>(cx: Cx<'a>, input: &'a str) -> PResult<'a, Expr> {
    binary_expr(cx, input, 1)
}

/// Comma separated expressions, at least one
pub fn expression_list<'a>(cx: Cx<'a>, input: &'a str) -> PResult<'a, Vec<Expr>> {
    let (mut input, first) = expression(cx, input)?;
    let mut exprs = vec![first];
    while let Ok((rest, _)) = inline_symbol(",")(input) {
        let (rest, expr) = expression(cx, rest)?;
        exprs.push(expr);
        input = rest;
    }
    Ok((input, exprs))
}

/// Precedence climbing: parse operators binding at least as tight as
/// `min_prec`
fn binary_expr<'a>(cx: Cx<'a>, input: &'a str, min_prec: u8) -> PResult<'a, Expr> {
    let (mut input, mut left) = unary_expr(cx, input)?;

    loop {
        let Some(rest) = same_line(input) else { break };
        let Some((after, op)) = binary_op(rest) else { break };
        let prec = op.precedence();
        if prec < min_prec {
            break;
        }
        let (after, right) = context("expected operand after binary operator", |i| binary_expr(cx, i, prec + 1)).parse(after)?;
        let span = left.span.merge(right.span);
        left = Expr {
            kind: ExprKind::Binary { op, x: Box::new(left), y: Box::new(right) },
            span,
        };
        input = after;
    }

    Ok((input, left))
}

/// Match a binary operator at the start of `input`
fn binary_op(input: &str) -> Option<(&str, BinaryOp)> {
    const OPS: &[(&str, BinaryOp)] = &[
        ("||", BinaryOp::LOr),
        ("&&", BinaryOp::LAnd),
        ("==", BinaryOp::Eq),
        ("!=", BinaryOp::Ne),
        ("<=", BinaryOp::Le),
        (">=", BinaryOp::Ge),
        ("<<", BinaryOp::Shl),
        (">>", BinaryOp::Shr),
        ("&^", BinaryOp::AndNot),
        ("<", BinaryOp::Lt),
        (">", BinaryOp::Gt),
        ("+", BinaryOp::Add),
        ("-", BinaryOp::Sub),
        ("|", BinaryOp::Or),
        ("^", BinaryOp::Xor),
        ("*", BinaryOp::Mul),
        ("/", BinaryOp::Div),
        ("%", BinaryOp::Rem),
        ("&", BinaryOp::And),
    ];

    for (text, op) in OPS {
        if let Some(rest) = input.strip_prefix(text) {
            let comparison = matches!(op, BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Le | BinaryOp::Ge);
            // Compound assignment, `<-`, `++`, `--` and comments are not operators
            if (!comparison && rest.starts_with('='))
                || (*text == "<" && rest.starts_with('-'))
                || (*text == "+" && rest.starts_with('+'))
                || (*text == "-" && rest.starts_with('-'))
                || (*text == "/" && (rest.starts_with('/') || rest.starts_with('*')))
            {
                return None;
            }
            return Some((rest, *op));
        }
    }
    None
}

/// Parse unary expression
pub fn unary_expr<'a>(cx: Cx<'a>, input: &'a str) -> PResult<'a, Expr> {
    let (input, _) = ws(input)?;
    let start = cx.pos(input);

    if let Ok((rest, _)) = tag::<_, _, ContextualError<&str>>("*").parse(input) {
        let (rest, x) = unary_expr(cx, rest)?;
        return Ok((rest, Expr { kind: ExprKind::Star(Box::new(x)), span: cx.span_from(start, rest) }));
    }

    // `<-chan T` is a type, `<-x` a receive
    if input.starts_with("<-") && !at_keyword(&input[2..], "chan") {
        let (rest, x) = unary_expr(cx, &input[2..])?;
        return Ok((
            rest,
            Expr { kind: ExprKind::Unary { op: UnaryOp::Recv, x: Box::new(x) }, span: cx.span_from(start, rest) },
        ));
    }

    let op = match input.chars().next() {
        Some('&') if !input.starts_with("&&") => Some(UnaryOp::Addr),
        Some('-') if !input.starts_with("--") => Some(UnaryOp::Neg),
        Some('+') if !input.starts_with("++") => Some(UnaryOp::Plus),
        Some('!') if !input.starts_with("!=") => Some(UnaryOp::Not),
        Some('^') => Some(UnaryOp::Xor),
        Some('~') => Some(UnaryOp::Tilde),
        _ => None,
    };
    if let Some(op) = op {
        let (rest, x) = unary_expr(cx, &input[1..])?;
        return Ok((rest, Expr { kind: ExprKind::Unary { op, x: Box::new(x) }, span: cx.span_from(start, rest) }));
    }

    primary_expr(cx, input)
}

/// Operand followed by any number of postfix operations
pub fn primary_expr<'a>(cx: Cx<'a>, input: &'a str) -> PResult<'a, Expr> {
    let (input, _) = ws(input)?;
    let start = cx.pos(input);
    let (mut input, mut expr) = operand(cx, input)?;

    loop {
        let Some(rest) = same_line(input) else { break };

        if let Some(after) = rest.strip_prefix('.')
            && !after.starts_with('.')
        {
            if let Ok((after, _)) = symbol("(").parse(after) {
                // Type assertion
                let (after, ty) = if let Ok((after, _)) = keyword("type")(after) {
                    (after, None)
                } else {
                    let (after, ty) = type_expr(cx, after)?;
                    (after, Some(ty))
                };
                let (after, _) = context("expected ')' after type assertion", symbol(")")).parse(after)?;
                expr = Expr {
                    kind: ExprKind::TypeAssert { x: Box::new(expr), ty },
                    span: cx.span_from(start, after),
                };
                input = after;
                continue;
            }
            let (after, sel) = context("expected selector after '.'", |i| ident(cx, i)).parse(after)?;
            expr = Expr {
                kind: ExprKind::Selector { x: Box::new(expr), sel },
                span: cx.span_from(start, after),
            };
            input = after;
        } else if rest.starts_with('(') {
            let (after, call) = call_args(cx, expr, rest)?;
            expr = Expr { kind: ExprKind::Call(call), span: cx.span_from(start, after) };
            input = after;
        } else if rest.starts_with('[') {
            let (after, indexed) = index_or_slice(cx, expr, &rest[1..])?;
            expr = Expr { kind: indexed, span: cx.span_from(start, after) };
            input = after;
        } else if rest.starts_with('{') && cx.composite && is_type_like(&expr) {
            let ty = expr_to_type(&expr);
            let (after, elts) = composite_body(cx, rest)?;
            expr = Expr {
                kind: ExprKind::CompositeLit { ty, elts },
                span: cx.span_from(start, after),
            };
            input = after;
        } else {
            break;
        }
    }

    Ok((input, expr))
}

fn call_args<'a>(cx: Cx<'a>, fun: Expr, input: &'a str) -> PResult<'a, CallExpr> {
    let lparen = cx.pos(input);
    let (input, _) = tag("(")(input)?;
    let inner = cx.with_composite();
    let mut ellipsis = false;
    let (input, args) = comma_list(input, ")", |i| {
        let (rest, arg) = expr_or_type(inner, i)?;
        // `f(xs...)`
        let (rest, dots) = opt(symbol("...")).parse(rest)?;
        if dots.is_some() {
            ellipsis = true;
        }
        Ok((rest, arg))
    })?;
    let (input, _) = ws(input)?;
    let rparen = cx.pos(input);
    let (input, _) = context("expected ')' to close call", tag(")")).parse(input)?;
    Ok((input, CallExpr { fun: Box::new(fun), args, ellipsis, lparen, rparen }))
}

/// After `[`: `x[i]`, `x[i, j]` (instantiation), `x[lo:hi]`, `x[lo:hi:max]`
fn index_or_slice<'a>(cx: Cx<'a>, x: Expr, input: &'a str) -> PResult<'a, ExprKind> {
    let inner = cx.with_composite();
    let (input, low) = if at_symbol(input, ":") {
        (input, None)
    } else {
        let (rest, low) = expr_or_type(inner, input)?;
        (rest, Some(low))
    };

    if let Ok((rest, _)) = symbol(":").parse(input) {
        let (rest, high) = if at_symbol(rest, "]") || at_symbol(rest, ":") {
            (rest, None)
        } else {
            let (rest, high) = expression(inner, rest)?;
            (rest, Some(Box::new(high)))
        };
        let (rest, max) = if let Ok((rest, _)) = symbol(":").parse(rest) {
            let (rest, max) = expression(inner, rest)?;
            (rest, Some(Box::new(max)))
        } else {
            (rest, None)
        };
        let (rest, _) = context("expected ']' after slice", symbol("]")).parse(rest)?;
        return Ok((rest, ExprKind::Slice { x: Box::new(x), low: low.map(Box::new), high, max }));
    }

    let mut indices: Vec<Expr> = low.into_iter().collect();
    let mut input = input;
    while let Ok((rest, _)) = symbol(",").parse(input) {
        if at_symbol(rest, "]") {
            input = rest;
            break;
        }
        let (rest, index) = expr_or_type(inner, rest)?;
        indices.push(index);
        input = rest;
    }
    let (input, _) = context("expected ']' after index", symbol("]")).parse(input)?;
    Ok((input, ExprKind::Index { x: Box::new(x), indices }))
}

/// Expressions that can name a type in `T{...}`
fn is_type_like(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Ident(_) => true,
        ExprKind::Selector { x, .. } => matches!(x.kind, ExprKind::Ident(_)),
        ExprKind::Index { x, .. } => is_type_like(x),
        ExprKind::Type(_) => true,
        _ => false,
    }
}

fn expr_to_type(expr: &Expr) -> Option<TypeExpr> {
    let kind = match &expr.kind {
        ExprKind::Type(ty) => return Some(ty.clone()),
        ExprKind::Ident(name) => TypeKind::Name { package: None, name: name.clone(), args: Vec::new() },
        ExprKind::Selector { x, sel } => TypeKind::Name {
            package: x.as_ident().map(str::to_string),
            name: sel.name.clone(),
            args: Vec::new(),
        },
        ExprKind::Index { x, indices } => {
            let base = expr_to_type(x)?;
            match base.kind {
                TypeKind::Name { package, name, .. } => TypeKind::Name {
                    package,
                    name,
                    args: indices.iter().filter_map(expr_to_type).collect(),
                },
                other => other,
            }
        }
        ExprKind::Star(inner) => TypeKind::Pointer(Box::new(expr_to_type(inner)?)),
        _ => return None,
    };
    Some(TypeExpr { kind, span: expr.span })
}

/// `{ elem, key: value, {nested}, }`
fn composite_body<'a>(cx: Cx<'a>, input: &'a str) -> PResult<'a, Vec<Element>> {
    let inner = cx.with_composite();
    let (input, _) = symbol("{").parse(input)?;
    let (input, elts) = comma_list(input, "}", |i| element(inner, i))?;
    let (input, _) = context("expected '}' after composite literal", symbol("}")).parse(input)?;
    Ok((input, elts))
}

fn element<'a>(cx: Cx<'a>, input: &'a str) -> PResult<'a, Element> {
    let (input, first) = element_value(cx, input)?;
    if let Ok((rest, _)) = symbol(":").parse(input) {
        let (rest, value) = element_value(cx, rest)?;
        return Ok((rest, Element { key: Some(first), value }));
    }
    Ok((input, Element { key: None, value: first }))
}

/// A value or a composite literal with its type elided
fn element_value<'a>(cx: Cx<'a>, input: &'a str) -> PResult<'a, Expr> {
    let (input, _) = ws(input)?;
    if input.starts_with('{') {
        let start = cx.pos(input);
        let (rest, elts) = composite_body(cx, input)?;
        return Ok((rest, Expr { kind: ExprKind::CompositeLit { ty: None, elts }, span: cx.span_from(start, rest) }));
    }
    expression(cx, input)
}

/// An expression, or a type where a type may stand in for one (call
/// arguments of `make`/`new`, generic instantiations)
pub fn expr_or_type<'a>(cx: Cx<'a>, input: &'a str) -> PResult<'a, Expr> {
    match expression(cx, input) {
        Ok(parsed) => Ok(parsed),
        Err(expr_err) => {
            let (rest, _) = ws(input)?;
            let start = cx.pos(rest);
            match type_expr(cx, rest) {
                Ok((rest, ty)) => Ok((rest, Expr { kind: ExprKind::Type(ty), span: cx.span_from(start, rest) })),
                Err(_) => Err(expr_err),
            }
        }
    }
}

/// Operand: literal, identifier, function literal, parenthesized
/// expression or a type that starts a composite literal or conversion
fn operand<'a>(cx: Cx<'a>, input: &'a str) -> PResult<'a, Expr> {
    let start = cx.pos(input);

    if let Ok((rest, (kind, value))) = basic_lit(input) {
        return Ok((
            rest,
            Expr { kind: ExprKind::BasicLit { kind, value: value.to_string() }, span: cx.span_from(start, rest) },
        ));
    }

    if at_keyword(input, "func") {
        return func_lit(cx, input);
    }

    if let Ok((rest, _)) = tag::<_, _, ContextualError<&str>>("(").parse(input) {
        let (rest, inner) = expr_or_type(cx.with_composite(), rest)?;
        let (rest, _) = context("expected ')'", symbol(")")).parse(rest)?;
        return Ok((rest, Expr { kind: ExprKind::Paren(Box::new(inner)), span: cx.span_from(start, rest) }));
    }

    if input.starts_with('[')
        || at_keyword(input, "map")
        || at_keyword(input, "chan")
        || at_keyword(input, "struct")
        || at_keyword(input, "interface")
    {
        let (rest, ty) = type_expr(cx, input)?;
        let type_span = cx.span_from(start, rest);
        if let Some(after) = same_line(rest)
            && after.starts_with('{')
            && !matches!(ty.kind, TypeKind::Interface(_) | TypeKind::Chan { .. })
        {
            let (after, elts) = composite_body(cx, after)?;
            return Ok((
                after,
                Expr { kind: ExprKind::CompositeLit { ty: Some(ty), elts }, span: cx.span_from(start, after) },
            ));
        }
        return Ok((rest, Expr { kind: ExprKind::Type(ty), span: type_span }));
    }

    let (rest, id) = context("expected expression", |i| ident(cx, i)).parse(input)?;
    Ok((rest, Expr { kind: ExprKind::Ident(id.name), span: id.span }))
}

/// `func(params) results { body }`, or a function type when no body follows
fn func_lit<'a>(cx: Cx<'a>, input: &'a str) -> PResult<'a, Expr> {
    let (input, _) = ws(input)?;
    let start = cx.pos(input);
    let (input, _) = keyword("func")(input)?;
    let (input, (params, results)) = signature(cx, input)?;

    if let Some(rest) = same_line(input)
        && rest.starts_with('{')
    {
        let (rest, body) = block(cx.with_composite(), rest)?;
        return Ok((
            rest,
            Expr { kind: ExprKind::FuncLit { params, results, body }, span: cx.span_from(start, rest) },
        ));
    }

    let span = cx.span_from(start, input);
    Ok((input, Expr { kind: ExprKind::Type(TypeExpr { kind: TypeKind::Func { params, results }, span }), span }))
}

// =============================================================================
// Literals
// =============================================================================

/// Number, rune or string literal
pub fn basic_lit(input: &str) -> PResult<'_, (LitKind, &str)> {
    if let Ok((rest, text)) = string_lit(input) {
        return Ok((rest, (LitKind::String, text)));
    }
    if let Ok((rest, text)) = rune_lit(input) {
        return Ok((rest, (LitKind::Char, text)));
    }
    number_lit(input)
}

/// Interpreted `"..."` or raw `` `...` `` string, quotes included
pub fn string_lit(input: &str) -> PResult<'_, &str> {
    if input.starts_with('`') {
        return recognize((tag("`"), take_until("`"), tag("`"))).parse(input);
    }
    quoted(input, '"')
}

fn rune_lit(input: &str) -> PResult<'_, &str> {
    quoted(input, '\'')
}

/// A quoted literal with backslash escapes, on one line
fn quoted(input: &str, quote: char) -> PResult<'_, &str> {
    let mut chars = input.char_indices();
    match chars.next() {
        Some((_, c)) if c == quote => {}
        _ => return fail(input, nom::error::ErrorKind::Char),
    }
    let mut escaped = false;
    for (i, c) in chars {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '\n' => break,
            c if c == quote => {
                let end = i + c.len_utf8();
                return Ok((&input[end..], &input[..end]));
            }
            _ => {}
        }
    }
    fail(input, nom::error::ErrorKind::Char)
}

/// Integer, float or imaginary literal in any base, with `_` separators
fn number_lit(input: &str) -> PResult<'_, (LitKind, &str)> {
    let starts_number = match input.as_bytes() {
        [b'0'..=b'9', ..] => true,
        [b'.', b'0'..=b'9', ..] => true,
        _ => false,
    };
    if !starts_number {
        return fail(input, nom::error::ErrorKind::Digit);
    }

    let lower = input.get(..2).map(|p| p.to_ascii_lowercase());
    if matches!(lower.as_deref(), Some("0x") | Some("0b") | Some("0o")) {
        let (rest, _) = recognize((
            take_while1(|c: char| c == '0'),
            satisfy(|c| matches!(c, 'x' | 'X' | 'b' | 'B' | 'o' | 'O')),
            take_while(|c: char| c.is_ascii_hexdigit() || c == '_'),
        ))
        .parse(input)?;
        let (rest, imag) = opt(tag("i")).parse(rest)?;
        let kind = if imag.is_some() { LitKind::Imag } else { LitKind::Int };
        let end = input.len() - rest.len();
        return Ok((rest, (kind, &input[..end])));
    }

    let mut kind = LitKind::Int;
    let digits = |s: &str| s.find(|c: char| !(c.is_ascii_digit() || c == '_')).unwrap_or(s.len());
    let mut end = digits(input);
    if input[end..].starts_with('.') {
        kind = LitKind::Float;
        end += 1;
        end += digits(&input[end..]);
    }
    if input[end..].starts_with(['e', 'E']) {
        let mut exp = end + 1;
        if input[exp..].starts_with(['+', '-']) {
            exp += 1;
        }
        let exp_digits = digits(&input[exp..]);
        if exp_digits > 0 {
            kind = LitKind::Float;
            end = exp + exp_digits;
        }
    }
    if input[end..].starts_with('i') {
        kind = LitKind::Imag;
        end += 1;
    }
    Ok((&input[end..], (kind, &input[..end])))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_expr(src: &str) -> Expr {
        let cx = Cx::new(src);
        let (rest, expr) = expression(cx, src).expect("expression should parse");
        assert!(rest.trim().is_empty(), "unparsed input: {:?}", rest);
        expr
    }

    #[test]
    fn test_method_chain_positions() {
        let src = "db.Where(\"x\").Find(&users)";
        let expr = parse_expr(src);
        let call = expr.as_call().expect("outer call");
        assert_eq!(call.lparen, src.find("(&").unwrap());
        assert_eq!(call.rparen, src.len() - 1);
        let (recv, sel) = call.method().unwrap();
        assert_eq!(sel.name, "Find");
        let inner = recv.as_call().unwrap();
        assert_eq!(inner.lparen, 8);
        assert_eq!(inner.rparen, 12);
    }

    #[test]
    fn test_precedence() {
        let expr = parse_expr("a + b * c == d");
        match expr.kind {
            ExprKind::Binary { op: BinaryOp::Eq, x, .. } => match x.kind {
                ExprKind::Binary { op: BinaryOp::Add, y, .. } => {
                    assert!(matches!(y.kind, ExprKind::Binary { op: BinaryOp::Mul, .. }))
                }
                other => panic!("unexpected {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_session_literal_argument() {
        let expr = parse_expr("db.Session(&gorm.Session{})");
        let call = expr.as_call().unwrap();
        match &call.args[0].kind {
            ExprKind::Unary { op: UnaryOp::Addr, x } => {
                assert!(matches!(x.kind, ExprKind::CompositeLit { .. }))
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_newline_ends_expression() {
        let src = "q.Find(nil)\n*p = q";
        let cx = Cx::new(src);
        let (rest, expr) = expression(cx, src).unwrap();
        assert!(expr.as_call().is_some());
        assert_eq!(rest.trim_start(), "*p = q");
    }

    #[test]
    fn test_trailing_dot_continues_chain() {
        let expr = parse_expr("db.\n\tWhere(\"x\").\n\tFind(nil)");
        let (_, sel) = expr.as_call().unwrap().method().unwrap();
        assert_eq!(sel.name, "Find");
    }

    #[test]
    fn test_type_assert_and_slice() {
        assert!(matches!(parse_expr("v.(*gorm.DB)").kind, ExprKind::TypeAssert { ty: Some(_), .. }));
        assert!(matches!(parse_expr("xs[1:]").kind, ExprKind::Slice { .. }));
        assert!(matches!(parse_expr("m[k]").kind, ExprKind::Index { .. }));
    }

    #[test]
    fn test_make_with_type_argument() {
        let expr = parse_expr("make(chan *gorm.DB, 1)");
        let call = expr.as_call().unwrap();
        assert!(matches!(call.args[0].kind, ExprKind::Type(_)));
    }

    #[test]
    fn test_literals() {
        assert!(matches!(parse_expr("0x1F").kind, ExprKind::BasicLit { kind: LitKind::Int, .. }));
        assert!(matches!(parse_expr("1.5e3").kind, ExprKind::BasicLit { kind: LitKind::Float, .. }));
        assert!(matches!(parse_expr("'\\n'").kind, ExprKind::BasicLit { kind: LitKind::Char, .. }));
        assert!(matches!(parse_expr("`raw\nstring`").kind, ExprKind::BasicLit { kind: LitKind::String, .. }));
        assert!(matches!(parse_expr("\"a \\\" b\"").kind, ExprKind::BasicLit { kind: LitKind::String, .. }));
    }

    #[test]
    fn test_func_literal_call() {
        let expr = parse_expr("func() { q.Find(nil) }()");
        let call = expr.as_call().unwrap();
        assert!(matches!(call.fun.kind, ExprKind::FuncLit { .. }));
    }

    #[test]
    fn test_receive() {
        assert!(matches!(parse_expr("<-ch").kind, ExprKind::Unary { op: UnaryOp::Recv, .. }));
    }
}
