//! Type expression parsing

use nom::{error::context, Parser};

use crate::go_ast::*;
use crate::go_parser::{
    at_symbol, comma_list, ident, inline_symbol, keyword, same_line, symbol, ws, Cx, PResult,
};
use crate::go_parser_expr::{expression, string_lit};

/// Parse a type
pub fn type_expr<'a>(cx: Cx<'a>, input: &'a str) -> PResult<'a, TypeExpr> {
    let (input, _) = ws(input)?;
    let start = cx.pos(input);

    let (input, kind) = if let Ok((rest, _)) = symbol("*").parse(input) {
        let (rest, inner) = type_expr(cx, rest)?;
        (rest, TypeKind::Pointer(Box::new(inner)))
    } else if at_symbol(input, "[") {
        array_or_slice_type(cx, input)?
    } else if let Ok((rest, _)) = keyword("map")(input) {
        let (rest, _) = symbol("[").parse(rest)?;
        let (rest, key) = type_expr(cx, rest)?;
        let (rest, _) = context("expected ']' after map key type", symbol("]")).parse(rest)?;
        let (rest, value) = type_expr(cx, rest)?;
        (rest, TypeKind::Map { key: Box::new(key), value: Box::new(value) })
    } else if let Ok((rest, _)) = keyword("chan")(input) {
        let (rest, dir) = match symbol("<-").parse(rest) {
            Ok((rest, _)) => (rest, ChanDir::Send),
            Err(_) => (rest, ChanDir::Both),
        };
        let (rest, elem) = type_expr(cx, rest)?;
        (rest, TypeKind::Chan { dir, elem: Box::new(elem) })
    } else if let Ok((rest, _)) = symbol("<-").parse(input) {
        let (rest, _) = keyword("chan")(rest)?;
        let (rest, elem) = type_expr(cx, rest)?;
        (rest, TypeKind::Chan { dir: ChanDir::Recv, elem: Box::new(elem) })
    } else if let Ok((rest, _)) = keyword("func")(input) {
        let (rest, (params, results)) = signature(cx, rest)?;
        (rest, TypeKind::Func { params, results })
    } else if let Ok((rest, _)) = keyword("struct")(input) {
        let (rest, fields) = struct_body(cx, rest)?;
        (rest, TypeKind::Struct(fields))
    } else if let Ok((rest, _)) = keyword("interface")(input) {
        let (rest, elems) = interface_body(cx, rest)?;
        (rest, TypeKind::Interface(elems))
    } else if let Ok((rest, _)) = symbol("(").parse(input) {
        let (rest, inner) = type_expr(cx, rest)?;
        let (rest, _) = context("expected ')' after type", symbol(")")).parse(rest)?;
        (rest, TypeKind::Paren(Box::new(inner)))
    } else {
        type_name(cx, input)?
    };

    Ok((input, TypeExpr { kind, span: cx.span_from(start, input) }))
}

/// `T`, `pkg.T`, `T[A, B]`
fn type_name<'a>(cx: Cx<'a>, input: &'a str) -> PResult<'a, TypeKind> {
    let (input, first) = context("expected type", |i| ident(cx, i)).parse(input)?;
    let (input, package, name) = match inline_symbol(".")(input) {
        Ok((rest, _)) => {
            let (rest, second) = ident(cx, rest)?;
            (rest, Some(first.name), second.name)
        }
        Err(_) => (input, None, first.name),
    };

    // Type arguments must follow on the same line and parse completely
    let (input, args) = match type_args(cx, input) {
        Ok((rest, args)) => (rest, args),
        Err(_) => (input, Vec::new()),
    };

    Ok((input, TypeKind::Name { package, name, args }))
}

/// `[A, B]` after a generic type name
pub fn type_args<'a>(cx: Cx<'a>, input: &'a str) -> PResult<'a, Vec<TypeExpr>> {
    let (rest, _) = inline_symbol("[")(input)?;
    if at_symbol(rest, "]") {
        // `T[]` is never a valid instantiation
        return Err(nom::Err::Error(crate::error::ContextualError::new(
            input,
            nom::error::ErrorKind::Verify,
        )));
    }
    let (rest, args) = comma_list(rest, "]", |i| type_expr(cx, i))?;
    let (rest, _) = symbol("]").parse(rest)?;
    Ok((rest, args))
}

fn array_or_slice_type<'a>(cx: Cx<'a>, input: &'a str) -> PResult<'a, TypeKind> {
    let (input, _) = symbol("[").parse(input)?;
    if let Ok((rest, _)) = symbol("]").parse(input) {
        let (rest, elem) = type_expr(cx, rest)?;
        return Ok((rest, TypeKind::Slice(Box::new(elem))));
    }
    let (input, len) = if let Ok((rest, _)) = symbol("...").parse(input) {
        (rest, None)
    } else {
        let (rest, len) = expression(cx.with_composite(), input)?;
        (rest, Some(Box::new(len)))
    };
    let (input, _) = context("expected ']' in array type", symbol("]")).parse(input)?;
    let (input, elem) = type_expr(cx, input)?;
    Ok((input, TypeKind::Array { len, elem: Box::new(elem) }))
}

/// Parameters and results of a function type or declaration
pub fn signature<'a>(cx: Cx<'a>, input: &'a str) -> PResult<'a, (Vec<Field>, Vec<Field>)> {
    let (input, params) = context("expected parameter list", |i| param_list(cx, i, "(", ")")).parse(input)?;

    // Results: a parenthesized list or a single type on the same line
    let (input, results) = if let Ok((rest, results)) = results_list(cx, input) {
        (rest, results)
    } else {
        (input, Vec::new())
    };
    Ok((input, (params, results)))
}

fn results_list<'a>(cx: Cx<'a>, input: &'a str) -> PResult<'a, Vec<Field>> {
    let Some(rest) = same_line(input) else {
        return Err(nom::Err::Error(crate::error::ContextualError::new(
            input,
            nom::error::ErrorKind::Eof,
        )));
    };
    if rest.starts_with('(') {
        return param_list(cx, rest, "(", ")");
    }
    if rest.starts_with('{') || rest.starts_with(',') || rest.starts_with(')') || rest.starts_with(';') {
        return Err(nom::Err::Error(crate::error::ContextualError::new(
            input,
            nom::error::ErrorKind::Verify,
        )));
    }
    let start = cx.pos(rest);
    let (rest, ty) = type_expr(cx, rest)?;
    Ok((rest, vec![Field { names: Vec::new(), ty, variadic: false, span: cx.span_from(start, rest) }]))
}

/// One entry of a parameter list before grouping
struct ParamEntry {
    name: Option<Ident>,
    ty: TypeExpr,
    variadic: bool,
    span: Span,
}

/// `(a, b int, c ...string)` or `(int, error)`, also used for receivers and
/// type parameter lists
pub fn param_list<'a>(
    cx: Cx<'a>,
    input: &'a str,
    open: &'static str,
    close: &'static str,
) -> PResult<'a, Vec<Field>> {
    let (input, _) = symbol(open).parse(input)?;
    let (input, entries) = comma_list(input, close, |i| param_entry(cx, i))?;
    let (input, _) = context("expected end of parameter list", symbol(close)).parse(input)?;
    Ok((input, group_params(entries)))
}

fn param_entry<'a>(cx: Cx<'a>, input: &'a str) -> PResult<'a, ParamEntry> {
    let (input, _) = ws(input)?;
    let start = cx.pos(input);

    // `name Type` or `name ...Type`, with the type on the same line
    if let Ok((rest, name)) = ident(cx, input) {
        if let Some(after) = same_line(rest) {
            let (after, variadic) = match symbol("...").parse(after) {
                Ok((after, _)) => (after, true),
                Err(_) => (after, false),
            };
            if let Ok((after, ty)) = constraint_type(cx, after) {
                return Ok((
                    after,
                    ParamEntry { name: Some(name), ty, variadic, span: cx.span_from(start, after) },
                ));
            }
        }
    }

    let (input, variadic) = match symbol("...").parse(input) {
        Ok((rest, _)) => (rest, true),
        Err(_) => (input, false),
    };
    let (input, ty) = constraint_type(cx, input)?;
    Ok((input, ParamEntry { name: None, ty, variadic, span: cx.span_from(start, input) }))
}

/// A type, or a constraint union such as `~int | ~string` in a type
/// parameter list
fn constraint_type<'a>(cx: Cx<'a>, input: &'a str) -> PResult<'a, TypeExpr> {
    let (input, _) = ws(input)?;
    let start = cx.pos(input);
    let (mut input, first) = tilde_type(cx, input)?;
    let mut terms = vec![first];
    while let Ok((rest, _)) = inline_symbol("|")(input) {
        let (rest, term) = tilde_type(cx, rest)?;
        terms.push(term);
        input = rest;
    }
    if terms.len() == 1 {
        return Ok((input, terms.remove(0)));
    }
    Ok((
        input,
        TypeExpr {
            kind: TypeKind::Interface(vec![InterfaceElem::Embedded(terms)]),
            span: cx.span_from(start, input),
        },
    ))
}

fn tilde_type<'a>(cx: Cx<'a>, input: &'a str) -> PResult<'a, TypeExpr> {
    match symbol("~").parse(input) {
        Ok((rest, _)) => type_expr(cx, rest),
        Err(_) => type_expr(cx, input),
    }
}

/// Resolve `(a, b int)`: when any entry is named, bare type names before a
/// named entry are names sharing its type
fn group_params(entries: Vec<ParamEntry>) -> Vec<Field> {
    if entries.iter().all(|e| e.name.is_none()) {
        return entries
            .into_iter()
            .map(|e| Field { names: Vec::new(), ty: e.ty, variadic: e.variadic, span: e.span })
            .collect();
    }

    let mut fields = Vec::new();
    let mut pending: Vec<Ident> = Vec::new();
    let mut pending_start: Option<usize> = None;
    for entry in entries {
        match entry.name {
            Some(name) => {
                let mut names = std::mem::take(&mut pending);
                names.push(name);
                let start = pending_start.take().unwrap_or(entry.span.start);
                fields.push(Field {
                    names,
                    ty: entry.ty,
                    variadic: entry.variadic,
                    span: Span::new(start, entry.span.end),
                });
            }
            None => {
                if let TypeKind::Name { package: None, name, args } = &entry.ty.kind
                    && args.is_empty()
                {
                    pending.push(Ident::new(name.clone(), entry.ty.span));
                    pending_start.get_or_insert(entry.span.start);
                } else {
                    fields.push(Field { names: Vec::new(), ty: entry.ty, variadic: entry.variadic, span: entry.span });
                }
            }
        }
    }
    fields
}

/// `{ A, B int; C string "tag"; Embedded }`
fn struct_body<'a>(cx: Cx<'a>, input: &'a str) -> PResult<'a, Vec<Field>> {
    let (mut input, _) = context("expected '{' after struct", symbol("{")).parse(input)?;
    let mut fields = Vec::new();
    loop {
        if let Ok((rest, _)) = symbol("}").parse(input) {
            input = rest;
            break;
        }
        let (rest, field) = context("expected struct field", |i| struct_field(cx, i)).parse(input)?;
        fields.push(field);
        let (rest, _) = nom::combinator::opt(symbol(";")).parse(rest)?;
        input = rest;
    }
    Ok((input, fields))
}

fn struct_field<'a>(cx: Cx<'a>, input: &'a str) -> PResult<'a, Field> {
    let (input, _) = ws(input)?;
    let start = cx.pos(input);

    let named = || -> PResult<'a, (Vec<Ident>, TypeExpr)> {
        let (mut rest, first) = ident(cx, input)?;
        let mut names = vec![first];
        while let Ok((after, _)) = inline_symbol(",")(rest) {
            let (after, name) = ident(cx, after)?;
            names.push(name);
            rest = after;
        }
        let Some(rest) = same_line(rest) else {
            return Err(nom::Err::Error(crate::error::ContextualError::new(
                rest,
                nom::error::ErrorKind::Eof,
            )));
        };
        let (rest, ty) = type_expr(cx, rest)?;
        Ok((rest, (names, ty)))
    };

    let (input, (names, ty)) = match named() {
        Ok(parsed) => parsed,
        Err(_) => {
            let (rest, ty) = type_expr(cx, input)?;
            (rest, (Vec::new(), ty))
        }
    };

    // Optional tag
    let input = match same_line(input) {
        Some(rest) if rest.starts_with('"') || rest.starts_with('`') => string_lit(rest)?.0,
        _ => input,
    };

    Ok((input, Field { names, ty, variadic: false, span: cx.span_from(start, input) }))
}

/// `{ Method(args) results; Embedded; ~int | string }`
fn interface_body<'a>(cx: Cx<'a>, input: &'a str) -> PResult<'a, Vec<InterfaceElem>> {
    let (mut input, _) = context("expected '{' after interface", symbol("{")).parse(input)?;
    let mut elems = Vec::new();
    loop {
        if let Ok((rest, _)) = symbol("}").parse(input) {
            input = rest;
            break;
        }
        let (rest, elem) = interface_elem(cx, input)?;
        elems.push(elem);
        let (rest, _) = nom::combinator::opt(symbol(";")).parse(rest)?;
        input = rest;
    }
    Ok((input, elems))
}

fn interface_elem<'a>(cx: Cx<'a>, input: &'a str) -> PResult<'a, InterfaceElem> {
    if let Ok((rest, name)) = ident(cx, input)
        && inline_symbol("(")(rest).is_ok()
    {
        let (rest, (params, results)) = signature(cx, rest)?;
        return Ok((rest, InterfaceElem::Method { name, params, results }));
    }
    let (rest, ty) = constraint_type(cx, input)?;
    let terms = match ty.kind {
        TypeKind::Interface(mut elems) if elems.len() == 1 => match elems.remove(0) {
            InterfaceElem::Embedded(terms) => terms,
            other => return Ok((rest, other)),
        },
        _ => vec![ty],
    };
    Ok((rest, InterfaceElem::Embedded(terms)))
}
