//! Declaration parsing: functions, methods, `var`, `const` and `type`

use nom::{combinator::opt, error::context, Parser};

use crate::go_ast::*;
use crate::go_parser::{at_symbol, fail_verify, ident, inline_symbol, keyword, same_line, symbol, ws, Cx, PResult};
use crate::go_parser_expr::expression_list;
use crate::go_parser_stmt::block;
use crate::go_parser_types::{param_list, signature, type_expr};

/// `func (r *Recv) Name[T any](params) results { body }`
pub fn func_decl<'a>(cx: Cx<'a>, input: &'a str) -> PResult<'a, FuncDecl> {
    let (input, _) = ws(input)?;
    let start = cx.pos(input);
    let (input, _) = keyword("func")(input)?;

    let (input, recv) = if at_symbol(input, "(") {
        let (rest, mut fields) = context("expected receiver", |i| param_list(cx, i, "(", ")")).parse(input)?;
        (rest, fields.pop())
    } else {
        (input, None)
    };

    let (input, name) = context("expected function name", |i| ident(cx, i)).parse(input)?;
    let (input, type_params) = match inline_symbol("[")(input) {
        Ok(_) => {
            let rest = same_line(input).unwrap_or(input);
            context("expected type parameters", |i| param_list(cx, i, "[", "]")).parse(rest)?
        }
        Err(_) => (input, Vec::new()),
    };
    let (input, (params, results)) = signature(cx, input)?;

    let (input, body) = match same_line(input) {
        Some(rest) if rest.starts_with('{') => {
            let (rest, body) = block(cx, rest)?;
            (rest, Some(body))
        }
        _ => (input, None),
    };

    Ok((
        input,
        FuncDecl {
            doc: None,
            recv,
            name,
            type_params,
            params,
            results,
            body,
            span: cx.span_from(start, input),
        },
    ))
}

/// `var`, `const` or `type`, single or grouped
pub fn gen_decl<'a>(cx: Cx<'a>, input: &'a str) -> PResult<'a, GenDecl> {
    let (input, _) = ws(input)?;
    let start = cx.pos(input);
    let (input, kind) = if let Ok((rest, _)) = keyword("var")(input) {
        (rest, GenKind::Var)
    } else if let Ok((rest, _)) = keyword("const")(input) {
        (rest, GenKind::Const)
    } else {
        let (rest, _) = keyword("type")(input)?;
        (rest, GenKind::Type)
    };

    let spec = |i: &'a str| -> PResult<'a, Spec> {
        match kind {
            GenKind::Type => type_spec(cx, i),
            GenKind::Var | GenKind::Const => value_spec(cx, i, kind),
        }
    };

    let (input, specs) = if let Ok((rest, _)) = symbol("(").parse(input) {
        let mut specs = Vec::new();
        let mut rest = rest;
        loop {
            if let Ok((after, _)) = symbol(")").parse(rest) {
                rest = after;
                break;
            }
            let (after, parsed) = context("expected declaration", spec).parse(rest)?;
            specs.push(parsed);
            let (after, _) = opt(symbol(";")).parse(after)?;
            rest = after;
        }
        (rest, specs)
    } else {
        let (rest, parsed) = spec(input)?;
        (rest, vec![parsed])
    };

    Ok((input, GenDecl { kind, specs, span: cx.span_from(start, input) }))
}

/// `a, b T = x, y`; constants in a group may omit both type and values
fn value_spec<'a>(cx: Cx<'a>, input: &'a str, kind: GenKind) -> PResult<'a, Spec> {
    let (input, _) = ws(input)?;
    let start = cx.pos(input);
    let (mut input, first) = ident(cx, input)?;
    let mut names = vec![first];
    while let Ok((rest, _)) = inline_symbol(",")(input) {
        let (rest, name) = ident(cx, rest)?;
        names.push(name);
        input = rest;
    }

    let (input, ty) = match same_line(input) {
        Some(rest) if !rest.starts_with('=') && !rest.starts_with(';') && !rest.starts_with(')') => {
            let (rest, ty) = type_expr(cx, rest)?;
            (rest, Some(ty))
        }
        _ => (input, None),
    };

    let (input, values) = match inline_symbol("=")(input) {
        Ok((rest, _)) => expression_list(cx, rest)?,
        Err(_) if kind == GenKind::Var && ty.is_none() => {
            return context("expected type or initializer", fail_verify).parse(input);
        }
        Err(_) => (input, Vec::new()),
    };

    Ok((input, Spec::Value { names, ty, values, span: cx.span_from(start, input) }))
}

/// `Name[T any] = Type` or `Name Type`
fn type_spec<'a>(cx: Cx<'a>, input: &'a str) -> PResult<'a, Spec> {
    let (input, _) = ws(input)?;
    let start = cx.pos(input);
    let (input, name) = ident(cx, input)?;

    // `type A [N]int` is an array, `type L[T any] ...` is generic
    let (input, type_params) = match inline_symbol("[")(input) {
        Ok(_) => {
            let rest = same_line(input).unwrap_or(input);
            match param_list(cx, rest, "[", "]") {
                Ok((after, params)) if !params.is_empty() && params.iter().all(|p| !p.names.is_empty()) => {
                    (after, params)
                }
                _ => (input, Vec::new()),
            }
        }
        Err(_) => (input, Vec::new()),
    };

    let (input, alias) = match inline_symbol("=")(input) {
        Ok((rest, _)) => (rest, true),
        Err(_) => (input, false),
    };
    let (input, ty) = type_expr(cx, input)?;

    Ok((input, Spec::Type { name, type_params, alias, ty, span: cx.span_from(start, input) }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_decl() {
        let src = "func (r *Repo[T]) Scoped(db *gorm.DB) *gorm.DB { return db.Where(\"x\") }";
        let (_, func) = func_decl(Cx::new(src), src).unwrap();
        assert_eq!(func.name.name, "Scoped");
        assert_eq!(func.receiver_base_name(), Some("Repo"));
        assert_eq!(func.params.len(), 1);
        assert_eq!(func.results.len(), 1);
        assert!(func.body.is_some());
    }

    #[test]
    fn test_generic_func_decl() {
        let src = "func Map[T any, U comparable](xs []T, f func(T) U) []U { return nil }";
        let (_, func) = func_decl(Cx::new(src), src).unwrap();
        assert_eq!(func.type_params.len(), 2);
        assert_eq!(func.params.len(), 2);
    }

    #[test]
    fn test_grouped_const_and_var() {
        let src = "const (\n\tA = iota\n\tB\n)";
        let (_, decl) = gen_decl(Cx::new(src), src).unwrap();
        assert_eq!(decl.specs.len(), 2);

        let src = "var db *gorm.DB";
        let (_, decl) = gen_decl(Cx::new(src), src).unwrap();
        assert!(matches!(&decl.specs[0], Spec::Value { ty: Some(_), .. }));
    }

    #[test]
    fn test_type_decls() {
        let src = "type List[T any] struct { items []T }";
        let (_, decl) = gen_decl(Cx::new(src), src).unwrap();
        assert!(matches!(&decl.specs[0], Spec::Type { type_params, .. } if type_params.len() == 1));

        let src = "type Buf [16]byte";
        let (_, decl) = gen_decl(Cx::new(src), src).unwrap();
        match &decl.specs[0] {
            Spec::Type { type_params, ty, .. } => {
                assert!(type_params.is_empty());
                assert!(matches!(ty.kind, TypeKind::Array { .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
