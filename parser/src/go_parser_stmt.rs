//! Statement parsing for Go

use nom::{combinator::opt, error::context, Parser};

use crate::error::ContextualError;
use crate::go_ast::*;
use crate::go_parser::{at_keyword, at_symbol, fail_verify, ident, keyword, same_line, symbol, ws, Cx, PResult};
use crate::go_parser_decls::gen_decl;
use crate::go_parser_expr::{expression, expression_list};

/// `{ stmt; stmt }`
pub fn block<'a>(cx: Cx<'a>, input: &'a str) -> PResult<'a, Block> {
    let (input, _) = ws(input)?;
    let start = cx.pos(input);
    let (input, _) = context("expected '{'", symbol("{")).parse(input)?;
    let (input, stmts) = stmt_list(cx.with_composite(), input)?;
    let (input, _) = context("expected '}' to close block", symbol("}")).parse(input)?;
    Ok((input, Block { stmts, span: cx.span_from(start, input) }))
}

/// Statements up to a closing `}` or the next `case`/`default`
fn stmt_list<'a>(cx: Cx<'a>, input: &'a str) -> PResult<'a, Vec<Stmt>> {
    let mut stmts = Vec::new();
    let mut input = input;
    loop {
        let (rest, _) = ws(input)?;
        if rest.is_empty() || rest.starts_with('}') || at_keyword(rest, "case") || at_keyword(rest, "default") {
            input = rest;
            break;
        }
        let (rest, stmt) = context("expected statement", |i| statement(cx, i)).parse(rest)?;
        stmts.push(stmt);
        let (rest, _) = opt(symbol(";")).parse(rest)?;
        input = rest;
    }
    Ok((input, stmts))
}

/// Parse one statement
pub fn statement<'a>(cx: Cx<'a>, input: &'a str) -> PResult<'a, Stmt> {
    let (input, _) = ws(input)?;
    let start = cx.pos(input);

    if input.starts_with(';') {
        return Ok((input, Stmt { kind: StmtKind::Empty, span: Span::new(start, start) }));
    }
    if input.starts_with('{') {
        let (rest, body) = block(cx, input)?;
        return Ok((rest, Stmt { kind: StmtKind::Block(body), span: cx.span_from(start, rest) }));
    }
    if at_keyword(input, "var") || at_keyword(input, "const") || at_keyword(input, "type") {
        let (rest, decl) = gen_decl(cx, input)?;
        return Ok((rest, Stmt { kind: StmtKind::Decl(decl), span: cx.span_from(start, rest) }));
    }
    if let Ok((rest, _)) = keyword("return")(input) {
        let (rest, results) = match same_line(rest) {
            Some(after) if !after.starts_with('}') && !after.starts_with(';') => expression_list(cx, after)?,
            _ => (rest, Vec::new()),
        };
        return Ok((rest, Stmt { kind: StmtKind::Return(results), span: cx.span_from(start, rest) }));
    }
    if let Ok((rest, _)) = keyword("go")(input) {
        let (rest, call) = context("expected call after 'go'", |i| expression(cx, i)).parse(rest)?;
        return Ok((rest, Stmt { kind: StmtKind::Go(call), span: cx.span_from(start, rest) }));
    }
    if let Ok((rest, _)) = keyword("defer")(input) {
        let (rest, call) = context("expected call after 'defer'", |i| expression(cx, i)).parse(rest)?;
        return Ok((rest, Stmt { kind: StmtKind::Defer(call), span: cx.span_from(start, rest) }));
    }
    for (kw, kind) in [
        ("break", BranchKind::Break),
        ("continue", BranchKind::Continue),
        ("goto", BranchKind::Goto),
        ("fallthrough", BranchKind::Fallthrough),
    ] {
        if let Ok((rest, _)) = keyword(kw)(input) {
            let (rest, label) = match same_line(rest) {
                Some(after) => match ident(cx, after) {
                    Ok((after, label)) => (after, Some(label)),
                    Err(_) => (rest, None),
                },
                None => (rest, None),
            };
            return Ok((rest, Stmt { kind: StmtKind::Branch { kind, label }, span: cx.span_from(start, rest) }));
        }
    }
    if at_keyword(input, "if") {
        return if_stmt(cx, input);
    }
    if at_keyword(input, "for") {
        return for_stmt(cx, input);
    }
    if at_keyword(input, "switch") {
        return switch_stmt(cx, input);
    }
    if at_keyword(input, "select") {
        return select_stmt(cx, input);
    }

    // Label: `name:` (but not `name :=`)
    if let Ok((rest, label)) = ident(cx, input)
        && let Ok((after, _)) = symbol(":").parse(rest)
        && !after.starts_with('=')
    {
        let (after, _) = ws(after)?;
        let (after, stmt) = if after.starts_with('}') {
            let at = cx.pos(after);
            (after, Stmt { kind: StmtKind::Empty, span: Span::new(at, at) })
        } else {
            statement(cx, after)?
        };
        return Ok((
            after,
            Stmt { kind: StmtKind::Labeled { label, stmt: Box::new(stmt) }, span: cx.span_from(start, after) },
        ));
    }

    simple_stmt(cx, input)
}

/// Expression, send, inc/dec, assignment or short variable declaration
pub fn simple_stmt<'a>(cx: Cx<'a>, input: &'a str) -> PResult<'a, Stmt> {
    let (input, _) = ws(input)?;
    let start = cx.pos(input);
    let (input, lhs) = expression_list(cx, input)?;

    if let Some(rest) = same_line(input) {
        if let Some((after, op)) = assign_op(rest) {
            let (after, rhs) = context("expected expression after assignment", |i| expression_list(cx, i)).parse(after)?;
            return Ok((after, Stmt { kind: StmtKind::Assign { lhs, op, rhs }, span: cx.span_from(start, after) }));
        }
        for (text, inc) in [("++", true), ("--", false)] {
            if let Some(after) = rest.strip_prefix(text) {
                let target = single(lhs, input)?;
                return Ok((after, Stmt { kind: StmtKind::IncDec { target, inc }, span: cx.span_from(start, after) }));
            }
        }
        if let Some(after) = rest.strip_prefix("<-") {
            let chan = single(lhs, input)?;
            let (after, value) = expression(cx, after)?;
            return Ok((after, Stmt { kind: StmtKind::Send { chan, value }, span: cx.span_from(start, after) }));
        }
    }

    let expr = single(lhs, input)?;
    Ok((input, Stmt { kind: StmtKind::Expr(expr), span: cx.span_from(start, input) }))
}

fn single(mut exprs: Vec<Expr>, input: &str) -> Result<Expr, nom::Err<ContextualError<&str>>> {
    if exprs.len() == 1 {
        return Ok(exprs.remove(0));
    }
    Err(nom::Err::Error(ContextualError::new(input, nom::error::ErrorKind::Verify)))
}

fn assign_op(input: &str) -> Option<(&str, AssignOp)> {
    const OPS: &[(&str, AssignOp)] = &[
        (":=", AssignOp::Define),
        ("<<=", AssignOp::Shl),
        (">>=", AssignOp::Shr),
        ("&^=", AssignOp::AndNot),
        ("+=", AssignOp::Add),
        ("-=", AssignOp::Sub),
        ("*=", AssignOp::Mul),
        ("/=", AssignOp::Div),
        ("%=", AssignOp::Rem),
        ("&=", AssignOp::And),
        ("|=", AssignOp::Or),
        ("^=", AssignOp::Xor),
        ("=", AssignOp::Assign),
    ];
    OPS.iter().find_map(|(text, op)| {
        let rest = input.strip_prefix(text)?;
        if *text == "=" && rest.starts_with('=') {
            return None;
        }
        Some((rest, *op))
    })
}

/// Optional `init;` of an if/switch header followed by the remaining header
fn header_init<'a>(cx: Cx<'a>, input: &'a str) -> PResult<'a, (Option<Stmt>, Option<Stmt>)> {
    let hdr = cx.no_composite();
    if at_symbol(input, "{") {
        return Ok((input, (None, None)));
    }
    if let Ok((rest, _)) = symbol(";").parse(input) {
        let (rest, second) = if at_symbol(rest, "{") { (rest, None) } else {
            let (rest, stmt) = simple_stmt(hdr, rest)?;
            (rest, Some(stmt))
        };
        return Ok((rest, (None, second)));
    }
    let (rest, first) = simple_stmt(hdr, input)?;
    if let Ok((rest, _)) = symbol(";").parse(rest) {
        let (rest, second) = if at_symbol(rest, "{") { (rest, None) } else {
            let (rest, stmt) = simple_stmt(hdr, rest)?;
            (rest, Some(stmt))
        };
        return Ok((rest, (Some(first), second)));
    }
    Ok((rest, (None, Some(first))))
}

fn if_stmt<'a>(cx: Cx<'a>, input: &'a str) -> PResult<'a, Stmt> {
    let (input, _) = ws(input)?;
    let start = cx.pos(input);
    let (input, _) = keyword("if")(input)?;
    let (input, (init, cond)) = header_init(cx, input)?;
    let cond = match cond.map(|s| s.kind) {
        Some(StmtKind::Expr(cond)) => cond,
        _ => return context("expected condition in if statement", fail_verify).parse(input),
    };
    let (input, then) = block(cx, input)?;

    let (input, els) = if let Ok((rest, _)) = keyword("else")(input) {
        let (rest, stmt) = if at_keyword(rest, "if") {
            if_stmt(cx, rest)?
        } else {
            let (rest, _) = ws(rest)?;
            let block_start = cx.pos(rest);
            let (rest, body) = block(cx, rest)?;
            (rest, Stmt { kind: StmtKind::Block(body), span: cx.span_from(block_start, rest) })
        };
        (rest, Some(Box::new(stmt)))
    } else {
        (input, None)
    };

    Ok((
        input,
        Stmt {
            kind: StmtKind::If { init: init.map(Box::new), cond, then, els },
            span: cx.span_from(start, input),
        },
    ))
}

fn for_stmt<'a>(cx: Cx<'a>, input: &'a str) -> PResult<'a, Stmt> {
    let (input, _) = ws(input)?;
    let start = cx.pos(input);
    let (input, _) = keyword("for")(input)?;
    let hdr = cx.no_composite();

    // for { }
    if at_symbol(input, "{") {
        let (rest, body) = block(cx, input)?;
        let kind = StmtKind::For { init: None, cond: None, post: None, body };
        return Ok((rest, Stmt { kind, span: cx.span_from(start, rest) }));
    }

    // for range x { } / for k, v := range x { }
    if let Some((rest, key, value, define)) = range_header(hdr, input) {
        let (rest, expr) = expression(hdr, rest)?;
        let (rest, body) = block(cx, rest)?;
        let kind = StmtKind::Range { key, value, define, expr, body };
        return Ok((rest, Stmt { kind, span: cx.span_from(start, rest) }));
    }

    let (input, init) = if at_symbol(input, ";") {
        (input, None)
    } else {
        let (rest, stmt) = simple_stmt(hdr, input)?;
        (rest, Some(stmt))
    };

    let Ok((input, _)) = symbol(";").parse(input) else {
        // for cond { }
        let cond = match init.map(|s| s.kind) {
            Some(StmtKind::Expr(cond)) => cond,
            _ => return context("expected loop condition", fail_verify).parse(input),
        };
        let (rest, body) = block(cx, input)?;
        let kind = StmtKind::For { init: None, cond: Some(cond), post: None, body };
        return Ok((rest, Stmt { kind, span: cx.span_from(start, rest) }));
    };

    let (input, cond) = if at_symbol(input, ";") {
        (input, None)
    } else {
        let (rest, cond) = expression(hdr, input)?;
        (rest, Some(cond))
    };
    let (input, _) = context("expected ';' in for clause", symbol(";")).parse(input)?;
    let (input, post) = if at_symbol(input, "{") {
        (input, None)
    } else {
        let (rest, stmt) = simple_stmt(hdr, input)?;
        (rest, Some(stmt))
    };
    let (input, body) = block(cx, input)?;
    let kind = StmtKind::For { init: init.map(Box::new), cond, post: post.map(Box::new), body };
    Ok((input, Stmt { kind, span: cx.span_from(start, input) }))
}

/// Everything of a range clause up to and including `range`
fn range_header<'a>(cx: Cx<'a>, input: &'a str) -> Option<(&'a str, Option<Expr>, Option<Expr>, bool)> {
    if let Ok((rest, _)) = keyword("range")(input) {
        return Some((rest, None, None, false));
    }
    let (rest, mut lhs) = expression_list(cx, input).ok()?;
    let rest = same_line(rest)?;
    let (rest, define) = if let Some(rest) = rest.strip_prefix(":=") {
        (rest, true)
    } else if let Some(rest) = rest.strip_prefix('=') {
        (rest, false)
    } else {
        return None;
    };
    let (rest, _) = keyword("range")(rest).ok()?;
    if lhs.is_empty() || lhs.len() > 2 {
        return None;
    }
    let value = if lhs.len() == 2 { lhs.pop() } else { None };
    let key = lhs.pop();
    Some((rest, key, value, define))
}

fn switch_stmt<'a>(cx: Cx<'a>, input: &'a str) -> PResult<'a, Stmt> {
    let (input, _) = ws(input)?;
    let start = cx.pos(input);
    let (input, _) = keyword("switch")(input)?;
    let (input, (init, tag)) = header_init(cx, input)?;
    let (input, _) = context("expected '{' after switch header", symbol("{")).parse(input)?;

    let mut clauses = Vec::new();
    let mut input = input;
    loop {
        if let Ok((rest, _)) = symbol("}").parse(input) {
            input = rest;
            break;
        }
        let (rest, _) = ws(input)?;
        let clause_start = cx.pos(rest);
        let (rest, exprs) = if let Ok((rest, _)) = keyword("default")(rest) {
            (rest, None)
        } else {
            let (rest, _) = context("expected 'case' or 'default'", keyword("case")).parse(rest)?;
            let (rest, exprs) = case_list(cx, rest)?;
            (rest, Some(exprs))
        };
        let (rest, _) = context("expected ':' after case", symbol(":")).parse(rest)?;
        let (rest, body) = stmt_list(cx, rest)?;
        clauses.push(CaseClause { exprs, body, span: cx.span_from(clause_start, rest) });
        input = rest;
    }

    Ok((
        input,
        Stmt {
            kind: StmtKind::Switch { init: init.map(Box::new), tag: tag.map(Box::new), clauses },
            span: cx.span_from(start, input),
        },
    ))
}

/// Case values; type switch cases may list types such as `[]int`
fn case_list<'a>(cx: Cx<'a>, input: &'a str) -> PResult<'a, Vec<Expr>> {
    let (mut input, first) = crate::go_parser_expr::expr_or_type(cx, input)?;
    let mut exprs = vec![first];
    while let Ok((rest, _)) = symbol(",").parse(input) {
        let (rest, expr) = crate::go_parser_expr::expr_or_type(cx, rest)?;
        exprs.push(expr);
        input = rest;
    }
    Ok((input, exprs))
}

fn select_stmt<'a>(cx: Cx<'a>, input: &'a str) -> PResult<'a, Stmt> {
    let (input, _) = ws(input)?;
    let start = cx.pos(input);
    let (input, _) = keyword("select")(input)?;
    let (input, _) = context("expected '{' after select", symbol("{")).parse(input)?;

    let mut clauses = Vec::new();
    let mut input = input;
    loop {
        if let Ok((rest, _)) = symbol("}").parse(input) {
            input = rest;
            break;
        }
        let (rest, _) = ws(input)?;
        let clause_start = cx.pos(rest);
        let (rest, comm) = if let Ok((rest, _)) = keyword("default")(rest) {
            (rest, None)
        } else {
            let (rest, _) = context("expected 'case' or 'default'", keyword("case")).parse(rest)?;
            let (rest, stmt) = simple_stmt(cx, rest)?;
            (rest, Some(Box::new(stmt)))
        };
        let (rest, _) = context("expected ':' after case", symbol(":")).parse(rest)?;
        let (rest, body) = stmt_list(cx, rest)?;
        clauses.push(CommClause { comm, body, span: cx.span_from(clause_start, rest) });
        input = rest;
    }

    Ok((input, Stmt { kind: StmtKind::Select(clauses), span: cx.span_from(start, input) }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_block(src: &str) -> Block {
        let cx = Cx::new(src);
        let (rest, body) = block(cx, src).expect("block should parse");
        assert!(rest.trim().is_empty(), "unparsed input: {:?}", rest);
        body
    }

    #[test]
    fn test_statement_spans_start_at_first_token() {
        let src = "{\n\tq := db.Where(\"x\")\n\tq.Find(nil)\n}";
        let body = parse_block(src);
        assert_eq!(body.stmts.len(), 2);
        let second = &body.stmts[1];
        assert_eq!(second.span.start, src.find("q.Find").unwrap());
        assert!(matches!(second.kind, StmtKind::Expr(_)));
        assert!(matches!(body.stmts[0].kind, StmtKind::Assign { op: AssignOp::Define, .. }));
    }

    #[test]
    fn test_if_with_init_and_else() {
        let src = "{ if err := q.Find(&u).Error; err != nil { return err } else { q.Count(nil) } }";
        let body = parse_block(src);
        match &body.stmts[0].kind {
            StmtKind::If { init, els, .. } => {
                assert!(init.is_some());
                assert!(els.is_some());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_range_and_three_clause_for() {
        let src = "{\n for _, i := range xs { q.Where(i).Find(nil) }\n for i := 0; i < 3; i++ { }\n for cond { }\n for { break }\n}";
        let body = parse_block(src);
        assert!(matches!(body.stmts[0].kind, StmtKind::Range { define: true, .. }));
        assert!(matches!(body.stmts[1].kind, StmtKind::For { init: Some(_), cond: Some(_), post: Some(_), .. }));
        assert!(matches!(body.stmts[2].kind, StmtKind::For { init: None, cond: Some(_), .. }));
        assert!(matches!(body.stmts[3].kind, StmtKind::For { cond: None, .. }));
    }

    #[test]
    fn test_switch_and_type_switch() {
        let src = "{\n switch v := x.(type) {\n case *gorm.DB, []int:\n  v.Find(nil)\n default:\n }\n switch { case a > b: }\n}";
        let body = parse_block(src);
        match &body.stmts[0].kind {
            StmtKind::Switch { tag: Some(tag), clauses, .. } => {
                assert!(matches!(tag.kind, StmtKind::Assign { .. }));
                assert_eq!(clauses.len(), 2);
                assert!(clauses[1].exprs.is_none());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_go_defer_send_select() {
        let src = "{\n go func() { ch <- q }()\n defer q.Find(nil)\n select {\n case v := <-ch:\n  _ = v\n default:\n }\n}";
        let body = parse_block(src);
        assert!(matches!(body.stmts[0].kind, StmtKind::Go(_)));
        assert!(matches!(body.stmts[1].kind, StmtKind::Defer(_)));
        assert!(matches!(body.stmts[2].kind, StmtKind::Select(_)));
    }

    #[test]
    fn test_return_on_own_line() {
        let src = "{\n if x {\n  return\n }\n return q, nil\n}";
        let body = parse_block(src);
        match &body.stmts[1].kind {
            StmtKind::Return(results) => assert_eq!(results.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_labeled_loop() {
        let src = "{\nouter:\n for {\n  break outer\n }\n}";
        let body = parse_block(src);
        assert!(matches!(body.stmts[0].kind, StmtKind::Labeled { .. }));
    }
}
