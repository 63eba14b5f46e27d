//! Fix synthesis for reuse violations
//!
//! Uses and roots are SSA positions; the rewrites need syntax. [`CallIndex`]
//! maps the `(` offset of every call expression in a file to the pieces the
//! synthesizer edits around.

pub mod synthesizer;

pub use synthesizer::{FixStats, FixSynthesizer};

use fxhash::FxHashMap;
use parser::{walk_expr, walk_file, walk_stmt, Expr, ExprKind, SourceFile, Span, Stmt, StmtKind, Visitor};

/// Syntax of one call expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallInfo {
    pub lparen: usize,
    pub rparen: usize,
    /// Selector name when the callee is `x.name`
    pub method: Option<String>,
    /// Span of `x` in `x.name(...)`
    pub recv: Option<Span>,
    pub recv_assignable: bool,
    /// Start of the expression statement this call is the whole of
    pub stmt_start: Option<usize>,
    /// `(` of the call that selects a method on this call's result
    pub outer: Option<usize>,
}

impl CallInfo {
    /// Offset right after the closing parenthesis
    pub fn end(&self) -> usize {
        self.rparen + 1
    }
}

/// Call expressions of one file keyed by `(` offset
#[derive(Debug, Default)]
pub struct CallIndex {
    calls: FxHashMap<usize, CallInfo>,
}

impl CallIndex {
    pub fn build(file: &SourceFile) -> Self {
        let mut collector = CallCollector::default();
        walk_file(&mut collector, file);

        let mut calls = collector.calls;
        for (lparen, start) in collector.statements {
            if let Some(info) = calls.get_mut(&lparen) {
                info.stmt_start = Some(start);
            }
        }
        for (inner, outer) in collector.outer {
            if let Some(info) = calls.get_mut(&inner) {
                info.outer = Some(outer);
            }
        }
        Self { calls }
    }

    pub fn get(&self, lparen: usize) -> Option<&CallInfo> {
        self.calls.get(&lparen)
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

#[derive(Default)]
struct CallCollector {
    calls: FxHashMap<usize, CallInfo>,
    statements: Vec<(usize, usize)>,
    outer: Vec<(usize, usize)>,
}

impl<'ast> Visitor<'ast> for CallCollector {
    fn visit_stmt(&mut self, stmt: &'ast Stmt) {
        if let StmtKind::Expr(expr) = &stmt.kind {
            if let Some(call) = expr.unparen().as_call() {
                self.statements.push((call.lparen, expr.span.start));
            }
        }
        walk_stmt(self, stmt);
    }

    fn visit_expr(&mut self, expr: &'ast Expr) {
        if let ExprKind::Call(call) = &expr.kind {
            let (method, recv, recv_assignable) = match call.method() {
                Some((recv, sel)) => {
                    if let Some(inner) = recv.unparen().as_call() {
                        self.outer.push((inner.lparen, call.lparen));
                    }
                    (Some(sel.name.clone()), Some(recv.span), recv.is_assignable())
                }
                None => (None, None, false),
            };
            self.calls.insert(
                call.lparen,
                CallInfo {
                    lparen: call.lparen,
                    rparen: call.rparen,
                    method,
                    recv,
                    recv_assignable,
                    stmt_start: None,
                    outer: None,
                },
            );
        }
        walk_expr(self, expr);
    }
}
