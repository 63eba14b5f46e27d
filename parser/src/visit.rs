//! AST traversal
//!
//! Implement `Visitor` and override the hooks of interest; the default
//! methods recurse through `walk_*`.

use crate::go_ast::*;

pub trait Visitor<'ast>: Sized {
    fn visit_func_decl(&mut self, func: &'ast FuncDecl) {
        walk_func_decl(self, func);
    }

    fn visit_stmt(&mut self, stmt: &'ast Stmt) {
        walk_stmt(self, stmt);
    }

    fn visit_expr(&mut self, expr: &'ast Expr) {
        walk_expr(self, expr);
    }
}

pub fn walk_file<'ast, V: Visitor<'ast>>(visitor: &mut V, file: &'ast SourceFile) {
    for decl in &file.decls {
        match decl {
            Decl::Func(func) => visitor.visit_func_decl(func),
            Decl::Gen(gen_decl) => walk_gen_decl(visitor, gen_decl),
        }
    }
}

pub fn walk_func_decl<'ast, V: Visitor<'ast>>(visitor: &mut V, func: &'ast FuncDecl) {
    if let Some(body) = &func.body {
        walk_block(visitor, body);
    }
}

pub fn walk_block<'ast, V: Visitor<'ast>>(visitor: &mut V, block: &'ast Block) {
    for stmt in &block.stmts {
        visitor.visit_stmt(stmt);
    }
}

fn walk_gen_decl<'ast, V: Visitor<'ast>>(visitor: &mut V, decl: &'ast GenDecl) {
    for spec in &decl.specs {
        if let Spec::Value { values, .. } = spec {
            for value in values {
                visitor.visit_expr(value);
            }
        }
    }
}

pub fn walk_stmt<'ast, V: Visitor<'ast>>(visitor: &mut V, stmt: &'ast Stmt) {
    match &stmt.kind {
        StmtKind::Expr(expr) | StmtKind::Go(expr) | StmtKind::Defer(expr) => visitor.visit_expr(expr),
        StmtKind::Send { chan, value } => {
            visitor.visit_expr(chan);
            visitor.visit_expr(value);
        }
        StmtKind::IncDec { target, .. } => visitor.visit_expr(target),
        StmtKind::Assign { lhs, rhs, .. } => {
            for expr in lhs.iter().chain(rhs) {
                visitor.visit_expr(expr);
            }
        }
        StmtKind::Return(results) => {
            for expr in results {
                visitor.visit_expr(expr);
            }
        }
        StmtKind::Branch { .. } | StmtKind::Empty => {}
        StmtKind::Block(block) => walk_block(visitor, block),
        StmtKind::If { init, cond, then, els } => {
            if let Some(init) = init {
                visitor.visit_stmt(init);
            }
            visitor.visit_expr(cond);
            walk_block(visitor, then);
            if let Some(els) = els {
                visitor.visit_stmt(els);
            }
        }
        StmtKind::For { init, cond, post, body } => {
            if let Some(init) = init {
                visitor.visit_stmt(init);
            }
            if let Some(cond) = cond {
                visitor.visit_expr(cond);
            }
            if let Some(post) = post {
                visitor.visit_stmt(post);
            }
            walk_block(visitor, body);
        }
        StmtKind::Range { key, value, expr, body, .. } => {
            for target in key.iter().chain(value) {
                visitor.visit_expr(target);
            }
            visitor.visit_expr(expr);
            walk_block(visitor, body);
        }
        StmtKind::Switch { init, tag, clauses } => {
            for stmt in init.iter().chain(tag) {
                visitor.visit_stmt(stmt);
            }
            for clause in clauses {
                for expr in clause.exprs.iter().flatten() {
                    visitor.visit_expr(expr);
                }
                for stmt in &clause.body {
                    visitor.visit_stmt(stmt);
                }
            }
        }
        StmtKind::Select(clauses) => {
            for clause in clauses {
                if let Some(comm) = &clause.comm {
                    visitor.visit_stmt(comm);
                }
                for stmt in &clause.body {
                    visitor.visit_stmt(stmt);
                }
            }
        }
        StmtKind::Labeled { stmt, .. } => visitor.visit_stmt(stmt),
        StmtKind::Decl(decl) => walk_gen_decl(visitor, decl),
    }
}

pub fn walk_expr<'ast, V: Visitor<'ast>>(visitor: &mut V, expr: &'ast Expr) {
    match &expr.kind {
        ExprKind::Ident(_) | ExprKind::BasicLit { .. } | ExprKind::Type(_) => {}
        ExprKind::CompositeLit { elts, .. } => {
            for elt in elts {
                if let Some(key) = &elt.key {
                    visitor.visit_expr(key);
                }
                visitor.visit_expr(&elt.value);
            }
        }
        ExprKind::FuncLit { body, .. } => walk_block(visitor, body),
        ExprKind::Paren(x) | ExprKind::Star(x) | ExprKind::Unary { x, .. } => visitor.visit_expr(x),
        ExprKind::Selector { x, .. } | ExprKind::TypeAssert { x, .. } => visitor.visit_expr(x),
        ExprKind::Index { x, indices } => {
            visitor.visit_expr(x);
            for index in indices {
                visitor.visit_expr(index);
            }
        }
        ExprKind::Slice { x, low, high, max } => {
            visitor.visit_expr(x);
            for bound in [low, high, max].into_iter().flatten() {
                visitor.visit_expr(bound);
            }
        }
        ExprKind::Call(call) => {
            visitor.visit_expr(&call.fun);
            for arg in &call.args {
                visitor.visit_expr(arg);
            }
        }
        ExprKind::Binary { x, y, .. } => {
            visitor.visit_expr(x);
            visitor.visit_expr(y);
        }
    }
}
