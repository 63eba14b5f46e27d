//! Go AST with byte span tracking
//!
//! Covers the subset of Go the analyzer needs to look at: the package
//! clause, imports, top-level declarations and full statement/expression
//! trees inside function bodies. Every node carries the byte span it was
//! parsed from so that rewrites can be expressed as byte edits.

use std::fmt;

pub use source_map::parser_integration::ByteSpan as Span;

/// A parsed source file
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFile {
    pub name: String,
    pub package: PackageClause,
    pub imports: Vec<ImportSpec>,
    pub decls: Vec<Decl>,
    /// Every comment in the file, grouped, in source order
    pub comments: Vec<CommentGroup>,
    pub span: Span,
}

impl SourceFile {
    pub fn funcs(&self) -> impl Iterator<Item = &FuncDecl> {
        self.decls.iter().filter_map(|decl| match decl {
            Decl::Func(func) => Some(func),
            Decl::Gen(_) => None,
        })
    }

    /// Local name under which `path` is imported, if it is
    pub fn import_name(&self, path: &str) -> Option<&str> {
        self.imports
            .iter()
            .find(|import| import.path == path)
            .map(|import| import.local_name())
    }

    /// Position right after the last import, or after the package clause
    /// when there are none
    pub fn import_insert_offset(&self) -> usize {
        self.imports
            .iter()
            .map(|import| import.decl_span.end)
            .max()
            .unwrap_or(self.package.span.end)
    }
}

/// `package name`
#[derive(Debug, Clone, PartialEq)]
pub struct PackageClause {
    pub name: Ident,
    pub doc: Option<CommentGroup>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentKind {
    /// `// ...`
    Line,
    /// `/* ... */`
    Block,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
    pub kind: CommentKind,
    /// Raw text including the comment markers
    pub text: String,
    pub span: Span,
}

impl Comment {
    /// Text without the comment markers
    pub fn body(&self) -> &str {
        match self.kind {
            CommentKind::Line => self.text.strip_prefix("//").unwrap_or(&self.text),
            CommentKind::Block => self
                .text
                .strip_prefix("/*")
                .and_then(|s| s.strip_suffix("*/"))
                .unwrap_or(&self.text),
        }
    }
}

/// Comments on adjacent lines with nothing but whitespace between them
#[derive(Debug, Clone, PartialEq)]
pub struct CommentGroup {
    pub comments: Vec<Comment>,
    pub span: Span,
}

/// One import line: `import name "path"`
#[derive(Debug, Clone, PartialEq)]
pub struct ImportSpec {
    pub name: Option<Ident>,
    pub path: String,
    pub span: Span,
    /// Span of the enclosing `import` declaration
    pub decl_span: Span,
}

impl ImportSpec {
    /// The name the package is referred to by in this file
    pub fn local_name(&self) -> &str {
        if let Some(name) = &self.name {
            return &name.name;
        }
        let mut segments = self.path.rsplit('/');
        let last = segments.next().unwrap_or(&self.path);
        // gopkg.in/yaml.v3 and example.com/mod/v2 style suffixes
        if is_major_version(last) {
            return segments.next().unwrap_or(last);
        }
        last.split('.').next().unwrap_or(last)
    }
}

fn is_major_version(segment: &str) -> bool {
    segment.len() > 1
        && segment.starts_with('v')
        && segment[1..].chars().all(|c| c.is_ascii_digit())
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

impl Ident {
    pub fn new(name: impl Into<String>, span: Span) -> Self {
        Self { name: name.into(), span }
    }

    pub fn is_blank(&self) -> bool {
        self.name == "_"
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

// =============================================================================
// Declarations
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Decl {
    Func(FuncDecl),
    Gen(GenDecl),
}

impl Decl {
    pub fn span(&self) -> Span {
        match self {
            Decl::Func(func) => func.span,
            Decl::Gen(gen_decl) => gen_decl.span,
        }
    }
}

/// `func (recv) name[T any](params) results { body }`
#[derive(Debug, Clone, PartialEq)]
pub struct FuncDecl {
    pub doc: Option<CommentGroup>,
    pub recv: Option<Field>,
    pub name: Ident,
    pub type_params: Vec<Field>,
    pub params: Vec<Field>,
    pub results: Vec<Field>,
    pub body: Option<Block>,
    pub span: Span,
}

impl FuncDecl {
    /// Base type name of the receiver: `*Repo[T]` gives `Repo`
    pub fn receiver_base_name(&self) -> Option<&str> {
        self.recv.as_ref().and_then(|field| field.ty.base_name())
    }

    pub fn is_method(&self) -> bool {
        self.recv.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenKind {
    Var,
    Const,
    Type,
}

/// `var`, `const` and `type` declarations, grouped or not
#[derive(Debug, Clone, PartialEq)]
pub struct GenDecl {
    pub kind: GenKind,
    pub specs: Vec<Spec>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Spec {
    Value {
        names: Vec<Ident>,
        ty: Option<TypeExpr>,
        values: Vec<Expr>,
        span: Span,
    },
    Type {
        name: Ident,
        type_params: Vec<Field>,
        alias: bool,
        ty: TypeExpr,
        span: Span,
    },
}

/// A parameter, result, receiver or struct field
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub names: Vec<Ident>,
    pub ty: TypeExpr,
    pub variadic: bool,
    pub span: Span,
}

// =============================================================================
// Types
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum ChanDir {
    Both,
    Send,
    Recv,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeExpr {
    pub kind: TypeKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeKind {
    /// `T`, `pkg.T`, `T[int]`
    Name {
        package: Option<String>,
        name: String,
        args: Vec<TypeExpr>,
    },
    Pointer(Box<TypeExpr>),
    Slice(Box<TypeExpr>),
    /// `[N]T`; `len` is `None` for `[...]T`
    Array {
        len: Option<Box<Expr>>,
        elem: Box<TypeExpr>,
    },
    Map {
        key: Box<TypeExpr>,
        value: Box<TypeExpr>,
    },
    Chan {
        dir: ChanDir,
        elem: Box<TypeExpr>,
    },
    Func {
        params: Vec<Field>,
        results: Vec<Field>,
    },
    Struct(Vec<Field>),
    Interface(Vec<InterfaceElem>),
    /// Parenthesized type
    Paren(Box<TypeExpr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum InterfaceElem {
    Method {
        name: Ident,
        params: Vec<Field>,
        results: Vec<Field>,
    },
    /// Embedded interface or type constraint union
    Embedded(Vec<TypeExpr>),
}

impl TypeExpr {
    /// Name of the named type at the core of this type, looking through
    /// pointers and parentheses
    pub fn base_name(&self) -> Option<&str> {
        match &self.kind {
            TypeKind::Name { name, .. } => Some(name),
            TypeKind::Pointer(inner) | TypeKind::Paren(inner) => inner.base_name(),
            _ => None,
        }
    }

    pub fn is_pointer(&self) -> bool {
        match &self.kind {
            TypeKind::Pointer(_) => true,
            TypeKind::Paren(inner) => inner.is_pointer(),
            _ => false,
        }
    }
}

// =============================================================================
// Statements
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    /// From `{` to `}` inclusive
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    /// `=`
    Assign,
    /// `:=`
    Define,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    AndNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchKind {
    Break,
    Continue,
    Goto,
    Fallthrough,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Expr(Expr),
    Send {
        chan: Expr,
        value: Expr,
    },
    IncDec {
        target: Expr,
        inc: bool,
    },
    Assign {
        lhs: Vec<Expr>,
        op: AssignOp,
        rhs: Vec<Expr>,
    },
    Go(Expr),
    Defer(Expr),
    Return(Vec<Expr>),
    Branch {
        kind: BranchKind,
        label: Option<Ident>,
    },
    Block(Block),
    If {
        init: Option<Box<Stmt>>,
        cond: Expr,
        then: Block,
        els: Option<Box<Stmt>>,
    },
    For {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        post: Option<Box<Stmt>>,
        body: Block,
    },
    Range {
        key: Option<Expr>,
        value: Option<Expr>,
        define: bool,
        expr: Expr,
        body: Block,
    },
    /// Expression and type switches. The tag of a type switch is the
    /// statement holding the `x.(type)` guard.
    Switch {
        init: Option<Box<Stmt>>,
        tag: Option<Box<Stmt>>,
        clauses: Vec<CaseClause>,
    },
    Select(Vec<CommClause>),
    Labeled {
        label: Ident,
        stmt: Box<Stmt>,
    },
    Decl(GenDecl),
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaseClause {
    /// `None` for `default:`
    pub exprs: Option<Vec<Expr>>,
    pub body: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommClause {
    /// `None` for `default:`
    pub comm: Option<Box<Stmt>>,
    pub body: Vec<Stmt>,
    pub span: Span,
}

// =============================================================================
// Expressions
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LitKind {
    Int,
    Float,
    Imag,
    Char,
    String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `&x`
    Addr,
    Neg,
    Plus,
    Not,
    Xor,
    /// `<-ch`
    Recv,
    /// `~T` in constraints
    Tilde,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    LOr,
    LAnd,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Or,
    Xor,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    And,
    AndNot,
}

impl BinaryOp {
    pub fn precedence(self) -> u8 {
        match self {
            BinaryOp::LOr => 1,
            BinaryOp::LAnd => 2,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => 3,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Or | BinaryOp::Xor => 4,
            _ => 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub key: Option<Expr>,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallExpr {
    pub fun: Box<Expr>,
    pub args: Vec<Expr>,
    pub ellipsis: bool,
    /// Offset of `(`; SSA call positions point here
    pub lparen: usize,
    /// Offset of `)`
    pub rparen: usize,
}

impl CallExpr {
    /// Receiver and method name when the callee is a selector
    pub fn method(&self) -> Option<(&Expr, &Ident)> {
        match &self.fun.kind {
            ExprKind::Selector { x, sel } => Some((x, sel)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Ident(String),
    BasicLit {
        kind: LitKind,
        value: String,
    },
    CompositeLit {
        ty: Option<TypeExpr>,
        elts: Vec<Element>,
    },
    FuncLit {
        params: Vec<Field>,
        results: Vec<Field>,
        body: Block,
    },
    Paren(Box<Expr>),
    Selector {
        x: Box<Expr>,
        sel: Ident,
    },
    Index {
        x: Box<Expr>,
        indices: Vec<Expr>,
    },
    Slice {
        x: Box<Expr>,
        low: Option<Box<Expr>>,
        high: Option<Box<Expr>>,
        max: Option<Box<Expr>>,
    },
    /// `x.(T)`; `ty` is `None` for `x.(type)`
    TypeAssert {
        x: Box<Expr>,
        ty: Option<TypeExpr>,
    },
    Call(CallExpr),
    /// `*x`, either a dereference or a pointer type
    Star(Box<Expr>),
    Unary {
        op: UnaryOp,
        x: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        x: Box<Expr>,
        y: Box<Expr>,
    },
    /// A type in expression position, e.g. the first argument of `make`
    Type(TypeExpr),
}

impl Expr {
    pub fn as_call(&self) -> Option<&CallExpr> {
        match &self.kind {
            ExprKind::Call(call) => Some(call),
            _ => None,
        }
    }

    pub fn as_ident(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Ident(name) => Some(name),
            _ => None,
        }
    }

    /// Strip any number of enclosing parentheses
    pub fn unparen(&self) -> &Expr {
        match &self.kind {
            ExprKind::Paren(inner) => inner.unparen(),
            _ => self,
        }
    }

    /// Whether the expression may appear on the left of `=`: identifiers,
    /// selector chains, dereferences and parenthesized forms of those.
    pub fn is_assignable(&self) -> bool {
        match &self.kind {
            ExprKind::Ident(name) => name != "_" && name != "nil",
            ExprKind::Selector { x, .. } => x.is_assignable(),
            ExprKind::Star(x) => x.is_assignable(),
            ExprKind::Paren(inner) => inner.is_assignable(),
            _ => false,
        }
    }
}
