//! Go source parser
//!
//! Parses the package clause, imports, comments and declarations of a Go
//! file into an AST whose nodes carry byte spans. The analyzer reads
//! directives from the comments and locates rewrite targets in the
//! statement trees.

pub mod error;
pub mod go_ast;
pub mod go_parser;
pub mod go_parser_decls;
pub mod go_parser_expr;
pub mod go_parser_stmt;
pub mod go_parser_types;
pub mod visit;


pub use error::{ContextualError, ParseError};
pub use go_ast::*;
pub use go_parser::parse_go_file;
pub use visit::{walk_block, walk_expr, walk_file, walk_func_decl, walk_stmt, Visitor};
