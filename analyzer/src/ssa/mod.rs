//! SSA program model consumed by the analyzer
//!
//! The host lowers Go packages to this form (or serializes them to JSON);
//! the analyzer only reads it.

pub mod builder;
pub mod ids;
pub mod program;
pub mod types;

pub use builder::{FunctionBuilder, ProgramBuilder};
pub use ids::{BlockId, FunctionId, TypeId, ValueId};
pub use program::{
    receiver_base_name, BasicBlock, CallCommon, Callee, Function, FunctionRef, Program, ProgramFile, UnOpKind,
    Value, ValueKind,
};
pub use types::{StructField, TypeKind, TypeTable};
