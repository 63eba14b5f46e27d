//! Purity contract of functions declared `pure`
//!
//! Handle values of a pure function are classified on a three-point lattice
//! (see [`PurityState`]); the validator then reports chain calls on
//! parameter-derived handles, parameter-derived handles passed to non-pure
//! callees, and polluted returns.

pub mod inferencer;
pub mod state;
pub mod validator;

pub use inferencer::PurityInferencer;
pub use state::PurityState;
pub use validator::{PurityValidator, PurityViolation, PurityViolationKind};

use crate::catalogue::Catalogue;
use crate::directives::DirectiveStore;
use crate::ssa::{Function, Program};

/// Contract violations of one function declared `pure`
pub fn validate_pure_function(
    program: &Program,
    catalogue: &Catalogue,
    directives: &DirectiveStore,
    function: &Function,
) -> Vec<PurityViolation> {
    if function.is_external() {
        return Vec::new();
    }
    PurityValidator::new(program, catalogue, directives, function).validate()
}

#[cfg(test)]
mod purity_test;
