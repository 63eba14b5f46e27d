//! Purity lattice
//!
//! `Clean` is the bottom, `Polluted` the top, and `Depends` sets sit in
//! between ordered by inclusion.

use std::collections::BTreeSet;
use std::fmt;

use crate::ssa::ValueId;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PurityState {
    /// Never touched by a polluting operation
    #[default]
    Clean,
    /// Transformed by a non-pure operation
    Polluted,
    /// As pure as the caller's arguments for these parameters
    Depends(BTreeSet<ValueId>),
}

impl PurityState {
    pub fn depends_on(param: ValueId) -> Self {
        PurityState::Depends(BTreeSet::from([param]))
    }

    /// `Depends` on a set of parameters; an empty set is `Clean`
    pub fn from_params(params: BTreeSet<ValueId>) -> Self {
        if params.is_empty() {
            PurityState::Clean
        } else {
            PurityState::Depends(params)
        }
    }

    /// Least upper bound of two states
    pub fn merge(&self, other: &PurityState) -> PurityState {
        match (self, other) {
            (PurityState::Polluted, _) | (_, PurityState::Polluted) => PurityState::Polluted,
            (PurityState::Clean, state) | (state, PurityState::Clean) => state.clone(),
            (PurityState::Depends(a), PurityState::Depends(b)) => {
                PurityState::Depends(a.union(b).copied().collect())
            }
        }
    }

    pub fn merge_all<'s>(states: impl IntoIterator<Item = &'s PurityState>) -> PurityState {
        states
            .into_iter()
            .fold(PurityState::Clean, |acc, state| acc.merge(state))
    }

    pub fn is_clean(&self) -> bool {
        matches!(self, PurityState::Clean)
    }

    pub fn is_polluted(&self) -> bool {
        matches!(self, PurityState::Polluted)
    }

    /// Parameters this state is derived from, if any
    pub fn params(&self) -> Option<&BTreeSet<ValueId>> {
        match self {
            PurityState::Depends(params) if !params.is_empty() => Some(params),
            _ => None,
        }
    }

    /// Derived from at least one parameter
    pub fn is_param_derived(&self) -> bool {
        self.params().is_some()
    }
}

impl fmt::Display for PurityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PurityState::Clean => write!(f, "Clean"),
            PurityState::Polluted => write!(f, "Polluted"),
            PurityState::Depends(params) => {
                write!(f, "Depends(")?;
                for (i, param) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", param)?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples() -> Vec<PurityState> {
        let a = ValueId::from_raw(1);
        let b = ValueId::from_raw(2);
        vec![
            PurityState::Clean,
            PurityState::Polluted,
            PurityState::depends_on(a),
            PurityState::depends_on(b),
            PurityState::Depends(BTreeSet::from([a, b])),
        ]
    }

    #[test]
    fn test_merge_table() {
        let a = ValueId::from_raw(1);
        let b = ValueId::from_raw(2);
        let clean = PurityState::Clean;
        let polluted = PurityState::Polluted;
        let dep_a = PurityState::depends_on(a);

        assert_eq!(clean.merge(&clean), PurityState::Clean);
        assert_eq!(dep_a.merge(&polluted), PurityState::Polluted);
        assert_eq!(clean.merge(&dep_a), dep_a);
        assert_eq!(
            dep_a.merge(&PurityState::depends_on(b)),
            PurityState::Depends(BTreeSet::from([a, b]))
        );
    }

    #[test]
    fn test_merge_is_commutative_and_associative() {
        let states = samples();
        for x in &states {
            for y in &states {
                assert_eq!(x.merge(y), y.merge(x), "{} ⊔ {}", x, y);
                for z in &states {
                    assert_eq!(x.merge(y).merge(z), x.merge(&y.merge(z)), "{} {} {}", x, y, z);
                }
            }
        }
    }

    #[test]
    fn test_identity_and_absorbing_elements() {
        for x in samples() {
            assert_eq!(PurityState::Clean.merge(&x), x);
            assert_eq!(x.merge(&PurityState::Polluted), PurityState::Polluted);
        }
    }

    #[test]
    fn test_empty_depends_is_clean() {
        assert_eq!(PurityState::from_params(BTreeSet::new()), PurityState::Clean);
        assert!(!PurityState::Depends(BTreeSet::new()).is_param_derived());
        assert_eq!(PurityState::merge_all(std::iter::empty()), PurityState::Clean);
    }

    #[test]
    fn test_display() {
        let state = PurityState::Depends(BTreeSet::from([ValueId::from_raw(3), ValueId::from_raw(1)]));
        assert_eq!(state.to_string(), "Depends(ValueId(1), ValueId(3))");
    }
}
