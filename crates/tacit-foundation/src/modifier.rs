//! Modifier kinds and their stack-effect composition.
//!
//! A modifier binds one or more functions and applies them according to a
//! fixed higher-order pattern. Metadata lives in a table rather than being
//! spread across match arms, and [`ModifierKind::effect`] is the single place
//! that derives a modifier's signature from the signatures it binds.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::signature::Signature;

/// Higher-order construct applied to bound functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ModifierKind {
    /// Folds a dyadic function along the last axis: `F(acc, x)` left to right.
    Reduce,
    /// Like [`ModifierKind::Reduce`], keeping every intermediate accumulator.
    Scan,
    /// Applies a function to corresponding rows of its arguments.
    Each,
    /// Runs a function underneath the top stack value.
    Dip,
    /// Runs two functions on the same arguments, pushing both results.
    Fork,
}

/// Static metadata for a modifier.
#[derive(Debug, Clone)]
pub struct ModifierSpec {
    pub kind: ModifierKind,
    pub name: &'static str,
    /// Number of functions the modifier binds.
    pub bound: usize,
}

const MODIFIER_SPECS: &[ModifierSpec] = &[
    ModifierSpec {
        kind: ModifierKind::Reduce,
        name: "reduce",
        bound: 1,
    },
    ModifierSpec {
        kind: ModifierKind::Scan,
        name: "scan",
        bound: 1,
    },
    ModifierSpec {
        kind: ModifierKind::Each,
        name: "each",
        bound: 1,
    },
    ModifierSpec {
        kind: ModifierKind::Dip,
        name: "dip",
        bound: 1,
    },
    ModifierSpec {
        kind: ModifierKind::Fork,
        name: "fork",
        bound: 2,
    },
];

/// The function signature `Reduce` and `Scan` accept.
const DYADIC: Signature = Signature::new(2, 1);

/// A modifier was given bound functions it cannot compose with.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BoundError {
    #[error("{modifier} binds {expected} function(s), found {found}")]
    Count {
        modifier: ModifierKind,
        expected: usize,
        found: usize,
    },

    #[error("{modifier} cannot bind a {found} function as operand {index}")]
    Signature {
        modifier: ModifierKind,
        index: usize,
        found: Signature,
    },
}

impl ModifierKind {
    /// All modifier kinds, in table order.
    pub fn all() -> impl Iterator<Item = ModifierKind> {
        MODIFIER_SPECS.iter().map(|spec| spec.kind)
    }

    /// Metadata for this modifier.
    ///
    /// # Panics
    ///
    /// Panics if the kind has no entry in the metadata table.
    pub fn spec(self) -> &'static ModifierSpec {
        MODIFIER_SPECS
            .iter()
            .find(|spec| spec.kind == self)
            .unwrap_or_else(|| panic!("missing modifier metadata for {self:?}"))
    }

    pub fn name(self) -> &'static str {
        self.spec().name
    }

    pub fn bound_count(self) -> usize {
        self.spec().bound
    }

    /// Signature of the modifier applied to functions with the given signatures.
    pub fn effect(self, bound: &[Signature]) -> Result<Signature, BoundError> {
        let expected = self.bound_count();
        if bound.len() != expected {
            return Err(BoundError::Count {
                modifier: self,
                expected,
                found: bound.len(),
            });
        }
        let reject = |index: usize| BoundError::Signature {
            modifier: self,
            index,
            found: bound[index],
        };
        match self {
            ModifierKind::Reduce | ModifierKind::Scan => {
                if bound[0] != DYADIC {
                    return Err(reject(0));
                }
                Ok(Signature::new(1, 1))
            }
            ModifierKind::Each => {
                if bound[0].inputs == 0 {
                    return Err(reject(0));
                }
                Ok(bound[0])
            }
            ModifierKind::Dip => Ok(Signature::new(bound[0].inputs + 1, bound[0].outputs + 1)),
            ModifierKind::Fork => Ok(Signature::new(
                bound[0].inputs.max(bound[1].inputs),
                bound[0].outputs + bound[1].outputs,
            )),
        }
    }
}

impl fmt::Display for ModifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
