//! Stack signatures.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Net stack effect of a function or instruction sequence.
///
/// `inputs` values are consumed from the caller's stack and `outputs` values
/// are left in their place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature {
    pub inputs: usize,
    pub outputs: usize,
}

impl Signature {
    pub const fn new(inputs: usize, outputs: usize) -> Self {
        Self { inputs, outputs }
    }

    /// Change in stack depth after running something with this signature.
    pub fn delta(self) -> isize {
        self.outputs as isize - self.inputs as isize
    }

    /// True if a body with this effect can stand in for `declared`.
    ///
    /// A body may leave some declared inputs untouched (they pass through as
    /// outputs), but it must not reach deeper than `declared.inputs` and must
    /// change the stack depth by the same amount.
    pub fn fits(self, declared: Signature) -> bool {
        self.inputs <= declared.inputs && self.delta() == declared.delta()
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}→{}", self.inputs, self.outputs)
    }
}
