//! Identifiers shared by the compiler and the VM.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Index of a function in the function table arena.
///
/// Ids are assigned once at definition time and never change, so instructions
/// may carry them across inlining without renumbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FunctionId(pub u32);

impl FunctionId {
    pub fn new(index: usize) -> Self {
        Self(index as u32)
    }

    /// Zero-based arena index.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "f{}", self.0)
    }
}

/// Index of a primitive in the primitive table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PrimitiveId(pub u16);

impl PrimitiveId {
    pub fn new(index: usize) -> Self {
        Self(index as u16)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for PrimitiveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// A function bound to a modifier or a fused operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FunctionRef {
    Primitive(PrimitiveId),
    Function(FunctionId),
}

impl FunctionRef {
    /// The user function this reference names, if any.
    pub fn function(self) -> Option<FunctionId> {
        match self {
            FunctionRef::Function(id) => Some(id),
            FunctionRef::Primitive(_) => None,
        }
    }
}

impl fmt::Display for FunctionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FunctionRef::Primitive(id) => write!(f, "{id}"),
            FunctionRef::Function(id) => write!(f, "{id}"),
        }
    }
}
