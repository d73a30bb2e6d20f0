//! Instruction set.
//!
//! Instructions form a flat, stack-based sequence: operands are popped from an
//! implicit stack and results pushed back. Assembled bodies never contain
//! [`Instruction::Inlined`]; that variant only exists between inlining and
//! assembly to mark spliced regions.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constant::ConstIndex;
use crate::ids::{FunctionId, FunctionRef, PrimitiveId};
use crate::modifier::ModifierKind;
use crate::signature::Signature;

/// Names of the fused operations known to the standard rule table and VM.
pub mod fusions {
    /// `windows` followed by `reduce(F)`: one fold per sliding window.
    pub const WINDOWED_REDUCE: &str = "windowed_reduce";
    /// `windows` followed by `each(F)`: apply `F` to every window without
    /// building the windows array.
    pub const EACH_WINDOWS: &str = "each_windows";
    /// `reverse` followed by `reduce(F)`: fold from the end without copying.
    pub const REVERSE_REDUCE: &str = "reverse_reduce";
    /// `each(F)` followed by `each(G)`: one pass applying `G ∘ F` per row.
    pub const EACH_CHAIN: &str = "each_chain";
    /// One or more `each` maps followed by `reduce(H)`: fold mapped rows directly.
    pub const MAP_REDUCE: &str = "map_reduce";
}

/// Bytecode instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Instruction {
    /// Push a constant from the owning function's pool.
    PushConstant(ConstIndex),

    /// Call a primitive. The signature is copied from the primitive table at
    /// lowering time.
    CallPrimitive {
        primitive: PrimitiveId,
        signature: Signature,
    },

    /// Call a user function through runtime dispatch.
    CallFunction(FunctionId),

    /// Apply a modifier to its bound functions.
    Modifier {
        kind: ModifierKind,
        functions: Vec<FunctionRef>,
    },

    /// A specialised replacement for a recognised instruction window.
    Fused(FusedOp),

    /// A callee body spliced in place of a call. Flattened by the assembler.
    Inlined {
        callee: FunctionId,
        body: Vec<Instruction>,
    },
}

impl Instruction {
    /// Number of instructions this occupies once assembled.
    pub fn size(&self) -> usize {
        match self {
            Instruction::Inlined { body, .. } => body.iter().map(Instruction::size).sum(),
            _ => 1,
        }
    }

    /// True if this is a direct call to `function`.
    pub fn calls(&self, function: FunctionId) -> bool {
        matches!(self, Instruction::CallFunction(id) if *id == function)
    }

    /// Functions bound to this instruction as modifier or fused-op operands.
    pub fn bound_functions(&self) -> &[FunctionRef] {
        match self {
            Instruction::Modifier { functions, .. } => functions,
            Instruction::Fused(op) => &op.functions,
            _ => &[],
        }
    }
}

/// Identifier of a fused operation, shared between fusion rules and the kernels
/// that execute them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FusionId(pub String);

impl FusionId {
    pub fn new(name: &str) -> Self {
        Self(name.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FusionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A fused operation.
///
/// `expansion` holds the exact instruction window the op replaced. A runtime
/// without a kernel for `id`, or whose kernel declines the input, executes the
/// expansion instead, so the op never means anything other than its window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedOp {
    pub id: FusionId,
    /// Bound functions in pattern order.
    pub functions: Vec<FunctionRef>,
    pub signature: Signature,
    pub pure: bool,
    pub expansion: Vec<Instruction>,
}
