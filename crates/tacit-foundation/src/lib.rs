//! Tacit foundation types.
//!
//! Everything the compiler produces and the VM consumes lives here, so the two
//! sides agree on one definition of an instruction, a signature and a program.
//!
//! - [`ids`] - Function, primitive and constant identifiers
//! - [`signature`] - Stack signatures (inputs → outputs)
//! - [`constant`] - Literal constants and per-function constant pools
//! - [`primitive`] - Primitive metadata table (arity, purity)
//! - [`modifier`] - Modifier kinds and their effect composition
//! - [`bytecode`] - Instructions and fused operations
//! - [`program`] - Sealed, executable programs

pub mod bytecode;
pub mod constant;
pub mod ids;
pub mod modifier;
pub mod primitive;
pub mod program;
pub mod signature;

pub use bytecode::{FusedOp, FusionId, Instruction, fusions};
pub use constant::{ConstIndex, Constant, ConstantPool};
pub use ids::{FunctionId, FunctionRef, PrimitiveId};
pub use modifier::{BoundError, ModifierKind, ModifierSpec};
pub use primitive::{PrimitiveSpec, PrimitiveTable, PrimitiveTableError};
pub use program::{CompiledFunction, Program};
pub use signature::Signature;
