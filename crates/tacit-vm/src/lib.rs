//! Reference executor for compiled tacit programs.
//!
//! The VM runs a sealed [`Program`](tacit_foundation::Program) against the
//! standard primitive kernels. It favours obvious semantics over speed:
//! values are plain `f64` arrays and every modifier is evaluated directly.
//! Fused operations use a specialised kernel where one applies and fall
//! back to their expansion otherwise.
//!
//! - [`value`] - n-dimensional array values
//! - [`machine`] - operand stack and side-effect log
//! - [`kernels`] - standard primitives (signature, purity, handler)
//! - [`fused`] - kernels for fused operations
//! - [`executor`] - instruction dispatch and modifier semantics

pub mod error;
pub mod executor;
pub mod fused;
pub mod kernels;
pub mod machine;
pub mod value;

pub use error::ExecutionError;
pub use executor::{Executor, MAX_CALL_DEPTH, MAX_CALLBACK_DEPTH};
pub use kernels::standard_primitives;
pub use machine::EffectLog;
pub use value::Value;
