//! Inlining and combinator-fusion optimizer for the tacit stack language.
//!
//! Function bodies enter the [`FunctionTable`] as words and leave as flat
//! instruction streams. Between the two, each function is:
//!
//! 1. lowered into instructions and a constant pool ([`lower`])
//! 2. scanned for fusable instruction windows ([`fusion`])
//! 3. planned for inlining against already compiled callees ([`planner`])
//! 4. flattened and validated ([`assemble`])
//!
//! The [`Compiler`] drives this over a whole program in call-graph order.
//! The [`effect`] analyzer underpins every stage: a transformation is only
//! kept if the body's stack effect stays what it was.
//!
//! ```ignore
//! let mut table = FunctionTable::new();
//! let square = table.define(FunctionDef::named("square", vec![dup, mul]))?;
//! let report = Compiler::new(&primitives).compile(&mut table);
//! let program = table.seal()?;
//! ```

pub mod assemble;
pub mod ast;
pub mod config;
pub mod effect;
pub mod error;
pub mod fusion;
pub mod graph;
pub mod infer;
pub mod lower;
pub mod pipeline;
pub mod planner;
pub mod table;

#[cfg(test)]
mod testing;

pub use ast::{FunctionDef, Operand, Word};
pub use config::{ConfigError, OptimizerConfig};
pub use effect::{EffectAnalyzer, FunctionEffects, StackEffect};
pub use error::{
    ArityError, ArityErrorKind, CompileError, Diagnostic, RuleError, SealError, TableError,
};
pub use fusion::{FusionMatcher, FusionRule, FusionRuleTable, ShapePattern};
pub use graph::CallGraph;
pub use pipeline::{CompileReport, Compiler, FunctionArtifact};
pub use planner::{DecisionReason, InliningDecision, InliningPlanner, SiteDecision};
pub use table::{CompileState, CompiledBody, FunctionEntry, FunctionTable};
