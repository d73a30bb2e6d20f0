//! Compiler errors and diagnostics

use std::fmt;

use thiserror::Error;

use tacit_foundation::{BoundError, FunctionId, PrimitiveId, Signature};

use crate::table::CompileState;

/// What went wrong while simulating a body's stack effect.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArityErrorKind {
    /// An instruction needs more values than the stack holds.
    #[error("needs {required} value(s) but only {available} are available")]
    Underflow { required: usize, available: usize },

    /// The body's net effect disagrees with the declared signature.
    #[error("body has effect {found}, declared {expected}")]
    OutputMismatch { expected: Signature, found: Signature },

    #[error("unknown function {0}")]
    UnknownFunction(FunctionId),

    #[error("unknown primitive {0}")]
    UnknownPrimitive(PrimitiveId),

    /// A call site recorded a signature the primitive table disagrees with.
    #[error("primitive {primitive} called as {recorded}, table declares {declared}")]
    PrimitiveSignature {
        primitive: PrimitiveId,
        recorded: Signature,
        declared: Signature,
    },

    /// Bound function count or shape does not suit the modifier.
    #[error(transparent)]
    Bound(#[from] BoundError),

    #[error("unknown constant #{0}")]
    UnknownConstant(u32),

    /// No signature is declared and none can be inferred.
    #[error("signature of {0} cannot be resolved")]
    Unresolvable(FunctionId),
}

/// A stack-effect failure pinned to an instruction position.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("at instruction {position}: {kind}")]
pub struct ArityError {
    pub position: usize,
    pub kind: ArityErrorKind,
}

impl ArityError {
    pub fn new(position: usize, kind: impl Into<ArityErrorKind>) -> Self {
        Self {
            position,
            kind: kind.into(),
        }
    }
}

fn describe(function: &FunctionId, name: &Option<String>) -> String {
    match name {
        Some(name) => format!("`{name}` ({function})"),
        None => function.to_string(),
    }
}

/// Errors raised while compiling a single function.
///
/// Every variant names the function it belongs to; a failure never leaks
/// into the compilation of other functions.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error("arity error in {}: {error}", describe(.function, .name))]
    Arity {
        function: FunctionId,
        name: Option<String>,
        #[source]
        error: ArityError,
    },

    /// A fusion replacement does not reproduce the effect of the window it replaced.
    #[error("fusion `{rule}` at {position} in {function} changes the effect: {message}")]
    FusionConsistency {
        function: FunctionId,
        rule: String,
        position: usize,
        message: String,
    },

    #[error("{function} references undefined function {target}")]
    UnresolvedFunction {
        function: FunctionId,
        target: FunctionId,
    },

    #[error("invalid body for {function}: {message}")]
    InvalidBody {
        function: FunctionId,
        message: String,
    },

    #[error("{function} cannot move from {from:?} to {to:?}")]
    StateRegression {
        function: FunctionId,
        from: CompileState,
        to: CompileState,
    },
}

impl CompileError {
    pub fn arity(function: FunctionId, name: Option<&str>, error: ArityError) -> Self {
        CompileError::Arity {
            function,
            name: name.map(str::to_string),
            error,
        }
    }

    /// The function this error belongs to.
    pub fn function(&self) -> FunctionId {
        match self {
            CompileError::Arity { function, .. }
            | CompileError::FusionConsistency { function, .. }
            | CompileError::UnresolvedFunction { function, .. }
            | CompileError::InvalidBody { function, .. }
            | CompileError::StateRegression { function, .. } => *function,
        }
    }
}

/// Errors from the function table's definition API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
    #[error("function `{0}` is already defined")]
    DuplicateName(String),

    #[error("unknown function {0}")]
    UnknownFunction(FunctionId),

    #[error("function {0} already has a body")]
    AlreadyDefined(FunctionId),
}

/// Errors from registering fusion rules.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    #[error("fusion rule `{0}` has an empty pattern")]
    EmptyPattern(String),

    #[error("fusion rule `{0}` is already registered")]
    Duplicate(String),
}

/// Raised when sealing a table that still holds uncompiled functions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot seal: {} function(s) not compiled: {functions:?}", .functions.len())]
pub struct SealError {
    pub functions: Vec<FunctionId>,
}

/// Non-fatal findings recorded while planning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// Transitive inlining stopped at the depth limit; the site was kept as a call.
    RecursionLimitExceeded {
        caller: FunctionId,
        callee: FunctionId,
        depth: usize,
    },
    /// The callee's compiled body did not fit its signature, so it was not spliced.
    InlineAborted {
        caller: FunctionId,
        callee: FunctionId,
        reason: String,
    },
}

impl Diagnostic {
    pub fn caller(&self) -> FunctionId {
        match self {
            Diagnostic::RecursionLimitExceeded { caller, .. }
            | Diagnostic::InlineAborted { caller, .. } => *caller,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::RecursionLimitExceeded {
                caller,
                callee,
                depth,
            } => write!(
                f,
                "{caller}: inlining of {callee} stopped at depth {depth}, kept as call"
            ),
            Diagnostic::InlineAborted {
                caller,
                callee,
                reason,
            } => write!(f, "{caller}: inlining of {callee} aborted: {reason}"),
        }
    }
}
