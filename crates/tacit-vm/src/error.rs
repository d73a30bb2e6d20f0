//! Execution errors

use thiserror::Error;

use tacit_foundation::{FunctionId, PrimitiveId};

/// Execution errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecutionError {
    #[error("stack underflow: needed {needed}, have {available}")]
    StackUnderflow { needed: usize, available: usize },

    #[error("{operation}: shapes {left:?} and {right:?} do not agree")]
    ShapeMismatch {
        operation: &'static str,
        left: Vec<usize>,
        right: Vec<usize>,
    },

    #[error("cannot reduce an empty axis")]
    EmptyReduce,

    #[error("{operation}: {message}")]
    InvalidArgument {
        operation: &'static str,
        message: String,
    },

    #[error("call depth exceeded ({0})")]
    CallDepthExceeded(usize),

    #[error("unknown function {0}")]
    UnknownFunction(FunctionId),

    #[error("unknown primitive {0}")]
    UnknownPrimitive(PrimitiveId),

    /// The primitive table names a primitive the VM has no kernel for.
    #[error("no kernel for primitive `{0}`")]
    MissingKernel(String),

    #[error("unknown constant #{index} in {function}")]
    UnknownConstant { function: FunctionId, index: u32 },

    #[error("{function} takes {expected} argument(s), got {found}")]
    ArgumentCount {
        function: FunctionId,
        expected: usize,
        found: usize,
    },
}

impl ExecutionError {
    pub(crate) fn invalid(operation: &'static str, message: impl Into<String>) -> Self {
        ExecutionError::InvalidArgument {
            operation,
            message: message.into(),
        }
    }
}
