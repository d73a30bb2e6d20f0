//! Operand stack and side-effect log.

use crate::error::ExecutionError;
use crate::value::Value;

/// Observable side effects of impure primitives.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EffectLog {
    /// Values passed to `print`, in order.
    pub printed: Vec<Value>,
    /// Number of `tick` calls so far.
    pub ticks: u64,
}

/// The state primitive kernels operate on.
#[derive(Debug, Clone, Default)]
pub struct Machine {
    stack: Vec<Value>,
    effects: EffectLog,
}

impl Machine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    pub fn extend(&mut self, values: impl IntoIterator<Item = Value>) {
        self.stack.extend(values);
    }

    pub fn pop(&mut self) -> Result<Value, ExecutionError> {
        self.stack.pop().ok_or(ExecutionError::StackUnderflow {
            needed: 1,
            available: 0,
        })
    }

    /// Pop two values, deepest first.
    pub fn pop_pair(&mut self) -> Result<(Value, Value), ExecutionError> {
        let mut values = self.pop_n(2)?;
        let top = values.pop();
        let below = values.pop();
        match (below, top) {
            (Some(below), Some(top)) => Ok((below, top)),
            _ => Err(ExecutionError::StackUnderflow {
                needed: 2,
                available: 0,
            }),
        }
    }

    /// Pop `n` values, deepest first.
    pub fn pop_n(&mut self, n: usize) -> Result<Vec<Value>, ExecutionError> {
        let available = self.stack.len();
        if available < n {
            return Err(ExecutionError::StackUnderflow {
                needed: n,
                available,
            });
        }
        Ok(self.stack.split_off(available - n))
    }

    /// The top `n` values, deepest first, without popping them.
    pub fn peek_n(&self, n: usize) -> Result<&[Value], ExecutionError> {
        let available = self.stack.len();
        if available < n {
            return Err(ExecutionError::StackUnderflow {
                needed: n,
                available,
            });
        }
        Ok(&self.stack[available - n..])
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Remove and return everything above `base`.
    pub fn split_off(&mut self, base: usize) -> Vec<Value> {
        self.stack.split_off(base.min(self.stack.len()))
    }

    pub fn truncate(&mut self, base: usize) {
        self.stack.truncate(base);
    }

    pub fn effects(&self) -> &EffectLog {
        &self.effects
    }

    pub fn effects_mut(&mut self) -> &mut EffectLog {
        &mut self.effects
    }
}
