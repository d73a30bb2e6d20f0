//! Program executor
//!
//! Walks compiled instruction streams over a shared operand stack, keeping
//! call frames on the heap so deep call chains stop at [`MAX_CALL_DEPTH`]
//! instead of exhausting the thread's stack. Fused operations dispatch to a
//! specialised kernel when one exists and accepts the input, and otherwise
//! run their expansion, so a program means the same thing with or without
//! fused kernels.

use tracing::{debug, trace};

use tacit_foundation::{
    CompiledFunction, FunctionId, FunctionRef, FusedOp, Instruction, ModifierKind, PrimitiveId,
    PrimitiveTable, Program, Signature,
};

use crate::error::ExecutionError;
use crate::fused::{FusedOutcome, fused_kernel};
use crate::kernels::{PrimitiveKernel, kernel};
use crate::machine::{EffectLog, Machine};
use crate::value::Value;

/// Maximum nesting of function calls.
pub const MAX_CALL_DEPTH: usize = 1024;

/// Maximum nesting of functions called back from modifiers and fused
/// kernels, which run on the native stack.
pub const MAX_CALLBACK_DEPTH: usize = 64;

/// A body being executed: a called function, or an inlined body or fused
/// expansion inside one.
struct Frame<'p> {
    function: &'p CompiledFunction,
    body: &'p [Instruction],
    pc: usize,
    call: bool,
}

impl<'p> Frame<'p> {
    fn nested(function: &'p CompiledFunction, body: &'p [Instruction]) -> Self {
        Self {
            function,
            body,
            pc: 0,
            call: false,
        }
    }
}

struct PrimitiveBinding {
    name: String,
    signature: Signature,
    kernel: Option<&'static PrimitiveKernel>,
}

pub struct Executor<'p> {
    program: &'p Program,
    primitives: Vec<PrimitiveBinding>,
    machine: Machine,
    depth: usize,
    callbacks: usize,
    fused_kernels: bool,
}

impl<'p> Executor<'p> {
    /// Bind `program` to the kernels named in `primitives`.
    ///
    /// Primitives without a kernel are only an error if they are executed.
    pub fn new(program: &'p Program, primitives: &PrimitiveTable) -> Self {
        let primitives = primitives
            .iter()
            .map(|(_, spec)| PrimitiveBinding {
                name: spec.name.clone(),
                signature: spec.signature,
                kernel: kernel(&spec.name),
            })
            .collect();
        Self {
            program,
            primitives,
            machine: Machine::new(),
            depth: 0,
            callbacks: 0,
            fused_kernels: true,
        }
    }

    /// Run fused ops through their expansions only.
    pub fn without_fused_kernels(mut self) -> Self {
        self.fused_kernels = false;
        self
    }

    pub fn effects(&self) -> &EffectLog {
        self.machine.effects()
    }

    /// Call `function` with `args` (deepest first) and return its outputs.
    pub fn call(&mut self, function: FunctionId, args: Vec<Value>) -> Result<Vec<Value>, ExecutionError> {
        let target = self.function(function)?;
        if args.len() != target.signature.inputs {
            return Err(ExecutionError::ArgumentCount {
                function,
                expected: target.signature.inputs,
                found: args.len(),
            });
        }

        let base = self.machine.depth();
        self.machine.extend(args);
        match self.invoke(function) {
            Ok(()) => Ok(self.machine.split_off(base)),
            Err(error) => {
                self.machine.truncate(base);
                Err(error)
            }
        }
    }

    /// Call a function by name.
    pub fn call_named(&mut self, name: &str, args: Vec<Value>) -> Result<Vec<Value>, ExecutionError> {
        let function = self.program.lookup(name).ok_or_else(|| {
            ExecutionError::invalid("call", format!("no function named `{name}`"))
        })?;
        self.call(function, args)
    }

    fn function(&self, id: FunctionId) -> Result<&'p CompiledFunction, ExecutionError> {
        let program = self.program;
        program
            .function(id)
            .ok_or(ExecutionError::UnknownFunction(id))
    }

    /// Run a function to completion on a fresh frame stack.
    ///
    /// Plain calls inside it push frames instead of recursing, so only
    /// callbacks from modifiers and fused kernels nest natively.
    fn invoke(&mut self, id: FunctionId) -> Result<(), ExecutionError> {
        if self.callbacks >= MAX_CALLBACK_DEPTH {
            return Err(ExecutionError::CallDepthExceeded(MAX_CALLBACK_DEPTH));
        }
        self.callbacks += 1;
        let depth = self.depth;
        let mut frames = Vec::new();
        let result = self.enter(&mut frames, id).and_then(|()| self.drive(&mut frames));
        self.depth = depth;
        self.callbacks -= 1;
        result
    }

    fn enter(&mut self, frames: &mut Vec<Frame<'p>>, id: FunctionId) -> Result<(), ExecutionError> {
        if self.depth >= MAX_CALL_DEPTH {
            return Err(ExecutionError::CallDepthExceeded(MAX_CALL_DEPTH));
        }
        let function = self.function(id)?;
        trace!(function = %id, depth = self.depth, "call");

        self.depth += 1;
        frames.push(Frame {
            function,
            body: &function.instructions,
            pc: 0,
            call: true,
        });
        Ok(())
    }

    fn drive(&mut self, frames: &mut Vec<Frame<'p>>) -> Result<(), ExecutionError> {
        while let Some(frame) = frames.last_mut() {
            let body = frame.body;
            let Some(instruction) = body.get(frame.pc) else {
                if frame.call {
                    self.depth -= 1;
                }
                frames.pop();
                continue;
            };
            frame.pc += 1;
            let function = frame.function;

            match instruction {
                Instruction::PushConstant(index) => {
                    let constant = function.constants.get(*index).ok_or(
                        ExecutionError::UnknownConstant {
                            function: function.id,
                            index: index.0,
                        },
                    )?;
                    self.machine.push(Value::from_constant(constant));
                }
                Instruction::CallPrimitive { primitive, .. } => self.call_primitive(*primitive)?,
                Instruction::CallFunction(id) => self.enter(frames, *id)?,
                Instruction::Modifier { kind, functions } => self.apply_modifier(*kind, functions)?,
                Instruction::Fused(op) => {
                    if self.run_kernel(op)? == FusedOutcome::Declined {
                        frames.push(Frame::nested(function, &op.expansion));
                    }
                }
                Instruction::Inlined { body, .. } => frames.push(Frame::nested(function, body)),
            }
        }
        Ok(())
    }

    fn call_primitive(&mut self, id: PrimitiveId) -> Result<(), ExecutionError> {
        let binding = self
            .primitives
            .get(id.index())
            .ok_or(ExecutionError::UnknownPrimitive(id))?;
        let kernel = binding
            .kernel
            .ok_or_else(|| ExecutionError::MissingKernel(binding.name.clone()))?;
        (kernel.handler)(&mut self.machine)
    }

    fn signature(&self, reference: FunctionRef) -> Result<Signature, ExecutionError> {
        match reference {
            FunctionRef::Primitive(id) => self
                .primitives
                .get(id.index())
                .map(|binding| binding.signature)
                .ok_or(ExecutionError::UnknownPrimitive(id)),
            FunctionRef::Function(id) => Ok(self.function(id)?.signature),
        }
    }

    fn apply(&mut self, reference: FunctionRef) -> Result<(), ExecutionError> {
        match reference {
            FunctionRef::Primitive(id) => self.call_primitive(id),
            FunctionRef::Function(id) => self.invoke(id),
        }
    }

    /// Apply `reference` to `args` (deepest first) and return what it leaves.
    pub(crate) fn apply_values(
        &mut self,
        reference: FunctionRef,
        args: Vec<Value>,
    ) -> Result<Vec<Value>, ExecutionError> {
        let base = self.machine.depth();
        self.machine.extend(args);
        if let Err(error) = self.apply(reference) {
            self.machine.truncate(base);
            return Err(error);
        }
        Ok(self.machine.split_off(base))
    }

    /// Fold one lane with a dyadic function, left to right.
    ///
    /// Every intermediate result must be a scalar.
    pub(crate) fn fold_lane(
        &mut self,
        reference: FunctionRef,
        lane: &[f64],
        operation: &'static str,
    ) -> Result<f64, ExecutionError> {
        let (first, rest) = lane.split_first().ok_or(ExecutionError::EmptyReduce)?;
        let mut acc = *first;
        for x in rest {
            acc = self.step(reference, acc, *x, operation)?;
        }
        Ok(acc)
    }

    fn step(
        &mut self,
        reference: FunctionRef,
        acc: f64,
        x: f64,
        operation: &'static str,
    ) -> Result<f64, ExecutionError> {
        let outputs = self.apply_values(reference, vec![Value::scalar(acc), Value::scalar(x)])?;
        match outputs.as_slice() {
            [value] => value.as_scalar().ok_or_else(|| ExecutionError::ShapeMismatch {
                operation,
                left: Vec::new(),
                right: value.shape().to_vec(),
            }),
            _ => Err(ExecutionError::invalid(
                operation,
                format!("folding function left {} values", outputs.len()),
            )),
        }
    }

    pub(crate) fn machine(&self) -> &Machine {
        &self.machine
    }

    pub(crate) fn machine_mut(&mut self) -> &mut Machine {
        &mut self.machine
    }

    fn apply_modifier(&mut self, kind: ModifierKind, functions: &[FunctionRef]) -> Result<(), ExecutionError> {
        let arity = || {
            ExecutionError::invalid(
                kind.name(),
                format!("expects {} bound function(s), got {}", kind.bound_count(), functions.len()),
            )
        };

        match kind {
            ModifierKind::Reduce => {
                let [f] = functions else { return Err(arity()) };
                let array = self.machine.pop()?;
                let result = self.reduce(*f, &array)?;
                self.machine.push(result);
            }
            ModifierKind::Scan => {
                let [f] = functions else { return Err(arity()) };
                let array = self.machine.pop()?;
                let result = self.scan(*f, &array)?;
                self.machine.push(result);
            }
            ModifierKind::Each => {
                let [f] = functions else { return Err(arity()) };
                let signature = self.signature(*f)?;
                let args = self.machine.pop_n(signature.inputs)?;
                let outputs = self.each(*f, signature, args)?;
                self.machine.extend(outputs);
            }
            ModifierKind::Dip => {
                let [f] = functions else { return Err(arity()) };
                let top = self.machine.pop()?;
                self.apply(*f)?;
                self.machine.push(top);
            }
            ModifierKind::Fork => {
                let [f, g] = functions else { return Err(arity()) };
                let (left, right) = (self.signature(*f)?, self.signature(*g)?);
                let n = left.inputs.max(right.inputs);
                let args = self.machine.pop_n(n)?;
                let left_out = self.apply_values(*f, args[n - left.inputs..].to_vec())?;
                let right_out = self.apply_values(*g, args[n - right.inputs..].to_vec())?;
                self.machine.extend(left_out);
                self.machine.extend(right_out);
            }
        }
        Ok(())
    }

    /// Fold every lane along the last axis.
    fn reduce(&mut self, f: FunctionRef, array: &Value) -> Result<Value, ExecutionError> {
        let (outer, lanes) = array
            .lanes()
            .map_err(|_| ExecutionError::invalid("reduce", "expected an array, got a scalar"))?;
        let mut results = Vec::with_capacity(lanes.len());
        for lane in lanes {
            results.push(self.fold_lane(f, lane, "reduce")?);
        }
        Value::new(outer, results)
    }

    /// Prefix folds of every lane along the last axis.
    fn scan(&mut self, f: FunctionRef, array: &Value) -> Result<Value, ExecutionError> {
        let (_, lanes) = array
            .lanes()
            .map_err(|_| ExecutionError::invalid("scan", "expected an array, got a scalar"))?;
        let mut data = Vec::with_capacity(array.data().len());
        for lane in lanes {
            let Some((first, rest)) = lane.split_first() else {
                continue;
            };
            let mut acc = *first;
            data.push(acc);
            for x in rest {
                acc = self.step(f, acc, *x, "scan")?;
                data.push(acc);
            }
        }
        Value::new(array.shape().to_vec(), data)
    }

    /// Apply `f` row by row. Scalar arguments are repeated for every row.
    fn each(
        &mut self,
        f: FunctionRef,
        signature: Signature,
        args: Vec<Value>,
    ) -> Result<Vec<Value>, ExecutionError> {
        let mut arrays = args.iter().filter(|arg| !arg.is_scalar());
        let Some(first) = arrays.next() else {
            return self.apply_values(f, args);
        };
        let rows = first.row_count();
        if let Some(other) = arrays.find(|arg| arg.row_count() != rows) {
            return Err(ExecutionError::ShapeMismatch {
                operation: "each",
                left: first.shape().to_vec(),
                right: other.shape().to_vec(),
            });
        }

        let mut slots: Vec<Vec<Value>> = vec![Vec::with_capacity(rows); signature.outputs];
        for row in 0..rows {
            let row_args = args.iter().map(|arg| arg.row(row)).collect();
            let outputs = self.apply_values(f, row_args)?;
            for (slot, value) in slots.iter_mut().zip(outputs) {
                slot.push(value);
            }
        }
        slots.into_iter().map(Value::from_rows).collect()
    }

    fn run_kernel(&mut self, op: &FusedOp) -> Result<FusedOutcome, ExecutionError> {
        if self.fused_kernels
            && let Some(kernel) = fused_kernel(op.id.as_str())
        {
            let outcome = kernel(self, op)?;
            if outcome == FusedOutcome::Declined {
                debug!(fusion = %op.id, "kernel declined, running expansion");
            }
            return Ok(outcome);
        }
        Ok(FusedOutcome::Declined)
    }
}
