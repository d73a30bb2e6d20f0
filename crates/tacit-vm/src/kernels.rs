//! Standard primitives: metadata and kernels.
//!
//! Each entry links a primitive name to its signature, purity and the
//! handler the executor dispatches to. [`standard_primitives`] turns the
//! list into the [`PrimitiveTable`] the compiler is given, so the compiler
//! and the VM always agree on arity and purity.

use std::sync::OnceLock;

use indexmap::IndexMap;

use tacit_foundation::{PrimitiveSpec, PrimitiveTable, Signature};

use crate::error::ExecutionError;
use crate::machine::Machine;
use crate::value::Value;

/// Primitive kernel entry point.
pub type Handler = fn(&mut Machine) -> Result<(), ExecutionError>;

#[derive(Debug, Clone, Copy)]
pub struct PrimitiveKernel {
    pub name: &'static str,
    pub signature: Signature,
    pub pure: bool,
    pub handler: Handler,
}

impl PrimitiveKernel {
    pub fn spec(&self) -> PrimitiveSpec {
        PrimitiveSpec {
            name: self.name.to_string(),
            signature: self.signature,
            pure: self.pure,
        }
    }
}

/// All standard primitive kernels, in registration order.
pub fn primitive_kernels() -> &'static [PrimitiveKernel] {
    static KERNELS: OnceLock<Vec<PrimitiveKernel>> = OnceLock::new();
    KERNELS.get_or_init(build_kernels)
}

/// Look up a kernel by primitive name.
pub fn kernel(name: &str) -> Option<&'static PrimitiveKernel> {
    static BY_NAME: OnceLock<IndexMap<&'static str, &'static PrimitiveKernel>> = OnceLock::new();
    BY_NAME
        .get_or_init(|| {
            primitive_kernels()
                .iter()
                .map(|kernel| (kernel.name, kernel))
                .collect()
        })
        .get(name)
        .copied()
}

/// The primitive table for programs run on this VM.
///
/// # Panics
///
/// Panics if two standard kernels share a name.
pub fn standard_primitives() -> PrimitiveTable {
    let mut table = PrimitiveTable::new();
    for kernel in primitive_kernels() {
        table
            .register(kernel.spec())
            .unwrap_or_else(|err| panic!("standard primitive table: {err}"));
    }
    table
}

fn build_kernels() -> Vec<PrimitiveKernel> {
    macro_rules! prim {
        ($name:literal, $inputs:literal => $outputs:literal, $handler:ident) => {
            PrimitiveKernel {
                name: $name,
                signature: Signature::new($inputs, $outputs),
                pure: true,
                handler: $handler,
            }
        };
        ($name:literal, $inputs:literal => $outputs:literal, impure, $handler:ident) => {
            PrimitiveKernel {
                name: $name,
                signature: Signature::new($inputs, $outputs),
                pure: false,
                handler: $handler,
            }
        };
    }

    vec![
        prim!("add", 2 => 1, handle_add),
        prim!("sub", 2 => 1, handle_sub),
        prim!("mul", 2 => 1, handle_mul),
        prim!("div", 2 => 1, handle_div),
        prim!("max", 2 => 1, handle_max),
        prim!("neg", 1 => 1, handle_neg),
        prim!("dup", 1 => 2, handle_dup),
        prim!("pop", 1 => 0, handle_pop),
        prim!("flip", 2 => 2, handle_flip),
        prim!("reverse", 1 => 1, handle_reverse),
        prim!("windows", 2 => 1, handle_windows),
        prim!("range", 1 => 1, handle_range),
        prim!("length", 1 => 1, handle_length),
        prim!("print", 1 => 0, impure, handle_print),
        prim!("tick", 0 => 1, impure, handle_tick),
    ]
}

fn binary(
    machine: &mut Machine,
    operation: &'static str,
    f: impl Fn(f64, f64) -> f64,
) -> Result<(), ExecutionError> {
    let (a, b) = machine.pop_pair()?;
    machine.push(a.zip_with(&b, operation, f)?);
    Ok(())
}

fn handle_add(machine: &mut Machine) -> Result<(), ExecutionError> {
    binary(machine, "add", |a, b| a + b)
}

fn handle_sub(machine: &mut Machine) -> Result<(), ExecutionError> {
    binary(machine, "sub", |a, b| a - b)
}

fn handle_mul(machine: &mut Machine) -> Result<(), ExecutionError> {
    binary(machine, "mul", |a, b| a * b)
}

fn handle_div(machine: &mut Machine) -> Result<(), ExecutionError> {
    binary(machine, "div", |a, b| a / b)
}

fn handle_max(machine: &mut Machine) -> Result<(), ExecutionError> {
    binary(machine, "max", f64::max)
}

fn handle_neg(machine: &mut Machine) -> Result<(), ExecutionError> {
    let value = machine.pop()?;
    machine.push(value.map(|x| -x));
    Ok(())
}

fn handle_dup(machine: &mut Machine) -> Result<(), ExecutionError> {
    let value = machine.pop()?;
    machine.push(value.clone());
    machine.push(value);
    Ok(())
}

fn handle_pop(machine: &mut Machine) -> Result<(), ExecutionError> {
    machine.pop()?;
    Ok(())
}

fn handle_flip(machine: &mut Machine) -> Result<(), ExecutionError> {
    let (a, b) = machine.pop_pair()?;
    machine.push(b);
    machine.push(a);
    Ok(())
}

fn handle_reverse(machine: &mut Machine) -> Result<(), ExecutionError> {
    let value = machine.pop()?;
    machine.push(value.reversed());
    Ok(())
}

fn handle_windows(machine: &mut Machine) -> Result<(), ExecutionError> {
    let (array, size) = machine.pop_pair()?;
    machine.push(windows(&array, &size)?);
    Ok(())
}

fn handle_range(machine: &mut Machine) -> Result<(), ExecutionError> {
    let n = machine.pop()?;
    let count = natural(&n, "range")?;
    machine.push(Value::list((0..count).map(|i| i as f64).collect::<Vec<_>>()));
    Ok(())
}

fn handle_length(machine: &mut Machine) -> Result<(), ExecutionError> {
    let value = machine.pop()?;
    machine.push(Value::scalar(value.row_count() as f64));
    Ok(())
}

fn handle_print(machine: &mut Machine) -> Result<(), ExecutionError> {
    let value = machine.pop()?;
    machine.effects_mut().printed.push(value);
    Ok(())
}

fn handle_tick(machine: &mut Machine) -> Result<(), ExecutionError> {
    let effects = machine.effects_mut();
    effects.ticks += 1;
    let ticks = effects.ticks;
    machine.push(Value::scalar(ticks as f64));
    Ok(())
}

/// A scalar holding a non-negative integer.
fn natural(value: &Value, operation: &'static str) -> Result<usize, ExecutionError> {
    match value.as_scalar() {
        Some(x) if x >= 0.0 && x.fract() == 0.0 => Ok(x as usize),
        _ => Err(ExecutionError::invalid(
            operation,
            format!("expected a non-negative integer, got {value}"),
        )),
    }
}

/// Window size argument of `windows`: an integer of at least one.
pub(crate) fn window_size(size: &Value) -> Result<usize, ExecutionError> {
    match natural(size, "windows")? {
        0 => Err(ExecutionError::invalid("windows", "window size must be at least 1")),
        size => Ok(size),
    }
}

/// All contiguous runs of `size` rows of `array`.
///
/// The result has shape `[n - size + 1, size, ..cell]`, or a leading zero
/// when the array is shorter than one window.
pub fn windows(array: &Value, size: &Value) -> Result<Value, ExecutionError> {
    if array.is_scalar() {
        return Err(ExecutionError::invalid("windows", "expected an array, got a scalar"));
    }
    let width = window_size(size)?;
    let rows = array.row_count();
    let count = if rows >= width { rows - width + 1 } else { 0 };
    let cell: usize = array.shape()[1..].iter().product();

    let mut data = Vec::with_capacity(count * width * cell);
    for start in 0..count {
        data.extend_from_slice(&array.data()[start * cell..(start + width) * cell]);
    }
    let mut shape = vec![count, width];
    shape.extend_from_slice(&array.shape()[1..]);
    Value::new(shape, data)
}
