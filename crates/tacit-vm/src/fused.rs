//! Kernels for fused operations.
//!
//! A kernel either completes the operation or declines it, leaving the
//! stack untouched so the executor can run the expansion instead. Kernels
//! over possibly impure functions (`windowed_reduce`, `reverse_reduce`)
//! only decline before calling anything, and call in the same order as the
//! expansion would. Kernels over pure functions may decline at any point.

use tacit_foundation::{FunctionRef, FusedOp, fusions};

use crate::error::ExecutionError;
use crate::executor::Executor;
use crate::kernels::window_size;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FusedOutcome {
    Done,
    Declined,
}

pub type FusedKernel = fn(&mut Executor<'_>, &FusedOp) -> Result<FusedOutcome, ExecutionError>;

const FUSED_KERNELS: &[(&str, FusedKernel)] = &[
    (fusions::WINDOWED_REDUCE, windowed_reduce),
    (fusions::REVERSE_REDUCE, reverse_reduce),
    (fusions::EACH_CHAIN, each_chain),
    (fusions::MAP_REDUCE, map_reduce),
    (fusions::EACH_WINDOWS, each_windows),
];

/// The kernel registered for a fusion id.
pub fn fused_kernel(id: &str) -> Option<FusedKernel> {
    FUSED_KERNELS
        .iter()
        .find(|(name, _)| *name == id)
        .map(|(_, kernel)| *kernel)
}

/// The top value if it is a non-empty list.
fn top_list(executor: &Executor<'_>) -> Option<Vec<f64>> {
    let [value] = executor.machine().peek_n(1).ok()? else {
        return None;
    };
    (value.rank() == 1 && !value.data().is_empty()).then(|| value.data().to_vec())
}

fn finish(executor: &mut Executor<'_>, consumed: usize, result: Value) -> Result<FusedOutcome, ExecutionError> {
    executor.machine_mut().pop_n(consumed)?;
    executor.machine_mut().push(result);
    Ok(FusedOutcome::Done)
}

/// Apply a pure monadic function to a scalar, if it yields one scalar.
fn map_scalar(executor: &mut Executor<'_>, f: FunctionRef, x: f64) -> Option<f64> {
    match executor.apply_values(f, vec![Value::scalar(x)]).ok()?.as_slice() {
        [value] => value.as_scalar(),
        _ => None,
    }
}

/// `windows` then `reduce(F)` over a list.
fn windowed_reduce(executor: &mut Executor<'_>, op: &FusedOp) -> Result<FusedOutcome, ExecutionError> {
    let [f] = op.functions[..] else {
        return Ok(FusedOutcome::Declined);
    };
    let (data, width) = match executor.machine().peek_n(2) {
        Ok([array, size]) if array.rank() == 1 => match window_size(size) {
            Ok(width) => (array.data().to_vec(), width),
            Err(_) => return Ok(FusedOutcome::Declined),
        },
        _ => return Ok(FusedOutcome::Declined),
    };

    let count = if data.len() >= width { data.len() - width + 1 } else { 0 };
    let mut results = Vec::with_capacity(count);
    for start in 0..count {
        results.push(executor.fold_lane(f, &data[start..start + width], "reduce")?);
    }
    finish(executor, 2, Value::list(results))
}

/// `windows` then `each(F)` over a list. Each window is handed to `F`
/// as a slice of the input instead of a row of a materialized array.
fn each_windows(executor: &mut Executor<'_>, op: &FusedOp) -> Result<FusedOutcome, ExecutionError> {
    let [f] = op.functions[..] else {
        return Ok(FusedOutcome::Declined);
    };
    let (data, width) = match executor.machine().peek_n(2) {
        Ok([array, size]) if array.rank() == 1 => match window_size(size) {
            Ok(width) => (array.data().to_vec(), width),
            Err(_) => return Ok(FusedOutcome::Declined),
        },
        _ => return Ok(FusedOutcome::Declined),
    };

    let mut results = Vec::with_capacity(data.len().saturating_sub(width) + 1);
    for window in data.windows(width) {
        let outputs = match executor.apply_values(f, vec![Value::list(window)]) {
            Ok(outputs) => outputs,
            Err(_) => return Ok(FusedOutcome::Declined),
        };
        let Ok([value]) = <[Value; 1]>::try_from(outputs) else {
            return Ok(FusedOutcome::Declined);
        };
        results.push(value);
    }
    match Value::from_rows(results) {
        Ok(result) => finish(executor, 2, result),
        Err(_) => Ok(FusedOutcome::Declined),
    }
}

/// `reverse` then `reduce(F)` over a non-empty list: fold from the end.
fn reverse_reduce(executor: &mut Executor<'_>, op: &FusedOp) -> Result<FusedOutcome, ExecutionError> {
    let [f] = op.functions[..] else {
        return Ok(FusedOutcome::Declined);
    };
    let Some(mut data) = top_list(executor) else {
        return Ok(FusedOutcome::Declined);
    };
    data.reverse();
    let result = executor.fold_lane(f, &data, "reduce")?;
    finish(executor, 1, Value::scalar(result))
}

/// `each(F)` then `each(G)` over a list, one pass.
fn each_chain(executor: &mut Executor<'_>, op: &FusedOp) -> Result<FusedOutcome, ExecutionError> {
    let [f, g] = op.functions[..] else {
        return Ok(FusedOutcome::Declined);
    };
    let Some(data) = top_list(executor) else {
        return Ok(FusedOutcome::Declined);
    };

    let mut results = Vec::with_capacity(data.len());
    for x in data {
        let Some(y) = map_scalar(executor, f, x).and_then(|y| map_scalar(executor, g, y)) else {
            return Ok(FusedOutcome::Declined);
        };
        results.push(y);
    }
    finish(executor, 1, Value::list(results))
}

/// One or more `each` maps then `reduce(H)` over a non-empty list, without
/// building the mapped list first.
fn map_reduce(executor: &mut Executor<'_>, op: &FusedOp) -> Result<FusedOutcome, ExecutionError> {
    let Some((&h, maps)) = op.functions.split_last() else {
        return Ok(FusedOutcome::Declined);
    };
    if maps.is_empty() {
        return Ok(FusedOutcome::Declined);
    }
    let Some(data) = top_list(executor) else {
        return Ok(FusedOutcome::Declined);
    };

    let mut acc: Option<f64> = None;
    for x in data {
        let mut value = x;
        for &map in maps {
            let Some(mapped) = map_scalar(executor, map, value) else {
                return Ok(FusedOutcome::Declined);
            };
            value = mapped;
        }
        acc = match acc {
            None => Some(value),
            Some(acc) => match executor.fold_lane(h, &[acc, value], "reduce") {
                Ok(folded) => Some(folded),
                Err(_) => return Ok(FusedOutcome::Declined),
            },
        };
    }
    match acc {
        Some(result) => finish(executor, 1, Value::scalar(result)),
        None => Ok(FusedOutcome::Declined),
    }
}
