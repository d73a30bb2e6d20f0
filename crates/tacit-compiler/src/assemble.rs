//! Assembly: flatten spliced regions and validate the final body.

use tracing::trace;

use tacit_foundation::{ConstantPool, FunctionId, FunctionRef, Instruction, Signature};

use crate::effect::EffectAnalyzer;
use crate::error::{ArityError, ArityErrorKind, CompileError};
use crate::planner::PlannedBody;
use crate::table::{CompiledBody, FunctionTable};

/// Turns a planned body into the final compiled body, checking it on the way.
pub struct Assembler<'a> {
    table: &'a FunctionTable,
    analyzer: &'a EffectAnalyzer<'a>,
}

impl<'a> Assembler<'a> {
    pub fn new(table: &'a FunctionTable, analyzer: &'a EffectAnalyzer<'a>) -> Self {
        Self { table, analyzer }
    }

    /// Produce the final body for `function`.
    ///
    /// Every function reference must resolve in the table and every
    /// constant in the pool, and the flattened body must still fit
    /// `signature`.
    pub fn assemble(
        &self,
        function: FunctionId,
        name: Option<&str>,
        planned: PlannedBody,
        signature: Signature,
    ) -> Result<CompiledBody, CompileError> {
        let mut instructions = Vec::with_capacity(planned.instructions.len());
        flatten(planned.instructions, &mut instructions);

        for (position, instruction) in instructions.iter().enumerate() {
            self.check_references(function, name, position, instruction, &planned.constants)?;
        }
        self.analyzer
            .verify(&instructions, signature)
            .map_err(|error| CompileError::arity(function, name, error))?;

        trace!(function = %function, instructions = instructions.len(), "assembled");
        Ok(CompiledBody {
            instructions,
            constants: planned.constants,
            inlined: planned.inlined,
        })
    }

    fn check_references(
        &self,
        function: FunctionId,
        name: Option<&str>,
        position: usize,
        instruction: &Instruction,
        constants: &ConstantPool,
    ) -> Result<(), CompileError> {
        let resolve = |target: FunctionId| {
            if self.table.get(target).is_some() {
                Ok(())
            } else {
                Err(CompileError::UnresolvedFunction { function, target })
            }
        };
        let bound = |functions: &[FunctionRef]| {
            functions
                .iter()
                .filter_map(|reference| reference.function())
                .try_for_each(resolve)
        };

        match instruction {
            Instruction::PushConstant(index) if constants.get(*index).is_none() => {
                Err(CompileError::arity(
                    function,
                    name,
                    ArityError::new(position, ArityErrorKind::UnknownConstant(index.0)),
                ))
            }
            Instruction::CallFunction(target) => resolve(*target),
            Instruction::Modifier { functions, .. } => bound(functions),
            Instruction::Fused(op) => {
                bound(&op.functions)?;
                op.expansion.iter().try_for_each(|inner| {
                    self.check_references(function, name, position, inner, constants)
                })
            }
            _ => Ok(()),
        }
    }
}

fn flatten(body: Vec<Instruction>, out: &mut Vec<Instruction>) {
    for instruction in body {
        match instruction {
            Instruction::Inlined { body, .. } => flatten(body, out),
            other => out.push(other),
        }
    }
}
