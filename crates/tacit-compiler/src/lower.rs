//! Lowering word bodies to instructions with a per-function constant pool.

use tracing::trace;

use tacit_foundation::{ConstantPool, FunctionRef, Instruction, PrimitiveId, PrimitiveTable};

use crate::ast::{Operand, Word};
use crate::error::{ArityError, ArityErrorKind, CompileError};
use crate::table::FunctionEntry;

/// Instructions and constants produced by lowering.
#[derive(Debug, Clone, PartialEq)]
pub struct LoweredBody {
    pub instructions: Vec<Instruction>,
    pub constants: ConstantPool,
}

/// Lower the word body of `entry`.
///
/// Fails on references to unknown primitives, on inline operands that were
/// never hoisted, and on entries that are already compiled.
pub fn lower(entry: &FunctionEntry, primitives: &PrimitiveTable) -> Result<LoweredBody, CompileError> {
    let invalid = |message: &str| CompileError::InvalidBody {
        function: entry.id,
        message: message.to_string(),
    };
    if !entry.is_defined() {
        return Err(invalid("declared but never given a body"));
    }
    let words = entry.words().ok_or_else(|| invalid("already compiled"))?;

    let mut constants = ConstantPool::new();
    let mut instructions = Vec::with_capacity(words.len());
    for (position, word) in words.iter().enumerate() {
        let unknown = |primitive: PrimitiveId| {
            CompileError::arity(
                entry.id,
                entry.name(),
                ArityError::new(position, ArityErrorKind::UnknownPrimitive(primitive)),
            )
        };

        let instruction = match word {
            Word::Constant(constant) => Instruction::PushConstant(constants.add(constant.clone())),
            Word::Primitive(primitive) => {
                let spec = primitives.get(*primitive).ok_or_else(|| unknown(*primitive))?;
                Instruction::CallPrimitive {
                    primitive: *primitive,
                    signature: spec.signature,
                }
            }
            Word::Call(id) => Instruction::CallFunction(*id),
            Word::Modified { modifier, operands } => {
                let functions = operands
                    .iter()
                    .map(|operand| match operand {
                        Operand::Primitive(primitive) => {
                            primitives
                                .get(*primitive)
                                .ok_or_else(|| unknown(*primitive))?;
                            Ok(FunctionRef::Primitive(*primitive))
                        }
                        Operand::Function(id) => Ok(FunctionRef::Function(*id)),
                        Operand::Inline(_) => Err(invalid("inline operand was not hoisted")),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Instruction::Modifier {
                    kind: *modifier,
                    functions,
                }
            }
        };
        instructions.push(instruction);
    }

    trace!(
        function = %entry.id,
        instructions = instructions.len(),
        constants = constants.len(),
        "lowered"
    );
    Ok(LoweredBody {
        instructions,
        constants,
    })
}
