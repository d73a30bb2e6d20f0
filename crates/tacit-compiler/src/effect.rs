//! Stack-effect analysis.
//!
//! The analyzer walks an instruction sequence tracking stack depth relative
//! to the entry depth. The lowest depth reached gives the number of inputs
//! consumed; the final depth above that gives the outputs. Purity is the
//! conjunction over every primitive and function the sequence calls.

use tacit_foundation::{FunctionId, FunctionRef, Instruction, PrimitiveTable, Signature};

use crate::error::{ArityError, ArityErrorKind};
use crate::table::FunctionTable;

/// Net stack effect and purity of an instruction sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackEffect {
    pub signature: Signature,
    pub pure: bool,
}

impl StackEffect {
    pub const fn new(signature: Signature, pure: bool) -> Self {
        Self { signature, pure }
    }
}

/// Source of signatures and purity for user functions.
pub trait FunctionEffects {
    fn function_signature(&self, id: FunctionId) -> Result<Signature, ArityErrorKind>;
    fn function_pure(&self, id: FunctionId) -> bool;
}

impl FunctionEffects for FunctionTable {
    fn function_signature(&self, id: FunctionId) -> Result<Signature, ArityErrorKind> {
        let entry = self.get(id).ok_or(ArityErrorKind::UnknownFunction(id))?;
        entry.signature.ok_or(ArityErrorKind::Unresolvable(id))
    }

    fn function_pure(&self, id: FunctionId) -> bool {
        self.get(id).is_some_and(|entry| entry.pure)
    }
}

/// Computes the stack effect and purity of instruction sequences.
pub struct EffectAnalyzer<'a> {
    primitives: &'a PrimitiveTable,
    functions: &'a dyn FunctionEffects,
}

impl<'a> EffectAnalyzer<'a> {
    pub fn new(primitives: &'a PrimitiveTable, functions: &'a dyn FunctionEffects) -> Self {
        Self {
            primitives,
            functions,
        }
    }

    /// Effect of a bound function reference.
    pub fn reference_effect(&self, reference: FunctionRef) -> Result<StackEffect, ArityErrorKind> {
        match reference {
            FunctionRef::Primitive(id) => {
                let spec = self
                    .primitives
                    .get(id)
                    .ok_or(ArityErrorKind::UnknownPrimitive(id))?;
                Ok(StackEffect::new(spec.signature, spec.pure))
            }
            FunctionRef::Function(id) => Ok(StackEffect::new(
                self.functions.function_signature(id)?,
                self.functions.function_pure(id),
            )),
        }
    }

    /// Effect of a single instruction.
    pub fn instruction_effect(
        &self,
        instruction: &Instruction,
    ) -> Result<StackEffect, ArityErrorKind> {
        match instruction {
            Instruction::PushConstant(_) => Ok(StackEffect::new(Signature::new(0, 1), true)),
            Instruction::CallPrimitive {
                primitive,
                signature,
            } => {
                let spec = self
                    .primitives
                    .get(*primitive)
                    .ok_or(ArityErrorKind::UnknownPrimitive(*primitive))?;
                if spec.signature != *signature {
                    return Err(ArityErrorKind::PrimitiveSignature {
                        primitive: *primitive,
                        recorded: *signature,
                        declared: spec.signature,
                    });
                }
                Ok(StackEffect::new(spec.signature, spec.pure))
            }
            Instruction::CallFunction(id) => self.reference_effect(FunctionRef::Function(*id)),
            Instruction::Modifier { kind, functions } => {
                let mut signatures = Vec::with_capacity(functions.len());
                let mut pure = true;
                for function in functions {
                    let effect = self.reference_effect(*function)?;
                    signatures.push(effect.signature);
                    pure &= effect.pure;
                }
                Ok(StackEffect::new(kind.effect(&signatures)?, pure))
            }
            Instruction::Fused(op) => {
                for function in &op.functions {
                    self.reference_effect(*function)?;
                }
                Ok(StackEffect::new(op.signature, op.pure))
            }
            Instruction::Inlined { body, .. } => self
                .analyze(body)
                .map_err(|error| error.kind),
        }
    }

    /// Net effect of `body`.
    pub fn analyze(&self, body: &[Instruction]) -> Result<StackEffect, ArityError> {
        self.simulate(body, None)
    }

    /// Check `body` against a declared signature.
    ///
    /// Fails with `Underflow` at the first instruction that would reach below
    /// the declared inputs, or with `OutputMismatch` (positioned after the last
    /// instruction) when the net effect does not fit.
    pub fn verify(&self, body: &[Instruction], declared: Signature) -> Result<StackEffect, ArityError> {
        let effect = self.simulate(body, Some(declared.inputs))?;
        if !effect.signature.fits(declared) {
            return Err(ArityError::new(
                body.len(),
                ArityErrorKind::OutputMismatch {
                    expected: declared,
                    found: effect.signature,
                },
            ));
        }
        Ok(effect)
    }

    fn simulate(&self, body: &[Instruction], available: Option<usize>) -> Result<StackEffect, ArityError> {
        let mut depth: isize = 0;
        let mut lowest: isize = 0;
        let mut pure = true;

        for (position, instruction) in body.iter().enumerate() {
            let effect = self
                .instruction_effect(instruction)
                .map_err(|kind| ArityError::new(position, kind))?;
            let signature = effect.signature;

            let after_pop = depth - signature.inputs as isize;
            if let Some(available) = available
                && after_pop < -(available as isize)
            {
                return Err(ArityError::new(
                    position,
                    ArityErrorKind::Underflow {
                        required: signature.inputs,
                        available: (depth + available as isize).max(0) as usize,
                    },
                ));
            }
            lowest = lowest.min(after_pop);
            depth = after_pop + signature.outputs as isize;
            pure &= effect.pure;
        }

        let inputs = (-lowest) as usize;
        let outputs = (depth - lowest) as usize;
        Ok(StackEffect::new(Signature::new(inputs, outputs), pure))
    }
}
