//! Fusion pattern matching.
//!
//! The matcher scans a lowered body once, left to right. At each position
//! every rule whose pattern matches there is a candidate; the longest
//! pattern wins and ties go to the rule registered first. A matched window
//! is replaced by one [`Instruction::Fused`] and scanning resumes after it.
//! Patterns never match fused instructions, so fusing a fused body is a
//! no-op.

mod rules;


pub use rules::{
    BoundConstraint, BoundFunction, FusionBuilder, FusionMatch, FusionRule, FusionRuleTable,
    ShapePattern,
};

use tracing::{debug, trace};

use tacit_foundation::{FunctionId, FusedOp, Instruction, PrimitiveTable};

use crate::effect::EffectAnalyzer;
use crate::error::CompileError;

/// A fusion applied to a body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedFusion {
    pub rule: String,
    /// Position of the window in the unfused body.
    pub position: usize,
    pub length: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FusionOutcome {
    pub instructions: Vec<Instruction>,
    pub applied: Vec<AppliedFusion>,
}

/// Rewrites a body by applying fusion rules, leftmost match first.
pub struct FusionMatcher<'a> {
    rules: &'a FusionRuleTable,
    primitives: &'a PrimitiveTable,
    analyzer: &'a EffectAnalyzer<'a>,
    verify: bool,
}

impl<'a> FusionMatcher<'a> {
    pub fn new(
        rules: &'a FusionRuleTable,
        primitives: &'a PrimitiveTable,
        analyzer: &'a EffectAnalyzer<'a>,
    ) -> Self {
        Self {
            rules,
            primitives,
            analyzer,
            verify: false,
        }
    }

    /// Re-analyze each replacement against the window it replaces.
    pub fn with_verification(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    pub fn fuse(
        &self,
        function: FunctionId,
        body: Vec<Instruction>,
    ) -> Result<FusionOutcome, CompileError> {
        let mut instructions = Vec::with_capacity(body.len());
        let mut applied = Vec::new();
        let mut position = 0;

        while position < body.len() {
            match self.best_at(function, &body, position)? {
                Some((rule, op, length)) => {
                    debug!(function = %function, rule, position, length, "fused");
                    applied.push(AppliedFusion {
                        rule: rule.to_string(),
                        position,
                        length,
                    });
                    instructions.push(Instruction::Fused(op));
                    position += length;
                }
                None => {
                    instructions.push(body[position].clone());
                    position += 1;
                }
            }
        }

        if !applied.is_empty() {
            trace!(function = %function, fusions = applied.len(), "fusion pass");
        }
        Ok(FusionOutcome {
            instructions,
            applied,
        })
    }

    /// The winning replacement at `position`, if any.
    fn best_at(
        &self,
        function: FunctionId,
        body: &[Instruction],
        position: usize,
    ) -> Result<Option<(&'a str, FusedOp, usize)>, CompileError> {
        let rest = &body[position..];
        let mut candidates: Vec<(usize, &'a FusionRule, FusionMatch<'_>)> = self
            .rules
            .rules()
            .iter()
            .enumerate()
            .filter(|(_, rule)| !rule.is_empty() && rule.len() <= rest.len())
            .filter_map(|(order, rule)| {
                self.match_rule(rule, &rest[..rule.len()], position)
                    .map(|matched| (order, rule, matched))
            })
            .collect();
        // Longest first; the sort is stable so registration order breaks ties.
        candidates.sort_by(|a, b| b.1.len().cmp(&a.1.len()).then(a.0.cmp(&b.0)));

        for (_, rule, matched) in candidates {
            let Some(mut op) = rule.build(&matched) else {
                continue;
            };
            op.expansion = matched.window.to_vec();
            if self.verify {
                self.check_consistency(function, rule, &matched, &op)?;
            }
            return Ok(Some((rule.name(), op, rule.len())));
        }
        Ok(None)
    }

    fn match_rule<'w>(
        &self,
        rule: &FusionRule,
        window: &'w [Instruction],
        position: usize,
    ) -> Option<FusionMatch<'w>> {
        let mut bound = Vec::new();
        let mut primitives_pure = true;

        for (shape, instruction) in rule.pattern().iter().zip(window) {
            match (shape, instruction) {
                (ShapePattern::Primitive(name), Instruction::CallPrimitive { primitive, .. }) => {
                    let spec = self.primitives.get(*primitive)?;
                    if spec.name != *name {
                        return None;
                    }
                    primitives_pure &= spec.pure;
                }
                (
                    ShapePattern::Modifier {
                        kind,
                        bound: constraints,
                    },
                    Instruction::Modifier {
                        kind: actual,
                        functions,
                    },
                ) => {
                    if kind != actual || constraints.len() != functions.len() {
                        return None;
                    }
                    for (constraint, function) in constraints.iter().zip(functions) {
                        let effect = self.analyzer.reference_effect(*function).ok()?;
                        if !constraint.admits(effect) {
                            return None;
                        }
                        bound.push(BoundFunction {
                            function: *function,
                            effect,
                        });
                    }
                }
                _ => return None,
            }
        }

        Some(FusionMatch {
            position,
            window,
            bound,
            primitives_pure,
        })
    }

    fn check_consistency(
        &self,
        function: FunctionId,
        rule: &FusionRule,
        matched: &FusionMatch<'_>,
        op: &FusedOp,
    ) -> Result<(), CompileError> {
        let inconsistent = |message: String| CompileError::FusionConsistency {
            function,
            rule: rule.name().to_string(),
            position: matched.position,
            message,
        };

        let window = self
            .analyzer
            .analyze(matched.window)
            .map_err(|error| inconsistent(format!("window does not analyze: {error}")))?;
        if window.signature != op.signature {
            return Err(inconsistent(format!(
                "window has effect {}, replacement claims {}",
                window.signature, op.signature
            )));
        }
        if window.pure != op.pure {
            return Err(inconsistent(format!(
                "window purity is {}, replacement claims {}",
                window.pure, op.pure
            )));
        }
        if op.functions != matched.functions() {
            return Err(inconsistent(
                "replacement binds different functions than the window".to_string(),
            ));
        }
        Ok(())
    }
}
