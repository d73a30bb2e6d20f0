//! Fusion rules and the rule table.

use std::fmt;
use std::sync::Arc;

use tacit_foundation::{
    FunctionRef, FusedOp, FusionId, Instruction, ModifierKind, Signature, fusions,
};

use crate::effect::StackEffect;
use crate::error::RuleError;

/// Requirement on one function bound to a modifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BoundConstraint {
    /// Exact signature the bound function must have.
    pub signature: Option<Signature>,
    pub require_pure: bool,
}

impl BoundConstraint {
    pub const fn any() -> Self {
        Self {
            signature: None,
            require_pure: false,
        }
    }

    pub const fn dyadic() -> Self {
        Self {
            signature: Some(Signature::new(2, 1)),
            require_pure: false,
        }
    }

    pub const fn pure(inputs: usize, outputs: usize) -> Self {
        Self {
            signature: Some(Signature::new(inputs, outputs)),
            require_pure: true,
        }
    }

    pub fn admits(&self, effect: StackEffect) -> bool {
        self.signature.is_none_or(|signature| signature == effect.signature)
            && (!self.require_pure || effect.pure)
    }
}

/// One element of a fusion pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShapePattern {
    /// A call to the primitive with this name.
    Primitive(String),
    /// A modifier of this kind whose bound functions satisfy the constraints.
    Modifier {
        kind: ModifierKind,
        bound: Vec<BoundConstraint>,
    },
}

impl ShapePattern {
    pub fn primitive(name: &str) -> Self {
        ShapePattern::Primitive(name.to_string())
    }

    pub fn modifier(kind: ModifierKind, bound: impl Into<Vec<BoundConstraint>>) -> Self {
        ShapePattern::Modifier {
            kind,
            bound: bound.into(),
        }
    }
}

/// A bound function captured by a match, with its analyzed effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundFunction {
    pub function: FunctionRef,
    pub effect: StackEffect,
}

/// A pattern matched at some position of a body.
#[derive(Debug, Clone)]
pub struct FusionMatch<'a> {
    pub position: usize,
    pub window: &'a [Instruction],
    /// Bound functions in pattern order.
    pub bound: Vec<BoundFunction>,
    /// Whether every primitive matched by name is pure.
    pub primitives_pure: bool,
}

impl FusionMatch<'_> {
    pub fn functions(&self) -> Vec<FunctionRef> {
        self.bound.iter().map(|bound| bound.function).collect()
    }

    pub fn bound_pure(&self) -> bool {
        self.bound.iter().all(|bound| bound.effect.pure)
    }

    /// Whether the whole window is free of side effects.
    pub fn pure(&self) -> bool {
        self.primitives_pure && self.bound_pure()
    }

    /// Build a fused operation over this match. The window becomes the
    /// operation's expansion.
    pub fn fused(&self, id: &str, signature: Signature, pure: bool) -> FusedOp {
        FusedOp {
            id: FusionId::new(id),
            functions: self.functions(),
            signature,
            pure,
            expansion: self.window.to_vec(),
        }
    }
}

/// Produces the replacement for a match, or declines it.
pub type FusionBuilder = Arc<dyn Fn(&FusionMatch<'_>) -> Option<FusedOp> + Send + Sync>;

#[derive(Clone)]
pub struct FusionRule {
    name: String,
    pattern: Vec<ShapePattern>,
    builder: FusionBuilder,
}

impl FusionRule {
    pub fn new(
        name: impl Into<String>,
        pattern: Vec<ShapePattern>,
        builder: impl Fn(&FusionMatch<'_>) -> Option<FusedOp> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            pattern,
            builder: Arc::new(builder),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pattern(&self) -> &[ShapePattern] {
        &self.pattern
    }

    pub fn len(&self) -> usize {
        self.pattern.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pattern.is_empty()
    }

    pub fn build(&self, matched: &FusionMatch<'_>) -> Option<FusedOp> {
        (self.builder)(matched)
    }
}

impl fmt::Debug for FusionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FusionRule")
            .field("name", &self.name)
            .field("pattern", &self.pattern)
            .finish_non_exhaustive()
    }
}

/// Ordered fusion rules. Earlier rules win ties between equally long matches.
#[derive(Debug, Clone, Default)]
pub struct FusionRuleTable {
    rules: Vec<FusionRule>,
}

impl FusionRuleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in rules.
    ///
    /// Patterns are written in execution order: `windows` runs before the
    /// reduce that consumes its result.
    pub fn standard() -> Self {
        use ShapePattern as P;

        let monadic = BoundConstraint::pure(1, 1);
        let dyadic_pure = BoundConstraint::pure(2, 1);

        let rules = vec![
            FusionRule::new(
                "map_reduce_chain",
                vec![
                    P::modifier(ModifierKind::Each, [monadic]),
                    P::modifier(ModifierKind::Each, [monadic]),
                    P::modifier(ModifierKind::Reduce, [dyadic_pure]),
                ],
                |m| Some(m.fused(fusions::MAP_REDUCE, Signature::new(1, 1), true)),
            ),
            FusionRule::new(
                "map_reduce",
                vec![
                    P::modifier(ModifierKind::Each, [monadic]),
                    P::modifier(ModifierKind::Reduce, [dyadic_pure]),
                ],
                |m| Some(m.fused(fusions::MAP_REDUCE, Signature::new(1, 1), true)),
            ),
            FusionRule::new(
                "each_chain",
                vec![
                    P::modifier(ModifierKind::Each, [monadic]),
                    P::modifier(ModifierKind::Each, [monadic]),
                ],
                |m| Some(m.fused(fusions::EACH_CHAIN, Signature::new(1, 1), true)),
            ),
            FusionRule::new(
                "windowed_reduce",
                vec![
                    P::primitive("windows"),
                    P::modifier(ModifierKind::Reduce, [BoundConstraint::dyadic()]),
                ],
                |m| Some(m.fused(fusions::WINDOWED_REDUCE, Signature::new(2, 1), m.pure())),
            ),
            FusionRule::new(
                "each_windows",
                vec![
                    P::primitive("windows"),
                    P::modifier(ModifierKind::Each, [monadic]),
                ],
                |m| Some(m.fused(fusions::EACH_WINDOWS, Signature::new(2, 1), m.pure())),
            ),
            FusionRule::new(
                "reverse_reduce",
                vec![
                    P::primitive("reverse"),
                    P::modifier(ModifierKind::Reduce, [BoundConstraint::dyadic()]),
                ],
                |m| Some(m.fused(fusions::REVERSE_REDUCE, Signature::new(1, 1), m.pure())),
            ),
        ];
        Self { rules }
    }

    /// Append a rule. It ranks after every rule already registered.
    pub fn register(&mut self, rule: FusionRule) -> Result<(), RuleError> {
        if rule.is_empty() {
            return Err(RuleError::EmptyPattern(rule.name));
        }
        if self.rules.iter().any(|existing| existing.name == rule.name) {
            return Err(RuleError::Duplicate(rule.name));
        }
        self.rules.push(rule);
        Ok(())
    }

    pub fn rules(&self) -> &[FusionRule] {
        &self.rules
    }

    pub fn get(&self, name: &str) -> Option<&FusionRule> {
        self.rules.iter().find(|rule| rule.name == name)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
