//! Function bodies as they arrive from the front end.

use tacit_foundation::{Constant, FunctionId, ModifierKind, PrimitiveId, Signature};

/// One word of a function body, in execution order.
#[derive(Debug, Clone, PartialEq)]
pub enum Word {
    /// Push a literal.
    Constant(Constant),
    /// Call a built-in.
    Primitive(PrimitiveId),
    /// Call a user function.
    Call(FunctionId),
    /// Apply a modifier to its bound operands.
    Modified {
        modifier: ModifierKind,
        operands: Vec<Operand>,
    },
}

/// A function bound to a modifier.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Primitive(PrimitiveId),
    Function(FunctionId),
    /// An inline body. The function table hoists these into anonymous
    /// functions when the enclosing function is defined.
    Inline(Vec<Word>),
}

impl Word {
    pub fn number(value: f64) -> Self {
        Word::Constant(Constant::Number(value))
    }

    pub fn list(values: impl Into<Vec<f64>>) -> Self {
        Word::Constant(Constant::List(values.into()))
    }

    pub fn modified(modifier: ModifierKind, operands: impl Into<Vec<Operand>>) -> Self {
        Word::Modified {
            modifier,
            operands: operands.into(),
        }
    }

    /// Number of words, counting nested inline bodies.
    pub fn weight(&self) -> usize {
        match self {
            Word::Modified { operands, .. } => {
                1 + operands
                    .iter()
                    .map(|operand| match operand {
                        Operand::Inline(words) => words.iter().map(Word::weight).sum(),
                        _ => 0,
                    })
                    .sum::<usize>()
            }
            _ => 1,
        }
    }
}

/// Calls every function referenced by `words`, including modifier operands
/// and functions referenced from inside inline bodies.
pub fn visit_references(words: &[Word], visit: &mut impl FnMut(FunctionId)) {
    for word in words {
        match word {
            Word::Call(id) => visit(*id),
            Word::Modified { operands, .. } => {
                for operand in operands {
                    match operand {
                        Operand::Function(id) => visit(*id),
                        Operand::Inline(inner) => visit_references(inner, visit),
                        Operand::Primitive(_) => {}
                    }
                }
            }
            Word::Constant(_) | Word::Primitive(_) => {}
        }
    }
}

/// A function definition handed to [`FunctionTable::define`](crate::FunctionTable::define).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FunctionDef {
    pub name: Option<String>,
    /// Declared signature. Inferred from the body when absent.
    pub signature: Option<Signature>,
    /// Size the planner should assume instead of measuring the compiled body.
    pub size_hint: Option<usize>,
    pub body: Vec<Word>,
}

impl FunctionDef {
    pub fn named(name: impl Into<String>, body: impl Into<Vec<Word>>) -> Self {
        Self {
            name: Some(name.into()),
            body: body.into(),
            ..Self::default()
        }
    }

    pub fn anonymous(body: impl Into<Vec<Word>>) -> Self {
        Self {
            body: body.into(),
            ..Self::default()
        }
    }

    pub fn with_signature(mut self, inputs: usize, outputs: usize) -> Self {
        self.signature = Some(Signature::new(inputs, outputs));
        self
    }

    pub fn with_size_hint(mut self, size: usize) -> Self {
        self.size_hint = Some(size);
        self
    }
}
