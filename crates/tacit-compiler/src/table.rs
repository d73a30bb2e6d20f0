//! The function table: every function of a program with its compile state.
//!
//! Functions are addressed by dense [`FunctionId`]s handed out at
//! definition time. A function starts [`Unlowered`](CompileState::Unlowered)
//! holding its word body and ends [`Compiled`](CompileState::Compiled)
//! holding the assembled instruction stream, which replaces the words.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::trace;

use tacit_foundation::{
    CompiledFunction, ConstantPool, FunctionId, Instruction, Program, Signature,
};

use crate::ast::{FunctionDef, Operand, Word};
use crate::error::{SealError, TableError};

/// Where a function is in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompileState {
    Unlowered,
    Fused,
    Planned,
    Compiled,
    Failed,
}

impl CompileState {
    /// Whether moving from `self` to `next` is a forward step.
    ///
    /// Stages advance one at a time; any unfinished stage may fail.
    pub fn can_advance_to(self, next: CompileState) -> bool {
        use CompileState::*;
        matches!(
            (self, next),
            (Unlowered, Fused)
                | (Fused, Planned)
                | (Planned, Compiled)
                | (Unlowered | Fused | Planned, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, CompileState::Compiled | CompileState::Failed)
    }
}

/// An assembled function body.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledBody {
    pub instructions: Vec<Instruction>,
    pub constants: ConstantPool,
    /// Callees spliced into this body, in splice order.
    pub inlined: Vec<FunctionId>,
}

impl CompiledBody {
    pub fn size(&self) -> usize {
        self.instructions.iter().map(Instruction::size).sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Unlowered(Vec<Word>),
    Compiled(CompiledBody),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionEntry {
    pub id: FunctionId,
    pub name: Option<String>,
    /// Signature given at definition time.
    pub declared: Option<Signature>,
    /// Declared or inferred signature; `None` until inference runs.
    pub signature: Option<Signature>,
    pub body: Body,
    /// No primitive or callee on any path has a side effect.
    pub pure: bool,
    /// Lies on a cycle of the call graph.
    pub recursive: bool,
    /// Pipeline stage last completed.
    pub state: CompileState,
    defined: bool,
    size_override: Option<usize>,
}

impl FunctionEntry {
    fn reserved(id: FunctionId, name: Option<String>) -> Self {
        Self {
            id,
            name,
            declared: None,
            signature: None,
            body: Body::Unlowered(Vec::new()),
            pure: false,
            recursive: false,
            state: CompileState::Unlowered,
            defined: false,
            size_override: None,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Whether a body has been supplied (see [`FunctionTable::reserve`]).
    pub fn is_defined(&self) -> bool {
        self.defined
    }

    pub fn words(&self) -> Option<&[Word]> {
        match &self.body {
            Body::Unlowered(words) => Some(words),
            Body::Compiled(_) => None,
        }
    }

    pub fn compiled(&self) -> Option<&CompiledBody> {
        match &self.body {
            Body::Compiled(body) => Some(body),
            Body::Unlowered(_) => None,
        }
    }

    /// Size the planner weighs against its budget.
    ///
    /// A declared hint wins; otherwise the compiled instruction count, or
    /// the word count before compilation.
    pub fn size_hint(&self) -> usize {
        if let Some(size) = self.size_override {
            return size;
        }
        match &self.body {
            Body::Unlowered(words) => words.iter().map(Word::weight).sum(),
            Body::Compiled(body) => body.size(),
        }
    }
}

/// All functions of a program.
#[derive(Debug, Clone, Default)]
pub struct FunctionTable {
    entries: Vec<FunctionEntry>,
    names: IndexMap<String, FunctionId>,
}

impl FunctionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a function. Inline operands in the body are hoisted into
    /// anonymous functions of their own.
    pub fn define(&mut self, def: FunctionDef) -> Result<FunctionId, TableError> {
        let id = self.reserve(def.name.as_deref())?;
        self.set_body(id, def)?;
        Ok(id)
    }

    /// Allocate an id for a function whose body comes later, so mutually
    /// recursive functions can refer to each other.
    pub fn reserve(&mut self, name: Option<&str>) -> Result<FunctionId, TableError> {
        let id = FunctionId::new(self.entries.len());
        if let Some(name) = name {
            if self.names.contains_key(name) {
                return Err(TableError::DuplicateName(name.to_string()));
            }
            self.names.insert(name.to_string(), id);
        }
        self.entries
            .push(FunctionEntry::reserved(id, name.map(str::to_string)));
        Ok(id)
    }

    /// Supply the body of a reserved function. The name in `def` is ignored.
    pub fn set_body(&mut self, id: FunctionId, def: FunctionDef) -> Result<(), TableError> {
        let entry = self
            .entries
            .get(id.index())
            .ok_or(TableError::UnknownFunction(id))?;
        if entry.defined {
            return Err(TableError::AlreadyDefined(id));
        }

        let body = self.hoist(def.body)?;
        let entry = &mut self.entries[id.index()];
        entry.declared = def.signature;
        entry.signature = def.signature;
        entry.size_override = def.size_hint;
        entry.body = Body::Unlowered(body);
        entry.defined = true;
        trace!(function = %id, name = ?entry.name, "defined");
        Ok(())
    }

    fn hoist(&mut self, words: Vec<Word>) -> Result<Vec<Word>, TableError> {
        words
            .into_iter()
            .map(|word| match word {
                Word::Modified { modifier, operands } => {
                    let operands = operands
                        .into_iter()
                        .map(|operand| match operand {
                            Operand::Inline(body) => self
                                .define(FunctionDef::anonymous(body))
                                .map(Operand::Function),
                            other => Ok(other),
                        })
                        .collect::<Result<Vec<_>, _>>()?;
                    Ok(Word::Modified { modifier, operands })
                }
                other => Ok(other),
            })
            .collect()
    }

    pub fn get(&self, id: FunctionId) -> Option<&FunctionEntry> {
        self.entries.get(id.index())
    }

    pub(crate) fn get_mut(&mut self, id: FunctionId) -> Option<&mut FunctionEntry> {
        self.entries.get_mut(id.index())
    }

    pub fn lookup(&self, name: &str) -> Option<FunctionId> {
        self.names.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FunctionEntry> {
        self.entries.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = FunctionId> + '_ {
        (0..self.entries.len()).map(FunctionId::new)
    }

    pub fn state(&self, id: FunctionId) -> Option<CompileState> {
        self.get(id).map(|entry| entry.state)
    }

    /// Record the assembled body. The word body is dropped.
    pub(crate) fn install(&mut self, id: FunctionId, body: CompiledBody) {
        if let Some(entry) = self.get_mut(id) {
            entry.body = Body::Compiled(body);
            entry.state = CompileState::Compiled;
        }
    }

    pub(crate) fn mark_failed(&mut self, id: FunctionId) {
        if let Some(entry) = self.get_mut(id)
            && !entry.state.is_terminal()
        {
            entry.state = CompileState::Failed;
        }
    }

    /// Freeze the table into an executable program.
    ///
    /// Fails if any function did not reach [`CompileState::Compiled`].
    pub fn seal(self) -> Result<Program, SealError> {
        let unfinished: Vec<FunctionId> = self
            .entries
            .iter()
            .filter(|entry| entry.state != CompileState::Compiled)
            .map(|entry| entry.id)
            .collect();
        if !unfinished.is_empty() {
            return Err(SealError {
                functions: unfinished,
            });
        }

        let functions = self
            .entries
            .into_iter()
            .filter_map(|entry| {
                let signature = entry.signature?;
                let Body::Compiled(body) = entry.body else {
                    return None;
                };
                Some(CompiledFunction {
                    id: entry.id,
                    name: entry.name,
                    signature,
                    pure: entry.pure,
                    recursive: entry.recursive,
                    instructions: body.instructions,
                    constants: body.constants,
                    inlined: body.inlined,
                })
            })
            .collect();
        Ok(Program::from_functions(functions))
    }
}
