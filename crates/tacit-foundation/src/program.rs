//! Sealed programs.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::bytecode::Instruction;
use crate::constant::ConstantPool;
use crate::ids::FunctionId;
use crate::signature::Signature;

/// Final, flat form of one function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledFunction {
    pub id: FunctionId,
    pub name: Option<String>,
    pub signature: Signature,
    pub pure: bool,
    pub recursive: bool,
    pub instructions: Vec<Instruction>,
    pub constants: ConstantPool,
    /// Callees whose bodies were spliced into this one, in splice order.
    pub inlined: Vec<FunctionId>,
}

/// An immutable program indexed by function id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Program {
    functions: Vec<CompiledFunction>,
    names: IndexMap<String, FunctionId>,
}

impl Program {
    /// Build a program from functions ordered by id.
    pub fn from_functions(functions: Vec<CompiledFunction>) -> Self {
        let names = functions
            .iter()
            .filter_map(|f| f.name.clone().map(|name| (name, f.id)))
            .collect();
        Self { functions, names }
    }

    pub fn function(&self, id: FunctionId) -> Option<&CompiledFunction> {
        self.functions.get(id.index())
    }

    pub fn lookup(&self, name: &str) -> Option<FunctionId> {
        self.names.get(name).copied()
    }

    pub fn functions(&self) -> &[CompiledFunction] {
        &self.functions
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}
