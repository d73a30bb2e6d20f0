//! Primitive metadata table.
//!
//! Primitives are the opaque, fixed-arity built-ins of the runtime. The
//! compiler only needs their signature and whether they are pure; execution
//! kernels are attached by the VM.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::ids::PrimitiveId;
use crate::signature::Signature;

/// Arity and purity of one primitive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimitiveSpec {
    pub name: String,
    pub signature: Signature,
    /// No observable effect beyond consuming and producing stack values.
    pub pure: bool,
}

impl PrimitiveSpec {
    pub fn pure(name: &str, inputs: usize, outputs: usize) -> Self {
        Self {
            name: name.to_string(),
            signature: Signature::new(inputs, outputs),
            pure: true,
        }
    }

    pub fn impure(name: &str, inputs: usize, outputs: usize) -> Self {
        Self {
            pure: false,
            ..Self::pure(name, inputs, outputs)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PrimitiveTableError {
    #[error("primitive `{0}` is already registered")]
    Duplicate(String),
}

/// Id → metadata mapping populated once by the runtime.
#[derive(Debug, Clone, Default)]
pub struct PrimitiveTable {
    specs: Vec<PrimitiveSpec>,
    by_name: IndexMap<String, PrimitiveId>,
}

impl PrimitiveTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a primitive, assigning the next id.
    pub fn register(&mut self, spec: PrimitiveSpec) -> Result<PrimitiveId, PrimitiveTableError> {
        if self.by_name.contains_key(&spec.name) {
            return Err(PrimitiveTableError::Duplicate(spec.name));
        }
        let id = PrimitiveId::new(self.specs.len());
        self.by_name.insert(spec.name.clone(), id);
        self.specs.push(spec);
        Ok(id)
    }

    pub fn get(&self, id: PrimitiveId) -> Option<&PrimitiveSpec> {
        self.specs.get(id.index())
    }

    pub fn lookup(&self, name: &str) -> Option<PrimitiveId> {
        self.by_name.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (PrimitiveId, &PrimitiveSpec)> {
        self.specs
            .iter()
            .enumerate()
            .map(|(idx, spec)| (PrimitiveId::new(idx), spec))
    }
}
