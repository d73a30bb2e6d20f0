//! Signature inference for functions defined without one.
//!
//! A missing signature is the effect of the lowered body. Callees without
//! a declared signature are inferred on demand and memoized; a function
//! reached again while its own inference is still running has no
//! resolvable signature, so recursion through undeclared functions fails.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use tacit_foundation::{FunctionId, PrimitiveTable, Signature};

use crate::effect::{EffectAnalyzer, FunctionEffects};
use crate::error::{ArityError, ArityErrorKind, CompileError};
use crate::lower::lower;
use crate::table::FunctionTable;

pub struct SignatureInference<'a> {
    table: &'a FunctionTable,
    primitives: &'a PrimitiveTable,
    memo: RefCell<HashMap<FunctionId, Result<Signature, CompileError>>>,
    in_progress: RefCell<HashSet<FunctionId>>,
}

impl<'a> SignatureInference<'a> {
    pub fn new(table: &'a FunctionTable, primitives: &'a PrimitiveTable) -> Self {
        Self {
            table,
            primitives,
            memo: RefCell::new(HashMap::new()),
            in_progress: RefCell::new(HashSet::new()),
        }
    }

    /// Declared signature, or the inferred effect of the body.
    pub fn infer(&self, id: FunctionId) -> Result<Signature, CompileError> {
        let entry = self.table.get(id).ok_or(CompileError::InvalidBody {
            function: id,
            message: "not in the function table".to_string(),
        })?;
        if let Some(signature) = entry.declared.or(entry.signature) {
            return Ok(signature);
        }
        if let Some(result) = self.memo.borrow().get(&id) {
            return result.clone();
        }
        if !self.in_progress.borrow_mut().insert(id) {
            return Err(CompileError::arity(
                id,
                entry.name(),
                ArityError::new(0, ArityErrorKind::Unresolvable(id)),
            ));
        }

        let result = lower(entry, self.primitives).and_then(|lowered| {
            EffectAnalyzer::new(self.primitives, self)
                .analyze(&lowered.instructions)
                .map(|effect| effect.signature)
                .map_err(|error| CompileError::arity(id, entry.name(), error))
        });

        self.in_progress.borrow_mut().remove(&id);
        self.memo.borrow_mut().insert(id, result.clone());
        result
    }
}

impl FunctionEffects for SignatureInference<'_> {
    fn function_signature(&self, id: FunctionId) -> Result<Signature, ArityErrorKind> {
        if self.table.get(id).is_none() {
            return Err(ArityErrorKind::UnknownFunction(id));
        }
        self.infer(id)
            .map_err(|_| ArityErrorKind::Unresolvable(id))
    }

    // Purity is settled over the call graph; signatures do not depend on it.
    fn function_pure(&self, _id: FunctionId) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{FunctionDef, Word};
    use crate::testing::primitives;

    #[test]
    fn test_infers_through_undeclared_callees() {
        let prims = primitives();
        let add = prims.lookup("add").unwrap();
        let mut table = FunctionTable::new();
        let sum3 = table
            .define(FunctionDef::named("sum3", vec![Word::Primitive(add), Word::Primitive(add)]))
            .unwrap();
        let user = table
            .define(FunctionDef::named("user", vec![Word::number(1.0), Word::Call(sum3)]))
            .unwrap();

        let inference = SignatureInference::new(&table, &prims);
        assert_eq!(inference.infer(sum3).unwrap(), Signature::new(3, 1));
        assert_eq!(inference.infer(user).unwrap(), Signature::new(2, 1));
    }

    #[test]
    fn test_declared_signature_is_trusted() {
        let prims = primitives();
        let mut table = FunctionTable::new();
        let f = table
            .define(FunctionDef::named("f", vec![]).with_signature(2, 2))
            .unwrap();
        let inference = SignatureInference::new(&table, &prims);
        assert_eq!(inference.infer(f).unwrap(), Signature::new(2, 2));
    }

    #[test]
    fn test_undeclared_recursion_is_unresolvable() {
        let prims = primitives();
        let mut table = FunctionTable::new();
        let f = table.reserve(Some("f")).unwrap();
        table
            .set_body(f, FunctionDef::anonymous(vec![Word::number(1.0), Word::Call(f)]))
            .unwrap();

        let inference = SignatureInference::new(&table, &prims);
        match inference.infer(f) {
            Err(CompileError::Arity { error, .. }) => {
                assert_eq!(error.position, 1);
                assert_eq!(error.kind, ArityErrorKind::Unresolvable(f));
            }
            other => panic!("expected unresolvable, got {other:?}"),
        }
    }

    #[test]
    fn test_declared_recursion_resolves() {
        let prims = primitives();
        let mut table = FunctionTable::new();
        let f = table.reserve(Some("f")).unwrap();
        table
            .set_body(
                f,
                FunctionDef::anonymous(vec![Word::Call(f)]).with_signature(1, 1),
            )
            .unwrap();
        let g = table
            .define(FunctionDef::named("g", vec![Word::number(3.0), Word::Call(f)]))
            .unwrap();

        let inference = SignatureInference::new(&table, &prims);
        assert_eq!(inference.infer(g).unwrap(), Signature::new(0, 1));
    }
}
