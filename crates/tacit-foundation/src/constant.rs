//! Literal constants and the per-function constant pool.

use serde::{Deserialize, Serialize};

/// A literal pushed by [`Instruction::PushConstant`](crate::Instruction::PushConstant).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constant {
    /// A scalar number.
    Number(f64),
    /// A rank-1 array of numbers.
    List(Vec<f64>),
}

/// Index into a function's [`ConstantPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConstIndex(pub u32);

impl ConstIndex {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Literal table owned by a single function body.
///
/// Indices are only meaningful within the owning body; splicing a body into
/// another function must remap them through [`ConstantPool::add`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConstantPool {
    constants: Vec<Constant>,
}

impl ConstantPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a constant, returning its index. Equal constants share one slot.
    pub fn add(&mut self, constant: Constant) -> ConstIndex {
        if let Some(idx) = self.constants.iter().position(|c| c == &constant) {
            return ConstIndex(idx as u32);
        }
        let idx = ConstIndex(self.constants.len() as u32);
        self.constants.push(constant);
        idx
    }

    pub fn get(&self, index: ConstIndex) -> Option<&Constant> {
        self.constants.get(index.index())
    }

    pub fn len(&self) -> usize {
        self.constants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Constant> {
        self.constants.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_deduplicates() {
        let mut pool = ConstantPool::new();
        let a = pool.add(Constant::Number(2.0));
        let b = pool.add(Constant::List(vec![1.0, 2.0]));
        let c = pool.add(Constant::Number(2.0));
        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(pool.len(), 2);
    }
}
