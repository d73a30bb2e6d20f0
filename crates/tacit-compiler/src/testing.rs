//! Fixtures shared by unit tests.

use tacit_foundation::{
    Constant, ConstantPool, FunctionId, FunctionRef, Instruction, ModifierKind, PrimitiveSpec,
    PrimitiveTable,
};

pub fn primitives() -> PrimitiveTable {
    let mut table = PrimitiveTable::new();
    for spec in [
        PrimitiveSpec::pure("add", 2, 1),
        PrimitiveSpec::pure("mul", 2, 1),
        PrimitiveSpec::pure("neg", 1, 1),
        PrimitiveSpec::pure("dup", 1, 2),
        PrimitiveSpec::pure("pop", 1, 0),
        PrimitiveSpec::pure("reverse", 1, 1),
        PrimitiveSpec::pure("windows", 2, 1),
        PrimitiveSpec::impure("print", 1, 0),
        PrimitiveSpec::impure("tick", 0, 1),
    ] {
        table.register(spec).unwrap();
    }
    table
}

pub fn call_prim(table: &PrimitiveTable, name: &str) -> Instruction {
    let primitive = table.lookup(name).unwrap();
    Instruction::CallPrimitive {
        primitive,
        signature: table.get(primitive).unwrap().signature,
    }
}

pub fn prim_ref(table: &PrimitiveTable, name: &str) -> FunctionRef {
    FunctionRef::Primitive(table.lookup(name).unwrap())
}

pub fn modifier(kind: ModifierKind, functions: Vec<FunctionRef>) -> Instruction {
    Instruction::Modifier { kind, functions }
}

pub fn call(id: FunctionId) -> Instruction {
    Instruction::CallFunction(id)
}

pub fn push(pool: &mut ConstantPool, value: f64) -> Instruction {
    Instruction::PushConstant(pool.add(Constant::Number(value)))
}
