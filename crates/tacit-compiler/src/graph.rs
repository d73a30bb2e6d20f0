//! Call graph over the function table.
//!
//! Edges run from caller to callee and cover both direct calls and
//! functions bound to modifiers. Strongly connected components (computed
//! with Tarjan's algorithm) form the compilation units: a function is
//! recursive exactly when its component has more than one member or it
//! calls itself. Units are then grouped into topological levels so every
//! level only depends on levels before it.

use tracing::debug;

use tacit_foundation::{FunctionId, PrimitiveTable};

use crate::ast::{Operand, Word, visit_references};
use crate::table::FunctionTable;

/// Index of a strongly connected component.
pub type UnitId = usize;

#[derive(Debug, Clone)]
pub struct CallGraph {
    /// Sorted, deduplicated callees per function.
    edges: Vec<Vec<FunctionId>>,
    /// Components in callee-first order.
    units: Vec<Vec<FunctionId>>,
    unit_of: Vec<UnitId>,
    self_calls: Vec<bool>,
}

impl CallGraph {
    /// Build the graph from the word bodies in `table`.
    ///
    /// Calls to ids outside the table are dropped here and reported when
    /// the caller is compiled.
    pub fn build(table: &FunctionTable) -> Self {
        let count = table.len();
        let mut edges = Vec::with_capacity(count);
        let mut self_calls = vec![false; count];

        for entry in table.iter() {
            let mut callees = Vec::new();
            match (entry.words(), entry.compiled()) {
                (Some(words), _) => visit_references(words, &mut |id| callees.push(id)),
                (None, Some(body)) => {
                    for instruction in &body.instructions {
                        collect_instruction_calls(instruction, &mut callees);
                    }
                }
                (None, None) => {}
            }
            callees.retain(|id| id.index() < count);
            callees.sort();
            callees.dedup();
            self_calls[entry.id.index()] = callees.contains(&entry.id);
            edges.push(callees);
        }

        let (units, unit_of) = Tarjan::run(&edges);
        debug!(functions = count, units = units.len(), "built call graph");
        Self {
            edges,
            units,
            unit_of,
            self_calls,
        }
    }

    pub fn callees(&self, id: FunctionId) -> &[FunctionId] {
        self.edges.get(id.index()).map_or(&[], Vec::as_slice)
    }

    /// Strongly connected components, each listed after every component it calls into.
    pub fn units(&self) -> &[Vec<FunctionId>] {
        &self.units
    }

    pub fn unit_of(&self, id: FunctionId) -> Option<UnitId> {
        self.unit_of.get(id.index()).copied()
    }

    pub fn is_recursive(&self, id: FunctionId) -> bool {
        let Some(unit) = self.unit_of(id) else {
            return false;
        };
        self.units[unit].len() > 1 || self.self_calls[id.index()]
    }

    /// Distinct units that `unit` calls into, excluding itself.
    fn unit_dependencies(&self, unit: UnitId) -> Vec<UnitId> {
        let mut deps: Vec<UnitId> = self.units[unit]
            .iter()
            .flat_map(|id| self.callees(*id))
            .map(|callee| self.unit_of[callee.index()])
            .filter(|dep| *dep != unit)
            .collect();
        deps.sort_unstable();
        deps.dedup();
        deps
    }

    /// Group units into levels with Kahn's algorithm.
    ///
    /// Units in one level never call each other, and every callee lives in
    /// an earlier level. Levels are sorted for determinism.
    pub fn levels(&self) -> Vec<Vec<UnitId>> {
        let count = self.units.len();
        let mut in_degree = vec![0usize; count];
        let mut dependents: Vec<Vec<UnitId>> = vec![Vec::new(); count];

        for unit in 0..count {
            for dep in self.unit_dependencies(unit) {
                in_degree[unit] += 1;
                dependents[dep].push(unit);
            }
        }

        let mut levels = Vec::new();
        let mut current: Vec<UnitId> = (0..count).filter(|u| in_degree[*u] == 0).collect();
        while !current.is_empty() {
            current.sort_unstable();
            let mut next = Vec::new();
            for unit in &current {
                for dependent in &dependents[*unit] {
                    in_degree[*dependent] -= 1;
                    if in_degree[*dependent] == 0 {
                        next.push(*dependent);
                    }
                }
            }
            levels.push(std::mem::replace(&mut current, next));
        }
        levels
    }

    /// Purity of every function.
    ///
    /// A function is pure when it calls no impure primitive and every
    /// function it reaches is pure. Members of one component share their
    /// purity; unknown primitives and undefined functions count as impure.
    pub fn purity(&self, table: &FunctionTable, primitives: &PrimitiveTable) -> Vec<bool> {
        let local: Vec<bool> = table
            .iter()
            .map(|entry| entry.is_defined() && locally_pure(entry.words(), primitives))
            .collect();

        let mut unit_pure = vec![true; self.units.len()];
        // Units are callee-first, so dependencies are settled before dependents.
        for (unit, members) in self.units.iter().enumerate() {
            let own = members.iter().all(|id| local[id.index()]);
            let deps = self
                .unit_dependencies(unit)
                .into_iter()
                .all(|dep| unit_pure[dep]);
            unit_pure[unit] = own && deps;
        }

        (0..table.len())
            .map(|index| unit_pure[self.unit_of[index]])
            .collect()
    }
}

fn collect_instruction_calls(
    instruction: &tacit_foundation::Instruction,
    out: &mut Vec<FunctionId>,
) {
    use tacit_foundation::Instruction;
    match instruction {
        Instruction::CallFunction(id) => out.push(*id),
        Instruction::Modifier { functions, .. } => {
            out.extend(functions.iter().filter_map(|f| f.function()))
        }
        Instruction::Fused(op) => {
            out.extend(op.functions.iter().filter_map(|f| f.function()));
            for inner in &op.expansion {
                collect_instruction_calls(inner, out);
            }
        }
        Instruction::Inlined { body, .. } => {
            for inner in body {
                collect_instruction_calls(inner, out);
            }
        }
        Instruction::PushConstant(_) | Instruction::CallPrimitive { .. } => {}
    }
}

fn locally_pure(words: Option<&[Word]>, primitives: &PrimitiveTable) -> bool {
    let Some(words) = words else {
        // Already compiled; purity was settled when it was.
        return true;
    };
    let pure = |id| primitives.get(id).is_some_and(|spec| spec.pure);
    words.iter().all(|word| match word {
        Word::Primitive(id) => pure(*id),
        Word::Modified { operands, .. } => operands.iter().all(|operand| match operand {
            Operand::Primitive(id) => pure(*id),
            Operand::Inline(inner) => locally_pure(Some(inner), primitives),
            Operand::Function(_) => true,
        }),
        Word::Constant(_) | Word::Call(_) => true,
    })
}

/// Tarjan's strongly connected components.
struct Tarjan<'a> {
    edges: &'a [Vec<FunctionId>],
    index: Vec<Option<usize>>,
    lowlink: Vec<usize>,
    on_stack: Vec<bool>,
    stack: Vec<usize>,
    next_index: usize,
    units: Vec<Vec<FunctionId>>,
    unit_of: Vec<UnitId>,
}

impl<'a> Tarjan<'a> {
    fn run(edges: &'a [Vec<FunctionId>]) -> (Vec<Vec<FunctionId>>, Vec<UnitId>) {
        let count = edges.len();
        let mut tarjan = Tarjan {
            edges,
            index: vec![None; count],
            lowlink: vec![0; count],
            on_stack: vec![false; count],
            stack: Vec::new(),
            next_index: 0,
            units: Vec::new(),
            unit_of: vec![0; count],
        };
        for node in 0..count {
            if tarjan.index[node].is_none() {
                tarjan.connect(node);
            }
        }
        (tarjan.units, tarjan.unit_of)
    }

    fn connect(&mut self, node: usize) {
        self.index[node] = Some(self.next_index);
        self.lowlink[node] = self.next_index;
        self.next_index += 1;
        self.stack.push(node);
        self.on_stack[node] = true;

        let edges = self.edges;
        for callee in &edges[node] {
            let callee = callee.index();
            match self.index[callee] {
                None => {
                    self.connect(callee);
                    self.lowlink[node] = self.lowlink[node].min(self.lowlink[callee]);
                }
                Some(index) if self.on_stack[callee] => {
                    self.lowlink[node] = self.lowlink[node].min(index);
                }
                Some(_) => {}
            }
        }

        if Some(self.lowlink[node]) == self.index[node] {
            let unit = self.units.len();
            let mut members = Vec::new();
            while let Some(member) = self.stack.pop() {
                self.on_stack[member] = false;
                self.unit_of[member] = unit;
                members.push(FunctionId::new(member));
                if member == node {
                    break;
                }
            }
            members.sort();
            self.units.push(members);
        }
    }
}
