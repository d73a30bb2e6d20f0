//! Whole-program compilation.
//!
//! The compiler settles program-wide facts first: which functions are
//! recursive, every missing signature, and purity. It then compiles the
//! call graph's units level by level, callees before callers, so the
//! planner always sees compiled bodies for the functions it may inline.
//! Units in one level are independent and may compile in parallel; their
//! results are installed in level order, so the outcome is the same
//! either way.
//!
//! Each function runs through lower → fuse → plan → assemble. A failure
//! marks only that function [`Failed`](CompileState::Failed).

use rayon::prelude::*;
use tracing::{debug, info, instrument, trace, warn};

use tacit_foundation::{FunctionId, PrimitiveTable};

use crate::assemble::Assembler;
use crate::config::OptimizerConfig;
use crate::effect::EffectAnalyzer;
use crate::error::{ArityError, ArityErrorKind, CompileError, Diagnostic};
use crate::fusion::{AppliedFusion, FusionMatcher, FusionRuleTable};
use crate::graph::CallGraph;
use crate::infer::SignatureInference;
use crate::lower::lower;
use crate::planner::{InliningDecision, InliningPlanner, SiteDecision};
use crate::table::{CompileState, CompiledBody, FunctionTable};

/// Everything produced by compiling one function.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionArtifact {
    pub id: FunctionId,
    pub body: CompiledBody,
    pub fusions: Vec<AppliedFusion>,
    pub decisions: Vec<SiteDecision>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Summary of a [`Compiler::compile`] run.
#[derive(Debug, Clone, Default)]
pub struct CompileReport {
    pub compiled: Vec<FunctionId>,
    pub errors: Vec<CompileError>,
    pub fusions: Vec<(FunctionId, AppliedFusion)>,
    pub decisions: Vec<SiteDecision>,
    pub diagnostics: Vec<Diagnostic>,
}

impl CompileReport {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn error_for(&self, id: FunctionId) -> Option<&CompileError> {
        self.errors.iter().find(|error| error.function() == id)
    }

    pub fn inlined_sites(&self) -> usize {
        self.decisions
            .iter()
            .filter(|site| site.decision == InliningDecision::Inline)
            .count()
    }

    fn fail(&mut self, table: &mut FunctionTable, error: CompileError) {
        let id = error.function();
        warn!(function = %id, %error, "compilation failed");
        table.mark_failed(id);
        self.errors.push(error);
    }
}

fn advance(function: FunctionId, state: &mut CompileState, next: CompileState) -> Result<(), CompileError> {
    if !state.can_advance_to(next) {
        return Err(CompileError::StateRegression {
            function,
            from: *state,
            to: next,
        });
    }
    *state = next;
    Ok(())
}

/// Whole-program driver: call graph, inference, purity, then per-level compilation.
pub struct Compiler<'p> {
    primitives: &'p PrimitiveTable,
    config: OptimizerConfig,
    rules: FusionRuleTable,
}

impl<'p> Compiler<'p> {
    /// A compiler with the default configuration and the standard fusion rules.
    pub fn new(primitives: &'p PrimitiveTable) -> Self {
        Self {
            primitives,
            config: OptimizerConfig::default(),
            rules: FusionRuleTable::standard(),
        }
    }

    pub fn with_config(mut self, config: OptimizerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_rules(mut self, rules: FusionRuleTable) -> Self {
        self.rules = rules;
        self
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    pub fn rules(&self) -> &FusionRuleTable {
        &self.rules
    }

    /// Compile every function of `table` that is not compiled yet.
    #[instrument(skip_all, name = "compile", fields(functions = table.len()))]
    pub fn compile(&self, table: &mut FunctionTable) -> CompileReport {
        let mut report = CompileReport::default();
        let graph = CallGraph::build(table);
        let pending: Vec<FunctionId> = table
            .iter()
            .filter(|entry| entry.state == CompileState::Unlowered)
            .map(|entry| entry.id)
            .collect();

        for id in &pending {
            if let Some(entry) = table.get_mut(*id) {
                entry.recursive = graph.is_recursive(*id);
            }
        }

        let inferred: Vec<_> = {
            let inference = SignatureInference::new(table, self.primitives);
            pending
                .iter()
                .map(|id| (*id, inference.infer(*id)))
                .collect()
        };
        for (id, result) in inferred {
            match result {
                Ok(signature) => {
                    if let Some(entry) = table.get_mut(id) {
                        entry.signature = Some(signature);
                    }
                }
                Err(error) => report.fail(table, error),
            }
        }

        let purity = graph.purity(table, self.primitives);
        for id in &pending {
            if let Some(entry) = table.get_mut(*id) {
                entry.pure = purity[id.index()];
            }
        }

        for (index, level) in graph.levels().iter().enumerate() {
            let units: Vec<&[FunctionId]> = level
                .iter()
                .map(|unit| graph.units()[*unit].as_slice())
                .collect();
            trace!(level = index, units = units.len(), "compiling level");

            let results: Vec<Vec<(FunctionId, Result<FunctionArtifact, CompileError>)>> = {
                let table: &FunctionTable = table;
                if self.config.parallel {
                    units
                        .par_iter()
                        .map(|members| self.compile_unit(table, members))
                        .collect()
                } else {
                    units
                        .iter()
                        .map(|members| self.compile_unit(table, members))
                        .collect()
                }
            };

            for (id, result) in results.into_iter().flatten() {
                match result {
                    Ok(artifact) => {
                        report
                            .fusions
                            .extend(artifact.fusions.into_iter().map(|fusion| (id, fusion)));
                        report.decisions.extend(artifact.decisions);
                        report.diagnostics.extend(artifact.diagnostics);
                        table.install(id, artifact.body);
                        report.compiled.push(id);
                    }
                    Err(error) => report.fail(table, error),
                }
            }
        }

        info!(
            compiled = report.compiled.len(),
            failed = report.errors.len(),
            fusions = report.fusions.len(),
            inlined = report.inlined_sites(),
            "compilation finished"
        );
        report
    }

    /// Compile the members of one unit in order.
    ///
    /// Members of a unit call each other, so none of them can be inlined
    /// into another and their relative order does not matter.
    fn compile_unit(
        &self,
        table: &FunctionTable,
        members: &[FunctionId],
    ) -> Vec<(FunctionId, Result<FunctionArtifact, CompileError>)> {
        members
            .iter()
            .filter(|id| table.state(**id) == Some(CompileState::Unlowered))
            .map(|id| (*id, self.compile_function(table, *id)))
            .collect()
    }

    /// Run one function through the pipeline against the current table.
    ///
    /// The function's signature must already be known and the functions it
    /// may inline must already be compiled. The table is shared with other
    /// workers, so the intermediate stages are tracked here and only the
    /// final state is written back by [`Compiler::compile`]. A function that
    /// already finished (compiled or failed) is rejected with
    /// [`CompileError::StateRegression`].
    #[instrument(skip_all, name = "compile_function", fields(function = %id))]
    pub fn compile_function(
        &self,
        table: &FunctionTable,
        id: FunctionId,
    ) -> Result<FunctionArtifact, CompileError> {
        let entry = table.get(id).ok_or_else(|| CompileError::InvalidBody {
            function: id,
            message: "not in the function table".to_string(),
        })?;
        let name = entry.name();
        let mut state = entry.state;
        if !state.can_advance_to(CompileState::Fused) {
            return Err(CompileError::StateRegression {
                function: id,
                from: state,
                to: CompileState::Fused,
            });
        }
        let signature = entry.signature.ok_or_else(|| {
            CompileError::arity(id, name, ArityError::new(0, ArityErrorKind::Unresolvable(id)))
        })?;
        let analyzer = EffectAnalyzer::new(self.primitives, table);

        let lowered = lower(entry, self.primitives)?;
        analyzer
            .verify(&lowered.instructions, signature)
            .map_err(|error| CompileError::arity(id, name, error))?;

        let fused = FusionMatcher::new(&self.rules, self.primitives, &analyzer)
            .with_verification(self.config.verify_fusion)
            .fuse(id, lowered.instructions)?;
        advance(id, &mut state, CompileState::Fused)?;

        let mut planned = InliningPlanner::new(table, &analyzer, &self.config).plan(
            id,
            fused.instructions,
            lowered.constants,
        );
        advance(id, &mut state, CompileState::Planned)?;
        let decisions = std::mem::take(&mut planned.decisions);
        let diagnostics = std::mem::take(&mut planned.diagnostics);

        let body = Assembler::new(table, &analyzer).assemble(id, name, planned, signature)?;
        advance(id, &mut state, CompileState::Compiled)?;

        debug!(
            function = %id,
            name = ?name,
            size = body.size(),
            fusions = fused.applied.len(),
            inlined = body.inlined.len(),
            "compiled"
        );
        Ok(FunctionArtifact {
            id,
            body,
            fusions: fused.applied,
            decisions,
            diagnostics,
        })
    }
}
