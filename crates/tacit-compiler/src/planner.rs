//! Inlining planner.
//!
//! Every direct call in a fused body is a candidate site. The planner
//! decides each site against the callee's table entry and, for sites it
//! inlines, splices the callee's compiled body in place of the call,
//! moving the callee's constants into the caller's pool. Calls exposed by
//! a splice are planned in turn, one level deeper, until the depth limit.
//!
//! Decision table, first match wins:
//!
//! | condition                                        | decision |
//! |--------------------------------------------------|----------|
//! | callee recursive, or already being expanded      | keep     |
//! | callee size hint above the budget                | keep     |
//! | callee impure and invoked more than once         | keep     |
//! | otherwise                                        | inline   |
//!
//! A site that passes the table is still kept if the callee is not compiled
//! yet, if expanding it would exceed the depth limit, or if its compiled
//! body does not have exactly the callee's signature.

use std::collections::HashMap;
use std::fmt;

use tracing::debug;

use tacit_foundation::{ConstantPool, FunctionId, Instruction};

use crate::config::OptimizerConfig;
use crate::effect::EffectAnalyzer;
use crate::error::Diagnostic;
use crate::table::FunctionTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InliningDecision {
    Inline,
    Keep,
}

/// Why a site was decided the way it was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecisionReason {
    /// Inlining is switched off in the configuration.
    Disabled,
    Recursive,
    OverBudget { size: usize, budget: usize },
    ImpureRepeated { invocations: usize },
    NotCompiled,
    DepthLimit,
    EffectMismatch,
    Eligible,
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecisionReason::Disabled => write!(f, "inlining disabled"),
            DecisionReason::Recursive => write!(f, "recursive"),
            DecisionReason::OverBudget { size, budget } => {
                write!(f, "size {size} over budget {budget}")
            }
            DecisionReason::ImpureRepeated { invocations } => {
                write!(f, "impure and invoked {invocations} times")
            }
            DecisionReason::NotCompiled => write!(f, "callee not compiled"),
            DecisionReason::DepthLimit => write!(f, "depth limit"),
            DecisionReason::EffectMismatch => write!(f, "effect mismatch"),
            DecisionReason::Eligible => write!(f, "eligible"),
        }
    }
}

/// The decision taken at one call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SiteDecision {
    pub caller: FunctionId,
    pub callee: FunctionId,
    /// 0 for sites in the caller's own body, n for sites exposed by n splices.
    pub depth: usize,
    pub decision: InliningDecision,
    pub reason: DecisionReason,
}

/// A body with its inlining applied. Spliced regions are still marked
/// with [`Instruction::Inlined`].
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedBody {
    pub instructions: Vec<Instruction>,
    pub constants: ConstantPool,
    pub inlined: Vec<FunctionId>,
    pub decisions: Vec<SiteDecision>,
    pub diagnostics: Vec<Diagnostic>,
}

struct PlanState {
    caller: FunctionId,
    constants: ConstantPool,
    /// Direct calls per callee; grows as splices expose calls, never shrinks.
    invocations: HashMap<FunctionId, usize>,
    /// Callees currently being expanded, outermost first.
    chain: Vec<FunctionId>,
    inlined: Vec<FunctionId>,
    decisions: Vec<SiteDecision>,
    diagnostics: Vec<Diagnostic>,
}

impl PlanState {
    fn count_calls(&mut self, body: &[Instruction]) {
        for instruction in body {
            if let Instruction::CallFunction(callee) = instruction {
                *self.invocations.entry(*callee).or_default() += 1;
            }
        }
    }
}

/// Decides every call site of a body and splices the ones it inlines.
pub struct InliningPlanner<'a> {
    table: &'a FunctionTable,
    analyzer: &'a EffectAnalyzer<'a>,
    config: &'a OptimizerConfig,
}

impl<'a> InliningPlanner<'a> {
    pub fn new(
        table: &'a FunctionTable,
        analyzer: &'a EffectAnalyzer<'a>,
        config: &'a OptimizerConfig,
    ) -> Self {
        Self {
            table,
            analyzer,
            config,
        }
    }

    /// Decide one site.
    ///
    /// `chain` lists the functions being expanded around the site, starting
    /// with the caller; `invocations` is how often the caller's body calls
    /// `callee` so far.
    pub fn decide(
        &self,
        chain: &[FunctionId],
        callee: FunctionId,
        invocations: usize,
        depth: usize,
    ) -> (InliningDecision, DecisionReason) {
        use InliningDecision::{Inline, Keep};

        if !self.config.inlining {
            return (Keep, DecisionReason::Disabled);
        }
        let Some(entry) = self.table.get(callee) else {
            return (Keep, DecisionReason::NotCompiled);
        };
        if entry.recursive || chain.contains(&callee) {
            return (Keep, DecisionReason::Recursive);
        }
        let size = entry.size_hint();
        let budget = self.config.inlining_size_budget;
        if size > budget {
            return (Keep, DecisionReason::OverBudget { size, budget });
        }
        if !entry.pure && invocations > 1 {
            return (Keep, DecisionReason::ImpureRepeated { invocations });
        }
        if entry.compiled().is_none() {
            return (Keep, DecisionReason::NotCompiled);
        }
        if depth > self.config.max_inlining_depth {
            return (Keep, DecisionReason::DepthLimit);
        }
        (Inline, DecisionReason::Eligible)
    }

    /// Plan every call site in `body`, splicing the ones decided inline.
    pub fn plan(
        &self,
        caller: FunctionId,
        body: Vec<Instruction>,
        constants: ConstantPool,
    ) -> PlannedBody {
        let mut state = PlanState {
            caller,
            constants,
            invocations: HashMap::new(),
            chain: vec![caller],
            inlined: Vec::new(),
            decisions: Vec::new(),
            diagnostics: Vec::new(),
        };
        state.count_calls(&body);
        let instructions = self.expand(body, 0, &mut state);

        debug!(
            function = %caller,
            sites = state.decisions.len(),
            inlined = state.inlined.len(),
            "planned"
        );
        PlannedBody {
            instructions,
            constants: state.constants,
            inlined: state.inlined,
            decisions: state.decisions,
            diagnostics: state.diagnostics,
        }
    }

    fn expand(&self, body: Vec<Instruction>, depth: usize, state: &mut PlanState) -> Vec<Instruction> {
        let mut out = Vec::with_capacity(body.len());
        for instruction in body {
            let Instruction::CallFunction(callee) = instruction else {
                out.push(instruction);
                continue;
            };

            let invocations = state.invocations.get(&callee).copied().unwrap_or(0);
            let (mut decision, mut reason) = self.decide(&state.chain, callee, invocations, depth);
            let mut spliced = None;

            match (decision, reason) {
                (InliningDecision::Inline, _) => match self.splice(callee, state) {
                    Ok(body) => spliced = Some(body),
                    Err(why) => {
                        decision = InliningDecision::Keep;
                        reason = DecisionReason::EffectMismatch;
                        state.diagnostics.push(Diagnostic::InlineAborted {
                            caller: state.caller,
                            callee,
                            reason: why,
                        });
                    }
                },
                (_, DecisionReason::DepthLimit) => {
                    state.diagnostics.push(Diagnostic::RecursionLimitExceeded {
                        caller: state.caller,
                        callee,
                        depth,
                    });
                }
                _ => {}
            }

            debug!(caller = %state.caller, %callee, depth, ?decision, %reason, "call site");
            state.decisions.push(SiteDecision {
                caller: state.caller,
                callee,
                depth,
                decision,
                reason,
            });

            match spliced {
                Some(body) => {
                    state.count_calls(&body);
                    state.inlined.push(callee);
                    state.chain.push(callee);
                    let body = self.expand(body, depth + 1, state);
                    state.chain.pop();
                    out.push(Instruction::Inlined { callee, body });
                }
                None => out.push(Instruction::CallFunction(callee)),
            }
        }
        out
    }

    /// The callee's compiled body with constants moved into the caller's pool.
    fn splice(&self, callee: FunctionId, state: &mut PlanState) -> Result<Vec<Instruction>, String> {
        let entry = self
            .table
            .get(callee)
            .ok_or_else(|| format!("{callee} is not defined"))?;
        let body = entry
            .compiled()
            .ok_or_else(|| format!("{callee} is not compiled"))?;
        let signature = entry
            .signature
            .ok_or_else(|| format!("{callee} has no signature"))?;

        let effect = self
            .analyzer
            .analyze(&body.instructions)
            .map_err(|error| error.to_string())?;
        if effect.signature != signature {
            return Err(format!(
                "body has effect {}, call site expects {signature}",
                effect.signature
            ));
        }

        let mut constants = state.constants.clone();
        let spliced = renumber(&body.instructions, &body.constants, &mut constants)?;
        state.constants = constants;
        Ok(spliced)
    }
}

/// Rewrite constant references from `from` into `into`.
pub fn renumber(
    body: &[Instruction],
    from: &ConstantPool,
    into: &mut ConstantPool,
) -> Result<Vec<Instruction>, String> {
    let mut out = Vec::with_capacity(body.len());
    for instruction in body {
        let rewritten = match instruction {
            Instruction::PushConstant(index) => {
                let constant = from
                    .get(*index)
                    .ok_or_else(|| format!("constant #{} is missing", index.0))?;
                Instruction::PushConstant(into.add(constant.clone()))
            }
            Instruction::Fused(op) => {
                let mut op = op.clone();
                op.expansion = renumber(&op.expansion, from, into)?;
                Instruction::Fused(op)
            }
            Instruction::Inlined { callee, body } => Instruction::Inlined {
                callee: *callee,
                body: renumber(body, from, into)?,
            },
            other => other.clone(),
        };
        out.push(rewritten);
    }
    Ok(out)
}
