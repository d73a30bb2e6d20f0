//! End-to-end scenarios: Define → Compile → Seal → Execute.

use tacit_compiler::{DecisionReason, FunctionDef, InliningDecision, OptimizerConfig, Word};
use tacit_foundation::{FunctionId, Instruction, ModifierKind, fusions};
use tacit_tests::{Mode, TestHarness, run_program};
use tacit_vm::Value;

fn calls_to(body: &[Instruction], callee: FunctionId) -> usize {
    body.iter().filter(|instruction| instruction.calls(callee)).count()
}

/// reduce(add) over windows of size 2, fused and unfused.
#[test]
fn test_windowed_sum() {
    let mut h = TestHarness::new();
    h.define(FunctionDef::named(
        "pair_sums",
        vec![
            h.prim("windows"),
            Word::modified(ModifierKind::Reduce, vec![h.op("add")]),
        ],
    ));
    let args = || vec![Value::list([1.0, 2.0, 3.0, 4.0]), Value::scalar(2.0)];
    let expected = vec![Value::list([3.0, 5.0, 7.0])];

    let build = h.build(Mode::FUSION_ONLY);
    assert_eq!(build.report.fusions.len(), 1);
    assert_eq!(build.report.fusions[0].1.rule, "windowed_reduce");
    let program = build.seal();
    let body = &program.functions()[0].instructions;
    assert!(matches!(
        body.as_slice(),
        [Instruction::Fused(op)] if op.id.as_str() == fusions::WINDOWED_REDUCE
    ));

    let (fast, _) = run_program(&program, h.primitives(), "pair_sums", args(), true);
    let (slow, _) = run_program(&program, h.primitives(), "pair_sums", args(), false);
    assert_eq!(fast.unwrap(), expected);
    assert_eq!(slow.unwrap(), expected);

    let (unfused, _) = h.build(Mode::PLAIN).run("pair_sums", args());
    assert_eq!(unfused.unwrap(), expected);
}

#[test]
fn test_window_wider_than_list_is_empty() {
    let mut h = TestHarness::new();
    h.define(FunctionDef::named(
        "pair_sums",
        vec![
            h.prim("windows"),
            Word::modified(ModifierKind::Reduce, vec![h.op("add")]),
        ],
    ));
    let result = h
        .run_everywhere("pair_sums", vec![Value::list([1.0, 2.0]), Value::scalar(5.0)])
        .unwrap();
    assert_eq!(result, vec![Value::list(Vec::<f64>::new())]);
}

#[test]
fn test_size_hint_over_budget_is_never_inlined() {
    let mut h = TestHarness::new().with_config(OptimizerConfig {
        inlining_size_budget: 200,
        verify_fusion: true,
        ..OptimizerConfig::default()
    });
    let big = h.define(
        FunctionDef::named("big", vec![Word::number(1.0), h.prim("add")]).with_size_hint(1000),
    );
    let main = h.define(FunctionDef::named(
        "main",
        vec![Word::Call(big), Word::Call(big), Word::Call(big)],
    ));

    let build = h.build(Mode::OPTIMIZED);
    assert_eq!(build.report.inlined_sites(), 0);
    let sites: Vec<_> = build
        .report
        .decisions
        .iter()
        .filter(|site| site.callee == big)
        .collect();
    assert_eq!(sites.len(), 3);
    for site in sites {
        assert_eq!(site.decision, InliningDecision::Keep);
        assert_eq!(
            site.reason,
            DecisionReason::OverBudget {
                size: 1000,
                budget: 200
            }
        );
    }

    let program = build.seal();
    assert_eq!(calls_to(&program.function(main).unwrap().instructions, big), 3);
    assert_eq!(
        h.run_everywhere("main", vec![Value::scalar(0.0)]).unwrap(),
        vec![Value::scalar(3.0)]
    );
}

#[test]
fn test_impure_function_called_twice_is_kept() {
    let mut h = TestHarness::new();
    let shout = h.define(FunctionDef::named("shout", vec![h.prim("dup"), h.prim("print")]));
    let main = h.define(FunctionDef::named(
        "main",
        vec![Word::Call(shout), h.prim("neg"), Word::Call(shout)],
    ));

    let build = h.build(Mode::OPTIMIZED);
    for site in build.report.decisions.iter().filter(|site| site.caller == main) {
        assert_eq!(site.decision, InliningDecision::Keep);
        assert_eq!(site.reason, DecisionReason::ImpureRepeated { invocations: 2 });
    }
    let program = build.seal();
    let compiled = program.function(main).unwrap();
    assert_eq!(calls_to(&compiled.instructions, shout), 2);
    assert!(compiled.inlined.is_empty());
    assert!(!compiled.pure);

    let (result, effects) = h.build(Mode::OPTIMIZED).run("main", vec![Value::scalar(4.0)]);
    assert_eq!(result.unwrap(), vec![Value::scalar(-4.0)]);
    assert_eq!(effects.printed, vec![Value::scalar(4.0), Value::scalar(-4.0)]);
}

#[test]
fn test_impure_function_called_once_may_be_inlined() {
    let mut h = TestHarness::new();
    let shout = h.define(FunctionDef::named("shout", vec![h.prim("dup"), h.prim("print")]));
    let main = h.define(FunctionDef::named("main", vec![Word::Call(shout), h.prim("neg")]));

    let program = h.build(Mode::OPTIMIZED).seal();
    assert_eq!(program.function(main).unwrap().inlined, vec![shout]);

    let result = h.run_everywhere("main", vec![Value::scalar(2.0)]).unwrap();
    assert_eq!(result, vec![Value::scalar(-2.0)]);
}

#[test]
fn test_inlined_and_kept_calls_agree() {
    let mut h = TestHarness::new();
    let scale = h.define(FunctionDef::named("scale", vec![Word::number(2.0), h.prim("mul")]));
    let main = h.define(FunctionDef::named(
        "main",
        vec![Word::Call(scale), Word::number(1.0), h.prim("add")],
    ));

    let inlined = h.build(Mode::INLINING_ONLY);
    assert_eq!(inlined.report.inlined_sites(), 1);
    let kept = h.build(Mode::PLAIN);
    assert_eq!(kept.report.inlined_sites(), 0);
    assert!(kept.report.decisions.iter().all(|site| site.decision == InliningDecision::Keep));

    let inlined = inlined.seal();
    let compiled = inlined.function(main).unwrap();
    assert_eq!(calls_to(&compiled.instructions, scale), 0);
    assert_eq!(compiled.constants.len(), 2);

    let args = vec![Value::list([1.0, 2.0, 3.0])];
    let (a, _) = run_program(&inlined, h.primitives(), "main", args.clone(), true);
    let (b, _) = h.build(Mode::PLAIN).run("main", args);
    assert_eq!(a.unwrap(), vec![Value::list([3.0, 5.0, 7.0])]);
    assert_eq!(b.unwrap(), vec![Value::list([3.0, 5.0, 7.0])]);
}

#[test]
fn test_nested_helpers_inline_transitively() {
    let mut h = TestHarness::new();
    let inc = h.define(FunctionDef::named("inc", vec![Word::number(1.0), h.prim("add")]));
    let inc2 = h.define(FunctionDef::named("inc2", vec![Word::Call(inc), Word::Call(inc)]));
    let main = h.define(FunctionDef::named("main", vec![Word::Call(inc2), Word::Call(inc2)]));

    let program = h.build(Mode::OPTIMIZED).seal();
    let compiled = program.function(main).unwrap();
    assert!(compiled.instructions.iter().all(|i| !matches!(i, Instruction::CallFunction(_))));
    assert!(compiled.inlined.contains(&inc2));
    assert_eq!(
        h.run_everywhere("main", vec![Value::scalar(0.0)]).unwrap(),
        vec![Value::scalar(4.0)]
    );
}
