//! Recursive functions are compiled but never spliced into themselves.

use tacit_compiler::{DecisionReason, FunctionDef, InliningDecision, Operand, Word};
use tacit_foundation::{Instruction, ModifierKind};
use tacit_tests::{Mode, TestHarness};
use tacit_vm::{ExecutionError, MAX_CALL_DEPTH, MAX_CALLBACK_DEPTH, Value};

#[test]
fn test_self_recursive_function_keeps_its_call() {
    let mut h = TestHarness::new();
    let spin = h.reserve("spin");
    h.set_body(
        spin,
        FunctionDef::named("spin", vec![h.prim("neg"), Word::Call(spin)]).with_signature(1, 1),
    );
    let main = h.define(FunctionDef::named("main", vec![Word::Call(spin)]));

    let build = h.build(Mode::OPTIMIZED);
    for site in &build.report.decisions {
        assert_eq!(site.decision, InliningDecision::Keep);
        assert_eq!(site.reason, DecisionReason::Recursive);
    }
    let program = build.seal();
    let compiled = program.function(spin).unwrap();
    assert!(compiled.recursive);
    assert!(compiled.inlined.is_empty());
    assert_eq!(compiled.instructions.iter().filter(|i| i.calls(spin)).count(), 1);
    assert!(program.function(main).unwrap().instructions[0].calls(spin));

    let (result, _) = h.build(Mode::OPTIMIZED).run("main", vec![Value::scalar(1.0)]);
    assert_eq!(result, Err(ExecutionError::CallDepthExceeded(MAX_CALL_DEPTH)));
}

#[test]
fn test_mutual_recursion_is_not_inlined() {
    let mut h = TestHarness::new();
    let ping = h.reserve("ping");
    let pong = h.reserve("pong");
    h.set_body(
        ping,
        FunctionDef::named("ping", vec![Word::Call(pong)]).with_signature(1, 1),
    );
    h.set_body(
        pong,
        FunctionDef::named("pong", vec![h.prim("neg"), Word::Call(ping)]).with_signature(1, 1),
    );

    let program = h.build(Mode::OPTIMIZED).seal();
    for id in [ping, pong] {
        let compiled = program.function(id).unwrap();
        assert!(compiled.recursive);
        assert!(!compiled.inlined.contains(&id));
        assert!(
            compiled
                .instructions
                .iter()
                .any(|i| matches!(i, Instruction::CallFunction(_)))
        );
    }

    for mode in Mode::ALL {
        let (result, _) = h.build(mode).run("ping", vec![Value::scalar(1.0)]);
        assert_eq!(result, Err(ExecutionError::CallDepthExceeded(MAX_CALL_DEPTH)), "{mode:?}");
    }
}

#[test]
fn test_recursion_through_a_modifier_is_bounded() {
    let mut h = TestHarness::new();
    let nest = h.reserve("nest");
    h.set_body(
        nest,
        FunctionDef::named(
            "nest",
            vec![Word::modified(ModifierKind::Each, vec![Operand::Function(nest)])],
        )
        .with_signature(1, 1),
    );

    for mode in Mode::ALL {
        let (result, _) = h.build(mode).run("nest", vec![Value::scalar(1.0)]);
        assert_eq!(result, Err(ExecutionError::CallDepthExceeded(MAX_CALLBACK_DEPTH)), "{mode:?}");
    }
}

#[test]
fn test_recursion_without_signature_fails_to_compile() {
    let mut h = TestHarness::new();
    let lost = h.reserve("lost");
    h.set_body(lost, FunctionDef::named("lost", vec![Word::Call(lost)]));
    let fine = h.define(FunctionDef::named("fine", vec![h.prim("dup")]));

    let build = h.build(Mode::OPTIMIZED);
    assert!(build.report.error_for(lost).is_some());
    assert!(build.report.error_for(fine).is_none());
}
