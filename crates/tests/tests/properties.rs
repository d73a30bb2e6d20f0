//! Properties every compiled program must keep, checked across builds.

use tacit_compiler::{
    CompileState, EffectAnalyzer, FunctionDef, FunctionTable, FusionMatcher, FusionRuleTable, Operand,
    Word,
};
use tacit_foundation::{FunctionId, FusedOp, Instruction, ModifierKind, Signature};
use tacit_tests::{Mode, TestHarness};
use tacit_vm::{ExecutionError, Value};

/// A program touching every standard fusion rule, a few call sites and an
/// inline operand.
fn sample_program() -> TestHarness {
    let mut h = TestHarness::new();
    let square = h.define(
        FunctionDef::named("square", vec![h.prim("dup"), h.prim("mul")]).with_signature(1, 1),
    );
    let sum_squares = h.define(FunctionDef::named(
        "sum_squares",
        vec![
            Word::modified(ModifierKind::Each, vec![Operand::Function(square)]),
            Word::modified(ModifierKind::Reduce, vec![h.op("add")]),
        ],
    ));
    h.define(FunctionDef::named(
        "mean_square",
        vec![
            h.prim("dup"),
            Word::Call(sum_squares),
            h.prim("flip"),
            h.prim("length"),
            h.prim("div"),
        ],
    ));
    h.define(FunctionDef::named(
        "pair_sums",
        vec![
            Word::number(2.0),
            h.prim("windows"),
            Word::modified(ModifierKind::Reduce, vec![h.op("add")]),
        ],
    ));
    h.define(FunctionDef::named(
        "fold_back",
        vec![
            h.prim("reverse"),
            Word::modified(ModifierKind::Reduce, vec![h.op("sub")]),
        ],
    ));
    h.define(FunctionDef::named(
        "shift_neg",
        vec![
            Word::modified(ModifierKind::Each, vec![h.op("neg")]),
            Word::modified(
                ModifierKind::Each,
                vec![Operand::Inline(vec![
                    Word::number(1.0),
                    h.prim("add"),
                ])],
            ),
        ],
    ));
    h.define(FunctionDef::named(
        "offset_fold",
        vec![
            Word::modified(ModifierKind::Each, vec![h.op("neg")]),
            Word::modified(
                ModifierKind::Each,
                vec![Operand::Inline(vec![Word::number(1.0), h.prim("add")])],
            ),
            Word::modified(ModifierKind::Reduce, vec![h.op("sub")]),
        ],
    ));
    h.define(FunctionDef::named(
        "window_sums",
        vec![
            h.prim("windows"),
            Word::modified(
                ModifierKind::Each,
                vec![Operand::Inline(vec![Word::modified(
                    ModifierKind::Reduce,
                    vec![h.op("add")],
                )])],
            ),
        ],
    ));
    h
}

fn fused_ops(body: &[Instruction], out: &mut Vec<FusedOp>) {
    for instruction in body {
        match instruction {
            Instruction::Fused(op) => out.push(op.clone()),
            Instruction::Inlined { body, .. } => fused_ops(body, out),
            _ => {}
        }
    }
}

fn compiled_table(h: &TestHarness, mode: Mode) -> FunctionTable {
    let build = h.build(mode);
    assert!(build.report.is_success(), "{:?}", build.report.errors);
    build.table
}

#[test]
fn test_arity_is_preserved_in_every_mode() {
    let h = sample_program();
    for mode in Mode::ALL {
        let table = compiled_table(&h, mode);
        let analyzer = EffectAnalyzer::new(h.primitives(), &table);
        for entry in table.iter() {
            assert_eq!(entry.state, CompileState::Compiled);
            let body = entry.compiled().unwrap();
            let effect = analyzer.analyze(&body.instructions).unwrap();
            assert_eq!(Some(effect.signature), entry.signature, "{mode:?} {:?}", entry.name);
            if let Some(declared) = entry.declared {
                assert_eq!(effect.signature, declared);
            }
        }
    }
}

#[test]
fn test_fused_ops_match_their_expansion() {
    let h = sample_program();
    let table = compiled_table(&h, Mode::OPTIMIZED);
    let analyzer = EffectAnalyzer::new(h.primitives(), &table);

    let mut ops = Vec::new();
    for entry in table.iter() {
        fused_ops(&entry.compiled().unwrap().instructions, &mut ops);
    }
    assert!(
        ops.len() >= FusionRuleTable::standard().len(),
        "expected every standard rule to fire, got {ops:?}"
    );

    for op in ops {
        let fused = analyzer.analyze(&[Instruction::Fused(op.clone())]).unwrap();
        let expanded = analyzer.analyze(&op.expansion).unwrap();
        assert_eq!(fused, expanded, "{}", op.id);
    }
}

#[test]
fn test_fusion_is_idempotent() {
    let h = sample_program();
    let table = compiled_table(&h, Mode::FUSION_ONLY);
    let analyzer = EffectAnalyzer::new(h.primitives(), &table);
    let rules = FusionRuleTable::standard();
    let matcher = FusionMatcher::new(&rules, h.primitives(), &analyzer).with_verification(true);

    for entry in table.iter() {
        let body = entry.compiled().unwrap().instructions.clone();
        let again = matcher.fuse(entry.id, body.clone()).unwrap();
        assert!(again.applied.is_empty(), "{:?} fused twice", entry.name);
        assert_eq!(again.instructions, body);
    }
}

#[test]
fn test_every_mode_computes_the_same_results() {
    let h = sample_program();

    assert_eq!(
        h.run_everywhere("sum_squares", vec![Value::list([1.0, 2.0, 3.0])]),
        Ok(vec![Value::scalar(14.0)])
    );
    assert_eq!(
        h.run_everywhere("mean_square", vec![Value::list([1.0, 2.0, 3.0])]),
        Ok(vec![Value::scalar(14.0 / 3.0)])
    );
    assert_eq!(
        h.run_everywhere("fold_back", vec![Value::list([10.0, 2.0, 3.0])]),
        Ok(vec![Value::scalar(-9.0)])
    );
    assert_eq!(
        h.run_everywhere("shift_neg", vec![Value::list([1.0, 2.0])]),
        Ok(vec![Value::list([0.0, -1.0])])
    );
    assert_eq!(
        h.run_everywhere("offset_fold", vec![Value::list([1.0, 2.0, 5.0])]),
        Ok(vec![Value::scalar(5.0)])
    );
    assert_eq!(
        h.run_everywhere(
            "window_sums",
            vec![Value::list([1.0, 2.0, 3.0, 4.0]), Value::scalar(2.0)]
        ),
        Ok(vec![Value::list([3.0, 5.0, 7.0])])
    );
    assert_eq!(
        h.run_everywhere("window_sums", vec![Value::list([1.0, 2.0]), Value::scalar(5.0)]),
        Ok(vec![Value::list(Vec::<f64>::new())])
    );
    assert_eq!(
        h.run_everywhere("sum_squares", vec![Value::list(Vec::<f64>::new())]),
        Err(ExecutionError::EmptyReduce)
    );
}

#[test]
fn test_longer_chains_fuse_into_one_op() {
    let h = sample_program();
    let build = h.build(Mode::OPTIMIZED);
    let offset_fold = build.table.lookup("offset_fold").unwrap();
    let window_sums = build.table.lookup("window_sums").unwrap();
    let rule_for = |id: FunctionId| {
        build
            .report
            .fusions
            .iter()
            .filter(|(function, _)| *function == id)
            .map(|(_, applied)| applied.rule.as_str())
            .collect::<Vec<_>>()
    };
    assert_eq!(rule_for(offset_fold), vec!["map_reduce_chain"]);
    assert_eq!(rule_for(window_sums), vec!["each_windows"]);

    for rule in FusionRuleTable::standard().rules() {
        assert!(
            build.report.fusions.iter().any(|(_, applied)| applied.rule == rule.name()),
            "{} never fired",
            rule.name()
        );
    }
}

#[test]
fn test_matrix_input_falls_back_to_expansion() {
    let h = sample_program();
    let matrix = Value::new(vec![2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
    let result = h.run_everywhere("fold_back", vec![matrix]).unwrap();
    // reverse swaps the rows, then each row folds: [3 - 4, 1 - 2]
    assert_eq!(result, vec![Value::list([-1.0, -1.0])]);

    let matrix = Value::new(vec![3, 2], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
    let result = h.run_everywhere("window_sums", vec![matrix, Value::scalar(2.0)]).unwrap();
    // two windows of two rows, each summed along its last axis
    assert_eq!(
        result,
        vec![Value::new(vec![2, 2], vec![3.0, 7.0, 7.0, 11.0]).unwrap()]
    );
}

#[test]
fn test_failed_function_does_not_block_others() {
    let mut h = TestHarness::new();
    let broken = h.define(FunctionDef::named("broken", vec![h.prim("add")]).with_signature(1, 1));
    let fine = h.define(FunctionDef::named("fine", vec![h.prim("neg")]));

    let build = h.build(Mode::OPTIMIZED);
    assert!(build.report.error_for(broken).is_some());
    assert!(build.report.error_for(fine).is_none());
    assert_eq!(build.table.state(broken), Some(CompileState::Failed));
    assert_eq!(build.table.state(fine), Some(CompileState::Compiled));

    let err = build.table.seal().unwrap_err();
    assert_eq!(err.functions, vec![broken]);
}

#[test]
fn test_declared_signature_is_kept() {
    let mut h = TestHarness::new();
    let swap = h.define(FunctionDef::named("swap", vec![h.prim("flip")]).with_signature(2, 2));
    let program = h.build(Mode::OPTIMIZED).seal();
    assert_eq!(program.function(swap).unwrap().signature, Signature::new(2, 2));
}
