//! Integration test harness for tacit.
//!
//! A [`TestHarness`] holds a function table that has not been compiled yet.
//! Each [`TestHarness::build`] compiles a fresh copy under one [`Mode`], so a
//! test can compare what the same program does fused and unfused, with and
//! without inlining: Define → Compile → Seal → Execute → Compare.

use std::sync::Once;

use tacit_compiler::{
    CompileReport, Compiler, FunctionDef, FunctionTable, FusionRuleTable, Operand,
    OptimizerConfig, Word,
};
use tacit_foundation::{FunctionId, PrimitiveTable, Program};
use tacit_vm::{EffectLog, ExecutionError, Executor, Value, standard_primitives};
use tracing_subscriber::{EnvFilter, fmt};

/// Install a test-friendly subscriber once. `RUST_LOG` selects the output.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(false)
            .try_init();
    });
}

/// Which optimizations a build runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mode {
    pub fusion: bool,
    pub inlining: bool,
}

impl Mode {
    pub const OPTIMIZED: Mode = Mode {
        fusion: true,
        inlining: true,
    };
    pub const PLAIN: Mode = Mode {
        fusion: false,
        inlining: false,
    };
    pub const FUSION_ONLY: Mode = Mode {
        fusion: true,
        inlining: false,
    };
    pub const INLINING_ONLY: Mode = Mode {
        fusion: false,
        inlining: true,
    };

    pub const ALL: [Mode; 4] = [
        Mode::PLAIN,
        Mode::FUSION_ONLY,
        Mode::INLINING_ONLY,
        Mode::OPTIMIZED,
    ];
}

/// Test harness for compiling and running tacit programs.
pub struct TestHarness {
    primitives: PrimitiveTable,
    table: FunctionTable,
    config: OptimizerConfig,
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl TestHarness {
    /// An empty program over the VM's standard primitives.
    pub fn new() -> Self {
        init_tracing();
        Self {
            primitives: standard_primitives(),
            table: FunctionTable::new(),
            config: OptimizerConfig {
                verify_fusion: true,
                ..OptimizerConfig::default()
            },
        }
    }

    /// Replace the configuration used when inlining is enabled.
    pub fn with_config(mut self, config: OptimizerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn primitives(&self) -> &PrimitiveTable {
        &self.primitives
    }

    /// A word calling the named primitive.
    ///
    /// # Panics
    ///
    /// Panics if the VM has no such primitive.
    pub fn prim(&self, name: &str) -> Word {
        Word::Primitive(self.primitive_id(name))
    }

    /// The named primitive as a modifier operand.
    pub fn op(&self, name: &str) -> Operand {
        Operand::Primitive(self.primitive_id(name))
    }

    fn primitive_id(&self, name: &str) -> tacit_foundation::PrimitiveId {
        self.primitives
            .lookup(name)
            .unwrap_or_else(|| panic!("no primitive named `{name}`"))
    }

    /// Add a function to the program.
    ///
    /// # Panics
    ///
    /// Panics if the table rejects the definition.
    pub fn define(&mut self, def: FunctionDef) -> FunctionId {
        self.table
            .define(def)
            .unwrap_or_else(|err| panic!("define failed: {err}"))
    }

    /// Reserve an id for a function defined later with [`Self::set_body`].
    pub fn reserve(&mut self, name: &str) -> FunctionId {
        self.table
            .reserve(Some(name))
            .unwrap_or_else(|err| panic!("reserve failed: {err}"))
    }

    pub fn set_body(&mut self, id: FunctionId, def: FunctionDef) {
        self.table
            .set_body(id, def)
            .unwrap_or_else(|err| panic!("set_body failed: {err}"));
    }

    /// Compile a copy of the program under `mode`.
    pub fn build(&self, mode: Mode) -> Build<'_> {
        let config = if mode.inlining {
            self.config.clone()
        } else {
            OptimizerConfig {
                verify_fusion: self.config.verify_fusion,
                ..OptimizerConfig::no_inlining()
            }
        };
        let rules = if mode.fusion {
            FusionRuleTable::standard()
        } else {
            FusionRuleTable::new()
        };

        let mut table = self.table.clone();
        let report = Compiler::new(&self.primitives)
            .with_config(config)
            .with_rules(rules)
            .compile(&mut table);
        Build {
            primitives: &self.primitives,
            mode,
            table,
            report,
        }
    }

    /// Run the named function under every mode and assert the results and
    /// side effects agree. Returns the shared result.
    ///
    /// # Panics
    ///
    /// Panics if any build fails or two modes disagree.
    pub fn run_everywhere(&self, name: &str, args: Vec<Value>) -> Result<Vec<Value>, ExecutionError> {
        let run = |mode: Mode| {
            let program = self.build(mode).seal();
            run_program(&program, &self.primitives, name, args.clone(), true)
        };

        let (expected, expected_effects) = run(Mode::PLAIN);
        for mode in Mode::ALL.into_iter().filter(|mode| *mode != Mode::PLAIN) {
            let (result, effects) = run(mode);
            assert_eq!(result, expected, "{name}: {mode:?} disagrees with the plain build");
            assert_eq!(effects, expected_effects, "{name}: {mode:?} side effects differ");
        }
        expected
    }
}

/// One compiled copy of a harness program.
pub struct Build<'h> {
    primitives: &'h PrimitiveTable,
    pub mode: Mode,
    pub table: FunctionTable,
    pub report: CompileReport,
}

impl Build<'_> {
    /// Seal the compiled table.
    ///
    /// # Panics
    ///
    /// Panics if compilation reported errors.
    pub fn seal(self) -> Program {
        assert!(
            self.report.is_success(),
            "{:?} build failed: {:?}",
            self.mode,
            self.report.errors
        );
        self.table
            .seal()
            .unwrap_or_else(|err| panic!("seal failed: {err}"))
    }

    /// Seal and run the named function.
    pub fn run(self, name: &str, args: Vec<Value>) -> (Result<Vec<Value>, ExecutionError>, EffectLog) {
        let primitives = self.primitives;
        let program = self.seal();
        run_program(&program, primitives, name, args, true)
    }
}

/// Run `name` on a fresh executor, optionally without fused kernels.
pub fn run_program(
    program: &Program,
    primitives: &PrimitiveTable,
    name: &str,
    args: Vec<Value>,
    fused_kernels: bool,
) -> (Result<Vec<Value>, ExecutionError>, EffectLog) {
    let executor = Executor::new(program, primitives);
    let mut executor = if fused_kernels {
        executor
    } else {
        executor.without_fused_kernels()
    };
    let result = executor.call_named(name, args);
    (result, executor.effects().clone())
}
