//! The compilation/evaluation unit: one warm context plus the state machine
//! that drives a source unit through compile, link, top-level execution and
//! entry-point invocation.

use crate::dsl::error::Diagnostic;
use crate::dsl::program::{Chunk, Program};
use crate::dsl::resolve::ResolveEnv;
use crate::dsl::value::Value;
use crate::dsl::vm::{RuntimeError, Vm};
use crate::error::EngineError;

use super::diagnostics::DiagnosticBuffer;
use super::modules::ModuleView;
use super::provision::SourceUnit;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnitState {
    #[default]
    Idle,
    Compiling,
    Ready,
    Failed,
    Invoking,
    Invoked,
    InvokeFailed,
}

impl UnitState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Compiling => "compiling",
            Self::Ready => "ready",
            Self::Failed => "failed",
            Self::Invoking => "invoking",
            Self::Invoked => "invoked",
            Self::InvokeFailed => "invoke-failed",
        }
    }
}

/// Outcome of a successful compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompilationResult {
    Clean,
    Warnings(usize),
}

/// Everything that survives between calls on one engine: linked functions,
/// classes and host bindings, plus global slot values.
#[derive(Debug, Default)]
pub struct Context {
    pub program: Program,
    pub globals: Vec<Value>,
}

/// A compiled and linked unit, waiting to run.
#[derive(Debug)]
pub struct Linked {
    pub top_level: Chunk,
    pub returns_value: bool,
    pub result: CompilationResult,
}

#[derive(Debug, Default)]
pub struct CompilationUnit {
    context: Context,
    state: UnitState,
    warning_level: u8,
    instruction_limit: Option<u64>,
}

impl CompilationUnit {
    pub fn new(warning_level: u8, instruction_limit: Option<u64>) -> Self {
        Self {
            context: Context::default(),
            state: UnitState::Idle,
            warning_level,
            instruction_limit,
        }
    }

    pub fn state(&self) -> UnitState {
        self.state
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Back to `Idle` before a new call. The context stays warm.
    pub fn reset(&mut self) {
        self.state = UnitState::Idle;
    }

    /// Compile `sources` and link them into the context. Every diagnostic,
    /// warnings included, goes to `sink` in emission order.
    pub fn compile(
        &mut self,
        sources: &SourceUnit,
        modules: &ModuleView,
        sink: &mut DiagnosticBuffer,
    ) -> Result<Linked, EngineError> {
        self.state = UnitState::Compiling;

        let texts = sources.texts();
        let env = ResolveEnv {
            program: &self.context.program,
            modules,
            warning_level: self.warning_level,
        };
        let (compiled, diagnostics) = crate::dsl::compile_sources(&texts, &env);

        let mut errors = 0;
        let mut warnings = 0;
        for d in &diagnostics {
            if d.is_error() {
                errors += 1;
            } else {
                warnings += 1;
            }
            sink.append(&format_diagnostic(d, sources));
        }

        let Some(compiled) = compiled.filter(|_| errors == 0) else {
            self.state = UnitState::Failed;
            log::debug!("compilation failed with {errors} error(s)");
            return Err(EngineError::CompilationFailed {
                errors: errors.max(1),
            });
        };

        let returns_value = compiled.returns_value;
        let top_level = match self.context.program.link(compiled, &modules.allowed) {
            Ok(chunk) => chunk,
            Err(d) => {
                sink.append(&format_diagnostic(&d, sources));
                self.state = UnitState::Failed;
                return Err(EngineError::CompilationFailed { errors: 1 });
            }
        };
        let global_count = self.context.program.global_count();
        if self.context.globals.len() < global_count {
            self.context.globals.resize(global_count, Value::Null);
        }

        self.state = UnitState::Ready;
        let result = if warnings == 0 {
            CompilationResult::Clean
        } else {
            CompilationResult::Warnings(warnings)
        };
        Ok(Linked {
            top_level,
            returns_value,
            result,
        })
    }

    /// Run a linked unit's top-level statements in order.
    pub fn execute(&mut self, linked: &Linked) -> Result<Value, EngineError> {
        self.state = UnitState::Invoking;
        let Context { program, globals } = &mut self.context;
        let outcome = Vm::new(program, globals, self.instruction_limit).run_top_level(&linked.top_level);
        self.settle(outcome)
    }

    /// Instantiate the entry type with no arguments.
    pub fn invoke_entry(&mut self, entry: &str) -> Result<(), EngineError> {
        self.state = UnitState::Invoking;
        let Some(class) = self.context.program.class_id(entry) else {
            self.state = UnitState::InvokeFailed;
            return Err(EngineError::EntryPointMissing(entry.to_string()));
        };
        let Context { program, globals } = &mut self.context;
        let outcome = Vm::new(program, globals, self.instruction_limit).instantiate(class, Vec::new());
        self.settle(outcome).map(|_| ())
    }

    fn settle(&mut self, outcome: Result<Value, RuntimeError>) -> Result<Value, EngineError> {
        match outcome {
            Ok(value) => {
                self.state = UnitState::Invoked;
                Ok(value)
            }
            Err(fault) => {
                self.state = UnitState::InvokeFailed;
                log::debug!("script fault: {}", fault.message);
                Err(EngineError::InvocationFault(fault.to_string()))
            }
        }
    }
}

fn format_diagnostic(d: &Diagnostic, sources: &SourceUnit) -> String {
    d.format_with_source(sources.origin(d.span.file), sources.text(d.span.file))
}
