pub mod diagnostics;
pub mod modules;
pub mod provision;
pub mod unit;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::console::{self, Console};
use crate::dsl::value::Value;
use crate::error::EngineError;

use diagnostics::DiagnosticBuffer;
use modules::{select, AllowedModuleSet, HostCatalog, ModuleView};
use provision::{InlineSource, ProjectSource, Provision, SourceUnit};
use unit::{CompilationUnit, Linked};

pub use unit::{CompilationResult, UnitState};

/// Namespace of the entry type.
pub const ENTRY_NAMESPACE: &str = "script";
/// Entry type, instantiated with no arguments after every successful run.
pub const ENTRY_TYPE: &str = "Main";

pub fn entry_point() -> String {
    format!("{ENTRY_NAMESPACE}.{ENTRY_TYPE}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// 0 = no warnings, 1 = unreachable code, 2 = also unused locals.
    pub warning_level: u8,
    /// Per-call instruction budget. `None` runs unbounded.
    pub instruction_limit: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            warning_level: 2,
            instruction_limit: None,
        }
    }
}

/// Where an engine's source comes from. Fixed at construction.
#[derive(Debug, Clone)]
pub enum SourceMode {
    Inline,
    Project(ProjectSource),
}

impl SourceMode {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Inline => "inline",
            Self::Project(_) => "project",
        }
    }
}

/// Hosts scripts for one caller.
///
/// Owns a single warm context: functions, classes and globals declared by
/// one call stay visible to later calls, and a later declaration of the same
/// name replaces the earlier one.
///
/// Every call clears the diagnostics, runs, then snapshots them into
/// [`last_error`](Self::last_error). Failures never panic; they come back as
/// [`EngineError`] and leave the engine ready for the next call.
pub struct ScriptEngine {
    mode: SourceMode,
    unit: CompilationUnit,
    modules: ModuleView,
    sink: DiagnosticBuffer,
    last_error: String,
    console: Arc<dyn Console>,
}

impl fmt::Debug for ScriptEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptEngine")
            .field("mode", &self.mode)
            .field("state", &self.unit.state())
            .field("modules", &self.modules.allowed.names().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl ScriptEngine {
    /// An engine fed raw source through [`run_source`](Self::run_source) and
    /// [`evaluate`](Self::evaluate). No modules are allowed until
    /// [`register_modules`](Self::register_modules) is called.
    pub fn inline(console: Arc<dyn Console>, config: EngineConfig) -> Self {
        Self::with_mode(SourceMode::Inline, ModuleView::default(), console, config)
    }

    /// An engine compiling the manifest in `dir` on every [`run`](Self::run).
    /// Every module loaded in `catalog` is allowed.
    pub fn project(
        dir: impl Into<PathBuf>,
        catalog: &HostCatalog,
        console: Arc<dyn Console>,
        config: EngineConfig,
    ) -> Self {
        let modules = ModuleView::new(catalog, AllowedModuleSet::all(catalog));
        Self::with_mode(SourceMode::Project(ProjectSource::new(dir)), modules, console, config)
    }

    fn with_mode(mode: SourceMode, modules: ModuleView, console: Arc<dyn Console>, config: EngineConfig) -> Self {
        Self {
            mode,
            unit: CompilationUnit::new(config.warning_level, config.instruction_limit),
            modules,
            sink: DiagnosticBuffer::new(),
            last_error: String::new(),
            console,
        }
    }

    /// Replace the allowed module set with the catalog modules named by
    /// `names`. Modules loaded into the catalog later stay invisible until
    /// this is called again.
    pub fn register_modules<S: AsRef<str>>(&mut self, catalog: &HostCatalog, names: &[S]) {
        let allowed = select(catalog, names);
        log::debug!(
            "engine allows {} module(s): {}",
            allowed.len(),
            allowed.names().collect::<Vec<_>>().join(", ")
        );
        self.modules = ModuleView::new(catalog, allowed);
    }

    pub fn allowed_modules(&self) -> impl Iterator<Item = &str> {
        self.modules.allowed.names()
    }

    pub fn mode(&self) -> &SourceMode {
        &self.mode
    }

    pub fn state(&self) -> UnitState {
        self.unit.state()
    }

    /// Diagnostics of the most recent call, trimmed. Empty if there were none.
    pub fn last_error(&self) -> &str {
        &self.last_error
    }

    /// Compile `code`, run its top level, then instantiate `script.Main`.
    pub fn run_source(&mut self, code: &str) -> Result<CompilationResult, EngineError> {
        self.begin();
        let result = match self.mode {
            SourceMode::Inline => InlineSource::new(code)
                .provision()
                .and_then(|sources| self.run_unit(&sources)),
            SourceMode::Project(_) => Err(self.wrong_mode("run_source")),
        };
        self.finish(result)
    }

    /// Compile the project, run its top level, then instantiate `script.Main`.
    pub fn run(&mut self) -> Result<CompilationResult, EngineError> {
        self.begin();
        let result = match &self.mode {
            SourceMode::Project(project) => {
                log::debug!("running project {}", project.dir().display());
                project.provision().and_then(|sources| self.run_unit(&sources))
            }
            SourceMode::Inline => Err(self.wrong_mode("run")),
        };
        self.finish(result)
    }

    /// Compile and run `code` against the warm context without invoking the
    /// entry point. Yields the value of a trailing expression statement.
    pub fn evaluate(&mut self, code: &str) -> Result<Option<Value>, EngineError> {
        self.begin();
        let result = self.evaluate_unit(code);
        self.finish(result)
    }

    /// [`evaluate`](Self::evaluate), converting the result.
    pub fn evaluate_as<T>(&mut self, code: &str) -> Result<Option<T>, EngineError>
    where
        T: TryFrom<Value>,
        T::Error: fmt::Display,
    {
        self.begin();
        let result = self.evaluate_unit(code).and_then(|value| {
            value
                .map(T::try_from)
                .transpose()
                .map_err(|e| EngineError::InvocationFault(format!("result conversion failed: {e}")))
        });
        self.finish(result)
    }

    fn begin(&mut self) {
        self.sink.clear();
        self.unit.reset();
    }

    fn finish<T>(&mut self, result: Result<T, EngineError>) -> Result<T, EngineError> {
        if let Err(e) = &result {
            log::debug!("engine call failed: {e}");
            // Compile errors are already in the buffer, one line each.
            if !matches!(e, EngineError::CompilationFailed { .. }) {
                self.sink.append(&format!("error: {e}"));
            }
        }
        self.last_error = self.sink.snapshot();
        if !self.last_error.is_empty() {
            console::report_error(self.console.as_ref(), &self.last_error);
        }
        result
    }

    fn wrong_mode(&self, operation: &'static str) -> EngineError {
        EngineError::WrongMode {
            operation,
            mode: self.mode.name(),
        }
    }

    fn compile(&mut self, sources: &SourceUnit) -> Result<Linked, EngineError> {
        self.unit.compile(sources, &self.modules, &mut self.sink)
    }

    fn run_unit(&mut self, sources: &SourceUnit) -> Result<CompilationResult, EngineError> {
        let linked = self.compile(sources)?;
        self.unit.execute(&linked)?;
        self.unit.invoke_entry(&entry_point())?;
        Ok(linked.result)
    }

    fn evaluate_unit(&mut self, code: &str) -> Result<Option<Value>, EngineError> {
        if let SourceMode::Project(_) = self.mode {
            return Err(self.wrong_mode("evaluate"));
        }
        let sources = InlineSource::new(code).provision()?;
        let linked = self.compile(&sources)?;
        let value = self.unit.execute(&linked)?;
        Ok(linked.returns_value.then_some(value))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::console::MemoryConsole;
    use crate::engine::modules::{Arity, HostError, HostModule};
    use std::fs;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const MAIN: &str = "namespace script { class Main { fn init() { Probe.hit(); } } }";

    struct Fixture {
        catalog: HostCatalog,
        hits: Arc<AtomicUsize>,
        console: Arc<MemoryConsole>,
    }

    impl Fixture {
        fn new() -> Self {
            let hits = Arc::new(AtomicUsize::new(0));
            let counter = Arc::clone(&hits);
            let mut catalog = HostCatalog::new();
            catalog.load(HostModule::new("Probe").with_function("hit", Arity::Exact(0), move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Value::Null)
            }));
            catalog.load(HostModule::new("Secret").with_function("peek", Arity::Exact(0), |_| {
                Err(HostError::new("not for scripts"))
            }));
            Self {
                catalog,
                hits,
                console: Arc::new(MemoryConsole::new()),
            }
        }

        fn inline(&self) -> ScriptEngine {
            self.inline_with(EngineConfig::default())
        }

        fn inline_with(&self, config: EngineConfig) -> ScriptEngine {
            let mut engine = ScriptEngine::inline(self.console.clone(), config);
            engine.register_modules(&self.catalog, &["Probe"]);
            engine
        }

        fn project(&self, dir: &Path) -> ScriptEngine {
            ScriptEngine::project(dir, &self.catalog, self.console.clone(), EngineConfig::default())
        }

        fn hits(&self) -> usize {
            self.hits.load(Ordering::SeqCst)
        }
    }

    fn write(dir: &Path, name: &str, text: &str) {
        fs::write(dir.join(name), text).unwrap();
    }

    #[test]
    fn evaluate_returns_trailing_expression() {
        let fx = Fixture::new();
        let mut engine = fx.inline();
        assert_eq!(engine.evaluate("1+1;").unwrap(), Some(Value::Int(2)));
        assert_eq!(engine.last_error(), "");
        assert_eq!(engine.evaluate("let x = 3;").unwrap(), None);
        assert_eq!(engine.evaluate_as::<i64>("x * 14").unwrap(), Some(42));
    }

    #[test]
    fn evaluate_as_reports_conversion_failure() {
        let fx = Fixture::new();
        let mut engine = fx.inline();
        let err = engine.evaluate_as::<bool>("\"text\"").unwrap_err();
        assert!(matches!(err, EngineError::InvocationFault(_)));
        assert!(engine.last_error().contains("result conversion failed"));
    }

    #[test]
    fn run_invokes_entry_point_once() {
        let fx = Fixture::new();
        let mut engine = fx.inline();
        assert_eq!(engine.run_source(MAIN).unwrap(), CompilationResult::Clean);
        assert_eq!(fx.hits(), 1);
        assert_eq!(engine.state(), UnitState::Invoked);
        assert_eq!(engine.last_error(), "");
        assert!(fx.console.lines().is_empty());
    }

    #[test]
    fn failed_compile_never_invokes() {
        let fx = Fixture::new();
        let mut engine = fx.inline();
        let src = format!("{MAIN}\nlet broken = ;");
        let err = engine.run_source(&src).unwrap_err();
        assert!(matches!(err, EngineError::CompilationFailed { .. }));
        assert_eq!(fx.hits(), 0);
        assert_eq!(engine.state(), UnitState::Failed);
        assert!(engine.last_error().starts_with("<inline>(2,"));
        assert!(fx.console.text().starts_with("ERROR!\n<inline>(2,"));
    }

    #[test]
    fn unmatched_brace_fails_with_diagnostics() {
        let fx = Fixture::new();
        let mut engine = fx.inline();
        let err = engine
            .run_source("namespace script { class Main { fn init() { Probe.hit(); } }")
            .unwrap_err();
        assert!(matches!(err, EngineError::CompilationFailed { .. }));
        assert!(!engine.last_error().is_empty());
        assert_eq!(fx.hits(), 0);
    }

    #[test]
    fn diagnostics_do_not_leak_between_runs() {
        let fx = Fixture::new();
        let mut engine = fx.inline();
        assert!(engine.run_source("let = 1;").is_err());
        assert!(!engine.last_error().is_empty());
        engine.run_source(MAIN).unwrap();
        assert_eq!(engine.last_error(), "");
        assert_eq!(engine.last_error(), "");
    }

    #[test]
    fn warnings_succeed_and_are_reported() {
        let fx = Fixture::new();
        let mut engine = fx.inline();
        let src = "namespace script { class Main { fn init() { let unused = 1; Probe.hit(); } } }";
        assert_eq!(engine.run_source(src).unwrap(), CompilationResult::Warnings(1));
        assert_eq!(fx.hits(), 1);
        assert!(engine.last_error().contains("warning[resolve]"));
        assert!(engine.last_error().contains("'unused'"));
    }

    #[test]
    fn missing_entry_point_is_reported() {
        let fx = Fixture::new();
        let mut engine = fx.inline();
        let err = engine.run_source("namespace script { class Other { } }").unwrap_err();
        assert!(matches!(err, EngineError::EntryPointMissing(_)));
        assert_eq!(engine.last_error(), "error: entry point script.Main is not declared");
    }

    #[test]
    fn loaded_but_unregistered_module_is_named() {
        let fx = Fixture::new();
        let mut engine = fx.inline();
        assert!(engine.evaluate("Secret.peek();").is_err());
        assert!(engine
            .last_error()
            .contains("module 'Secret' is loaded but not referenced by this engine"));
    }

    #[test]
    fn no_modules_without_registration() {
        let fx = Fixture::new();
        let mut engine = ScriptEngine::inline(fx.console.clone(), EngineConfig::default());
        assert!(engine.run_source(MAIN).is_err());
        assert_eq!(fx.hits(), 0);
    }

    #[test]
    fn entry_fault_is_caught() {
        let fx = Fixture::new();
        let mut engine = fx.inline();
        let src = "namespace script { class Main { fn init() { let zero = 0; Probe.hit(); return 1 / zero; } } }";
        let err = engine.run_source(src).unwrap_err();
        assert!(matches!(err, EngineError::InvocationFault(_)));
        assert_eq!(engine.state(), UnitState::InvokeFailed);
        assert!(engine.last_error().contains("Attempted to divide by zero"));
        assert!(engine.last_error().contains("script.Main.init"));
        // Still usable afterwards.
        assert_eq!(engine.evaluate("2 + 2").unwrap(), Some(Value::Int(4)));
    }

    #[test]
    fn unloaded_module_faults_instead_of_panicking() {
        let mut fx = Fixture::new();
        let mut engine = fx.inline();
        engine.evaluate("fn ping() { Probe.hit(); }").unwrap();
        assert!(fx.catalog.unload("Probe"));
        let err = engine.evaluate("ping();").unwrap_err();
        assert!(matches!(err, EngineError::InvocationFault(_)));
        assert!(engine.last_error().contains("unloaded"));
    }

    #[test]
    fn instruction_limit_stops_runaway_loops() {
        let fx = Fixture::new();
        let mut engine = fx.inline_with(EngineConfig {
            warning_level: 2,
            instruction_limit: Some(1_000),
        });
        let err = engine.evaluate("while true { }").unwrap_err();
        assert!(matches!(err, EngineError::InvocationFault(_)));
        assert!(engine.last_error().contains("Instruction limit of 1000 exceeded"));
    }

    #[test]
    fn deeply_nested_source_is_a_compile_error() {
        let fx = Fixture::new();
        let mut engine = fx.inline();
        let n = 10_000;
        let parens = format!("{}1{};", "(".repeat(n), ")".repeat(n));
        let err = engine.evaluate(&parens).unwrap_err();
        assert!(matches!(err, EngineError::CompilationFailed { .. }));
        assert!(engine.last_error().contains("nested too deeply"));

        let blocks = format!("{}{}", "{".repeat(1_000), "}".repeat(1_000));
        let err = engine.evaluate(&blocks).unwrap_err();
        assert!(matches!(err, EngineError::CompilationFailed { .. }));

        assert_eq!(engine.evaluate("((1 + 1));").unwrap(), Some(Value::Int(2)));
    }

    #[test]
    fn later_declarations_replace_earlier_ones() {
        let fx = Fixture::new();
        let mut engine = fx.inline();
        engine.evaluate("fn answer() { return 1; }").unwrap();
        engine.evaluate("fn answer() { return 2; }").unwrap();
        assert_eq!(engine.evaluate_as::<i64>("answer()").unwrap(), Some(2));
    }

    #[test]
    fn wrong_mode_is_rejected() {
        let fx = Fixture::new();
        let dir = tempfile::tempdir().unwrap();
        let mut project = fx.project(dir.path());
        assert!(matches!(
            project.evaluate("1"),
            Err(EngineError::WrongMode { operation: "evaluate", mode: "project" })
        ));
        let mut inline = fx.inline();
        assert!(matches!(inline.run(), Err(EngineError::WrongMode { .. })));
        assert!(!inline.last_error().is_empty());
    }

    #[test]
    fn project_without_manifest_stays_idle() {
        let fx = Fixture::new();
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "main.ms", MAIN);
        let mut engine = fx.project(dir.path());
        let err = engine.run().unwrap_err();
        assert!(matches!(err, EngineError::NoManifestFound { .. }));
        assert_eq!(engine.state(), UnitState::Idle);
        assert!(engine.last_error().contains("no *.msproj manifest"));
        assert_eq!(fx.hits(), 0);
    }

    #[test]
    fn project_with_missing_file() {
        let fx = Fixture::new();
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "app.msproj",
            r#"<Project><Compile Include="main.ms"/><Compile Include="gone.ms"/></Project>"#,
        );
        write(dir.path(), "main.ms", MAIN);
        let mut engine = fx.project(dir.path());
        assert!(matches!(engine.run(), Err(EngineError::SourceFileMissing { .. })));
        assert_eq!(fx.hits(), 0);
    }

    #[test]
    fn two_file_project_shares_types() {
        let fx = Fixture::new();
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "app.msproj",
            r#"<Project><ItemGroup>
                <Compile Include="lib.ms"/>
                <Compile Include="main.ms"/>
            </ItemGroup></Project>"#,
        );
        write(
            dir.path(),
            "lib.ms",
            "namespace lib { class Greeter { fn greet() { Probe.hit(); return \"hi\"; } } }",
        );
        write(
            dir.path(),
            "main.ms",
            "namespace script { class Main { fn init() { let g = new lib.Greeter(); g.greet(); } } }",
        );
        let mut engine = fx.project(dir.path());
        assert_eq!(engine.run().unwrap(), CompilationResult::Clean);
        assert_eq!(fx.hits(), 1);

        // Runs are repeatable against the warm context.
        assert_eq!(engine.run().unwrap(), CompilationResult::Clean);
        assert_eq!(fx.hits(), 2);
    }

    #[test]
    fn project_errors_name_their_file() {
        let fx = Fixture::new();
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "app.msproj",
            r#"<Project><Compile Include="a.ms"/><Compile Include="b.ms"/></Project>"#,
        );
        write(dir.path(), "a.ms", MAIN);
        write(dir.path(), "b.ms", "\nlet y = missing;");
        let mut engine = fx.project(dir.path());
        assert!(engine.run().is_err());
        assert!(engine
            .last_error()
            .starts_with("b.ms(2,9): error[resolve]: The name 'missing' does not exist in the current context"));
    }
}
