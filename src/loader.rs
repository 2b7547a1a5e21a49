//! The trigger-driven loader: every press of the configured key builds a
//! fresh engine, runs the configured script or project, and frames the
//! output with banners.

use std::fs;
use std::sync::Arc;

use crate::console::{self, Console};
use crate::engine::modules::HostCatalog;
use crate::engine::{CompilationResult, ScriptEngine};
use crate::error::EngineError;
use crate::settings::LoaderSettings;
use crate::stdlib;
use crate::trigger::{EdgeTrigger, KeyCode, KeyEvent};

pub struct ScriptLoader {
    settings: LoaderSettings,
    trigger: EdgeTrigger,
    console: Arc<dyn Console>,
    catalog: HostCatalog,
}

impl ScriptLoader {
    /// A loader offering the standard host modules.
    pub fn new(settings: LoaderSettings, console: Arc<dyn Console>) -> Self {
        let catalog = stdlib::standard_catalog(Arc::clone(&console));
        Self::with_catalog(settings, console, catalog)
    }

    pub fn with_catalog(settings: LoaderSettings, console: Arc<dyn Console>, catalog: HostCatalog) -> Self {
        let trigger = EdgeTrigger::new(settings.key());
        Self {
            settings,
            trigger,
            console,
            catalog,
        }
    }

    pub fn settings(&self) -> &LoaderSettings {
        &self.settings
    }

    pub fn key(&self) -> KeyCode {
        self.trigger.key()
    }

    pub fn catalog(&self) -> &HostCatalog {
        &self.catalog
    }

    /// Load or unload host modules. Engines see the catalog as it is at the
    /// next trigger.
    pub fn catalog_mut(&mut self) -> &mut HostCatalog {
        &mut self.catalog
    }

    /// Feed a key event. Runs once on the trigger key's rising edge.
    pub fn handle(&mut self, event: KeyEvent) -> Option<Result<CompilationResult, EngineError>> {
        self.trigger.handle(event).then(|| self.run_once())
    }

    /// Run the configured script now, with banners.
    pub fn run_once(&self) -> Result<CompilationResult, EngineError> {
        let console = self.console.as_ref();
        console::loading_banner(console);
        let result = self.execute();
        match &result {
            Ok(outcome) => log::debug!("run finished: {outcome:?}"),
            Err(e) => log::debug!("run failed: {e}"),
        }
        console::done_banner(console);
        result
    }

    fn execute(&self) -> Result<CompilationResult, EngineError> {
        let config = self.settings.engine_config();
        if let Some(dir) = &self.settings.project_dir {
            let mut engine = ScriptEngine::project(dir, &self.catalog, Arc::clone(&self.console), config);
            return engine.run();
        }

        let path = &self.settings.file_path;
        let code = match fs::read_to_string(path) {
            Ok(code) => code,
            Err(source) => {
                let err = EngineError::Io {
                    path: path.clone(),
                    source,
                };
                console::report_error(self.console.as_ref(), &format!("error: {err}"));
                return Err(err);
            }
        };
        let mut engine = ScriptEngine::inline(Arc::clone(&self.console), config);
        engine.register_modules(&self.catalog, &self.settings.allowed_modules);
        engine.run_source(&code)
    }
}
