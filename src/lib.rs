//! Dynamic script hosting: compile ModScript sources at runtime against a
//! whitelisted set of host modules, run the `script.Main` entry point and
//! report diagnostics without taking the host down.

pub mod console;
pub mod dsl;
pub mod engine;
pub mod error;
pub mod loader;
pub mod paths;
pub mod settings;
pub mod stdlib;
pub mod trigger;

pub use engine::{CompilationResult, EngineConfig, ScriptEngine, UnitState};
pub use error::EngineError;
