use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use script_loader::console::{Console, StdConsole};
use script_loader::engine::modules::HostCatalog;
use script_loader::loader::ScriptLoader;
use script_loader::paths;
use script_loader::settings::{self, LoaderSettings};
use script_loader::stdlib;
use script_loader::trigger::{KeyCode, KeyEvent};
use script_loader::ScriptEngine;

// ── CLI argument parsing ─────────────────────────────────────────

#[derive(Parser)]
#[command(name = "script-loader", about = "Compile and run ModScript against host modules", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config directory holding settings.json
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Trigger key override
    #[arg(long, global = true)]
    key: Option<String>,

    /// Allow a host module (repeatable). Replaces the configured allow-list
    #[arg(long = "allow", global = true)]
    allow: Vec<String>,

    /// 0 = errors only, 1 = unreachable code, 2 = also unused locals
    #[arg(long, global = true)]
    warning_level: Option<u8>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a script file once (defaults to the configured file)
    Run { file: Option<PathBuf> },
    /// Run the project in DIR once
    Project { dir: PathBuf },
    /// Evaluate code and print its value
    Eval { code: String },
    /// Evaluate lines from stdin against one warm engine
    Repl,
    /// Read key events from stdin ("<Key> [down|up]") and run on each press
    Listen,
    /// List host modules and mark the allowed ones
    Modules,
    /// Print the effective settings
    Settings,
}

// ── Settings ─────────────────────────────────────────────────────

fn effective_settings(cli: &Cli) -> LoaderSettings {
    let config_dir = cli.config_dir.clone().unwrap_or_else(paths::default_config_dir);
    let mut settings = settings::load_or_init(&config_dir).unwrap_or_else(|e| {
        log::warn!("cannot initialize settings in {}: {e}", config_dir.display());
        LoaderSettings::default()
    });
    if let Some(key) = &cli.key {
        settings.script_key.clone_from(key);
    }
    if !cli.allow.is_empty() {
        settings.allowed_modules.clone_from(&cli.allow);
    }
    if let Some(level) = cli.warning_level {
        settings.warning_level = level;
    }
    settings
}

// ── Commands ─────────────────────────────────────────────────────

fn run_once(settings: LoaderSettings, console: Arc<dyn Console>) -> i32 {
    let loader = ScriptLoader::new(settings, console);
    i32::from(loader.run_once().is_err())
}

fn inline_engine(settings: &LoaderSettings, console: &Arc<dyn Console>) -> (ScriptEngine, HostCatalog) {
    let catalog = stdlib::standard_catalog(Arc::clone(console));
    let mut engine = ScriptEngine::inline(Arc::clone(console), settings.engine_config());
    engine.register_modules(&catalog, &settings.allowed_modules);
    (engine, catalog)
}

fn eval(settings: &LoaderSettings, console: &Arc<dyn Console>, code: &str) -> i32 {
    let (mut engine, _catalog) = inline_engine(settings, console);
    match engine.evaluate(code) {
        Ok(Some(value)) => {
            console.write_line(&value.to_string());
            0
        }
        Ok(None) => 0,
        Err(_) => 1,
    }
}

fn repl(settings: &LoaderSettings, console: &Arc<dyn Console>) -> i32 {
    let (mut engine, _catalog) = inline_engine(settings, console);
    repl_loop(&mut engine, console.as_ref(), io::stdin().lock(), io::stdout())
}

/// Prompt on `out`, evaluate each line of `input`, print values to the console.
/// Ends on EOF or once the prompt can no longer be written.
fn repl_loop(engine: &mut ScriptEngine, console: &dyn Console, mut input: impl BufRead, mut out: impl Write) -> i32 {
    loop {
        if let Err(e) = write!(out, "> ").and_then(|()| out.flush()) {
            log::debug!("repl prompt not written, stopping: {e}");
            return 0;
        }
        let mut line = String::new();
        match input.read_line(&mut line) {
            Ok(0) => return 0,
            Ok(_) => {}
            Err(e) => {
                eprintln!("stdin: {e}");
                return 1;
            }
        }
        if line.trim().is_empty() {
            continue;
        }
        if let Ok(Some(value)) = engine.evaluate(&line) {
            console.write_line(&value.to_string());
        }
    }
}

/// Parse `<Key> [down|up]`. A bare key name is a full press.
fn parse_key_line(line: &str) -> Option<Vec<KeyEvent>> {
    let mut parts = line.split_whitespace();
    let key: KeyCode = match parts.next()?.parse() {
        Ok(key) => key,
        Err(e) => {
            log::warn!("{e}");
            return None;
        }
    };
    match parts.next().map(str::to_ascii_lowercase).as_deref() {
        None => Some(vec![KeyEvent::down(key), KeyEvent::up(key)]),
        Some("down") => Some(vec![KeyEvent::down(key)]),
        Some("up") => Some(vec![KeyEvent::up(key)]),
        Some(other) => {
            log::warn!("unknown key state '{other}'");
            None
        }
    }
}

fn listen(settings: LoaderSettings, console: Arc<dyn Console>) -> i32 {
    let mut loader = ScriptLoader::new(settings, console);
    eprintln!("listening for {} on stdin", loader.key());
    for line in io::stdin().lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                eprintln!("stdin: {e}");
                return 1;
            }
        };
        for event in parse_key_line(&line).unwrap_or_default() {
            loader.handle(event);
        }
    }
    0
}

fn modules(settings: &LoaderSettings, console: &Arc<dyn Console>) -> i32 {
    let catalog = stdlib::standard_catalog(Arc::clone(console));
    for module in catalog.iter() {
        let marker = if settings.allowed_modules.iter().any(|m| m == module.name()) {
            "*"
        } else {
            " "
        };
        let functions: Vec<_> = module.functions().map(|f| format!("{}({})", f.name, f.arity)).collect();
        console.write_line(&format!("{marker} {}: {}", module.name(), functions.join(", ")));
    }
    0
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let mut settings = effective_settings(&cli);
    let console: Arc<dyn Console> = Arc::new(StdConsole);

    let code = match cli.command {
        Commands::Run { file } => {
            if let Some(file) = file {
                settings.file_path = file;
            }
            settings.project_dir = None;
            run_once(settings, console)
        }
        Commands::Project { dir } => {
            settings.project_dir = Some(dir);
            run_once(settings, console)
        }
        Commands::Eval { code } => eval(&settings, &console, &code),
        Commands::Repl => repl(&settings, &console),
        Commands::Listen => listen(settings, console),
        Commands::Modules => modules(&settings, &console),
        Commands::Settings => match serde_json::to_string_pretty(&settings) {
            Ok(json) => {
                console.write_line(&json);
                0
            }
            Err(e) => {
                eprintln!("{e}");
                1
            }
        },
    };
    process::exit(code);
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use script_loader::console::MemoryConsole;

    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }
    }

    #[test]
    fn repl_evaluates_lines_against_one_engine() {
        let memory = Arc::new(MemoryConsole::new());
        let console: Arc<dyn Console> = memory.clone();
        let (mut engine, _catalog) = inline_engine(&LoaderSettings::default(), &console);
        let mut prompts = Vec::new();
        let input = "let x = 2;\n\nx * 21\n".as_bytes();
        assert_eq!(repl_loop(&mut engine, console.as_ref(), input, &mut prompts), 0);
        assert_eq!(memory.lines(), vec!["42"]);
        assert_eq!(prompts, b"> > > > ");
    }

    #[test]
    fn repl_stops_when_output_is_closed() {
        let memory = Arc::new(MemoryConsole::new());
        let console: Arc<dyn Console> = memory.clone();
        let (mut engine, _catalog) = inline_engine(&LoaderSettings::default(), &console);
        assert_eq!(repl_loop(&mut engine, console.as_ref(), "1 + 1\n".as_bytes(), ClosedPipe), 0);
        assert!(memory.lines().is_empty());
    }

    #[test]
    fn key_lines() {
        assert_eq!(
            parse_key_line("leftalt").unwrap(),
            vec![KeyEvent::down(KeyCode::LeftAlt), KeyEvent::up(KeyCode::LeftAlt)]
        );
        assert_eq!(parse_key_line("F5 DOWN").unwrap(), vec![KeyEvent::down(KeyCode::F5)]);
        assert!(parse_key_line("nokey").is_none());
        assert!(parse_key_line("F5 sideways").is_none());
        assert!(parse_key_line("   ").is_none());
    }

    #[test]
    fn flags_override_settings() {
        let dir = tempfile::tempdir().unwrap();
        let cli = Cli::parse_from([
            "script-loader",
            "--config-dir",
            dir.path().to_str().unwrap(),
            "--allow",
            "Math",
            "--allow",
            "Text",
            "--key",
            "F2",
            "modules",
        ]);
        let settings = effective_settings(&cli);
        assert_eq!(settings.allowed_modules, vec!["Math", "Text"]);
        assert_eq!(settings.key(), KeyCode::F2);
        assert!(paths::settings_path(dir.path()).exists());
    }
}
