//! Centralized path definitions for the loader's files.
//!
//! No other module should hard-code these names.

use std::path::{Path, PathBuf};

// ── Leaf filenames ───────────────────────────────────────────────

pub const SETTINGS_FILE: &str = "settings.json";
/// Inline-mode script read on every trigger unless settings say otherwise.
pub const DEFAULT_SCRIPT_FILE: &str = "Mod.ms";

// ── Directories ──────────────────────────────────────────────────

/// Config directory used when neither the CLI nor the environment names one.
pub const DEFAULT_CONFIG_DIR: &str = ".script-loader";
pub const CONFIG_DIR_ENV: &str = "SCRIPT_LOADER_CONFIG_DIR";

pub fn settings_path(config_dir: &Path) -> PathBuf {
    config_dir.join(SETTINGS_FILE)
}

/// `$SCRIPT_LOADER_CONFIG_DIR`, else `.script-loader` under the working
/// directory.
pub fn default_config_dir() -> PathBuf {
    std::env::var_os(CONFIG_DIR_ENV)
        .filter(|dir| !dir.is_empty())
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_DIR), PathBuf::from)
}
