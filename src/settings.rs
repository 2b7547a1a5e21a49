use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::engine::EngineConfig;
use crate::error::SettingsError;
use crate::paths;
use crate::stdlib::DEFAULT_ALLOWED_MODULES;
use crate::trigger::{self, KeyCode};

const SETTINGS_VERSION: u32 = 1;

/// Loader preferences stored as JSON in the config directory. Missing fields
/// take their defaults, so older files keep loading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderSettings {
    pub version: u32,
    /// Key name, matched case-insensitively. Bad names fall back to LeftAlt.
    pub script_key: String,
    /// Inline-mode script file.
    pub file_path: PathBuf,
    /// When set, runs compile this project directory instead of `file_path`.
    pub project_dir: Option<PathBuf>,
    pub allowed_modules: Vec<String>,
    pub warning_level: u8,
    pub instruction_limit: Option<u64>,
}

impl Default for LoaderSettings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            script_key: trigger::DEFAULT_KEY.name().to_string(),
            file_path: PathBuf::from(paths::DEFAULT_SCRIPT_FILE),
            project_dir: None,
            allowed_modules: DEFAULT_ALLOWED_MODULES.iter().map(ToString::to_string).collect(),
            warning_level: EngineConfig::default().warning_level,
            instruction_limit: None,
        }
    }
}

impl LoaderSettings {
    pub fn key(&self) -> KeyCode {
        trigger::resolve_key(Some(&self.script_key))
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            warning_level: self.warning_level,
            instruction_limit: self.instruction_limit,
        }
    }
}

/// Write via a sibling temp file and rename, so readers never see a torn file.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<(), SettingsError> {
    let mut tmp_name = OsString::from(path.file_name().unwrap_or_default());
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(&tmp_name);

    let mut file = fs::File::create(&tmp_path)?;
    file.write_all(data)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Load settings from the config directory. Returns None if no settings file
/// exists or it cannot be parsed.
pub fn load_settings(config_dir: &Path) -> Option<LoaderSettings> {
    let path = paths::settings_path(config_dir);
    if !path.exists() {
        return None;
    }
    match read_settings(&path) {
        Ok(settings) => Some(settings),
        Err(e) => {
            log::warn!("ignoring unreadable settings {}: {e}", path.display());
            None
        }
    }
}

fn read_settings(path: &Path) -> Result<LoaderSettings, SettingsError> {
    let data = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}

/// Load settings, writing the defaults first if the file does not exist yet.
/// An unreadable file is left alone and the defaults are used.
pub fn load_or_init(config_dir: &Path) -> Result<LoaderSettings, SettingsError> {
    if let Some(settings) = load_settings(config_dir) {
        return Ok(settings);
    }
    let settings = LoaderSettings::default();
    if !paths::settings_path(config_dir).exists() {
        save_settings(config_dir, &settings)?;
        log::debug!("wrote default settings to {}", config_dir.display());
    }
    Ok(settings)
}

/// Save settings to the config directory.
pub fn save_settings(config_dir: &Path, settings: &LoaderSettings) -> Result<(), SettingsError> {
    fs::create_dir_all(config_dir)?;
    let json = serde_json::to_string_pretty(settings)?;
    atomic_write(&paths::settings_path(config_dir), json.as_bytes())
}
