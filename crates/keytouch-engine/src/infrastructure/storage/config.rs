//! TOML-based configuration persistence for the engine.
//!
//! Reads and writes `EngineConfig` to the platform-appropriate config file:
//! - Windows:  `%APPDATA%\KeyTouch\config.toml`
//! - Linux:    `~/.config/keytouch/config.toml`
//! - macOS:    `~/Library/Application Support/KeyTouch/config.toml`
//!
//! # The file at a glance (for beginners)
//!
//! Three TOML tables, one per consumer: `[engine]` for the process itself,
//! `[humanize]` for the gesture handlers and `[script]` for the Lua sandboxes.
//! A typical hand-edited file:
//!
//! ```toml
//! [engine]
//! log_level = "debug"
//! keymap_path = "/home/me/keymaps/racing.json"
//!
//! [humanize]
//! random_offset = 20
//!
//! [script]
//! soft_timeout_ms = 10000
//! ```
//!
//! # Serde default values
//!
//! Every field carries `#[serde(default = "some_fn")]` (or `#[serde(default)]`),
//! so a missing file, a missing section or a missing key all fall back to the
//! built-in value.  Older config files keep working when new fields appear.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::application::settings::{HumanizeSettings, ScriptSettings};

/// Why the configuration could not be loaded or saved.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Neither `APPDATA`, `XDG_CONFIG_HOME` nor `HOME` is set.
    #[error("no config directory for this platform")]
    NoPlatformConfigDir,

    #[error("config I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config is not valid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("config could not be written as TOML: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub humanize: HumanizeSettings,
    #[serde(default)]
    pub script: ScriptSettings,
}

/// Process-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineSection {
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Key-map JSON loaded at start-up.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keymap_path: Option<PathBuf>,
    /// Directory `loadModule` and file scripts resolve against.  Defaults to
    /// `<config dir>/scripts`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_base_path: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            keymap_path: None,
            script_base_path: None,
        }
    }
}

impl EngineConfig {
    /// The configured script directory, or `<config dir>/scripts`.
    pub fn script_base_path(&self) -> PathBuf {
        match &self.engine.script_base_path {
            Some(path) => path.clone(),
            None => config_dir()
                .map(|dir| dir.join("scripts"))
                .unwrap_or_else(|_| PathBuf::from("scripts")),
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads `EngineConfig` from the platform config file.
///
/// # Errors
///
/// See [`load_config_from`].
pub fn load_config() -> Result<EngineConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Loads `EngineConfig` from `path`, returning the defaults if the file does
/// not exist yet.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<EngineConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no config file, using defaults");
            Ok(EngineConfig::default())
        }
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Persists `config` to the platform config file.
///
/// # Errors
///
/// See [`save_config_to`].
pub fn save_config(config: &EngineConfig) -> Result<(), ConfigError> {
    save_config_to(config, &config_file_path()?)
}

/// Persists `config` to `path`, creating the directory if needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config_to(config: &EngineConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolves the platform config base directory including the `KeyTouch`
/// subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("KeyTouch"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("keytouch"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME")
            .map(|h| PathBuf::from(h).join("Library").join("Application Support").join("KeyTouch"))
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(tag: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("keytouch_{tag}_{}_{nanos}", std::process::id()))
    }

    #[test]
    fn test_engine_config_defaults() {
        // Arrange / Act
        let cfg = EngineConfig::default();

        // Assert
        assert_eq!(cfg.engine.log_level, "info");
        assert_eq!(cfg.engine.keymap_path, None);
        assert_eq!(cfg.script.soft_timeout_ms, 30_000);
        assert_eq!(cfg.humanize.random_offset, 0);
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let cfg: EngineConfig = toml::from_str("").expect("deserialize empty");

        assert_eq!(cfg, EngineConfig::default());
    }

    #[test]
    fn test_partial_sections_override_defaults() {
        // Arrange
        let toml_str = r#"
[engine]
log_level = "debug"
[script]
hard_timeout_ms = 250
[humanize]
random_offset = 40
"#;

        // Act
        let cfg: EngineConfig = toml::from_str(toml_str).expect("deserialize partial");

        // Assert
        assert_eq!(cfg.engine.log_level, "debug");
        assert_eq!(cfg.script.hard_timeout_ms, 250);
        // Unspecified fields keep their defaults
        assert_eq!(cfg.script.soft_timeout_ms, 30_000);
        assert_eq!(cfg.humanize.random_offset, 40);
        assert_eq!(cfg.humanize.steer_wheel_smooth, 50);
    }

    #[test]
    fn test_unset_paths_are_omitted_from_toml() {
        let toml_str = toml::to_string_pretty(&EngineConfig::default()).expect("serialize");

        assert!(!toml_str.contains("keymap_path"));
        assert!(!toml_str.contains("script_base_path"));
    }

    #[test]
    fn test_invalid_toml_returns_parse_error() {
        let dir = temp_dir("bad");
        let path = dir.join("config.toml");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(&path, "[[[ not valid toml").unwrap();

        let result = load_config_from(&path);

        assert!(matches!(result, Err(ConfigError::Parse(_))));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_returns_default_when_file_absent() {
        let path = PathBuf::from("/nonexistent/path/that/cannot/exist/config.toml");

        let cfg = load_config_from(&path).unwrap();

        assert_eq!(cfg, EngineConfig::default());
    }

    #[test]
    fn test_save_and_load_round_trip_via_temp_dir() {
        // Arrange
        let dir = temp_dir("round_trip");
        let path = dir.join("nested").join("config.toml");
        let mut cfg = EngineConfig::default();
        cfg.engine.keymap_path = Some(PathBuf::from("maps/racing.json"));
        cfg.script.max_touch_points = 4;

        // Act
        save_config_to(&cfg, &path).unwrap();
        let loaded = load_config_from(&path).unwrap();

        // Assert
        assert_eq!(loaded, cfg);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_explicit_script_base_path_wins() {
        let mut cfg = EngineConfig::default();
        cfg.engine.script_base_path = Some(PathBuf::from("/opt/scripts"));

        assert_eq!(cfg.script_base_path(), PathBuf::from("/opt/scripts"));
    }

    #[test]
    fn test_config_file_path_ends_with_config_toml() {
        if let Ok(path) = config_file_path() {
            assert!(
                path.ends_with("config.toml"),
                "config file must be named config.toml, got {path:?}"
            );
        }
        // NoPlatformConfigDir in a stripped CI env is also acceptable.
    }
}
