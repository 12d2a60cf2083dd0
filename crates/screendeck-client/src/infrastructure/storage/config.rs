//! TOML persistence for [`AppConfig`].
//!
//! The file lives in the platform config directory:
//! - Windows:  `%APPDATA%\ScreenDeck\config.toml`
//! - Linux:    `~/.config/screendeck/config.toml`
//! - macOS:    `~/Library/Application Support/ScreenDeck/config.toml`
//!
//! A missing file is not an error: the caller gets `AppConfig::default()` and
//! the file is created on the first save.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::debug;

use crate::application::settings::{AppConfig, ConfigError, ConfigStore};

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the base directory cannot
/// be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the default config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads the config at `path`, returning defaults if the file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// [`ConfigError::Parse`] if the TOML is malformed and
/// [`ConfigError::UnsupportedVersion`] for files written by a newer build.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => {
            let cfg: AppConfig = toml::from_str(&content)?;
            cfg.check_version()?;
            Ok(cfg)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no config file; using defaults");
            Ok(AppConfig::default())
        }
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Writes `config` to `path`, creating the parent directory if needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(path: &Path, config: &AppConfig) -> Result<(), ConfigError> {
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

fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("ScreenDeck"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("screendeck"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("ScreenDeck")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Stores ────────────────────────────────────────────────────────────────────

/// [`ConfigStore`] writing to a TOML file.
#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the platform default location.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoPlatformConfigDir`] if it cannot be resolved.
    pub fn default_location() -> Result<Self, ConfigError> {
        config_file_path().map(Self::at)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        load_config(&self.path)
    }
}

impl ConfigStore for FileConfigStore {
    fn save(&self, config: &AppConfig) -> Result<(), ConfigError> {
        save_config(&self.path, config)?;
        debug!(path = %self.path.display(), "config saved");
        Ok(())
    }
}

/// [`ConfigStore`] that keeps every saved snapshot in memory.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    saves: Mutex<Vec<AppConfig>>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn save_count(&self) -> usize {
        self.saves.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    /// The most recently saved config.
    pub fn last(&self) -> Option<AppConfig> {
        self.saves
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .last()
            .cloned()
    }
}

impl ConfigStore for MemoryConfigStore {
    fn save(&self, config: &AppConfig) -> Result<(), ConfigError> {
        self.saves
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(config.clone());
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
