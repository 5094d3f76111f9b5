//! On-disk configuration, loaded once at startup.
//!
//! Missing or unreadable files fall back to defaults and a default file is
//! written so users have something to edit. Out-of-range values are clamped
//! rather than rejected.

use std::path::{Path, PathBuf};

use log::{info, warn};

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub notifications: NotificationConfig,
    pub playback: PlaybackConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            notifications: NotificationConfig::default(),
            playback: PlaybackConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file name, resolved inside the data directory unless
    /// absolute.
    pub database_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_file: "library.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub dismiss_after_ms: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            dismiss_after_ms: crate::notifier::DISMISS_AFTER_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Volume applied to the session at startup, clamped to [0, 1].
    pub initial_volume: f64,
    /// How often a playing backend reports its position.
    pub progress_interval_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            initial_volume: 1.0,
            progress_interval_ms: 200,
        }
    }
}

impl Config {
    /// Reads the config at `path`, writing a default file when none exists.
    /// Parse failures fall back to defaults without overwriting the file.
    pub fn load_or_create(path: &Path) -> Config {
        let config = match std::fs::read_to_string(path) {
            Ok(raw) => match toml::from_str(&raw) {
                Ok(config) => config,
                Err(err) => {
                    warn!(
                        "Config: Could not parse {}, using defaults: {}",
                        path.display(),
                        err
                    );
                    Config::default()
                }
            },
            Err(_) => {
                let config = Config::default();
                if let Ok(serialized) = toml::to_string_pretty(&config) {
                    if let Some(parent) = path.parent() {
                        let _ = std::fs::create_dir_all(parent);
                    }
                    match std::fs::write(path, serialized) {
                        Ok(()) => info!("Config: Wrote defaults to {}", path.display()),
                        Err(err) => {
                            warn!("Config: Could not write {}: {}", path.display(), err)
                        }
                    }
                }
                config
            }
        };
        config.sanitized()
    }

    fn sanitized(mut self) -> Config {
        self.playback.initial_volume = self.playback.initial_volume.clamp(0.0, 1.0);
        if self.playback.progress_interval_ms == 0 {
            self.playback.progress_interval_ms = PlaybackConfig::default().progress_interval_ms;
        }
        if self.notifications.dismiss_after_ms == 0 {
            self.notifications.dismiss_after_ms = NotificationConfig::default().dismiss_after_ms;
        }
        if self.storage.database_file.trim().is_empty() {
            self.storage.database_file = StorageConfig::default().database_file;
        }
        self
    }

    /// Absolute path of the database file for this config.
    pub fn database_path(&self, data_dir: &Path) -> PathBuf {
        let file = Path::new(&self.storage.database_file);
        if file.is_absolute() {
            file.to_path_buf()
        } else {
            data_dir.join(file)
        }
    }
}

/// Per-user data directory for the database and config file.
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tunevault")
}
