//! Configuration loading for meshboard.
//!
//! Everything lives under one home directory (`$MESHBOARD_HOME`, default
//! `~/.meshboard`): `settings.json`, `queue/`, `data/` and `logs/`.
//! Relative paths in settings are resolved against the home directory.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::transport::TransportKind;

/// Resolve the home directory: explicit override, else `~/.meshboard`.
pub fn resolve_home_dir(home_override: Option<&Path>) -> Result<PathBuf> {
    if let Some(home) = home_override {
        return Ok(home.to_path_buf());
    }

    let home = directories::UserDirs::new()
        .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))?;

    Ok(home.home_dir().join(".meshboard"))
}

/// Queue configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct QueueSettings {
    pub dir: Option<PathBuf>,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    100
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            dir: None,
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// Telegram configuration.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct TelegramSettings {
    pub bot_token: Option<String>,
}

/// Transport configuration.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct TransportSettings {
    #[serde(default)]
    pub kind: TransportKind,
    #[serde(default)]
    pub telegram: TelegramSettings,
}

/// meshboard settings (`settings.json`).
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct Settings {
    #[serde(default)]
    pub queue: QueueSettings,

    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    #[serde(default)]
    pub transport: TransportSettings,
}

fn validate_settings(settings: &Settings) -> Result<()> {
    if settings.queue.poll_interval_ms == 0 {
        return Err(Error::Config(
            "queue.poll_interval_ms must be greater than zero".to_string(),
        ));
    }

    if let (Some(queue_dir), Some(data_dir)) = (&settings.queue.dir, &settings.data_dir) {
        if queue_dir == data_dir {
            return Err(Error::Config(
                "queue.dir and data_dir must not be the same directory".to_string(),
            ));
        }
    }
    Ok(())
}

/// Loaded settings together with the home directory they belong to.
#[derive(Clone, Debug)]
pub struct Config {
    pub home: PathBuf,
    pub settings: Settings,
}

impl Config {
    /// Load `<home>/settings.json`; a missing file yields defaults.
    pub fn load(home: impl Into<PathBuf>) -> Result<Self> {
        let home = home.into();
        let path = home.join("settings.json");

        let settings = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let settings: Settings = serde_json::from_str(&content)
                .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
            tracing::debug!("Loaded settings from {}", path.display());
            settings
        } else {
            tracing::debug!("No settings at {}, using defaults", path.display());
            Settings::default()
        };

        validate_settings(&settings)?;
        Ok(Self { home, settings })
    }

    fn resolve(&self, configured: Option<&PathBuf>, default: &str) -> PathBuf {
        match configured {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => self.home.join(path),
            None => self.home.join(default),
        }
    }

    pub fn queue_dir(&self) -> PathBuf {
        self.resolve(self.settings.queue.dir.as_ref(), "queue")
    }

    pub fn data_dir(&self) -> PathBuf {
        self.resolve(self.settings.data_dir.as_ref(), "data")
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.settings.queue.poll_interval_ms)
    }
}

/// Log directory for a home directory.
pub fn log_dir(home: &Path) -> PathBuf {
    home.join("logs")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_settings_use_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::load(temp_dir.path()).unwrap();

        assert_eq!(config.queue_dir(), temp_dir.path().join("queue"));
        assert_eq!(config.data_dir(), temp_dir.path().join("data"));
        assert_eq!(config.poll_interval(), Duration::from_millis(100));
        assert_eq!(config.settings.transport.kind, TransportKind::Stdio);
    }

    #[test]
    fn test_settings_file() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(
            temp_dir.path().join("settings.json"),
            r#"{
                "queue": { "dir": "spool", "poll_interval_ms": 250 },
                "data_dir": "/var/lib/meshboard",
                "transport": { "kind": "telegram", "telegram": { "bot_token": "123:abc" } }
            }"#,
        )
        .unwrap();

        let config = Config::load(temp_dir.path()).unwrap();
        assert_eq!(config.queue_dir(), temp_dir.path().join("spool"));
        assert_eq!(config.data_dir(), PathBuf::from("/var/lib/meshboard"));
        assert_eq!(config.poll_interval(), Duration::from_millis(250));
        assert_eq!(config.settings.transport.kind, TransportKind::Telegram);
        assert_eq!(
            config.settings.transport.telegram.bot_token.as_deref(),
            Some("123:abc")
        );
    }

    #[test]
    fn test_rejects_zero_poll_interval() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(
            temp_dir.path().join("settings.json"),
            r#"{ "queue": { "poll_interval_ms": 0 } }"#,
        )
        .unwrap();

        assert!(matches!(Config::load(temp_dir.path()), Err(Error::Config(_))));
    }

    #[test]
    fn test_rejects_shared_queue_and_data_dir() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(
            temp_dir.path().join("settings.json"),
            r#"{ "queue": { "dir": "store" }, "data_dir": "store" }"#,
        )
        .unwrap();

        assert!(matches!(Config::load(temp_dir.path()), Err(Error::Config(_))));
    }

    #[test]
    fn test_malformed_settings() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("settings.json"), "{ nope").unwrap();

        assert!(matches!(Config::load(temp_dir.path()), Err(Error::Config(_))));
    }

    #[test]
    fn test_home_override() {
        let home = resolve_home_dir(Some(Path::new("/tmp/mb"))).unwrap();
        assert_eq!(home, PathBuf::from("/tmp/mb"));
    }
}
