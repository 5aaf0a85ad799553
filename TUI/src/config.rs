// Application configuration.
//
// Reads `medrag.toml` (or the path in `--config` / `MEDRAG_CONFIG`), then
// applies environment overrides. Every section has defaults, so running
// without a file is fine.

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "medrag.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub ui: UiConfig,
    pub session: SessionConfig,
    pub export: ExportConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    /// Retrieval depth sent with each question; the server default applies when unset.
    pub top_k: Option<u32>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            top_k: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    /// Main loop tick rate in milliseconds (target 60 FPS = ~16ms)
    pub tick_rate_ms: u64,

    /// How long status-line messages stay visible
    pub status_timeout_ms: u64,

    /// How long the upload badge shows "Analysis Ready" before going idle
    pub upload_success_display_ms: u64,

    /// How long the upload badge shows "Upload Failed" before going idle
    pub upload_error_display_ms: u64,

    /// Lines to scroll per key press
    pub scroll_step: usize,

    /// Width of the report sidebar in characters
    pub sidebar_width: u16,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            tick_rate_ms: 16,
            status_timeout_ms: 3000,
            upload_success_display_ms: 2500,
            upload_error_display_ms: 3000,
            scroll_step: 3,
            sidebar_width: 34,
        }
    }
}

impl UiConfig {
    pub fn tick_rate(&self) -> Duration {
        Duration::from_millis(self.tick_rate_ms.max(1))
    }

    pub fn status_timeout(&self) -> Duration {
        Duration::from_millis(self.status_timeout_ms)
    }

    pub fn upload_success_display(&self) -> Duration {
        Duration::from_millis(self.upload_success_display_ms)
    }

    pub fn upload_error_display(&self) -> Duration {
        Duration::from_millis(self.upload_error_display_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Start a fresh conversation whenever a new report is analysed.
    pub clear_history_on_upload: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub dir: PathBuf,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("outputs"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub enabled: bool,
    pub file: PathBuf,
    /// Filter used when RUST_LOG is not set
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            file: PathBuf::from("medrag.log"),
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration. An explicitly named file (argument or
    /// `MEDRAG_CONFIG`) must exist; the default `medrag.toml` is optional.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();

        let (path, required) = match explicit {
            Some(path) => (path.to_path_buf(), true),
            None => match std::env::var("MEDRAG_CONFIG") {
                Ok(path) => (PathBuf::from(path), true),
                Err(_) => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
            },
        };

        let mut config = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            Self::from_toml_str(&content).with_context(|| format!("parsing {}", path.display()))?
        } else if required {
            bail!("Config file not found: {}", path.display());
        } else {
            Self::default()
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `MEDRAG_API_URL` and `MEDRAG_LOG` overrides.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("MEDRAG_API_URL").filter(|v| !v.trim().is_empty()) {
            self.api.base_url = url;
        }
        if let Some(level) = lookup("MEDRAG_LOG").filter(|v| !v.trim().is_empty()) {
            self.log.level = level;
        }
    }
}
