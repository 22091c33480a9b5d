use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {config_path}: {source}")]
    ConfigReadError {
        config_path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {config_path}: {source}")]
    ConfigParseError {
        config_path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Unknown editor type '{0}' in config (expected textarea, tiptap or novel)")]
    UnknownEditor(String),
}

const KNOWN_EDITORS: [&str; 3] = ["textarea", "tiptap", "novel"];

/// Per-backend snapshot-poll intervals in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub textarea_ms: u64,
    pub tiptap_ms: u64,
    pub novel_ms: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            textarea_ms: 100,
            tiptap_ms: 100,
            novel_ms: 200,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Characters of context captured on each side of a selection.
    pub context_radius: usize,
    pub preserve_formatting: bool,
    /// Forces the editor type instead of detecting it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_editor: Option<String>,
    pub poll: PollConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            context_radius: 100,
            preserve_formatting: true,
            default_editor: None,
            poll: PollConfig::default(),
        }
    }
}

impl Config {
    pub fn load_from_path<P: AsRef<Path>>(config_path: P) -> Result<Option<Self>, ConfigError> {
        let config_path = config_path.as_ref();
        if !config_path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(config_path).map_err(|source| {
            ConfigError::ConfigReadError {
                config_path: config_path.to_path_buf(),
                source,
            }
        })?;

        let config: Config =
            toml::from_str(&content).map_err(|source| ConfigError::ConfigParseError {
                config_path: config_path.to_path_buf(),
                source,
            })?;

        if let Some(editor) = &config.default_editor
            && !KNOWN_EDITORS.contains(&editor.as_str())
        {
            return Err(ConfigError::UnknownEditor(editor.clone()));
        }

        Ok(Some(config))
    }

    pub fn load() -> Result<Option<Self>, ConfigError> {
        let config_path = Self::config_path();
        Self::load_from_path(&config_path)
    }

    /// Load from the default location, falling back to defaults when absent.
    pub fn load_or_default() -> Result<Self, ConfigError> {
        Ok(Self::load()?.unwrap_or_default())
    }

    pub fn save_to_path<P: AsRef<Path>>(&self, config_path: P) -> anyhow::Result<()> {
        let config_path = config_path.as_ref();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        self.save_to_path(&config_path)
    }

    pub fn config_path() -> PathBuf {
        let config_dir = shellexpand::tilde("~/.config/content-bridge");
        PathBuf::from(config_dir.as_ref()).join("config.toml")
    }

    /// Expand `~` and `$VARS` in a user-supplied config path.
    pub fn expand_path(path: &Path) -> Option<PathBuf> {
        let path_str = path.to_string_lossy();
        match shellexpand::full(&path_str) {
            Ok(expanded) => Some(PathBuf::from(expanded.as_ref())),
            Err(_) => None,
        }
    }

    /// Poll interval for a backend name; unknown names get the textarea rate.
    pub fn poll_interval(&self, editor: &str) -> Duration {
        let millis = match editor {
            "tiptap" => self.poll.tiptap_ms,
            "novel" => self.poll.novel_ms,
            _ => self.poll.textarea_ms,
        };
        Duration::from_millis(millis)
    }
}
