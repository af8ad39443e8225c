use facegate_core::{FrameSize, DEFAULT_LABEL, DEFAULT_THRESHOLD};
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Session configuration, loaded from environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Euclidean distance below which a probe is accepted.
    pub threshold: f32,
    /// Identity tag attached to the enrolled descriptor.
    pub label: String,
    /// Size of the surface the overlay is drawn on.
    pub display: FrameSize,
    /// Display refresh rate driving the verification loop.
    pub refresh_hz: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            label: DEFAULT_LABEL.to_string(),
            display: FrameSize::new(480, 360),
            refresh_hz: 60,
        }
    }
}

impl SessionConfig {
    /// Load configuration from `FACEGATE_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            threshold: env_f32("FACEGATE_THRESHOLD", defaults.threshold),
            label: std::env::var("FACEGATE_LABEL").unwrap_or(defaults.label),
            display: FrameSize::new(
                env_u32("FACEGATE_DISPLAY_WIDTH", defaults.display.width),
                env_u32("FACEGATE_DISPLAY_HEIGHT", defaults.display.height),
            ),
            refresh_hz: env_u32("FACEGATE_REFRESH_HZ", defaults.refresh_hz),
        }
    }

    /// Environment first, then the optional TOML file on top.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Self::from_env();
        if let Some(path) = path {
            let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.display().to_string(),
                source,
            })?;
            let overrides: ConfigOverrides = toml::from_str(&text)?;
            overrides.apply(&mut config);
            tracing::debug!(path = %path.display(), "applied config file");
        }
        Ok(config)
    }
}

/// Optional values from a TOML config file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigOverrides {
    pub threshold: Option<f32>,
    pub label: Option<String>,
    pub display_width: Option<u32>,
    pub display_height: Option<u32>,
    pub refresh_hz: Option<u32>,
}

impl ConfigOverrides {
    pub fn apply(self, config: &mut SessionConfig) {
        if let Some(v) = self.threshold {
            config.threshold = v;
        }
        if let Some(v) = self.label {
            config.label = v;
        }
        if let Some(v) = self.display_width {
            config.display.width = v;
        }
        if let Some(v) = self.display_height {
            config.display.height = v;
        }
        if let Some(v) = self.refresh_hz {
            config.refresh_hz = v;
        }
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
