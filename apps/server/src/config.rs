//! Server configuration.
//!
//! Supports loading from YAML files with environment variable overrides.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Server configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port to bind the HTTP server to.
    /// Override: `CHORUS_BIND_PORT`
    pub bind_port: u16,

    /// Directory holding the audio files served to clients.
    /// Override: `CHORUS_MEDIA_DIR`
    pub media_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let defaults = chorus_core::Config::default();
        Self {
            bind_port: defaults.preferred_port,
            media_dir: defaults.media_dir,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("CHORUS_BIND_PORT") {
            if let Ok(port) = val.parse() {
                self.bind_port = port;
            }
        }

        if let Ok(val) = std::env::var("CHORUS_MEDIA_DIR") {
            if !val.is_empty() {
                self.media_dir = PathBuf::from(val);
            }
        }
    }

    /// Converts to chorus-core's Config type.
    pub fn to_core_config(&self) -> chorus_core::Config {
        chorus_core::Config {
            preferred_port: self.bind_port,
            media_dir: self.media_dir.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = ServerConfig::load(None).unwrap();
        assert_eq!(config.bind_port, ServerConfig::default().bind_port);
    }

    #[test]
    fn yaml_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "bind_port: 9999\nmedia_dir: /srv/music").unwrap();

        let config = ServerConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.bind_port, 9999);
        assert_eq!(config.media_dir, PathBuf::from("/srv/music"));
    }

    #[test]
    fn malformed_yaml_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "bind_port: [not a port").unwrap();
        assert!(ServerConfig::load(Some(file.path())).is_err());
    }
}
