//! Core configuration shared between the library and its binaries.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::protocol_constants::DEFAULT_PORT;

/// Runtime configuration for the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Port to bind. 0 means scan the fallback range for a free port.
    pub preferred_port: u16,
    /// Directory scanned for playable tracks and served at /media.
    pub media_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            preferred_port: DEFAULT_PORT,
            media_dir: PathBuf::from("."),
        }
    }
}
