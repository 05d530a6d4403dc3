/// Configuration for the Quadro backend.
/// Reads server.json from ~/.config/quadro/server.json (or platform equivalent).
use quadro_core::config::BoardSettings;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Board document. Created on first start when missing.
    #[serde(default = "default_data_file")]
    pub data_file: PathBuf,
    /// Reload the board when another process rewrites the file.
    #[serde(default = "default_true")]
    pub watch_data_file: bool,
    #[serde(default)]
    pub board: BoardSettings,
}

fn default_port() -> u16 {
    8080
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_data_file() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("quadro")
        .join("board.json")
}

fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_address: default_bind_address(),
            data_file: default_data_file(),
            watch_data_file: true,
            board: BoardSettings::default(),
        }
    }
}

/// Default config path: ~/.config/quadro/server.json
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("quadro")
        .join("server.json")
}

/// Load config from path. Returns defaults if the file doesn't exist or
/// can't be parsed.
pub fn load_config(path: &Path) -> ServerConfig {
    match fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
            log::warn!("[quadro.config] Failed to parse config {}: {}", path.display(), e);
            ServerConfig::default()
        }),
        Err(_) => {
            log::info!("[quadro.config] No config at {}, using defaults", path.display());
            ServerConfig::default()
        }
    }
}
