//! Arbiter configuration: optional JSON file under the XDG config dir with
//! env overrides, same layout as the sampler side.

use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

use serde::Deserialize;

use crate::arbiter::Thresholds;

pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ArbiterConfig {
    pub thresholds: Thresholds,
    pub timeout_ms: Option<u64>,
    pub socket: Option<PathBuf>,
}

pub fn config_dir() -> PathBuf {
    if let Some(xdg) = env::var_os("XDG_CONFIG_HOME") {
        PathBuf::from(xdg).join("hangwatch")
    } else {
        dirs_next::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hangwatch")
    }
}

pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

/// Missing or malformed files fall back to defaults; the watchdog must
/// come up even on a box that was never configured.
pub fn load(explicit: Option<&Path>) -> ArbiterConfig {
    let path = explicit.map(Path::to_path_buf).unwrap_or_else(config_path);
    match fs::read_to_string(&path) {
        Ok(s) => serde_json::from_str(&s).unwrap_or_default(),
        Err(_) => ArbiterConfig::default(),
    }
}

pub fn timeout(cfg: &ArbiterConfig) -> Duration {
    let ms = env::var("HANGWATCH_TIMEOUT_MS")
        .ok()
        .and_then(|v| v.parse().ok())
        .or(cfg.timeout_ms)
        .unwrap_or(DEFAULT_TIMEOUT_MS);
    Duration::from_millis(ms)
}

pub fn socket_path(cfg: &ArbiterConfig, cli: Option<PathBuf>) -> PathBuf {
    cli.or_else(|| env::var_os("HANGWATCH_SOCK").map(PathBuf::from))
        .or_else(|| cfg.socket.clone())
        .unwrap_or_else(|| PathBuf::from(hangwatch_wire::DEFAULT_SOCKET_PATH))
}
