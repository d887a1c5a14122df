//! Sampler configuration: optional JSON file under the XDG config dir
//! ($XDG_CONFIG_HOME/hangwatch/config.json, fallback ~/.config/hangwatch)
//! with env overrides for the knobs that matter in the field.

use std::path::{Path, PathBuf};
use std::{env, fs};

use serde::Deserialize;

use crate::classify::Thresholds;

/// The sar invocation that yields exactly the sections the parser expects:
/// -u cpu, -W swapping, -r memory, -w task creation + context switches,
/// -q queue lengths, per-core rows, one-second cadence.
pub const DEFAULT_SAR_COMMAND: &str = "sar -uWrwq -P ALL 1";

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SamplerConfig {
    pub thresholds: Thresholds,
    pub sar_command: Option<String>,
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

/// Missing or malformed files fall back to defaults; the sampler must come
/// up even on a box that was never configured.
pub fn load(explicit: Option<&Path>) -> SamplerConfig {
    let path = explicit.map(Path::to_path_buf).unwrap_or_else(config_path);
    match fs::read_to_string(&path) {
        Ok(s) => serde_json::from_str(&s).unwrap_or_default(),
        Err(_) => SamplerConfig::default(),
    }
}

pub fn sar_command(cfg: &SamplerConfig) -> String {
    env::var("HANGWATCH_SAR_CMD")
        .ok()
        .or_else(|| cfg.sar_command.clone())
        .unwrap_or_else(|| DEFAULT_SAR_COMMAND.to_string())
}

pub fn socket_path(cfg: &SamplerConfig, cli: Option<PathBuf>) -> PathBuf {
    cli.or_else(|| env::var_os("HANGWATCH_SOCK").map(PathBuf::from))
        .or_else(|| cfg.socket.clone())
        .unwrap_or_else(|| PathBuf::from(hangwatch_wire::DEFAULT_SOCKET_PATH))
}
