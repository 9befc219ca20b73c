//! Optional TOML configuration file support.
//!
//! Values present in the file override CLI defaults; environment variables
//! override both (see [`super::AppConfig::resolve`]).

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileConfig {
    pub media_root: Option<PathBuf>,
    pub db_path: Option<PathBuf>,
    pub listen_addr: Option<String>,

    #[serde(default)]
    pub auth: AuthFileConfig,

    #[serde(default)]
    pub scan: ScanFileConfig,

    #[serde(default)]
    pub streaming: StreamingFileConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthFileConfig {
    pub secret: Option<String>,
    pub access_ttl_secs: Option<u64>,
    pub refresh_ttl_secs: Option<u64>,
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
    pub rate_limit_window_secs: Option<u64>,
    pub rate_limit_count: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScanFileConfig {
    pub workers: Option<usize>,
    pub exclude: Option<String>,
    pub watch: Option<bool>,
    pub auto_playlists: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamingFileConfig {
    pub ffmpeg_path: Option<String>,
    pub ffprobe_path: Option<String>,
    pub cover_cache_dir: Option<PathBuf>,
    pub hls_cache_dir: Option<PathBuf>,
    pub hls_cache_max_mb: Option<u64>,
    pub hls_segment_secs: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let config: FileConfig = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {:?}", path))?;
        Ok(config)
    }
}
