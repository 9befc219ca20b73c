mod file_config;

pub use file_config::FileConfig;

use crate::server::RequestsLoggingLevel;
use anyhow::{bail, Result};
use std::path::PathBuf;

/// CLI arguments that participate in config resolution.
/// Mirrors the subset of CLI flags that a TOML file or environment
/// variables may override.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub media_root: Option<PathBuf>,
    pub db_path: Option<PathBuf>,
    pub listen_addr: Option<String>,
    pub logging_level: RequestsLoggingLevel,
    pub scan_workers: Option<usize>,
    pub scan_exclude: Option<String>,
    pub watch: Option<bool>,
    pub auto_playlists: Option<bool>,
}

/// Fully resolved application configuration.
///
/// Resolution order, lowest to highest precedence: built-in defaults,
/// CLI arguments, TOML file, `CHORALE_*` environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub media_root: PathBuf,
    pub db_path: PathBuf,
    pub listen_addr: String,
    pub logging_level: RequestsLoggingLevel,

    // Identity
    pub auth_secret: String,
    pub access_ttl_secs: u64,
    pub refresh_ttl_secs: u64,
    pub admin_username: String,
    pub admin_password: String,
    pub rate_limit_window_secs: u64,
    pub rate_limit_count: u32,

    // Scanner
    pub scan_workers: usize,
    pub scan_exclude: Option<String>,
    pub watch: bool,
    pub auto_playlists: bool,

    // Streaming
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    pub cover_cache_dir: PathBuf,
    pub hls_cache_dir: PathBuf,
    pub hls_cache_max_mb: u64,
    pub hls_segment_secs: u64,
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match env_string(name) {
        None => Ok(None),
        Some(raw) => match raw.parse::<T>() {
            Ok(v) => Ok(Some(v)),
            Err(_) => bail!("Invalid value for {}: {}", name, raw),
        },
    }
}

fn env_bool(name: &str) -> Result<Option<bool>> {
    match env_string(name) {
        None => Ok(None),
        Some(raw) => match raw.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            other => bail!("Invalid boolean for {}: {}", name, other),
        },
    }
}

impl AppConfig {
    pub fn resolve(cli: &CliConfig, file: Option<FileConfig>) -> Result<AppConfig> {
        let file = file.unwrap_or_default();

        let media_root = env_string("CHORALE_MEDIA_ROOT")
            .map(PathBuf::from)
            .or(file.media_root)
            .or_else(|| cli.media_root.clone());
        let Some(media_root) = media_root else {
            bail!("media root not configured (set --media-root or CHORALE_MEDIA_ROOT)");
        };

        let db_path = env_string("CHORALE_DB_PATH")
            .map(PathBuf::from)
            .or(file.db_path)
            .or_else(|| cli.db_path.clone())
            .unwrap_or_else(|| PathBuf::from("chorale.db"));

        let listen_addr = env_string("CHORALE_LISTEN_ADDR")
            .or(file.listen_addr)
            .or_else(|| cli.listen_addr.clone())
            .unwrap_or_else(|| "0.0.0.0:3001".to_string());

        let auth_secret = env_string("CHORALE_AUTH_SECRET").or(file.auth.secret);
        let Some(auth_secret) = auth_secret else {
            bail!("auth secret not configured (set CHORALE_AUTH_SECRET)");
        };
        if auth_secret.len() < 16 {
            bail!("auth secret must be at least 16 characters");
        }

        let admin_username = env_string("CHORALE_ADMIN_USERNAME")
            .or(file.auth.admin_username)
            .unwrap_or_else(|| "admin".to_string());
        let admin_password =
            env_string("CHORALE_ADMIN_PASSWORD").or(file.auth.admin_password).unwrap_or_default();

        let cover_cache_dir = env_string("CHORALE_COVER_CACHE_DIR")
            .map(PathBuf::from)
            .or(file.streaming.cover_cache_dir)
            .unwrap_or_else(|| PathBuf::from("covers"));

        let hls_cache_dir = env_string("CHORALE_HLS_CACHE_DIR")
            .map(PathBuf::from)
            .or(file.streaming.hls_cache_dir)
            .unwrap_or_else(|| PathBuf::from("hls-cache"));

        let scan_workers = env_parse::<usize>("CHORALE_SCAN_WORKERS")?
            .or(file.scan.workers)
            .or(cli.scan_workers)
            .unwrap_or(4)
            .max(1);

        let scan_exclude = env_string("CHORALE_SCAN_EXCLUDE")
            .or(file.scan.exclude)
            .or_else(|| cli.scan_exclude.clone());
        if let Some(pattern) = &scan_exclude {
            if regex::Regex::new(pattern).is_err() {
                bail!("Invalid scan exclude pattern: {}", pattern);
            }
        }

        Ok(AppConfig {
            media_root,
            db_path,
            listen_addr,
            logging_level: cli.logging_level.clone(),
            auth_secret,
            access_ttl_secs: env_parse("CHORALE_ACCESS_TTL_SECS")?
                .or(file.auth.access_ttl_secs)
                .unwrap_or(900),
            refresh_ttl_secs: env_parse("CHORALE_REFRESH_TTL_SECS")?
                .or(file.auth.refresh_ttl_secs)
                .unwrap_or(30 * 24 * 3600),
            admin_username,
            admin_password,
            rate_limit_window_secs: env_parse("CHORALE_RATE_LIMIT_WINDOW_SECS")?
                .or(file.auth.rate_limit_window_secs)
                .unwrap_or(60),
            rate_limit_count: env_parse("CHORALE_RATE_LIMIT_COUNT")?
                .or(file.auth.rate_limit_count)
                .unwrap_or(10),
            scan_workers,
            scan_exclude,
            watch: env_bool("CHORALE_WATCH")?
                .or(file.scan.watch)
                .or(cli.watch)
                .unwrap_or(true),
            auto_playlists: env_bool("CHORALE_AUTO_PLAYLISTS")?
                .or(file.scan.auto_playlists)
                .or(cli.auto_playlists)
                .unwrap_or(false),
            ffmpeg_path: env_string("CHORALE_FFMPEG_PATH")
                .or(file.streaming.ffmpeg_path)
                .unwrap_or_else(|| "ffmpeg".to_string()),
            ffprobe_path: env_string("CHORALE_FFPROBE_PATH")
                .or(file.streaming.ffprobe_path)
                .unwrap_or_else(|| "ffprobe".to_string()),
            cover_cache_dir,
            hls_cache_dir,
            hls_cache_max_mb: env_parse("CHORALE_HLS_CACHE_MAX_MB")?
                .or(file.streaming.hls_cache_max_mb)
                .unwrap_or(512),
            hls_segment_secs: env_parse("CHORALE_HLS_SEGMENT_SECS")?
                .or(file.streaming.hls_segment_secs)
                .unwrap_or(4)
                .max(1),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli_with_root() -> CliConfig {
        CliConfig {
            media_root: Some(PathBuf::from("/music")),
            ..Default::default()
        }
    }

    #[test]
    fn resolve_requires_secret() {
        // No env leakage risk: CHORALE_AUTH_SECRET is unset in the test env.
        let file = FileConfig::default();
        assert!(AppConfig::resolve(&cli_with_root(), Some(file)).is_err());
    }

    #[test]
    fn resolve_applies_defaults() {
        let mut file = FileConfig::default();
        file.auth.secret = Some("0123456789abcdef".to_string());
        let config = AppConfig::resolve(&cli_with_root(), Some(file)).unwrap();
        assert_eq!(config.listen_addr, "0.0.0.0:3001");
        assert_eq!(config.access_ttl_secs, 900);
        assert_eq!(config.scan_workers, 4);
        assert!(config.watch);
        assert!(!config.auto_playlists);
        assert_eq!(config.hls_segment_secs, 4);
    }

    #[test]
    fn file_overrides_cli() {
        let mut file = FileConfig::default();
        file.auth.secret = Some("0123456789abcdef".to_string());
        file.scan.workers = Some(12);
        let mut cli = cli_with_root();
        cli.scan_workers = Some(2);
        let config = AppConfig::resolve(&cli, Some(file)).unwrap();
        assert_eq!(config.scan_workers, 12);
    }

    #[test]
    fn rejects_bad_exclude_pattern() {
        let mut file = FileConfig::default();
        file.auth.secret = Some("0123456789abcdef".to_string());
        file.scan.exclude = Some("[unclosed".to_string());
        assert!(AppConfig::resolve(&cli_with_root(), Some(file)).is_err());
    }
}
