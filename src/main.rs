use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use chorale_server::auth::AuthService;
use chorale_server::config::{self, AppConfig};
use chorale_server::jobs::{JobRegistry, WorkerPool};
use chorale_server::media::{CoverResolver, FfprobeAudioProbe};
use chorale_server::scanner::{ScanJobHandler, Scanner, ScannerConfig};
use chorale_server::search::SearchService;
use chorale_server::server::{run_server, RequestsLoggingLevel, ServerConfig, ServerState};
use chorale_server::stats::StatsService;
use chorale_server::store::SqliteStore;
use chorale_server::streaming::{HlsCache, HlsGenerator, Transcoder};

/// Interval between maintenance sweeps (expired sessions, finished jobs).
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(3600);

/// Completed jobs older than this are pruned.
const JOB_RETENTION: Duration = Duration::from_secs(7 * 24 * 3600);

const HLS_CLEANER_INTERVAL: Duration = Duration::from_secs(60);

const WORKER_DRAIN_DEADLINE: Duration = Duration::from_secs(30);

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to TOML configuration file. Values in the file override CLI
    /// arguments; CHORALE_* environment variables override both.
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// Root directory of the music library.
    #[clap(long)]
    pub media_root: Option<PathBuf>,

    /// Path of the SQLite database file.
    #[clap(long)]
    pub db_path: Option<PathBuf>,

    /// Address to listen on, e.g. 0.0.0.0:3001.
    #[clap(long)]
    pub listen_addr: Option<String>,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// Number of parallel scan workers.
    #[clap(long)]
    pub scan_workers: Option<usize>,

    /// Regex of directories to exclude from scanning.
    #[clap(long)]
    pub scan_exclude: Option<String>,

    /// Watch the media root and rescan on changes.
    #[clap(long)]
    pub watch: Option<bool>,

    /// Import .m3u/.m3u8 files found during scans as playlists.
    #[clap(long)]
    pub auto_playlists: Option<bool>,
}

impl From<&CliArgs> for config::CliConfig {
    fn from(args: &CliArgs) -> Self {
        config::CliConfig {
            media_root: args.media_root.clone(),
            db_path: args.db_path.clone(),
            listen_addr: args.listen_addr.clone(),
            logging_level: args.logging_level.clone(),
            scan_workers: args.scan_workers,
            scan_exclude: args.scan_exclude.clone(),
            watch: args.watch,
            auto_playlists: args.auto_playlists,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            Some(config::FileConfig::load(path)?)
        }
        None => None,
    };
    let cli_config: config::CliConfig = (&cli_args).into();
    let app_config = AppConfig::resolve(&cli_config, file_config)?;

    info!("Configuration loaded:");
    info!("  media_root: {:?}", app_config.media_root);
    info!("  db_path: {:?}", app_config.db_path);
    info!("  listen_addr: {}", app_config.listen_addr);
    info!("  scan_workers: {}", app_config.scan_workers);
    info!("  watch: {}", app_config.watch);
    info!("  auto_playlists: {}", app_config.auto_playlists);

    if !app_config.db_path.exists() {
        info!("Creating new database at {:?}", app_config.db_path);
    }
    let store = Arc::new(SqliteStore::new(&app_config.db_path)?);

    let auth = Arc::new(AuthService::new(
        store.clone(),
        app_config.auth_secret.clone(),
        app_config.access_ttl_secs,
        app_config.refresh_ttl_secs,
    ));
    auth.bootstrap_admin(&app_config.admin_username, &app_config.admin_password)?;

    let covers = Arc::new(CoverResolver::new(app_config.cover_cache_dir.clone())?);
    let probe = Arc::new(FfprobeAudioProbe::new(app_config.ffprobe_path.clone()));
    let scanner = Arc::new(Scanner::new(
        store.clone(),
        probe,
        covers,
        ScannerConfig {
            media_root: app_config.media_root.clone(),
            workers: app_config.scan_workers,
            exclude: app_config
                .scan_exclude
                .as_deref()
                .map(regex::Regex::new)
                .transpose()?,
            auto_playlists: app_config.auto_playlists,
            admin_username: app_config.admin_username.clone(),
        },
    ));

    let transcoder = Arc::new(Transcoder::new(app_config.ffmpeg_path.clone()));
    if transcoder.resolve_binary().is_none() {
        // Streaming originals still works; transcoding answers 503
        tracing::warn!(
            "Encoder binary '{}' not found; transcoded streaming is unavailable",
            app_config.ffmpeg_path
        );
    }
    let hls_cache = Arc::new(HlsCache::new(
        app_config.hls_cache_dir.clone(),
        app_config.hls_cache_max_mb * 1024 * 1024,
    )?);
    let hls = Arc::new(HlsGenerator::new(
        transcoder.clone(),
        hls_cache.clone(),
        app_config.hls_segment_secs,
    ));

    let shutdown_token = CancellationToken::new();

    // Background job workers (currently: library scans)
    let mut registry = JobRegistry::new();
    registry.register(Arc::new(ScanJobHandler::new(scanner.clone())));
    let mut worker_pool = WorkerPool::new(
        store.clone(),
        Arc::new(registry),
        2,
        shutdown_token.child_token(),
    );
    worker_pool.start();

    hls_cache.spawn_cleaner(HLS_CLEANER_INTERVAL, shutdown_token.child_token());

    if app_config.watch {
        chorale_server::scanner::watcher::spawn(
            app_config.media_root.clone(),
            app_config.db_path.clone(),
            scanner.clone(),
            shutdown_token.child_token(),
        )?;
    }

    // Periodic maintenance: expired sessions and finished jobs
    {
        let auth = auth.clone();
        let store = store.clone();
        let cancel = shutdown_token.child_token();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(MAINTENANCE_INTERVAL);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        match auth.cleanup_sessions(0) {
                            Ok(count) if count > 0 => info!("Pruned {} expired session(s)", count),
                            Ok(_) => {}
                            Err(err) => error!("Session cleanup failed: {}", err),
                        }
                        let cutoff = chorale_server::store::now_ts() - JOB_RETENTION.as_secs() as i64;
                        match store.cleanup_completed_jobs(cutoff) {
                            Ok(count) if count > 0 => info!("Pruned {} finished job(s)", count),
                            Ok(_) => {}
                            Err(err) => error!("Job cleanup failed: {}", err),
                        }
                    }
                }
            }
        });
    }

    let search = Arc::new(SearchService::new(store.clone()));
    let stats = Arc::new(StatsService::new(store.clone()));
    let state = ServerState {
        config: ServerConfig {
            requests_logging_level: app_config.logging_level.clone(),
            cover_cache_dir: app_config.cover_cache_dir.clone(),
            rate_limit_window_secs: app_config.rate_limit_window_secs,
            rate_limit_count: app_config.rate_limit_count,
        },
        start_time: Instant::now(),
        store,
        auth,
        scanner,
        search,
        stats,
        transcoder,
        hls,
    };

    info!("Ready to serve at {}!", app_config.listen_addr);

    tokio::select! {
        result = run_server(state, &app_config.listen_addr, shutdown_token.child_token()) => {
            info!("HTTP server stopped: {:?}", result);
            shutdown_token.cancel();
            worker_pool.shutdown(WORKER_DRAIN_DEADLINE).await;
            result
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, initiating graceful shutdown");
            shutdown_token.cancel();
            worker_pool.shutdown(WORKER_DRAIN_DEADLINE).await;
            Ok(())
        }
    }
}
