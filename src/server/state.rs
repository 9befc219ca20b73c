use axum::extract::FromRef;

use crate::auth::AuthService;
use crate::scanner::Scanner;
use crate::search::SearchService;
use crate::stats::StatsService;
use crate::store::SqliteStore;
use crate::streaming::{HlsGenerator, Transcoder};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use super::RequestsLoggingLevel;

pub type GuardedStore = Arc<SqliteStore>;
pub type GuardedAuth = Arc<AuthService>;
pub type GuardedScanner = Arc<Scanner>;
pub type GuardedSearch = Arc<SearchService>;
pub type GuardedStats = Arc<StatsService>;
pub type GuardedTranscoder = Arc<Transcoder>;
pub type GuardedHls = Arc<HlsGenerator>;

/// Settings the HTTP layer needs at request time.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub requests_logging_level: RequestsLoggingLevel,
    pub cover_cache_dir: PathBuf,
    pub rate_limit_window_secs: u64,
    pub rate_limit_count: u32,
}

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub store: GuardedStore,
    pub auth: GuardedAuth,
    pub scanner: GuardedScanner,
    pub search: GuardedSearch,
    pub stats: GuardedStats,
    pub transcoder: GuardedTranscoder,
    pub hls: GuardedHls,
}

impl FromRef<ServerState> for GuardedStore {
    fn from_ref(input: &ServerState) -> Self {
        input.store.clone()
    }
}

impl FromRef<ServerState> for GuardedAuth {
    fn from_ref(input: &ServerState) -> Self {
        input.auth.clone()
    }
}

impl FromRef<ServerState> for GuardedScanner {
    fn from_ref(input: &ServerState) -> Self {
        input.scanner.clone()
    }
}

impl FromRef<ServerState> for GuardedSearch {
    fn from_ref(input: &ServerState) -> Self {
        input.search.clone()
    }
}

impl FromRef<ServerState> for GuardedStats {
    fn from_ref(input: &ServerState) -> Self {
        input.stats.clone()
    }
}

impl FromRef<ServerState> for GuardedTranscoder {
    fn from_ref(input: &ServerState) -> Self {
        input.transcoder.clone()
    }
}

impl FromRef<ServerState> for GuardedHls {
    fn from_ref(input: &ServerState) -> Self {
        input.hls.clone()
    }
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}
