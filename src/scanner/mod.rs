//! The library ingestion pipeline.
//!
//! A scan walks the media root, fans the audio files out over a worker pool
//! that extracts tags and technical properties and upserts the results, then
//! reconciles the store against the set of songs actually seen. At most one
//! scan runs at a time, enforced by an atomic flag that every exit path
//! releases.

pub mod m3u;
pub mod watcher;

use crate::jobs::{JobContext, JobHandler};
use crate::media::{self, AudioProbe, CoverResolver};
use crate::store::{ScanState, ScanStatus, SongUpsert, SqliteStore};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value as JsonValue};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

/// Queue type string for scan jobs.
pub const SCAN_JOB_TYPE: &str = "library_scan";

/// Audio files are classified by extension.
pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "flac", "m4a", "aac", "ogg", "wav", "opus"];

const PLAYLIST_EXTENSIONS: &[&str] = &["m3u", "m3u8"];

/// Progress writes are coalesced to this interval.
const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("scan already running")]
    AlreadyRunning,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug, Clone)]
pub struct ScannerConfig {
    pub media_root: PathBuf,
    pub workers: usize,
    pub exclude: Option<Regex>,
    pub auto_playlists: bool,
    /// Imported playlists are owned by this user.
    pub admin_username: String,
}

#[derive(Default)]
struct ScanProgress {
    processed: AtomicI64,
    errors: AtomicI64,
    current_file: Mutex<Option<String>>,
}

/// Releases the running flag when the scan ends, panics included.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct Scanner {
    store: Arc<SqliteStore>,
    probe: Arc<dyn AudioProbe>,
    covers: Arc<CoverResolver>,
    config: ScannerConfig,
    running: Arc<AtomicBool>,
}

impl Scanner {
    pub fn new(
        store: Arc<SqliteStore>,
        probe: Arc<dyn AudioProbe>,
        covers: Arc<CoverResolver>,
        config: ScannerConfig,
    ) -> Scanner {
        Scanner {
            store,
            probe,
            covers,
            config,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Claim the running flag, create the status row and enqueue the scan
    /// job. Exactly one concurrent caller wins; the rest get
    /// [`ScanError::AlreadyRunning`].
    pub fn start_scan(&self) -> Result<i64, ScanError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(ScanError::AlreadyRunning);
        }

        let scan_id = match self.store.create_scan() {
            Ok(id) => id,
            Err(err) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(ScanError::Internal(err));
            }
        };
        let payload = json!({ "scan_id": scan_id }).to_string();
        if let Err(err) = self.store.enqueue_job(SCAN_JOB_TYPE, &payload) {
            let _ = self.store.finish_scan(scan_id, ScanState::Failed, 0, 0);
            self.running.store(false, Ordering::SeqCst);
            return Err(ScanError::Internal(err));
        }

        info!("Scan {} scheduled", scan_id);
        Ok(scan_id)
    }

    pub fn status(&self) -> Result<Option<ScanStatus>> {
        self.store.latest_scan()
    }

    /// Execute a scheduled scan. Per-file errors are tallied and logged but
    /// never abort the scan; only catastrophic failures (unreadable media
    /// root, store errors) mark it failed.
    pub async fn run_scan(self: Arc<Self>, scan_id: i64, cancel: CancellationToken) -> Result<()> {
        let Some(status) = self.store.get_scan(scan_id)? else {
            warn!("Scan {} has no status row; dropping", scan_id);
            return Ok(());
        };
        if status.status != ScanState::Running {
            // Stale job from a previous process; its row was failed at startup.
            debug!("Scan {} is not running anymore; dropping", scan_id);
            return Ok(());
        }

        // The flag is normally held by start_scan; re-assert it so a scan job
        // is never processed without it, and release it on every exit path.
        self.running.store(true, Ordering::SeqCst);
        let _guard = RunningGuard(self.running.clone());

        let progress = Arc::new(ScanProgress::default());
        let outcome = Arc::clone(&self)
            .run_scan_inner(scan_id, cancel, progress.clone())
            .await;

        let processed = progress.processed.load(Ordering::SeqCst);
        let errors = progress.errors.load(Ordering::SeqCst);
        match outcome {
            Ok(()) => {
                self.store
                    .finish_scan(scan_id, ScanState::Completed, processed, errors)?;
                info!(
                    "Scan {} completed: {} file(s) processed, {} error(s)",
                    scan_id, processed, errors
                );
                Ok(())
            }
            Err(err) => {
                error!("Scan {} failed: {:#}", scan_id, err);
                self.store
                    .finish_scan(scan_id, ScanState::Failed, processed, errors)?;
                Err(err)
            }
        }
    }

    async fn run_scan_inner(
        self: Arc<Self>,
        scan_id: i64,
        cancel: CancellationToken,
        progress: Arc<ScanProgress>,
    ) -> Result<()> {
        let walk = {
            let root = self.config.media_root.clone();
            let exclude = self.config.exclude.clone();
            tokio::task::spawn_blocking(move || walk_media_root(&root, exclude.as_ref()))
                .await
                .context("walk task panicked")??
        };
        info!(
            "Scan {}: found {} audio file(s), {} playlist file(s)",
            scan_id,
            walk.audio_files.len(),
            walk.playlist_files.len()
        );
        self.store.set_scan_total(scan_id, walk.audio_files.len() as i64)?;

        // Progress ticker: coalesces worker updates into bounded writes
        let ticker_done = CancellationToken::new();
        let ticker = {
            let store = self.store.clone();
            let progress = progress.clone();
            let done = ticker_done.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = done.cancelled() => break,
                        _ = tokio::time::sleep(PROGRESS_INTERVAL) => {
                            let current = progress.current_file.lock().unwrap().clone();
                            let _ = store.update_scan_progress(
                                scan_id,
                                progress.processed.load(Ordering::SeqCst),
                                progress.errors.load(Ordering::SeqCst),
                                current.as_deref(),
                            );
                        }
                    }
                }
            })
        };

        // Fan the files out over the worker pool; each worker keeps a local
        // seen-set that is merged at the join.
        let files = Arc::new(walk.audio_files);
        let next_index = Arc::new(AtomicI64::new(0));
        let mut workers = Vec::new();
        for _ in 0..self.config.workers.max(1) {
            let scanner = self.clone();
            let files = files.clone();
            let next_index = next_index.clone();
            let progress = progress.clone();
            let cancel = cancel.clone();
            workers.push(tokio::spawn(async move {
                let mut seen: HashSet<i64> = HashSet::new();
                loop {
                    if cancel.is_cancelled() {
                        break;
                    }
                    let index = next_index.fetch_add(1, Ordering::SeqCst) as usize;
                    let Some(path) = files.get(index) else {
                        break;
                    };
                    *progress.current_file.lock().unwrap() =
                        Some(path.display().to_string());
                    match scanner.process_file(path).await {
                        Ok(song_id) => {
                            seen.insert(song_id);
                        }
                        Err(err) => {
                            warn!("Skipping {:?}: {:#}", path, err);
                            progress.errors.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                    progress.processed.fetch_add(1, Ordering::SeqCst);
                }
                seen
            }));
        }

        let mut seen_songs: HashSet<i64> = HashSet::new();
        for worker in workers {
            match worker.await {
                Ok(local) => seen_songs.extend(local),
                Err(err) => {
                    ticker_done.cancel();
                    let _ = ticker.await;
                    bail!("scan worker panicked: {}", err);
                }
            }
        }
        ticker_done.cancel();
        let _ = ticker.await;

        if cancel.is_cancelled() {
            bail!("scan cancelled");
        }

        // Reconciliation strictly happens-after every worker upsert has
        // committed: a file temporarily unseen mid-walk is never deleted.
        let counts = self.store.reconcile_library(&seen_songs)?;
        if counts.songs + counts.albums + counts.artists > 0 {
            info!(
                "Scan {}: removed {} song(s), {} album(s), {} artist(s)",
                scan_id, counts.songs, counts.albums, counts.artists
            );
        }

        if self.config.auto_playlists {
            self.import_playlists(&walk.playlist_files)?;
        }

        // Final coalesced progress write
        self.store.update_scan_progress(
            scan_id,
            progress.processed.load(Ordering::SeqCst),
            progress.errors.load(Ordering::SeqCst),
            None,
        )?;
        Ok(())
    }

    /// Ingest one audio file: tags, probe, upserts, lyrics, cover and the
    /// full-text row. Returns the song id for the seen-set.
    async fn process_file(&self, path: &Path) -> Result<i64> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown");

        let tags = match media::read_tags(path) {
            Ok(tags) => tags,
            Err(err) => {
                debug!("No readable tags in {:?}: {}", path, err);
                media::FileTags::default()
            }
        };
        let (fallback_title, fallback_artist) = media::tags::fallback_from_filename(file_name);

        let title = tags.title.clone().unwrap_or(fallback_title);
        let artist_name = tags
            .artist
            .clone()
            .or_else(|| tags.album_artist.clone())
            .or(fallback_artist)
            .unwrap_or_else(|| "Unknown Artist".to_string());
        let album_title = tags
            .album
            .clone()
            .unwrap_or_else(|| "Unknown Album".to_string());

        // A file the probe cannot time never becomes a row
        let probed = self
            .probe
            .probe(path)
            .await
            .with_context(|| format!("probe failed for {:?}", path))?;

        let metadata = std::fs::metadata(path)?;
        let file_modified = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_else(|| probed.codec.clone());

        let artist_id = self.store.upsert_artist(&artist_name)?;
        let album_id = self.store.upsert_album(&album_title, artist_id, tags.year)?;

        let cover_path = self
            .covers
            .resolve_song_cover(path, tags.picture.as_ref());

        let song_id = self.store.upsert_song(&SongUpsert {
            album_id,
            artist_id,
            title: title.clone(),
            track_number: tags.track,
            disc_number: tags.disc,
            duration_ms: probed.duration_ms,
            sample_rate: probed.sample_rate,
            bit_depth: probed.bit_depth,
            channels: probed.channels,
            bitrate_kbps: probed.bitrate_kbps,
            format,
            file_path: path.display().to_string(),
            file_size: metadata.len() as i64,
            file_modified,
            cover_path: cover_path.clone(),
        })?;

        let lyrics = media::lyrics::resolve_lyrics(
            path,
            tags.lyrics.as_deref(),
            Some(&title),
            Some(&artist_name),
            Some(&album_title),
        );
        self.store.replace_lyrics(song_id, &lyrics)?;

        if let Some(folder) = path.parent() {
            if let Some(album_cover) = self
                .covers
                .resolve_album_cover(folder, cover_path.as_deref())
            {
                self.store.set_album_cover(album_id, &album_cover)?;
            }
        }

        self.store
            .update_song_fts(song_id, &title, &artist_name, &album_title)?;
        Ok(song_id)
    }

    fn import_playlists(&self, playlist_files: &[PathBuf]) -> Result<()> {
        let Some(owner) = self
            .store
            .get_user_by_username(&self.config.admin_username)?
        else {
            warn!(
                "Playlist auto-import enabled but admin user '{}' does not exist; skipping",
                self.config.admin_username
            );
            return Ok(());
        };

        for playlist_path in playlist_files {
            let content = match std::fs::read_to_string(playlist_path) {
                Ok(content) => content,
                Err(err) => {
                    warn!("Failed to read playlist {:?}: {}", playlist_path, err);
                    continue;
                }
            };
            let base_dir = playlist_path.parent().unwrap_or(Path::new(""));
            let mut song_ids = Vec::new();
            for track_path in m3u::parse_m3u(&content, base_dir) {
                match self
                    .store
                    .get_song_id_by_path(&track_path.display().to_string())?
                {
                    Some(id) => song_ids.push(id),
                    None => debug!(
                        "Playlist {:?} references unknown track {:?}",
                        playlist_path, track_path
                    ),
                }
            }

            let name = playlist_path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("playlist");
            self.store.upsert_imported_playlist(
                owner.id,
                name,
                &playlist_path.display().to_string(),
                &song_ids,
            )?;
            info!(
                "Imported playlist '{}' ({} track(s)) from {:?}",
                name,
                song_ids.len(),
                playlist_path
            );
        }
        Ok(())
    }
}

struct WalkOutcome {
    audio_files: Vec<PathBuf>,
    playlist_files: Vec<PathBuf>,
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false)
}

fn walk_media_root(root: &Path, exclude: Option<&Regex>) -> Result<WalkOutcome> {
    if !root.is_dir() {
        bail!("media root {:?} is not a readable directory", root);
    }

    let mut audio_files = Vec::new();
    let mut playlist_files = Vec::new();
    let walker = WalkDir::new(root).follow_links(false).into_iter();
    let mut iter = walker.filter_entry(|entry| {
        if entry.depth() == 0 {
            return true;
        }
        if entry.file_type().is_dir() {
            if is_hidden(entry.path()) {
                return false;
            }
            if let Some(pattern) = exclude {
                if pattern.is_match(&entry.path().display().to_string()) {
                    return false;
                }
            }
        }
        true
    });

    while let Some(entry) = iter.next() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!("Walk error under {:?}: {}", root, err);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(extension) = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
        else {
            continue;
        };
        if AUDIO_EXTENSIONS.contains(&extension.as_str()) {
            audio_files.push(entry.into_path());
        } else if PLAYLIST_EXTENSIONS.contains(&extension.as_str()) {
            playlist_files.push(entry.into_path());
        }
    }

    audio_files.sort();
    playlist_files.sort();
    Ok(WalkOutcome {
        audio_files,
        playlist_files,
    })
}

/// Job-queue handler driving [`Scanner::run_scan`]. Scan failures are
/// recorded on the status row rather than surfaced as job failures, so a
/// broken scan is never blindly retried.
pub struct ScanJobHandler {
    scanner: Arc<Scanner>,
}

impl ScanJobHandler {
    pub fn new(scanner: Arc<Scanner>) -> ScanJobHandler {
        ScanJobHandler { scanner }
    }
}

#[async_trait]
impl JobHandler for ScanJobHandler {
    fn job_type(&self) -> &'static str {
        SCAN_JOB_TYPE
    }

    async fn handle(&self, ctx: &JobContext, payload: JsonValue) -> Result<()> {
        let Some(scan_id) = payload.get("scan_id").and_then(JsonValue::as_i64) else {
            warn!("Scan job without scan_id payload: {}", payload);
            return Ok(());
        };
        if let Err(err) = Arc::clone(&self.scanner).run_scan(scan_id, ctx.cancel.clone()).await {
            error!("Scan {} ended with error: {:#}", scan_id, err);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walk_classifies_and_skips_hidden() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("artist/album")).unwrap();
        std::fs::create_dir_all(root.join(".hidden")).unwrap();
        std::fs::write(root.join("artist/album/01 - a.mp3"), b"x").unwrap();
        std::fs::write(root.join("artist/album/02 - b.FLAC"), b"x").unwrap();
        std::fs::write(root.join("artist/album/cover.jpg"), b"x").unwrap();
        std::fs::write(root.join("artist/list.m3u"), b"x").unwrap();
        std::fs::write(root.join(".hidden/secret.mp3"), b"x").unwrap();

        let outcome = walk_media_root(root, None).unwrap();
        assert_eq!(outcome.audio_files.len(), 2);
        assert_eq!(outcome.playlist_files.len(), 1);
    }

    #[test]
    fn walk_honors_exclude_pattern() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("keep")).unwrap();
        std::fs::create_dir_all(root.join("skip-me")).unwrap();
        std::fs::write(root.join("keep/a.mp3"), b"x").unwrap();
        std::fs::write(root.join("skip-me/b.mp3"), b"x").unwrap();

        let exclude = Regex::new("skip-me").unwrap();
        let outcome = walk_media_root(root, Some(&exclude)).unwrap();
        assert_eq!(outcome.audio_files.len(), 1);
        assert!(outcome.audio_files[0].ends_with("keep/a.mp3"));
    }

    #[test]
    fn walk_rejects_missing_root() {
        assert!(walk_media_root(Path::new("/definitely/not/here"), None).is_err());
    }
}
