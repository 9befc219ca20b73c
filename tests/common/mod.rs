//! Shared fixtures for integration tests.

use async_trait::async_trait;
use chorale_server::media::{AudioProbe, CoverResolver, ProbeError, ProbeResult};
use chorale_server::scanner::{Scanner, ScannerConfig};
use chorale_server::store::{SqliteStore, UserRole};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Probe returning canned technical properties, so the pipeline can be
/// exercised without a real ffprobe binary or real audio files. Files whose
/// name contains "broken" fail the probe.
pub struct FakeProbe;

#[async_trait]
impl AudioProbe for FakeProbe {
    async fn probe(&self, path: &Path) -> Result<ProbeResult, ProbeError> {
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        if name.contains("broken") {
            return Err(ProbeError::NoDuration);
        }
        Ok(ProbeResult {
            duration_ms: 200_000,
            sample_rate: 44_100,
            bit_depth: 16,
            channels: 2,
            bitrate_kbps: Some(320),
            codec: "mp3".to_string(),
        })
    }
}

pub struct TestHarness {
    pub root: tempfile::TempDir,
    pub media_root: PathBuf,
    pub store: Arc<SqliteStore>,
    pub scanner: Arc<Scanner>,
}

pub fn harness(auto_playlists: bool) -> TestHarness {
    let root = tempfile::tempdir().unwrap();
    let media_root = root.path().join("media");
    std::fs::create_dir_all(&media_root).unwrap();

    let store = Arc::new(SqliteStore::in_memory().unwrap());
    store
        .create_user("admin", "$fake-hash", None, UserRole::Admin)
        .unwrap();

    let covers = Arc::new(CoverResolver::new(root.path().join("covers")).unwrap());
    let scanner = Arc::new(Scanner::new(
        store.clone(),
        Arc::new(FakeProbe),
        covers,
        ScannerConfig {
            media_root: media_root.clone(),
            workers: 2,
            exclude: None,
            auto_playlists,
            admin_username: "admin".to_string(),
        },
    ));

    TestHarness {
        root,
        media_root,
        store,
        scanner,
    }
}

impl TestHarness {
    pub fn write_media(&self, relative: &str, content: &[u8]) {
        let path = self.media_root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    /// Schedule and synchronously drive one full scan.
    pub async fn scan(&self) -> i64 {
        let scan_id = self.scanner.start_scan().unwrap();
        Arc::clone(&self.scanner)
            .run_scan(scan_id, tokio_util::sync::CancellationToken::new())
            .await
            .unwrap();
        scan_id
    }
}
