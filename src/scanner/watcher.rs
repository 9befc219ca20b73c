//! Filesystem watcher feeding the scanner.
//!
//! Recursive notify events are debounced: any relevant create/write/remove/
//! rename re-arms a fixed timer, and when the burst goes quiet a scan is
//! triggered unless one is already running.

use super::{ScanError, Scanner};
use anyhow::Result;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Quiet period after the last event before a rescan fires.
pub const DEBOUNCE: Duration = Duration::from_secs(5);

fn has_hidden_component(path: &Path) -> bool {
    path.components().any(|component| match component {
        Component::Normal(name) => name
            .to_str()
            .map(|n| n.starts_with('.'))
            .unwrap_or(false),
        _ => false,
    })
}

/// Events for hidden directories and for the database file (including its
/// WAL/SHM siblings) never trigger a rescan.
fn is_relevant(event: &Event, db_path: &Path) -> bool {
    if !matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    ) {
        return false;
    }
    let db_stem = db_path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    event.paths.iter().any(|path| {
        if has_hidden_component(path) {
            return false;
        }
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if !db_stem.is_empty() && name.starts_with(db_stem) {
                return false;
            }
        }
        true
    })
}

/// Spawn the watcher task. The returned handle keeps running until the
/// cancellation token fires.
pub fn spawn(
    media_root: PathBuf,
    db_path: PathBuf,
    scanner: Arc<Scanner>,
    cancel: CancellationToken,
) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Event>();

    let mut watcher: RecommendedWatcher =
        notify::recommended_watcher(move |result: notify::Result<Event>| match result {
            Ok(event) => {
                let _ = tx.send(event);
            }
            Err(err) => warn!("Watcher error: {}", err),
        })?;
    watcher.watch(&media_root, RecursiveMode::Recursive)?;
    info!("Watching {:?} for changes", media_root);

    tokio::spawn(async move {
        // Keep the watcher alive for the lifetime of the task
        let _watcher = watcher;
        let mut deadline: Option<tokio::time::Instant> = None;

        loop {
            let debounce_fires = async {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                received = rx.recv() => {
                    match received {
                        None => break,
                        Some(event) => {
                            if is_relevant(&event, &db_path) {
                                debug!("Filesystem change: {:?}", event.paths);
                                deadline = Some(tokio::time::Instant::now() + DEBOUNCE);
                            }
                        }
                    }
                }
                _ = debounce_fires => {
                    deadline = None;
                    match scanner.start_scan() {
                        Ok(scan_id) => info!("Watcher triggered scan {}", scan_id),
                        Err(ScanError::AlreadyRunning) => {
                            debug!("Change burst while a scan is running; skipping")
                        }
                        Err(err) => warn!("Watcher failed to start scan: {}", err),
                    }
                }
            }
        }
        info!("Watcher stopped");
    });

    Ok(())
}
