//! Bounded disk cache for HLS artifacts with per-key single-flight.
//!
//! Keys map to files under the cache directory. Concurrent misses for the
//! same key coalesce onto one producer; waiters re-check the disk once the
//! producer finishes. A background cleaner evicts expired entries and, when
//! the cache exceeds its byte budget, the oldest entries past a minimum TTL.

use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Entries older than this are always evicted.
const MAX_AGE: Duration = Duration::from_secs(3600);

/// Entries younger than this survive even an over-quota sweep, so a segment
/// is never deleted while a client is still fetching its siblings.
const MIN_TTL: Duration = Duration::from_secs(120);

pub struct HlsCache {
    dir: PathBuf,
    max_bytes: u64,
    inflight: Mutex<HashMap<String, broadcast::Sender<()>>>,
}

impl HlsCache {
    pub fn new(dir: PathBuf, max_bytes: u64) -> std::io::Result<HlsCache> {
        std::fs::create_dir_all(&dir)?;
        Ok(HlsCache {
            dir,
            max_bytes,
            inflight: Mutex::new(HashMap::new()),
        })
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }

    /// Return the cached file for `key`, producing it at most once across
    /// concurrent callers.
    pub async fn get_or_create<F, Fut>(&self, key: &str, produce: F) -> Result<PathBuf>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<u8>>>,
    {
        let target = self.path_for(key);
        let mut produce = Some(produce);

        loop {
            if target.is_file() {
                return Ok(target);
            }

            let waiter = {
                let mut inflight = self.inflight.lock().await;
                if let Some(sender) = inflight.get(key) {
                    Some(sender.subscribe())
                } else {
                    let (sender, _) = broadcast::channel(1);
                    inflight.insert(key.to_string(), sender);
                    None
                }
            };

            if let Some(mut receiver) = waiter {
                // Someone else is producing this artifact; wait and re-check
                let _ = receiver.recv().await;
                continue;
            }

            // We own the flight; the producer is consumed exactly once
            let Some(producer) = produce.take() else {
                self.finish_flight(key).await;
                bail!("artifact '{}' could not be produced", key);
            };
            let outcome = producer().await;
            let result = match outcome {
                Ok(bytes) => self.write_atomic(&target, &bytes).map(|_| target.clone()),
                Err(err) => Err(err),
            };
            self.finish_flight(key).await;
            return result;
        }
    }

    async fn finish_flight(&self, key: &str) {
        let mut inflight = self.inflight.lock().await;
        if let Some(sender) = inflight.remove(key) {
            let _ = sender.send(());
        }
    }

    fn write_atomic(&self, target: &Path, bytes: &[u8]) -> Result<()> {
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)
            .context("failed to create cache temp file")?;
        std::io::Write::write_all(&mut tmp, bytes)?;
        tmp.persist(target)
            .with_context(|| format!("failed to persist cache file {:?}", target))?;
        Ok(())
    }

    /// Background eviction loop. Runs until the token cancels.
    pub fn spawn_cleaner(self: &Arc<Self>, interval: Duration, cancel: CancellationToken) {
        let cache = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {
                        if let Err(err) = cache.sweep() {
                            warn!("HLS cache sweep failed: {}", err);
                        }
                    }
                }
            }
            debug!("HLS cache cleaner stopped");
        });
    }

    fn sweep(&self) -> Result<()> {
        let now = SystemTime::now();
        let mut entries: Vec<(PathBuf, u64, Duration)> = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            if !metadata.is_file() {
                continue;
            }
            let age = metadata
                .modified()
                .ok()
                .and_then(|m| now.duration_since(m).ok())
                .unwrap_or_default();
            entries.push((entry.path(), metadata.len(), age));
        }

        let mut removed = 0usize;
        entries.retain(|(path, _, age)| {
            if *age > MAX_AGE {
                if std::fs::remove_file(path).is_ok() {
                    removed += 1;
                }
                false
            } else {
                true
            }
        });

        let mut total: u64 = entries.iter().map(|(_, size, _)| size).sum();
        if total > self.max_bytes {
            // Oldest first, but never younger than the minimum TTL
            entries.sort_by(|a, b| b.2.cmp(&a.2));
            for (path, size, age) in entries {
                if total <= self.max_bytes || age < MIN_TTL {
                    break;
                }
                if std::fs::remove_file(&path).is_ok() {
                    total = total.saturating_sub(size);
                    removed += 1;
                }
            }
        }

        if removed > 0 {
            info!("HLS cache sweep removed {} entr(ies)", removed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn produces_once_and_caches() {
        let dir = tempfile::tempdir().unwrap();
        let cache = HlsCache::new(dir.path().join("cache"), 1024 * 1024).unwrap();

        let path = cache
            .get_or_create("a.init.mp4", || async { Ok(b"blob".to_vec()) })
            .await
            .unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"blob");

        // Second call must not invoke the producer
        let path2 = cache
            .get_or_create("a.init.mp4", || async {
                panic!("producer must not run for a cached key")
            })
            .await
            .unwrap();
        assert_eq!(path, path2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_misses_coalesce() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(HlsCache::new(dir.path().join("cache"), 1024 * 1024).unwrap());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let calls = calls.clone();
            tasks.push(tokio::spawn(async move {
                cache
                    .get_or_create("seg.0.m4s", move || {
                        let calls = calls.clone();
                        async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            Ok(b"segment".to_vec())
                        }
                    })
                    .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn producer_failure_propagates_and_is_retryable() {
        let dir = tempfile::tempdir().unwrap();
        let cache = HlsCache::new(dir.path().join("cache"), 1024 * 1024).unwrap();

        let failed = cache
            .get_or_create("x.m4s", || async { bail!("encoder exploded") })
            .await;
        assert!(failed.is_err());

        // A later attempt may succeed
        let path = cache
            .get_or_create("x.m4s", || async { Ok(b"ok".to_vec()) })
            .await
            .unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"ok");
    }
}
