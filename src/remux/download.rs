//! On-demand download cache.
//!
//! A download request for a transcoded title remuxes its HLS output into a
//! single MP4 under the cache directory. Concurrent requests for the same
//! title share one remux: each cache entry carries a `OnceCell` and the
//! first caller through `get_or_try_init` does the work while the rest
//! await it. A failed remux leaves the cell uninitialized, so the next
//! request simply tries again.

use crate::config::CacheConfig;
use crate::error::{CoreError, Result};
use crate::layout::{resolve_layout, HlsTemplates, MediaKind};
use crate::mediapath;
use crate::remux::{content_type_for, sanitize_filename, Remuxer};
use dashmap::DashMap;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OnceCell, Semaphore};
use tokio_util::io::ReaderStream;

/// A ready-to-serve remuxed file.
#[derive(Debug, Clone)]
pub struct RemuxedDownload {
    pub key: String,
    pub path: PathBuf,
    pub filename: String,
}

/// What a download request knows about its title. The master playlist is
/// resolved from whichever of the path hints is available.
#[derive(Debug, Clone, Copy)]
pub struct DownloadRequest<'a> {
    pub kind: MediaKind,
    pub descriptor: &'a str,
    /// Catalog-relative source path, when the source file is still known.
    pub source_relative: Option<&'a str>,
    /// Catalog-relative derived path; a `.m3u8` here is used directly.
    pub hls_relative: Option<&'a str>,
    /// Idempotency key. `None` produces a one-shot uncached download.
    pub cache_key: Option<&'a str>,
}

struct DownloadEntry {
    path: PathBuf,
    filename: String,
    cell: OnceCell<()>,
    last_used: Mutex<Instant>,
}

pub struct DownloadCache {
    root: PathBuf,
    ttl: Duration,
    entries: DashMap<String, Arc<DownloadEntry>>,
    pool: Arc<Semaphore>,
    remuxer: Arc<dyn Remuxer>,
}

impl DownloadCache {
    pub fn new(config: &CacheConfig, remuxer: Arc<dyn Remuxer>) -> Self {
        Self {
            root: config.root_dir.clone(),
            ttl: config.download_ttl(),
            entries: DashMap::new(),
            pool: Arc::new(Semaphore::new(config.remux_workers)),
            remuxer,
        }
    }

    /// Wipe and recreate the cache directory. Cached files never outlive the
    /// daemon, so leftovers from a previous run are garbage.
    pub async fn init(&self) -> Result<()> {
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                return Err(CoreError::CacheWrite {
                    path: self.root.clone(),
                    source: err,
                })
            }
        }
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|err| CoreError::CacheWrite {
                path: self.root.clone(),
                source: err,
            })
    }

    /// Resolve a title's master playlist and hand off to [`ensure`].
    ///
    /// A `.m3u8` in `hls_relative` is trusted as the master; anything else
    /// recomputes the layout from the source path, so downloads keep working
    /// after the source file has been deleted.
    ///
    /// [`ensure`]: DownloadCache::ensure
    pub async fn ensure_title(
        &self,
        media_dir: &Path,
        templates: &HlsTemplates,
        request: DownloadRequest<'_>,
    ) -> Result<RemuxedDownload> {
        let master_relative = match request.hls_relative {
            Some(hls) if hls.ends_with(".m3u8") => hls.to_string(),
            _ => resolve_layout(
                request.kind,
                request.source_relative,
                request.hls_relative,
                templates,
            )
            .map(|layout| layout.master)
            .ok_or_else(|| CoreError::SourceMissing(media_dir.to_path_buf()))?,
        };

        let master_absolute = mediapath::resolve(media_dir, &master_relative);
        self.ensure(request.cache_key, request.descriptor, &master_absolute)
            .await
    }

    /// Return the remuxed file for a title, producing it on first request.
    ///
    /// `key` is the caller's idempotency key, normally the master-playlist
    /// relative path; `None` produces an uncachable one-shot entry. The
    /// returned filename is the sanitized descriptor.
    pub async fn ensure(
        &self,
        key: Option<&str>,
        descriptor: &str,
        master_absolute: &Path,
    ) -> Result<RemuxedDownload> {
        if !master_absolute.exists() {
            return Err(CoreError::SourceMissing(master_absolute.to_path_buf()));
        }

        let key = key
            .map(str::to_owned)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let entry = self
            .entries
            .entry(key.clone())
            .or_insert_with(|| {
                Arc::new(DownloadEntry {
                    path: self.root.join(format!("{}.mp4", short_digest(&key))),
                    filename: format!("{}.mp4", sanitize_filename(descriptor)),
                    cell: OnceCell::new(),
                    last_used: Mutex::new(Instant::now()),
                })
            })
            .clone();

        entry
            .cell
            .get_or_try_init(|| async {
                let _permit = self.pool.acquire().await.map_err(|_| {
                    CoreError::CacheWrite {
                        path: entry.path.clone(),
                        source: std::io::Error::other("remux pool closed"),
                    }
                })?;
                tracing::info!("Remuxing download: {}", descriptor);
                match self.remuxer.remux_to_file(master_absolute, &entry.path).await {
                    Ok(()) => Ok(()),
                    Err(err) => {
                        remove_quietly(&entry.path).await;
                        Err(err)
                    }
                }
            })
            .await?;

        if !entry.path.exists() {
            // Swept or externally deleted between init and now.
            self.entries.remove(&key);
            return Err(CoreError::CacheWrite {
                path: entry.path.clone(),
                source: std::io::Error::other("remux output missing after completion"),
            });
        }

        *entry.last_used.lock() = Instant::now();
        Ok(RemuxedDownload {
            key,
            path: entry.path.clone(),
            filename: entry.filename.clone(),
        })
    }

    /// Called after the file has been served. One-shot downloads pass
    /// `delete_after` and give their disk space back immediately; cached
    /// ones just refresh the idle clock.
    pub async fn release(&self, download: &RemuxedDownload, delete_after: bool) {
        if delete_after {
            remove_quietly(&download.path).await;
            self.entries.remove(&download.key);
        } else if let Some(entry) = self.entries.get(&download.key) {
            *entry.last_used.lock() = Instant::now();
        }
    }

    /// Drop entries idle past the TTL and delete their files. In-flight
    /// remuxes are never swept.
    pub async fn sweep(&self) {
        let now = Instant::now();
        let expired: Vec<(String, PathBuf)> = self
            .entries
            .iter()
            .filter(|item| item.value().cell.initialized())
            .filter(|item| now.duration_since(*item.value().last_used.lock()) > self.ttl)
            .map(|item| (item.key().clone(), item.value().path.clone()))
            .collect();

        for (key, path) in expired {
            self.entries.remove(&key);
            remove_quietly(&path).await;
            tracing::debug!("Evicted expired download: {}", key);
        }
    }

    pub fn start_sweeper(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                cache.sweep().await;
            }
        })
    }

    #[cfg(test)]
    fn entry_count(&self) -> usize {
        self.entries.len()
    }
}

/// Everything the HTTP layer needs to serve a cached file.
pub struct DownloadBody {
    pub size: u64,
    pub content_type: &'static str,
    pub stream: ReaderStream<tokio::fs::File>,
}

/// Open a cached file as a sized byte stream for the HTTP layer.
pub async fn open_body(path: &Path) -> Result<DownloadBody> {
    let file = tokio::fs::File::open(path).await?;
    let size = file.metadata().await?.len();
    Ok(DownloadBody {
        size,
        content_type: content_type_for(path),
        stream: ReaderStream::new(file),
    })
}

async fn remove_quietly(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => {
            tracing::warn!("Failed to remove cache file {:?}: {}", path, err);
        }
    }
}

fn short_digest(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    hex::encode(&digest[..16])
}
