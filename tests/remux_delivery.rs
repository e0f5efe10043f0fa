//! Integration tests for the delivery caches: on-demand download remuxing
//! and live fMP4 playlist conversion.

use async_trait::async_trait;
use bytes::Bytes;
use hlsforge::config::CacheConfig;
use hlsforge::error::{CoreError, Result};
use hlsforge::remux::download::DownloadCache;
use hlsforge::remux::live::{rewrite_playlist, LiveRemuxCache};
use hlsforge::remux::{content_type_for, sanitize_filename, Remuxer};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct RecordingRemuxer {
    remux_calls: AtomicUsize,
    segment_calls: AtomicUsize,
    delay: Duration,
}

impl RecordingRemuxer {
    fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            remux_calls: AtomicUsize::new(0),
            segment_calls: AtomicUsize::new(0),
            delay,
        })
    }
}

#[async_trait]
impl Remuxer for RecordingRemuxer {
    async fn remux_to_file(&self, _playlist: &Path, output: &Path) -> Result<()> {
        self.remux_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        tokio::fs::write(output, b"remuxed mp4").await?;
        Ok(())
    }

    async fn segment_to_fmp4(&self, _segment: &Path) -> Result<Bytes> {
        self.segment_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Bytes::from_static(b"fmp4 segment"))
    }

    async fn init_from_segment(&self, _segment: &Path) -> Result<Bytes> {
        Ok(Bytes::from_static(b"fmp4 init"))
    }
}

fn cache_config(tmp: &TempDir) -> CacheConfig {
    CacheConfig {
        root_dir: tmp.path().join("remux-cache"),
        ..CacheConfig::default()
    }
}

async fn finished_title(tmp: &TempDir) -> PathBuf {
    let master = tmp.path().join("Alien.m3u8");
    tokio::fs::write(&master, b"#EXTM3U").await.unwrap();
    master
}

#[tokio::test]
async fn burst_of_download_requests_remuxes_once() {
    let tmp = TempDir::new().unwrap();
    let remuxer = RecordingRemuxer::new(Duration::from_millis(20));
    let cache = Arc::new(DownloadCache::new(&cache_config(&tmp), remuxer.clone()));
    cache.init().await.unwrap();
    let master = finished_title(&tmp).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let cache = Arc::clone(&cache);
        let master = master.clone();
        handles.push(tokio::spawn(async move {
            cache
                .ensure(Some("movies/Alien.m3u8"), "Alien", &master)
                .await
        }));
    }

    let mut paths = Vec::new();
    for handle in handles {
        let download = handle.await.unwrap().unwrap();
        assert_eq!(download.filename, "Alien.mp4");
        paths.push(download.path);
    }

    assert_eq!(remuxer.remux_calls.load(Ordering::SeqCst), 1);
    assert!(paths.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(
        tokio::fs::read(&paths[0]).await.unwrap(),
        b"remuxed mp4".to_vec()
    );
}

#[tokio::test]
async fn one_shot_download_is_deleted_after_serving() {
    let tmp = TempDir::new().unwrap();
    let cache = DownloadCache::new(
        &cache_config(&tmp),
        RecordingRemuxer::new(Duration::ZERO),
    );
    cache.init().await.unwrap();
    let master = finished_title(&tmp).await;

    let download = cache.ensure(None, "Alien", &master).await.unwrap();
    assert!(download.path.exists());

    cache.release(&download, true).await;
    assert!(!download.path.exists());
}

#[tokio::test]
async fn download_of_unfinished_title_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let cache = DownloadCache::new(
        &cache_config(&tmp),
        RecordingRemuxer::new(Duration::ZERO),
    );
    cache.init().await.unwrap();

    let missing = tmp.path().join("NotDone.m3u8");
    let result = cache.ensure(Some("k"), "NotDone", &missing).await;
    assert!(matches!(result, Err(CoreError::SourceMissing(_))));
}

#[tokio::test]
async fn live_segments_are_served_from_memory_after_first_remux() {
    let tmp = TempDir::new().unwrap();
    let remuxer = RecordingRemuxer::new(Duration::ZERO);
    let cache = LiveRemuxCache::new(&cache_config(&tmp), remuxer.clone());

    let segment = Path::new("/media/movies/Alien_00003.ts");
    for _ in 0..5 {
        let data = cache.remux_segment(segment).await.unwrap();
        assert_eq!(&data[..], b"fmp4 segment");
    }
    assert_eq!(remuxer.segment_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn playlist_is_rewritten_for_fmp4_delivery() {
    let input = "\
#EXTM3U
#EXT-X-VERSION:3
#EXT-X-TARGETDURATION:6
#EXT-X-MEDIA-SEQUENCE:0
#EXT-X-INDEPENDENT-SEGMENTS
#EXTINF:6.000000,
Lost.S01E02_00000.ts
#EXTINF:4.200000,
Lost.S01E02_00001.ts
#EXT-X-ENDLIST
";
    let out = rewrite_playlist(input);

    assert!(out.starts_with("#EXTM3U"));
    assert!(out.contains("#EXT-X-VERSION:7"));
    assert!(!out.contains("EXT-X-INDEPENDENT-SEGMENTS"));
    assert!(out.contains("Lost.S01E02_00000.m4s?remux=fmp4"));
    assert!(out.contains("#EXT-X-MAP:URI=\"Lost.S01E02_init.mp4?remux=fmp4\""));
    // Durations and the endlist marker survive untouched.
    assert!(out.contains("#EXTINF:4.200000,"));
    assert!(out.trim_end().ends_with("#EXT-X-ENDLIST"));
}

#[test]
fn download_filenames_are_browser_safe() {
    let name = sanitize_filename("Lost: Season 1 / Episode 2?");
    assert_eq!(name, "Lost- Season 1 - Episode 2-");
    assert_eq!(content_type_for(Path::new("x.mp4")), "video/mp4");
}
