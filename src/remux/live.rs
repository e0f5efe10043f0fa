//! Live fMP4 remux cache.
//!
//! Some players cannot play MPEG-TS segments (Samsung's browser, recent
//! Apple devices). For those, each `.ts` segment is stream-copied to a
//! fragmented MP4 buffer on first request and memoized in memory, and the
//! playlist is rewritten to reference the converted segments plus an init
//! segment derived from the first one. Segments are immutable once written
//! so they keep a long TTL; playlists can still grow, so theirs is short.

use crate::config::CacheConfig;
use crate::error::Result;
use crate::remux::Remuxer;
use bytes::Bytes;
use dashmap::DashMap;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

fn digest_key(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    hex::encode(&digest[..16])
}

struct CachedBytes {
    data: Bytes,
    stored_at: Instant,
}

struct CachedText {
    data: String,
    stored_at: Instant,
}

pub struct LiveRemuxCache {
    remuxer: Arc<dyn Remuxer>,
    segments: DashMap<String, CachedBytes>,
    playlists: DashMap<String, CachedText>,
    segment_ttl: Duration,
    playlist_ttl: Duration,
}

impl LiveRemuxCache {
    pub fn new(config: &CacheConfig, remuxer: Arc<dyn Remuxer>) -> Self {
        Self {
            remuxer,
            segments: DashMap::new(),
            playlists: DashMap::new(),
            segment_ttl: config.segment_ttl(),
            playlist_ttl: config.playlist_ttl(),
        }
    }

    /// Convert a `.ts` segment to fMP4, memoized by path.
    pub async fn remux_segment(&self, ts_path: &Path) -> Result<Bytes> {
        let key = digest_key(&ts_path.to_string_lossy());
        if let Some(cached) = self.segments.get(&key) {
            return Ok(cached.data.clone());
        }

        let data = self.remuxer.segment_to_fmp4(ts_path).await?;
        self.segments.insert(
            key,
            CachedBytes {
                data: data.clone(),
                stored_at: Instant::now(),
            },
        );
        Ok(data)
    }

    /// Build the fMP4 init segment from a `.ts` segment, memoized by path.
    pub async fn init_segment(&self, ts_path: &Path) -> Result<Bytes> {
        let key = digest_key(&format!("{}#init", ts_path.to_string_lossy()));
        if let Some(cached) = self.segments.get(&key) {
            return Ok(cached.data.clone());
        }

        let data = self.remuxer.init_from_segment(ts_path).await?;
        self.segments.insert(
            key,
            CachedBytes {
                data: data.clone(),
                stored_at: Instant::now(),
            },
        );
        Ok(data)
    }

    /// Rewrite a playlist to reference fMP4 segments. Keyed by path plus
    /// content, so an appended-to playlist is never served stale.
    pub fn convert_playlist(&self, playlist_path: &Path, content: &str) -> String {
        let key = digest_key(&format!("{}{}", playlist_path.to_string_lossy(), content));
        if let Some(cached) = self.playlists.get(&key) {
            return cached.data.clone();
        }

        let converted = rewrite_playlist(content);
        self.playlists.insert(
            key,
            CachedText {
                data: converted.clone(),
                stored_at: Instant::now(),
            },
        );
        converted
    }

    pub fn sweep(&self) {
        let now = Instant::now();
        self.segments
            .retain(|_, entry| now.duration_since(entry.stored_at) <= self.segment_ttl);
        self.playlists
            .retain(|_, entry| now.duration_since(entry.stored_at) <= self.playlist_ttl);
    }

    pub fn start_sweeper(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                cache.sweep();
            }
        })
    }

    #[cfg(test)]
    fn cached_counts(&self) -> (usize, usize) {
        (self.segments.len(), self.playlists.len())
    }
}

/// Rewrite an HLS playlist for fMP4 delivery. Pure text transform:
/// segment URIs get an `.m4s?remux=fmp4` suffix, the independent-segments
/// tag is dropped, an `EXT-X-MAP` pointing at a derived init segment is
/// injected, and the version is raised to 7.
pub fn rewrite_playlist(content: &str) -> String {
    static SEGMENT_REF: OnceLock<Regex> = OnceLock::new();
    static VERSION_TAG: OnceLock<Regex> = OnceLock::new();
    static FIRST_M4S: OnceLock<Regex> = OnceLock::new();
    static INIT_NAME: OnceLock<Regex> = OnceLock::new();

    let segment_ref =
        SEGMENT_REF.get_or_init(|| Regex::new(r"(?m)(\S+)\.ts(\s|$)").expect("static regex"));
    let version_tag =
        VERSION_TAG.get_or_init(|| Regex::new(r"#EXT-X-VERSION:\d+").expect("static regex"));
    let first_m4s =
        FIRST_M4S.get_or_init(|| Regex::new(r"([^\s?]+\.m4s)").expect("static regex"));
    let init_name = INIT_NAME.get_or_init(|| Regex::new(r"\d+\.m4s$").expect("static regex"));

    let mut converted = segment_ref
        .replace_all(content, "${1}.m4s?remux=fmp4${2}")
        .into_owned();

    // Some TVs choke on this tag, and fMP4 playback does not need it.
    converted = converted
        .lines()
        .filter(|line| !line.trim_start().starts_with("#EXT-X-INDEPENDENT-SEGMENTS"))
        .collect::<Vec<_>>()
        .join("\n");
    if content.ends_with('\n') && !converted.ends_with('\n') {
        converted.push('\n');
    }

    if converted.contains(".m4s") && !converted.contains("#EXT-X-MAP") {
        if let Some(first) = first_m4s.find(&converted) {
            let init_uri = init_name.replace(first.as_str(), "init.mp4").into_owned();
            let mut lines: Vec<String> = converted.lines().map(str::to_owned).collect();
            let insert_after = lines.iter().position(|line| {
                line.starts_with("#EXT-X-MEDIA-SEQUENCE") || line.starts_with("#EXT-X-VERSION")
            });
            if let Some(idx) = insert_after {
                lines.insert(
                    idx + 1,
                    format!("#EXT-X-MAP:URI=\"{}?remux=fmp4\"", init_uri),
                );
                let trailing_newline = converted.ends_with('\n');
                converted = lines.join("\n");
                if trailing_newline {
                    converted.push('\n');
                }
            }
        }
    }

    version_tag
        .replace(&converted, "#EXT-X-VERSION:7")
        .into_owned()
}
