use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Root of the media library. Sources live under `movies/` and `shows/`;
    /// HLS output is written beside them.
    #[serde(default = "default_media_dir")]
    pub media_dir: PathBuf,

    #[serde(default)]
    pub transcode: TranscodeConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub notify: NotifyConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            media_dir: default_media_dir(),
            transcode: TranscodeConfig::default(),
            cache: CacheConfig::default(),
            notify: NotifyConfig::default(),
        }
    }
}

fn default_media_dir() -> PathBuf {
    PathBuf::from("./media")
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TranscodeConfig {
    /// Path to the ffmpeg binary.
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg_path: PathBuf,

    /// Target HLS segment duration in seconds.
    #[serde(default = "default_segment_duration")]
    pub segment_duration_secs: u64,

    /// `-hls_playlist_type` value, normally `vod`.
    #[serde(default = "default_playlist_type")]
    pub playlist_type: String,

    /// Master playlist name template (`%b` = title base name).
    #[serde(default = "default_master_template")]
    pub master_template: String,

    /// Variant playlist template (`%b`, optional `%v`).
    #[serde(default = "default_variant_template")]
    pub variant_template: String,

    /// Segment file template (`%b`, `%0Nd`, optional `%v`).
    #[serde(default = "default_segment_template")]
    pub segment_template: String,

    /// Concurrent transcode slots. Defaults to the host CPU count.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// ffmpeg `-threads` budget per job. 0 leaves the choice to ffmpeg.
    #[serde(default)]
    pub threads_per_job: u32,

    #[serde(default = "default_video_bitrate")]
    pub video_bitrate: String,

    #[serde(default = "default_max_bitrate")]
    pub max_bitrate: String,

    /// VBV buffer size. Empty derives 2x the max bitrate.
    #[serde(default)]
    pub buf_size: String,

    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate: String,

    #[serde(default = "default_audio_channels")]
    pub audio_channels: u32,

    /// Target resolution as `WIDTHxHEIGHT`; empty skips scaling.
    #[serde(default = "default_resolution")]
    pub resolution: String,

    /// Keyframe interval in frames.
    #[serde(default = "default_keyframe_interval")]
    pub keyframe_interval: u32,

    #[serde(default = "default_preset")]
    pub preset: String,

    /// x264 `-tune` value; empty omits the flag.
    #[serde(default)]
    pub tune: String,

    /// Debounce window for filesystem-change rescans.
    #[serde(default = "default_rescan_debounce_ms")]
    pub rescan_debounce_ms: u64,

    /// Resume interrupted encodes from surviving segments. When disabled,
    /// partial output is wiped and the encode starts fresh.
    #[serde(default = "default_resume")]
    pub resume: bool,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg(),
            segment_duration_secs: default_segment_duration(),
            playlist_type: default_playlist_type(),
            master_template: default_master_template(),
            variant_template: default_variant_template(),
            segment_template: default_segment_template(),
            workers: default_workers(),
            threads_per_job: 0,
            video_bitrate: default_video_bitrate(),
            max_bitrate: default_max_bitrate(),
            buf_size: String::new(),
            audio_bitrate: default_audio_bitrate(),
            audio_channels: default_audio_channels(),
            resolution: default_resolution(),
            keyframe_interval: default_keyframe_interval(),
            preset: default_preset(),
            tune: String::new(),
            rescan_debounce_ms: default_rescan_debounce_ms(),
            resume: default_resume(),
        }
    }
}

impl TranscodeConfig {
    pub fn segment_duration(&self) -> Duration {
        Duration::from_secs(self.segment_duration_secs)
    }

    pub fn rescan_debounce(&self) -> Duration {
        Duration::from_millis(self.rescan_debounce_ms)
    }

    pub fn templates(&self) -> crate::layout::HlsTemplates {
        crate::layout::HlsTemplates {
            master: self.master_template.clone(),
            variant: self.variant_template.clone(),
            segment: self.segment_template.clone(),
        }
    }
}

fn default_ffmpeg() -> PathBuf {
    PathBuf::from("ffmpeg")
}
fn default_segment_duration() -> u64 {
    6
}
fn default_playlist_type() -> String {
    "vod".to_string()
}
fn default_master_template() -> String {
    "%b.m3u8".to_string()
}
fn default_variant_template() -> String {
    "%b.m3u8".to_string()
}
fn default_segment_template() -> String {
    "%b_%05d.ts".to_string()
}
fn default_workers() -> usize {
    num_cpus::get().max(1)
}
fn default_video_bitrate() -> String {
    "6000k".to_string()
}
fn default_max_bitrate() -> String {
    "7500k".to_string()
}
fn default_audio_bitrate() -> String {
    "320k".to_string()
}
fn default_audio_channels() -> u32 {
    2
}
fn default_resolution() -> String {
    "1920x1080".to_string()
}
fn default_keyframe_interval() -> u32 {
    60
}
fn default_preset() -> String {
    "slow".to_string()
}
fn default_rescan_debounce_ms() -> u64 {
    2000
}
fn default_resume() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Directory holding remuxed download files. Wiped on daemon start.
    #[serde(default = "default_cache_dir")]
    pub root_dir: PathBuf,

    /// Idle TTL for remuxed downloads.
    #[serde(default = "default_download_ttl")]
    pub download_ttl_secs: u64,

    /// TTL for remuxed live segments and init segments (immutable content).
    #[serde(default = "default_segment_ttl")]
    pub segment_ttl_secs: u64,

    /// TTL for rewritten playlists (content may still grow).
    #[serde(default = "default_playlist_ttl")]
    pub playlist_ttl_secs: u64,

    /// How often the eviction sweeps run.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Concurrent download remux slots.
    #[serde(default = "default_remux_workers")]
    pub remux_workers: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root_dir: default_cache_dir(),
            download_ttl_secs: default_download_ttl(),
            segment_ttl_secs: default_segment_ttl(),
            playlist_ttl_secs: default_playlist_ttl(),
            sweep_interval_secs: default_sweep_interval(),
            remux_workers: default_remux_workers(),
        }
    }
}

impl CacheConfig {
    pub fn download_ttl(&self) -> Duration {
        Duration::from_secs(self.download_ttl_secs)
    }
    pub fn segment_ttl(&self) -> Duration {
        Duration::from_secs(self.segment_ttl_secs)
    }
    pub fn playlist_ttl(&self) -> Duration {
        Duration::from_secs(self.playlist_ttl_secs)
    }
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

fn default_cache_dir() -> PathBuf {
    std::env::temp_dir().join("hlsforge-remux-cache")
}
fn default_download_ttl() -> u64 {
    30 * 60
}
fn default_segment_ttl() -> u64 {
    30 * 60
}
fn default_playlist_ttl() -> u64 {
    5
}
fn default_sweep_interval() -> u64 {
    5 * 60
}
fn default_remux_workers() -> usize {
    1
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NotifyConfig {
    /// Completion-notification endpoint. Empty disables notifications.
    #[serde(default)]
    pub url: String,

    /// Shared key sent in the `x-internal-key` header.
    #[serde(default)]
    pub api_key: String,
}

impl NotifyConfig {
    pub fn enabled(&self) -> bool {
        !self.url.trim().is_empty()
    }
}
