//! Container remuxing.
//!
//! Two consumers sit on top of this module: the download cache, which turns
//! a finished HLS title into a single progressive MP4 file, and the live
//! cache, which converts individual `.ts` segments to fMP4 for players that
//! cannot consume MPEG-TS. Both are stream copies, never re-encodes.

pub mod download;
pub mod live;

use crate::encoder::process;
use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};

/// Longest filename offered on a download, after sanitizing.
pub const MAX_DOWNLOAD_FILENAME_LEN: usize = 140;

const FRAGMENT_MOVFLAGS: &str = "frag_keyframe+empty_moov+default_base_moof";

/// Seam between the caches and ffmpeg. Tests substitute an in-memory fake.
#[async_trait]
pub trait Remuxer: Send + Sync {
    /// Stream-copy a whole HLS playlist into a progressive MP4 file.
    async fn remux_to_file(&self, playlist: &Path, output: &Path) -> Result<()>;

    /// Stream-copy one `.ts` segment into a fragmented MP4 buffer.
    async fn segment_to_fmp4(&self, segment: &Path) -> Result<Bytes>;

    /// Produce an fMP4 initialization segment from a `.ts` segment.
    async fn init_from_segment(&self, segment: &Path) -> Result<Bytes>;
}

pub struct FfmpegRemuxer {
    ffmpeg_path: PathBuf,
}

impl FfmpegRemuxer {
    pub fn new(ffmpeg_path: PathBuf) -> Self {
        Self { ffmpeg_path }
    }
}

#[async_trait]
impl Remuxer for FfmpegRemuxer {
    async fn remux_to_file(&self, playlist: &Path, output: &Path) -> Result<()> {
        // Segment URIs inside the playlist are relative, so ffmpeg has to run
        // from the playlist's own directory to resolve them.
        let dir = playlist.parent().unwrap_or_else(|| Path::new("."));
        let playlist_name = playlist
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let args = vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-y".to_string(),
            "-i".to_string(),
            playlist_name,
            "-c".to_string(),
            "copy".to_string(),
            "-movflags".to_string(),
            "faststart".to_string(),
            "-f".to_string(),
            "mp4".to_string(),
            output.to_string_lossy().into_owned(),
        ];
        process::run_in_dir(&self.ffmpeg_path, &args, dir).await
    }

    async fn segment_to_fmp4(&self, segment: &Path) -> Result<Bytes> {
        let args = vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-i".to_string(),
            segment.to_string_lossy().into_owned(),
            "-map".to_string(),
            "0".to_string(),
            "-c".to_string(),
            "copy".to_string(),
            "-f".to_string(),
            "mp4".to_string(),
            "-movflags".to_string(),
            FRAGMENT_MOVFLAGS.to_string(),
            "pipe:1".to_string(),
        ];
        process::run_capture(&self.ffmpeg_path, &args).await
    }

    async fn init_from_segment(&self, segment: &Path) -> Result<Bytes> {
        // A fraction of a second of input is enough to emit the moov header.
        let args = vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-i".to_string(),
            segment.to_string_lossy().into_owned(),
            "-map".to_string(),
            "0:v:0".to_string(),
            "-map".to_string(),
            "0:a:0".to_string(),
            "-c".to_string(),
            "copy".to_string(),
            "-f".to_string(),
            "mp4".to_string(),
            "-movflags".to_string(),
            FRAGMENT_MOVFLAGS.to_string(),
            "-t".to_string(),
            "0.1".to_string(),
            "pipe:1".to_string(),
        ];
        process::run_capture(&self.ffmpeg_path, &args).await
    }
}

/// Flatten a descriptor into something safe to offer as a filename.
pub fn sanitize_filename(input: &str) -> String {
    let stripped: String = input
        .chars()
        .map(|c| match c {
            '/' | '\\' | '?' | '%' | '*' | ':' | '|' | '"' | '<' | '>' => '-',
            c => c,
        })
        .collect();
    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return "download".to_string();
    }
    collapsed.chars().take(MAX_DOWNLOAD_FILENAME_LEN).collect()
}

/// Content type a download response should carry for a given file.
pub fn content_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .as_deref()
    {
        Some("mp4") => "video/mp4",
        Some("mkv") => "video/x-matroska",
        Some("mov") => "video/quicktime",
        Some("avi") => "video/x-msvideo",
        Some("m4v") => "video/x-m4v",
        Some("webm") => "video/webm",
        _ => "video/mp4",
    }
}
