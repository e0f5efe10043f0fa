//! FFmpeg invocation building.
//!
//! A pure function from job paths, transcode settings, and an optional resume
//! cursor to the exact argument vector. Keeping it side-effect free makes the
//! resume and scaling behavior testable without spawning a process.

use crate::config::TranscodeConfig;
use crate::inventory::ResumeCursor;
use crate::layout::Layout;
use crate::mediapath;
use crate::template;
use std::path::Path;

/// Build the full ffmpeg argument vector for a transcode job.
pub fn build_transcode_args(
    settings: &TranscodeConfig,
    media_dir: &Path,
    source_absolute: &Path,
    layout: &Layout,
    cursor: Option<&ResumeCursor>,
) -> Vec<String> {
    let variant_path = mediapath::resolve(media_dir, &layout.variant_template);
    let segment_path = mediapath::resolve(media_dir, &layout.segment_template);
    let master_name = mediapath::file_name_posix(&layout.master).to_string();

    let use_variant_map = template::has_stream_index(&layout.variant_template)
        || template::has_stream_index(&layout.segment_template);

    let mut args: Vec<String> = vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-y".into(),
    ];

    // Seek must precede -i so ffmpeg seeks the demuxer instead of decoding
    // and discarding everything before the resume point.
    if let Some(cursor) = cursor {
        if cursor.seek_seconds > 0.0 {
            args.push("-ss".into());
            args.push(format_seek_seconds(cursor.seek_seconds));
        }
    }

    args.push("-i".into());
    args.push(source_absolute.to_string_lossy().into_owned());

    if let Some(filter) = scale_filter(&settings.resolution) {
        args.push("-vf".into());
        args.push(filter);
    }

    args.extend([
        "-map".into(),
        "0:v:0".into(),
        "-map".into(),
        "0:a:0".into(),
        "-c:v".into(),
        "libx264".into(),
        "-preset".into(),
        settings.preset.clone(),
    ]);

    if !settings.tune.is_empty() {
        args.push("-tune".into());
        args.push(settings.tune.clone());
    }

    args.extend([
        "-pix_fmt".into(),
        "yuv420p".into(),
        "-profile:v".into(),
        "high".into(),
        "-b:v".into(),
        settings.video_bitrate.clone(),
        "-maxrate".into(),
        settings.max_bitrate.clone(),
    ]);

    if let Some(buf_size) = resolve_buf_size(&settings.max_bitrate, &settings.buf_size) {
        args.push("-bufsize".into());
        args.push(buf_size);
    }

    let keyframe_interval = if settings.keyframe_interval > 0 {
        settings.keyframe_interval
    } else {
        (settings.segment_duration_secs as u32 * 2).max(1)
    };
    args.extend([
        "-g".into(),
        keyframe_interval.to_string(),
        "-keyint_min".into(),
        keyframe_interval.to_string(),
        "-sc_threshold".into(),
        "0".into(),
    ]);

    args.extend(["-c:a".into(), "aac".into()]);
    if !settings.audio_bitrate.is_empty() {
        args.push("-b:a".into());
        args.push(settings.audio_bitrate.clone());
    }
    args.extend(["-ac".into(), settings.audio_channels.to_string()]);

    args.extend([
        "-hls_time".into(),
        settings.segment_duration_secs.to_string(),
        "-hls_playlist_type".into(),
        settings.playlist_type.clone(),
        "-hls_segment_filename".into(),
        segment_path.to_string_lossy().into_owned(),
    ]);

    if settings.threads_per_job > 0 {
        args.push("-threads".into());
        args.push(settings.threads_per_job.to_string());
    }

    if use_variant_map {
        args.extend([
            "-master_pl_name".into(),
            master_name,
            "-var_stream_map".into(),
            "v:0,a:0 name:high".into(),
        ]);
    }

    args.push("-hls_flags".into());
    args.push(hls_flags(cursor));

    if let Some(cursor) = cursor {
        args.push("-start_number".into());
        args.push(cursor.start_number.to_string());
    }

    args.extend([
        "-f".into(),
        "hls".into(),
        variant_path.to_string_lossy().into_owned(),
    ]);

    args
}

fn hls_flags(cursor: Option<&ResumeCursor>) -> String {
    let mut flags = vec!["independent_segments"];
    if let Some(cursor) = cursor {
        if cursor.append_list {
            flags.push("append_list");
        }
        if cursor.discont_start {
            flags.push("discont_start");
        }
    }
    flags.join("+")
}

/// Aspect-preserving, divisible-by-2 scale filter from a `WxH` target.
/// Returns `None` when no target dimension is configured.
fn scale_filter(resolution: &str) -> Option<String> {
    let (width, height) = parse_resolution(resolution)?;
    let scale = match (width, height) {
        (Some(w), Some(h)) => format!(
            "scale=w={w}:h={h}:force_original_aspect_ratio=decrease:force_divisible_by=2"
        ),
        (Some(w), None) => format!(
            "scale=w={w}:h=-2:force_original_aspect_ratio=decrease:force_divisible_by=2"
        ),
        (None, Some(h)) => format!(
            "scale=w=-2:h={h}:force_original_aspect_ratio=decrease:force_divisible_by=2"
        ),
        (None, None) => return None,
    };
    Some(format!("{scale},setsar=1"))
}

fn parse_resolution(value: &str) -> Option<(Option<u32>, Option<u32>)> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    let (w, h) = value.split_once(|c| c == 'x' || c == 'X' || c == ':')?;
    let width = w.trim().parse().ok();
    let height = h.trim().parse().ok();
    if width.is_none() && height.is_none() {
        return None;
    }
    Some((width, height))
}

/// Parse a bitrate like `7500k` or `8M` into kbps.
fn parse_bitrate_kbps(value: &str) -> Option<f64> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    let (digits, unit) = match value.char_indices().find(|(_, c)| c.is_ascii_alphabetic()) {
        Some((idx, _)) => value.split_at(idx),
        None => (value, "k"),
    };
    let numeric: f64 = digits.parse().ok()?;
    match unit.to_ascii_lowercase().as_str() {
        "" | "k" => Some(numeric),
        "m" => Some(numeric * 1000.0),
        "g" => Some(numeric * 1_000_000.0),
        _ => None,
    }
}

/// VBV buffer size: explicit override, else 2x the max bitrate.
fn resolve_buf_size(max_bitrate: &str, override_value: &str) -> Option<String> {
    if !override_value.is_empty() {
        return Some(override_value.to_string());
    }
    let kbps = parse_bitrate_kbps(max_bitrate)?;
    Some(format!("{}k", (kbps * 2.0).round() as u64))
}

/// Render a seek offset without trailing zeros (`252`, `12.5`).
fn format_seek_seconds(seconds: f64) -> String {
    if seconds <= 0.0 {
        return "0".to_string();
    }
    if (seconds - seconds.round()).abs() < 1e-3 {
        return format!("{}", seconds.round() as u64);
    }
    let formatted = format!("{seconds:.3}");
    formatted
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string()
}
