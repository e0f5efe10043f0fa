//! HLS output layout resolution.
//!
//! Pure computation from a catalog-relative source path and the configured
//! naming templates to the derived output paths. Both the encoder daemon and
//! the API process run this independently and must agree on the result, so
//! the function touches no filesystem state: identical inputs always yield
//! identical layouts. That determinism is also what makes the master
//! playlist usable as an idempotency key.

use crate::mediapath;
use crate::template;
use serde::{Deserialize, Serialize};

/// What kind of title a source file represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Movie,
    Episode,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Movie => "movie",
            MediaKind::Episode => "episode",
        }
    }
}

/// The three naming templates driving output layout.
#[derive(Debug, Clone)]
pub struct HlsTemplates {
    /// Master playlist name, e.g. `%b.m3u8`.
    pub master: String,
    /// Variant playlist template, e.g. `%b_v%v.m3u8`.
    pub variant: String,
    /// Segment template, e.g. `%b_%05d.ts`.
    pub segment: String,
}

/// Derived output layout, all paths catalog-relative posix strings.
///
/// `variant_template` and `segment_template` still carry their `%v`/`%d`
/// placeholders; they are handed to ffmpeg verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub master: String,
    pub output_dir: String,
    pub base_name: String,
    pub variant_template: String,
    pub segment_template: String,
}

/// Resolve the output layout for a title.
///
/// The base name comes from the source filename; when the source is gone
/// (e.g. deleted after encoding) it is recovered from a known derived path so
/// downloads keep working. Episode outputs nest one directory deeper, under a
/// base-name directory, because episodes of a season share a folder and their
/// segment files would otherwise collide.
pub fn resolve_layout(
    kind: MediaKind,
    source_relative: Option<&str>,
    hls_relative: Option<&str>,
    templates: &HlsTemplates,
) -> Option<Layout> {
    let mut base_dir = String::new();
    let mut base_name = String::new();

    if let Some(source) = source_relative {
        base_dir = mediapath::parent_posix(source).to_string();
        base_name = mediapath::file_stem_posix(source).to_string();
    }
    if base_name.is_empty() {
        if let Some(hls) = hls_relative {
            base_dir = mediapath::parent_posix(hls).to_string();
            base_name = mediapath::file_stem_posix(hls).to_string();
        }
    }
    if source_relative.is_none() && hls_relative.is_none() {
        return None;
    }
    if base_name.trim().is_empty() {
        base_name = "stream".to_string();
    }

    let output_dir = match kind {
        MediaKind::Episode => mediapath::join_posix(&base_dir, &base_name),
        MediaKind::Movie => {
            if base_dir == "." {
                String::new()
            } else {
                base_dir.clone()
            }
        }
    };

    let place = |tpl: &str| {
        mediapath::join_posix(&output_dir, &template::format_base(tpl, &base_name))
    };

    Some(Layout {
        master: place(&templates.master),
        variant_template: place(&templates.variant),
        segment_template: place(&templates.segment),
        output_dir,
        base_name,
    })
}
