//! Source discovery.
//!
//! Walks the media library for video sources without a finished HLS output
//! and turns each into a transcode job. Movies live anywhere under `movies/`;
//! episodes follow the `shows/<show>/<season>/` convention. The set of
//! directories holding sources is returned alongside so the scheduler can
//! keep filesystem watches in sync.

use crate::inventory;
use crate::layout::{resolve_layout, HlsTemplates, Layout, MediaKind};
use crate::mediapath;
use crate::template::SegmentPattern;
use regex::Regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use walkdir::WalkDir;

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "mov", "avi", "m4v", "webm"];

/// A unit of transcode work. The key doubles as the idempotency key: it is
/// the derived master-playlist path, so two discoveries of the same source
/// collapse to one job.
#[derive(Debug, Clone)]
pub struct TranscodeJob {
    pub key: String,
    pub kind: MediaKind,
    pub descriptor: String,
    pub show_title: Option<String>,
    pub season_label: Option<String>,
    pub episode_number: Option<u32>,
    pub source_absolute: PathBuf,
    pub master_absolute: PathBuf,
    pub output_dir_absolute: PathBuf,
    pub layout: Layout,
    pub pattern: Option<SegmentPattern>,
    /// Segments already on disk at discovery time; queue classification only.
    /// Pre-flight rescans before trusting it.
    pub resume_eligible: bool,
}

impl TranscodeJob {
    fn from_layout(
        media_dir: &Path,
        kind: MediaKind,
        source_absolute: PathBuf,
        layout: Layout,
    ) -> Self {
        let master_absolute = mediapath::resolve(media_dir, &layout.master);
        let output_dir_absolute = if layout.output_dir.is_empty() {
            media_dir.to_path_buf()
        } else {
            mediapath::resolve(media_dir, &layout.output_dir)
        };
        let pattern = SegmentPattern::compile(&layout.segment_template, &layout.base_name);
        let inv = inventory::scan_segments(&output_dir_absolute, pattern.as_ref(), &layout.base_name);

        Self {
            key: layout.master.clone(),
            kind,
            descriptor: layout.base_name.clone(),
            show_title: None,
            season_label: None,
            episode_number: None,
            source_absolute,
            master_absolute,
            output_dir_absolute,
            pattern,
            resume_eligible: !inv.is_empty(),
            layout,
        }
    }

    #[cfg(test)]
    pub fn for_tests(
        media_dir: &Path,
        kind: MediaKind,
        source_absolute: PathBuf,
        layout: Layout,
    ) -> Self {
        Self::from_layout(media_dir, kind, source_absolute, layout)
    }
}

/// Everything one library scan produced.
#[derive(Debug, Default)]
pub struct Discovery {
    pub jobs: Vec<TranscodeJob>,
    pub watch_dirs: HashSet<PathBuf>,
}

/// Scan the media library for sources still missing their master playlist.
pub fn discover_jobs(media_dir: &Path, templates: &HlsTemplates) -> Discovery {
    let mut discovery = Discovery::default();
    discovery.watch_dirs.insert(media_dir.to_path_buf());

    let movies_dir = media_dir.join("movies");
    if movies_dir.is_dir() {
        collect_movie_jobs(media_dir, &movies_dir, templates, &mut discovery);
    }

    let shows_dir = media_dir.join("shows");
    if shows_dir.is_dir() {
        collect_show_jobs(media_dir, &shows_dir, templates, &mut discovery);
    }

    discovery
}

fn collect_movie_jobs(
    media_dir: &Path,
    movies_dir: &Path,
    templates: &HlsTemplates,
    discovery: &mut Discovery,
) {
    for entry in WalkDir::new(movies_dir).follow_links(false).into_iter() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!("Skipping unreadable path during scan: {}", err);
                continue;
            }
        };

        if entry.file_type().is_dir() {
            discovery.watch_dirs.insert(entry.path().to_path_buf());
            continue;
        }
        if !entry.file_type().is_file() || !is_video_source(entry.path()) {
            continue;
        }

        let Some(source_relative) = mediapath::relativize(media_dir, entry.path()) else {
            continue;
        };
        let Some(layout) =
            resolve_layout(MediaKind::Movie, Some(&source_relative), None, templates)
        else {
            continue;
        };

        let job = TranscodeJob::from_layout(
            media_dir,
            MediaKind::Movie,
            entry.path().to_path_buf(),
            layout,
        );
        if job.master_absolute.exists() {
            continue;
        }
        discovery.jobs.push(job);
    }
}

fn collect_show_jobs(
    media_dir: &Path,
    shows_dir: &Path,
    templates: &HlsTemplates,
    discovery: &mut Discovery,
) {
    discovery.watch_dirs.insert(shows_dir.to_path_buf());

    for show in read_dirs(shows_dir) {
        discovery.watch_dirs.insert(show.clone());
        let show_title = dir_name(&show);

        for season in read_dirs(&show) {
            discovery.watch_dirs.insert(season.clone());
            let season_label = dir_name(&season);

            let entries = match std::fs::read_dir(&season) {
                Ok(entries) => entries,
                Err(_) => continue,
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if !path.is_file() || !is_video_source(&path) {
                    continue;
                }
                let Some(source_relative) = mediapath::relativize(media_dir, &path) else {
                    continue;
                };
                let Some(layout) =
                    resolve_layout(MediaKind::Episode, Some(&source_relative), None, templates)
                else {
                    continue;
                };

                let mut job =
                    TranscodeJob::from_layout(media_dir, MediaKind::Episode, path, layout);
                if job.master_absolute.exists() {
                    continue;
                }
                job.episode_number = parse_episode_number(&job.layout.base_name);
                job.descriptor = format!(
                    "{} {} - {}",
                    show_title, season_label, job.layout.base_name
                );
                job.show_title = Some(show_title.clone());
                job.season_label = Some(season_label.clone());
                discovery.jobs.push(job);
            }
        }
    }
}

fn read_dirs(dir: &Path) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .flatten()
                .map(|e| e.path())
                .filter(|p| p.is_dir())
                .collect()
        })
        .unwrap_or_default();
    dirs.sort();
    dirs
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn is_video_source(path: &Path) -> bool {
    path.extension()
        .map(|ext| {
            let ext = ext.to_string_lossy().to_lowercase();
            VIDEO_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Pull an episode number out of `S01E05` / `1x05`-style markers.
fn parse_episode_number(base_name: &str) -> Option<u32> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let re = PATTERN.get_or_init(|| {
        Regex::new(r"(?i)(?:s\d{1,2}e|\d{1,2}x)(\d{1,3})").expect("static regex")
    });
    re.captures(base_name)?.get(1)?.as_str().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn templates() -> HlsTemplates {
        HlsTemplates {
            master: "%b.m3u8".into(),
            variant: "%b.m3u8".into(),
            segment: "%b_%05d.ts".into(),
        }
    }

    #[test]
    fn test_discovers_movies_and_episodes() {
        let tmp = TempDir::new().unwrap();
        let movie_dir = tmp.path().join("movies/Alien (1979)");
        std::fs::create_dir_all(&movie_dir).unwrap();
        std::fs::write(movie_dir.join("Alien.mkv"), b"x").unwrap();

        let season_dir = tmp.path().join("shows/Lost/Season 1");
        std::fs::create_dir_all(&season_dir).unwrap();
        std::fs::write(season_dir.join("Lost S01E02.mkv"), b"x").unwrap();

        let discovery = discover_jobs(tmp.path(), &templates());
        assert_eq!(discovery.jobs.len(), 2);

        let movie = discovery
            .jobs
            .iter()
            .find(|j| j.kind == MediaKind::Movie)
            .unwrap();
        assert_eq!(movie.key, "movies/Alien (1979)/Alien.m3u8");
        assert_eq!(movie.descriptor, "Alien");

        let episode = discovery
            .jobs
            .iter()
            .find(|j| j.kind == MediaKind::Episode)
            .unwrap();
        assert_eq!(episode.show_title.as_deref(), Some("Lost"));
        assert_eq!(episode.season_label.as_deref(), Some("Season 1"));
        assert_eq!(episode.episode_number, Some(2));
        assert_eq!(episode.descriptor, "Lost Season 1 - Lost S01E02");

        assert!(discovery.watch_dirs.contains(&movie_dir));
        assert!(discovery.watch_dirs.contains(&season_dir));
    }

    #[test]
    fn test_finished_titles_are_not_rediscovered() {
        let tmp = TempDir::new().unwrap();
        let movie_dir = tmp.path().join("movies");
        std::fs::create_dir_all(&movie_dir).unwrap();
        std::fs::write(movie_dir.join("Alien.mkv"), b"x").unwrap();
        // Master playlist present means the encode already completed.
        std::fs::write(movie_dir.join("Alien.m3u8"), b"#EXTM3U").unwrap();

        let discovery = discover_jobs(tmp.path(), &templates());
        assert!(discovery.jobs.is_empty());
    }

    #[test]
    fn test_partial_output_marks_resume_eligible() {
        let tmp = TempDir::new().unwrap();
        let movie_dir = tmp.path().join("movies");
        std::fs::create_dir_all(&movie_dir).unwrap();
        std::fs::write(movie_dir.join("Alien.mkv"), b"x").unwrap();
        std::fs::write(movie_dir.join("Alien_00000.ts"), b"seg").unwrap();

        let discovery = discover_jobs(tmp.path(), &templates());
        assert_eq!(discovery.jobs.len(), 1);
        assert!(discovery.jobs[0].resume_eligible);
    }

    #[test]
    fn test_non_video_files_ignored() {
        let tmp = TempDir::new().unwrap();
        let movie_dir = tmp.path().join("movies");
        std::fs::create_dir_all(&movie_dir).unwrap();
        std::fs::write(movie_dir.join("notes.txt"), b"x").unwrap();
        std::fs::write(movie_dir.join("Alien.m3u8"), b"#EXTM3U").unwrap();

        let discovery = discover_jobs(tmp.path(), &templates());
        assert!(discovery.jobs.is_empty());
    }

    #[test]
    fn test_parse_episode_number() {
        assert_eq!(parse_episode_number("Lost S01E05"), Some(5));
        assert_eq!(parse_episode_number("lost 1x07"), Some(7));
        assert_eq!(parse_episode_number("Pilot"), None);
    }
}
