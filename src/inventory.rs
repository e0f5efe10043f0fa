//! Segment inventory scanning and resume-cursor derivation.
//!
//! An interrupted encode leaves numbered segments behind but no master
//! playlist. Counting what survived tells the scheduler where to pick the
//! encode back up.

use crate::template::{self, SegmentPattern};
use std::path::Path;
use std::time::Duration;

/// What a scan of an output directory found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SegmentInventory {
    /// Highest segment index present, if any.
    pub highest: Option<u64>,
    /// Lowest segment index present, if any.
    pub lowest: Option<u64>,
    /// Number of distinct indices found.
    pub count: usize,
}

impl SegmentInventory {
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Scan a directory for produced segments.
///
/// Matching uses the compiled segment pattern when one is derivable from the
/// template; otherwise falls back to "starts with `<base>_`, ends with `.ts`"
/// plus trailing-number extraction. A nonexistent directory is an empty
/// inventory, never an error.
pub fn scan_segments(
    dir: &Path,
    pattern: Option<&SegmentPattern>,
    base_name: &str,
) -> SegmentInventory {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return SegmentInventory::default(),
    };

    let fallback_prefix = format!("{}_", base_name.to_lowercase());
    let mut seen = std::collections::HashSet::new();
    let mut highest: Option<u64> = None;
    let mut lowest: Option<u64> = None;

    for entry in entries.flatten() {
        let name = entry.file_name();
        let name = name.to_string_lossy();

        let index = match pattern {
            Some(pat) => pat.match_index(&name),
            None => {
                let lower = name.to_lowercase();
                if lower.starts_with(&fallback_prefix) && lower.ends_with(".ts") {
                    template::trailing_number(&name)
                } else {
                    None
                }
            }
        };

        let Some(index) = index else { continue };
        if !seen.insert(index) {
            continue;
        }
        highest = Some(highest.map_or(index, |h| h.max(index)));
        lowest = Some(lowest.map_or(index, |l| l.min(index)));
    }

    SegmentInventory {
        highest,
        lowest,
        count: seen.len(),
    }
}

/// Where to pick an interrupted encode back up.
#[derive(Debug, Clone, PartialEq)]
pub struct ResumeCursor {
    /// Append to the existing variant playlist instead of rewriting it.
    pub append_list: bool,
    /// Segment number the encoder should emit next.
    pub start_number: u64,
    /// Input seek offset in seconds.
    pub seek_seconds: f64,
    /// Mark the first resumed segment with a discontinuity tag.
    pub discont_start: bool,
}

impl ResumeCursor {
    /// Derive a cursor from a segment inventory.
    ///
    /// The seek derives from the distinct segment *count*, not the highest
    /// index: a gapped directory then under-seeks (re-encoding some overlap)
    /// rather than skipping content the gaps never covered.
    pub fn from_inventory(
        inventory: &SegmentInventory,
        segment_duration: Duration,
    ) -> Option<Self> {
        let highest = inventory.highest?;
        let seek_seconds = inventory.count as f64 * segment_duration.as_secs_f64();

        Some(Self {
            append_list: true,
            start_number: highest + 1,
            seek_seconds,
            discont_start: seek_seconds > 0.0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::SegmentPattern;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), b"seg").unwrap();
    }

    #[test]
    fn test_scan_with_pattern() {
        let tmp = TempDir::new().unwrap();
        let pat = SegmentPattern::compile("%b_%05d.ts", "Alien").unwrap();
        for i in [0u64, 1, 2, 41] {
            touch(tmp.path(), &format!("Alien_{i:05}.ts"));
        }
        touch(tmp.path(), "Alien.m3u8");
        touch(tmp.path(), "unrelated.ts");

        let inv = scan_segments(tmp.path(), Some(&pat), "Alien");
        assert_eq!(inv.highest, Some(41));
        assert_eq!(inv.lowest, Some(0));
        assert_eq!(inv.count, 4);
    }

    #[test]
    fn test_scan_gapped_indices() {
        let tmp = TempDir::new().unwrap();
        let pat = SegmentPattern::compile("%b_%05d.ts", "Alien").unwrap();
        for i in [3u64, 5, 9] {
            touch(tmp.path(), &format!("Alien_{i:05}.ts"));
        }

        let inv = scan_segments(tmp.path(), Some(&pat), "Alien");
        assert_eq!(inv.highest, Some(9));
        assert_eq!(inv.lowest, Some(3));
        assert_eq!(inv.count, 3);
    }

    #[test]
    fn test_scan_fallback_matcher() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "Alien_00007.ts");
        touch(tmp.path(), "ALIEN_00008.TS");
        touch(tmp.path(), "Alien_notes.txt");

        let inv = scan_segments(tmp.path(), None, "Alien");
        assert_eq!(inv.highest, Some(8));
        assert_eq!(inv.count, 2);
    }

    #[test]
    fn test_scan_missing_dir_is_empty() {
        let inv = scan_segments(Path::new("/does/not/exist"), None, "Alien");
        assert!(inv.is_empty());
        assert_eq!(inv.highest, None);
    }

    #[test]
    fn test_resume_cursor_from_contiguous_run() {
        let inv = SegmentInventory {
            highest: Some(41),
            lowest: Some(0),
            count: 42,
        };
        let cursor = ResumeCursor::from_inventory(&inv, Duration::from_secs(6)).unwrap();
        assert_eq!(cursor.start_number, 42);
        assert_eq!(cursor.seek_seconds, 252.0);
        assert!(cursor.append_list);
        assert!(cursor.discont_start);
    }

    #[test]
    fn test_resume_cursor_seeks_by_count_not_index() {
        let inv = SegmentInventory {
            highest: Some(9),
            lowest: Some(3),
            count: 3,
        };
        let cursor = ResumeCursor::from_inventory(&inv, Duration::from_secs(6)).unwrap();
        assert_eq!(cursor.start_number, 10);
        assert_eq!(cursor.seek_seconds, 18.0);
    }

    #[test]
    fn test_resume_cursor_requires_segments() {
        let inv = SegmentInventory::default();
        assert!(ResumeCursor::from_inventory(&inv, Duration::from_secs(6)).is_none());
    }
}
