//! Naming-template compiler shared by the layout resolver and the segment
//! inventory scanner.
//!
//! Templates use `%b` for the title base name, `%v` for the ffmpeg variant
//! stream index, and `%d` / zero-padded `%0Nd` for the segment number. The
//! same compiled form serves both directions: formatting output paths and
//! recognizing segment files already on disk.

use regex::Regex;

/// Substitute `%b` occurrences with the base name.
pub fn format_base(template: &str, base_name: &str) -> String {
    template.replace("%b", base_name)
}

/// Whether the template addresses per-variant outputs (`%v`).
///
/// Controls emission of `-var_stream_map` / `-master_pl_name`.
pub fn has_stream_index(template: &str) -> bool {
    template.contains("%v")
}

/// A compiled segment-filename matcher.
///
/// Each numeric placeholder becomes a capture group; the group playing the
/// segment-index role is the `%d`-family one (the last group if the template
/// only carries `%v`).
#[derive(Debug, Clone)]
pub struct SegmentPattern {
    regex: Regex,
    index_group: usize,
}

impl SegmentPattern {
    /// Compile the file-name portion of a segment template, with `%b`
    /// already substituted. Returns `None` when the template carries no
    /// numeric placeholder at all.
    pub fn compile(segment_template: &str, base_name: &str) -> Option<Self> {
        let formatted = format_base(segment_template, base_name);
        let file_name = crate::mediapath::file_name_posix(&formatted);

        let placeholder = Regex::new(r"%0\d+d|%d|%v").expect("static regex");
        let mut pattern = String::from("^");
        let mut last_end = 0;
        let mut group = 0;
        let mut index_group = None;

        for m in placeholder.find_iter(file_name) {
            pattern.push_str(&regex::escape(&file_name[last_end..m.start()]));
            pattern.push_str(r"(\d+)");
            group += 1;
            if m.as_str() != "%v" {
                index_group = Some(group);
            }
            last_end = m.end();
        }
        pattern.push_str(&regex::escape(&file_name[last_end..]));
        pattern.push('$');

        if group == 0 {
            return None;
        }

        let regex = Regex::new(&format!("(?i){pattern}")).ok()?;
        Some(Self {
            regex,
            index_group: index_group.unwrap_or(group),
        })
    }

    /// Extract the segment index from a file name, if it matches.
    pub fn match_index(&self, file_name: &str) -> Option<u64> {
        let caps = self.regex.captures(file_name)?;
        caps.get(self.index_group)?.as_str().parse().ok()
    }

    /// Whether a file name matches the pattern at all.
    pub fn is_match(&self, file_name: &str) -> bool {
        self.regex.is_match(file_name)
    }
}

/// Fallback trailing-number extraction for templates without a derivable
/// pattern: the last digit run before the final extension.
pub fn trailing_number(file_name: &str) -> Option<u64> {
    let stem = match file_name.rfind('.') {
        Some(idx) if idx > 0 => &file_name[..idx],
        _ => file_name,
    };
    let digits: String = stem
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    if digits.is_empty() {
        return None;
    }
    digits.chars().rev().collect::<String>().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_base() {
        assert_eq!(format_base("%b.m3u8", "Alien"), "Alien.m3u8");
        assert_eq!(format_base("%b_%05d.ts", "Alien"), "Alien_%05d.ts");
    }

    #[test]
    fn test_compile_padded_template() {
        let pat = SegmentPattern::compile("%b_%05d.ts", "Alien").unwrap();
        assert_eq!(pat.match_index("Alien_00042.ts"), Some(42));
        assert_eq!(pat.match_index("alien_00000.ts"), Some(0));
        assert_eq!(pat.match_index("Alien_00042.m4s"), None);
        assert_eq!(pat.match_index("Other_00042.ts"), None);
    }

    #[test]
    fn test_compile_variant_template_prefers_segment_group() {
        let pat = SegmentPattern::compile("%b_v%v_%05d.ts", "Alien").unwrap();
        assert_eq!(pat.match_index("Alien_v0_00007.ts"), Some(7));
    }

    #[test]
    fn test_compile_without_placeholder() {
        assert!(SegmentPattern::compile("%b.ts", "Alien").is_none());
    }

    #[test]
    fn test_escapes_regex_metacharacters_in_base_name() {
        let pat = SegmentPattern::compile("%b_%05d.ts", "Alien (1979)").unwrap();
        assert_eq!(pat.match_index("Alien (1979)_00003.ts"), Some(3));
    }

    #[test]
    fn test_trailing_number() {
        assert_eq!(trailing_number("Alien_00042.ts"), Some(42));
        assert_eq!(trailing_number("Alien.ts"), None);
        assert_eq!(trailing_number("Alien_7"), Some(7));
    }

    #[test]
    fn test_has_stream_index() {
        assert!(has_stream_index("%b_v%v.m3u8"));
        assert!(!has_stream_index("%b.m3u8"));
    }
}
