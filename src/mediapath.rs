//! Catalog-relative path handling.
//!
//! The catalog, the encoder, and the remux caches all exchange paths as
//! forward-slash strings relative to the media root. Conversion to platform
//! paths happens only at the filesystem boundary.

use std::path::{Path, PathBuf, MAIN_SEPARATOR};

/// Convert a platform path fragment to a posix-style relative string.
pub fn to_posix(path: &str) -> String {
    if MAIN_SEPARATOR == '/' {
        path.to_string()
    } else {
        path.replace(MAIN_SEPARATOR, "/")
    }
}

/// Convert a posix-style relative string to a platform path fragment.
pub fn from_posix(path: &str) -> PathBuf {
    if MAIN_SEPARATOR == '/' {
        PathBuf::from(path)
    } else {
        PathBuf::from(path.replace('/', &MAIN_SEPARATOR.to_string()))
    }
}

/// Resolve a catalog-relative posix path against the media root.
pub fn resolve(media_dir: &Path, relative: &str) -> PathBuf {
    media_dir.join(from_posix(relative))
}

/// Express a platform path relative to the media root, posix-style.
///
/// Returns `None` when the path is not under the root.
pub fn relativize(media_dir: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(media_dir).ok()?;
    Some(to_posix(&rel.to_string_lossy()))
}

/// Join posix path fragments, normalizing `.` components.
pub fn join_posix(dir: &str, rest: &str) -> String {
    if rest.starts_with('/') {
        return normalize_posix(rest);
    }
    if dir.is_empty() || dir == "." {
        return normalize_posix(rest);
    }
    normalize_posix(&format!("{dir}/{rest}"))
}

fn normalize_posix(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => continue,
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    let joined = parts.join("/");
    if path.starts_with('/') {
        format!("/{joined}")
    } else {
        joined
    }
}

/// Posix dirname: everything before the final slash, or `.` when flat.
pub fn parent_posix(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) => "/",
        Some(idx) => &path[..idx],
        None => ".",
    }
}

/// Posix basename.
pub fn file_name_posix(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// Posix basename with the final extension removed.
pub fn file_stem_posix(path: &str) -> &str {
    let name = file_name_posix(path);
    match name.rfind('.') {
        Some(0) | None => name,
        Some(idx) => &name[..idx],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_posix() {
        assert_eq!(join_posix("movies", "Alien.m3u8"), "movies/Alien.m3u8");
        assert_eq!(join_posix("", "Alien.m3u8"), "Alien.m3u8");
        assert_eq!(join_posix(".", "Alien.m3u8"), "Alien.m3u8");
        assert_eq!(join_posix("shows/Lost", "./S01E01"), "shows/Lost/S01E01");
    }

    #[test]
    fn test_parent_and_stem() {
        assert_eq!(parent_posix("movies/Alien.mkv"), "movies");
        assert_eq!(parent_posix("Alien.mkv"), ".");
        assert_eq!(file_stem_posix("movies/Alien (1979).mkv"), "Alien (1979)");
        assert_eq!(file_stem_posix("noext"), "noext");
        assert_eq!(file_name_posix("a/b/c.ts"), "c.ts");
    }

    #[test]
    fn test_resolve_round_trip() {
        let root = Path::new("/srv/media");
        let abs = resolve(root, "movies/Alien.mkv");
        assert_eq!(relativize(root, &abs).as_deref(), Some("movies/Alien.mkv"));
    }
}
