use serde::Deserialize;

use crate::FsError;

/// Path conventions used by a [`Vfs`](crate::Vfs) instance.
///
/// Injected at router construction so that different routers (or tests)
/// can use different separators without any global state.
///
/// - `separator` is the canonical separator every path is normalized to
/// - `alt_separator` is accepted on input and replaced with `separator`
/// - `root` marks a virtual path (`/assets/foo.png`); paths that do not
///   start with it are treated as physical
/// - `extension_marker` separates a file name from its extension and is
///   used to tell files from bare directories during resolution
/// - `forbidden_chars` may never appear in a path passed to the router
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    pub separator: char,
    pub alt_separator: char,
    pub root: char,
    pub extension_marker: char,
    pub forbidden_chars: Vec<char>,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            separator: '/',
            alt_separator: '\\',
            root: '/',
            extension_marker: '.',
            forbidden_chars: vec!['<', '>', '"', '|', '?', '*', '\0'],
        }
    }
}

impl PathConfig {
    /// Normalize a path.
    ///
    /// - Replaces alternate separators with the canonical one
    /// - Collapses redundant separators (`a///b` → `a/b`)
    /// - Appends a trailing separator when `is_directory` is set
    ///
    /// An empty input stays empty.
    pub fn normalize(&self, path: &str, is_directory: bool) -> String {
        let mut normalized = String::with_capacity(path.len() + 1);
        let mut prev_was_separator = false;

        for ch in path.chars() {
            let ch = if ch == self.alt_separator {
                self.separator
            } else {
                ch
            };
            if ch == self.separator {
                if prev_was_separator {
                    continue;
                }
                prev_was_separator = true;
            } else {
                prev_was_separator = false;
            }
            normalized.push(ch);
        }

        if is_directory && !normalized.is_empty() && !normalized.ends_with(self.separator) {
            normalized.push(self.separator);
        }

        normalized
    }

    /// Whether the path is non-blank and free of forbidden characters.
    pub fn is_valid(&self, path: &str) -> bool {
        !path.trim().is_empty() && !path.chars().any(|ch| self.forbidden_chars.contains(&ch))
    }

    /// Like [`is_valid`](Self::is_valid) but returns a descriptive error.
    pub fn validate(&self, path: &str) -> Result<(), FsError> {
        if path.trim().is_empty() {
            return Err(FsError::InvalidArgument("empty path".into()));
        }
        if let Some(ch) = path.chars().find(|ch| self.forbidden_chars.contains(ch)) {
            return Err(FsError::InvalidArgument(format!(
                "forbidden character {ch:?} in path {path:?}"
            )));
        }
        Ok(())
    }

    /// Whether the path starts with the virtual root marker.
    pub fn is_virtual(&self, path: &str) -> bool {
        path.starts_with(self.root)
    }

    /// Join a directory path and a relative path with exactly one separator
    /// between them.
    pub fn combine(&self, left: &str, right: &str) -> String {
        let mut combined = self.normalize(left, true);
        let right = self.normalize(right, false);
        combined.push_str(right.strip_prefix(self.separator).unwrap_or(&right));
        combined
    }

    /// The last segment of the path (`dir/file.png` → `file.png`).
    pub fn file_name<'a>(&self, path: &'a str) -> &'a str {
        let trimmed = path.trim_end_matches([self.separator, self.alt_separator]);
        match trimmed.rfind([self.separator, self.alt_separator]) {
            Some(pos) => &trimmed[pos + 1..],
            None => trimmed,
        }
    }

    /// The extension of the last segment including its marker
    /// (`a/b.tar.gz` → `.gz`), or an empty string.
    pub fn extension<'a>(&self, path: &'a str) -> &'a str {
        let name = self.file_name(path);
        match name.rfind(self.extension_marker) {
            Some(pos) if pos > 0 => &name[pos..],
            _ => "",
        }
    }

    /// Whether `segment` looks like a file name rather than a directory.
    pub(crate) fn has_extension_marker(&self, segment: &str) -> bool {
        segment.contains(self.extension_marker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PathConfig {
        PathConfig::default()
    }

    #[test]
    fn backslashes_are_replaced() {
        assert_eq!(
            config().normalize("textures\\brick.png", false),
            "textures/brick.png"
        );
    }

    #[test]
    fn redundant_slashes() {
        assert_eq!(
            config().normalize("textures///brick.png", false),
            "textures/brick.png"
        );
        assert_eq!(config().normalize("a\\\\/b", false), "a/b");
    }

    #[test]
    fn directory_gets_trailing_separator() {
        assert_eq!(config().normalize("/assets", true), "/assets/");
        assert_eq!(config().normalize("/assets/", true), "/assets/");
    }

    #[test]
    fn empty_stays_empty() {
        assert_eq!(config().normalize("", true), "");
    }

    #[test]
    fn custom_separator() {
        let cfg = PathConfig {
            separator: '\\',
            alt_separator: '/',
            root: '\\',
            ..PathConfig::default()
        };
        assert_eq!(cfg.normalize("/data//sub/", false), "\\data\\sub\\");
        assert!(cfg.is_virtual("\\data"));
    }

    #[test]
    fn reject_empty() {
        assert!(!config().is_valid(""));
        assert!(!config().is_valid("   "));
        assert!(matches!(
            config().validate(""),
            Err(FsError::InvalidArgument(_))
        ));
    }

    #[test]
    fn reject_forbidden_chars() {
        assert!(!config().is_valid("/assets/what?.png"));
        assert!(!config().is_valid("/assets/a|b"));
        assert!(config().is_valid("C:/data/file.txt"));
    }

    #[test]
    fn virtual_detection() {
        assert!(config().is_virtual("/assets/a.png"));
        assert!(!config().is_virtual("C:/data/a.png"));
        assert!(!config().is_virtual("relative/a.png"));
    }

    #[test]
    fn combine_paths() {
        assert_eq!(config().combine("C:/data", "level.scene"), "C:/data/level.scene");
        assert_eq!(config().combine("C:/data/", "/level.scene"), "C:/data/level.scene");
        assert_eq!(config().combine("a\\b", "c\\d.txt"), "a/b/c/d.txt");
    }

    #[test]
    fn file_name_and_extension() {
        assert_eq!(config().file_name("dir/sub/file.png"), "file.png");
        assert_eq!(config().file_name("file.png"), "file.png");
        assert_eq!(config().file_name("dir/sub/"), "sub");
        assert_eq!(config().extension("dir/archive.tar.gz"), ".gz");
        assert_eq!(config().extension("dir.v2/readme"), "");
        assert_eq!(config().extension(".hidden"), "");
    }
}
