//! Input and output path patterns.
//!
//! Patterns are relative to a package directory and always use `/` as the
//! separator. A pattern without glob characters names a file, or a directory
//! whose files all match. `*` and `?` stay inside one path segment, `**`
//! crosses segments, and a leading `!` turns a pattern into an exclusion.

use std::io;
use std::path::Path;

use regex::Regex;
use walkdir::WalkDir;

const SKIPPED_DIRS: &[&str] = &[".git", ".strata"];

#[derive(Debug, Clone)]
enum Matcher {
    Literal(String),
    Glob(Regex),
}

impl Matcher {
    fn parse(pattern: &str) -> Result<Self, regex::Error> {
        let pattern = normalize(pattern);
        if pattern.contains(['*', '?']) {
            Regex::new(&glob_to_regex(&pattern)).map(Matcher::Glob)
        } else {
            Ok(Matcher::Literal(pattern))
        }
    }

    fn matches(&self, relative: &str) -> bool {
        match self {
            Matcher::Literal(literal) => {
                literal.is_empty()
                    || literal == "."
                    || relative == literal
                    || relative
                        .strip_prefix(literal.as_str())
                        .is_some_and(|rest| rest.starts_with('/'))
            }
            Matcher::Glob(regex) => regex.is_match(relative),
        }
    }
}

fn normalize(pattern: &str) -> String {
    let trimmed = pattern.trim().trim_start_matches("./");
    trimmed.trim_end_matches('/').replace('\\', "/")
}

fn glob_to_regex(pattern: &str) -> String {
    let mut regex = String::with_capacity(pattern.len() * 2 + 2);
    regex.push('^');
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                if chars.peek() == Some(&'/') {
                    chars.next();
                    regex.push_str("(?:.*/)?");
                } else {
                    regex.push_str(".*");
                }
            }
            '*' => regex.push_str("[^/]*"),
            '?' => regex.push_str("[^/]"),
            other => regex.push_str(&regex::escape(&other.to_string())),
        }
    }
    regex.push('$');
    regex
}

/// True if `pattern` is absolute or climbs out of its base with `..`.
/// Such a pattern could never match during [`PatternSet::resolve`].
pub fn leaves_base(pattern: &str) -> bool {
    let raw = pattern.trim();
    let raw = raw.strip_prefix('!').unwrap_or(raw);
    if raw.starts_with('/') || raw.starts_with('\\') || Path::new(raw).is_absolute() {
        return true;
    }
    normalize(raw).split('/').any(|segment| segment == "..")
}

/// A compiled list of include and exclude patterns.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    include: Vec<Matcher>,
    exclude: Vec<Matcher>,
}

impl PatternSet {
    /// Compiles `patterns`; entries starting with `!` become exclusions.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, regex::Error> {
        let mut set = PatternSet::default();
        for pattern in patterns {
            let pattern = pattern.as_ref();
            match pattern.strip_prefix('!') {
                Some(negated) => set.exclude.push(Matcher::parse(negated)?),
                None => set.include.push(Matcher::parse(pattern)?),
            }
        }
        Ok(set)
    }

    /// Excludes everything `other` includes as well.
    pub fn excluding(mut self, other: &PatternSet) -> Self {
        self.exclude.extend(other.include.iter().cloned());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.include.is_empty()
    }

    pub fn matches(&self, relative: &str) -> bool {
        self.include.iter().any(|m| m.matches(relative))
            && !self.exclude.iter().any(|m| m.matches(relative))
    }

    /// Lists files below `base` that match, as sorted `/`-separated paths
    /// relative to `base`.
    pub fn resolve(&self, base: &Path) -> io::Result<Vec<String>> {
        if self.is_empty() || !base.is_dir() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        let walker = WalkDir::new(base)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                e.depth() == 0
                    || !(e.file_type().is_dir()
                        && SKIPPED_DIRS.contains(&e.file_name().to_string_lossy().as_ref()))
            });

        for entry in walker {
            let entry = entry?;
            if entry.file_type().is_dir() {
                continue;
            }
            let relative = relative_path(base, entry.path());
            if self.matches(&relative) {
                files.push(relative);
            }
        }

        files.sort();
        files.dedup();
        Ok(files)
    }
}

fn relative_path(base: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(base).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn patterns_outside_the_base_are_detected() {
        assert!(leaves_base("../shared.json"));
        assert!(leaves_base("src/../../x"));
        assert!(leaves_base("!../x"));
        assert!(leaves_base("/etc/config"));
        assert!(!leaves_base("src/**"));
        assert!(!leaves_base("./build.rs"));
        assert!(!leaves_base("..hidden/file"));
    }

    fn set(patterns: &[&str]) -> PatternSet {
        PatternSet::new(patterns).unwrap()
    }

    #[test]
    fn glob_translation() {
        assert_eq!(glob_to_regex("src/*.rs"), r"^src/[^/]*\.rs$");
        assert_eq!(glob_to_regex("**/*.rs"), r"^(?:.*/)?[^/]*\.rs$");
        assert_eq!(glob_to_regex("src/**"), r"^src/.*$");
        assert_eq!(glob_to_regex("a?c"), r"^a[^/]c$");
    }

    #[test]
    fn single_star_stays_in_segment() {
        let patterns = set(&["src/*.rs"]);
        assert!(patterns.matches("src/lib.rs"));
        assert!(!patterns.matches("src/nested/lib.rs"));
    }

    #[test]
    fn double_star_matches_any_depth() {
        let patterns = set(&["**/*.rs"]);
        assert!(patterns.matches("lib.rs"));
        assert!(patterns.matches("src/a/b/lib.rs"));
        assert!(!patterns.matches("src/lib.rsx"));
    }

    #[test]
    fn literal_directory_matches_descendants() {
        let patterns = set(&["src"]);
        assert!(patterns.matches("src/lib.rs"));
        assert!(patterns.matches("src/a/b.rs"));
        assert!(!patterns.matches("srcs/lib.rs"));
    }

    #[test]
    fn negation_excludes() {
        let patterns = set(&["src/**", "!src/generated/**"]);
        assert!(patterns.matches("src/lib.rs"));
        assert!(!patterns.matches("src/generated/out.rs"));
    }

    #[test]
    fn resolve_is_sorted_and_skips_outputs() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("src/b")).unwrap();
        fs::create_dir_all(dir.path().join("out")).unwrap();
        fs::write(dir.path().join("src/z.txt"), "z").unwrap();
        fs::write(dir.path().join("src/b/a.txt"), "a").unwrap();
        fs::write(dir.path().join("out/result.txt"), "r").unwrap();

        let outputs = set(&["out/**"]);
        let inputs = set(&["**"]).excluding(&outputs);
        let files = inputs.resolve(dir.path()).unwrap();

        assert_eq!(files, vec!["src/b/a.txt".to_string(), "src/z.txt".to_string()]);
    }
}
