//! Architectural Enforcement
//!
//! Source scanners backing the integration tests in `tests/`. The tests walk
//! the production sources of the workspace and fail on patterns the engine
//! must not contain:
//! - fixed-delay timers (`sleep`) standing in for sequencing
//! - `unwrap()` / `expect()` outside tests
//! - blocking I/O in the engine outside the storage and config layers
//!
//! Only production code is scanned: line comments are stripped and a file
//! is scanned up to its first `#[cfg(test)]` item.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Production source directories, relative to the workspace root
pub const PRODUCTION_DIRS: &[&str] = &["streamchat/core/src", "streamchat/cli/src"];

/// A forbidden pattern found in production code
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Violation {
    /// File containing the match
    pub path: PathBuf,
    /// 1-based line number
    pub line: usize,
    /// The offending line, trimmed
    pub text: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} - {}", self.path.display(), self.line, self.text)
    }
}

/// Workspace root (two levels above this crate)
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("..").join("..")
}

/// Absolute production source directories that exist
#[must_use]
pub fn production_dirs() -> Vec<PathBuf> {
    let root = workspace_root();
    PRODUCTION_DIRS
        .iter()
        .map(|dir| root.join(dir))
        .filter(|dir| dir.exists())
        .collect()
}

/// All `.rs` files below `dir`
pub fn rust_files(dir: &Path) -> impl Iterator<Item = PathBuf> {
    walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("rs"))
        .map(walkdir::DirEntry::into_path)
}

/// Production lines of a source file as `(line_number, code)`
///
/// Line comments are stripped; scanning stops at the first `#[cfg(test)]`.
pub fn production_lines(content: &str) -> impl Iterator<Item = (usize, &str)> {
    content
        .lines()
        .enumerate()
        .take_while(|(_, line)| !line.trim_start().starts_with("#[cfg(test)]"))
        .map(|(idx, line)| (idx + 1, line.split("//").next().unwrap_or(line)))
        .filter(|(_, code)| !code.trim().is_empty())
}

/// Whether the function enclosing line `idx` (0-based) is an `async fn`
///
/// Scans backwards to the nearest `fn` signature; `false` outside any
/// function.
#[must_use]
pub fn in_async_fn(lines: &[&str], idx: usize) -> bool {
    lines
        .iter()
        .take(idx + 1)
        .rev()
        .map(|line| line.trim_start())
        .find(|line| line.starts_with("fn ") || line.contains(" fn "))
        .is_some_and(|signature| signature.contains("async fn "))
}

/// Find lines in `dirs` whose code contains any of `patterns`
#[must_use]
pub fn find_patterns(dirs: &[PathBuf], patterns: &[&str]) -> Vec<Violation> {
    let mut violations = Vec::new();

    for dir in dirs {
        for path in rust_files(dir) {
            let Ok(content) = fs::read_to_string(&path) else {
                continue;
            };

            for (line, code) in production_lines(&content) {
                if patterns.iter().any(|p| code.contains(p)) {
                    violations.push(Violation {
                        path: path.clone(),
                        line,
                        text: code.trim().to_string(),
                    });
                }
            }
        }
    }

    violations
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_lines_skip_comments_and_tests() {
        let source = "\
fn a() {
    // tokio::time::sleep(d).await;
    let x = 1; // trailing .unwrap()

}

#[cfg(test)]
mod tests {
    fn t() { x.unwrap(); }
}
";
        let lines: Vec<_> = production_lines(source).collect();
        assert_eq!(lines, vec![(1, "fn a() {"), (3, "    let x = 1; "), (5, "}")]);
    }

    #[test]
    fn test_async_fn_detection() {
        let source = [
            "impl Writer {",
            "    pub async fn flush(&mut self) {",
            "        let x = std::fs::read(path);",
            "    }",
            "    pub(crate) fn apply(&self) {",
            "        std::fs::write(path, data);",
            "    }",
            "}",
        ];
        assert!(!in_async_fn(&source, 0));
        assert!(in_async_fn(&source, 2));
        assert!(!in_async_fn(&source, 5));
    }

    #[test]
    fn test_production_dirs_found() {
        assert_eq!(production_dirs().len(), PRODUCTION_DIRS.len());
    }
}
