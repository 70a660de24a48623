//! Architectural Enforcement Integration Tests
//!
//! This package contains integration tests that enforce architectural principles:
//! - No sleep() calls in production code: streams wait on I/O, never on timers
//! - No automatic retry in provider backends: a failed request surfaces once
//!
//! The helpers here walk the workspace sources and hand each production line
//! to a check. Test modules (`#[cfg(test)]` onwards) and comments are skipped.

use std::fs;
use std::path::{Path, PathBuf};

/// Production source directories, relative to the workspace root
pub const PRODUCTION_DIRS: &[&str] = &["advisor/core/src", "advisor/daemon/src", "cli/src"];

/// Provider backend sources
pub const BACKEND_DIR: &str = "advisor/core/src/backend";

/// One line of production code
#[derive(Debug, Clone)]
pub struct SourceLine {
    /// File the line came from
    pub path: PathBuf,
    /// 1-based line number
    pub number: usize,
    /// The code, with any trailing `//` comment removed
    pub code: String,
}

impl std::fmt::Display for SourceLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{} - {}", self.path.display(), self.number, self.code.trim())
    }
}

/// The workspace root (two levels above this package)
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("..").join("..")
}

/// Every production line of every `.rs` file under `dir`
///
/// `dir` is relative to the workspace root. A missing directory yields
/// nothing.
#[must_use]
pub fn production_lines(dir: &str) -> Vec<SourceLine> {
    let root = workspace_root().join(dir);
    if !root.exists() {
        return Vec::new();
    }

    let mut lines = Vec::new();
    for entry in walkdir::WalkDir::new(&root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
    {
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) != Some("rs") {
            continue;
        }
        let Ok(content) = fs::read_to_string(path) else {
            continue;
        };

        for (idx, line) in content.lines().enumerate() {
            if line.trim_start().starts_with("#[cfg(test)]") {
                break;
            }
            let code = line.split("//").next().unwrap_or(line);
            if code.trim().is_empty() {
                continue;
            }
            lines.push(SourceLine {
                path: path.to_path_buf(),
                number: idx + 1,
                code: code.to_string(),
            });
        }
    }
    lines
}

/// Lines under `dirs` for which `violates` returns true
pub fn find_violations<F>(dirs: &[&str], violates: F) -> Vec<SourceLine>
where
    F: Fn(&str) -> bool,
{
    dirs.iter()
        .flat_map(|dir| production_lines(dir))
        .filter(|line| violates(&line.code))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_dirs_exist() {
        for dir in PRODUCTION_DIRS {
            assert!(workspace_root().join(dir).exists(), "{dir} is missing");
        }
    }

    #[test]
    fn test_scanner_sees_production_code() {
        let lines = production_lines(BACKEND_DIR);
        assert!(lines.iter().any(|l| l.code.contains("fn send_streaming")));
        assert!(lines.iter().all(|l| !l.code.contains("#[tokio::test]")));
    }
}
