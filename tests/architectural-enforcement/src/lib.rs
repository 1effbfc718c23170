//! Architectural Enforcement Integration Tests
//!
//! This package contains integration tests that enforce architectural principles
//! on the teeflow production sources:
//! - No sleeping or spinning to wait for buffer space or data
//! - No blocking file or network I/O inside async functions
//!
//! The helpers here walk the production source trees and hand each
//! non-test line to a checker.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Production source directories, relative to the workspace root
pub const PRODUCTION_DIRS: &[&str] = &["teeflow/core/src", "teeflow/cli/src"];

/// One rule violation
#[derive(Debug, Clone)]
pub struct Violation {
    /// File containing the violation
    pub path: PathBuf,
    /// 1-based line number
    pub line: usize,
    /// The offending line, trimmed
    pub text: String,
    /// What rule was broken
    pub reason: &'static str,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} - {}: {}",
            self.path.display(),
            self.line,
            self.reason,
            self.text
        )
    }
}

/// Workspace root, derived from this package's manifest directory
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../..")
}

/// All `.rs` files under the production directories
///
/// # Panics
///
/// Panics if a production directory is missing, so a moved crate cannot
/// silently disable the checks.
#[must_use]
pub fn production_files() -> Vec<PathBuf> {
    let root = workspace_root();
    let mut files = Vec::new();
    for dir in PRODUCTION_DIRS {
        let path = root.join(dir);
        assert!(path.exists(), "production directory missing: {}", path.display());
        for entry in walkdir::WalkDir::new(&path)
            .into_iter()
            .filter_map(Result::ok)
        {
            if entry.path().extension().and_then(|s| s.to_str()) == Some("rs") {
                files.push(entry.into_path());
            }
        }
    }
    files.sort();
    files
}

/// Lines before the first `#[cfg(test)]` marker
#[must_use]
pub fn production_lines(content: &str) -> Vec<&str> {
    content
        .lines()
        .take_while(|line| !line.trim().starts_with("#[cfg(test)]"))
        .collect()
}

/// The line with any trailing `//` comment removed
#[must_use]
pub fn code_part(line: &str) -> &str {
    line.split("//").next().unwrap_or(line)
}

fn fn_signature(line: &str) -> Option<bool> {
    let trimmed = line.trim_start();
    let is_decl = trimmed.starts_with("fn ")
        || trimmed.starts_with("async fn ")
        || ((trimmed.starts_with("pub ") || trimmed.starts_with("pub(")) && trimmed.contains("fn "));
    is_decl.then(|| trimmed.contains("async fn "))
}

/// Check if the line at `current_idx` sits inside an `async fn`
///
/// Scans backwards to the nearest function signature.
#[must_use]
pub fn is_in_async_function(lines: &[&str], current_idx: usize) -> bool {
    for i in (0..=current_idx).rev() {
        if let Some(is_async) = fn_signature(lines[i]) {
            return is_async;
        }
        let line = lines[i].trim();
        if line.starts_with("mod ") || (line.starts_with("impl") && line.ends_with('{')) {
            return false;
        }
    }
    false
}

/// Run `check` over every production line
///
/// `check` receives the file's production lines, the line index and the
/// comment-stripped code, and returns a reason when the line violates a rule.
pub fn scan<F>(check: F) -> Vec<Violation>
where
    F: Fn(&[&str], usize, &str) -> Option<&'static str>,
{
    let mut violations = Vec::new();
    for path in production_files() {
        let Ok(content) = fs::read_to_string(&path) else {
            continue;
        };
        let lines = production_lines(&content);
        for (idx, line) in lines.iter().enumerate() {
            if let Some(reason) = check(&lines, idx, code_part(line)) {
                violations.push(Violation {
                    path: path.clone(),
                    line: idx + 1,
                    text: line.trim().to_string(),
                    reason,
                });
            }
        }
    }
    violations
}

/// Print violations and panic if there are any
///
/// # Panics
///
/// Panics when `violations` is not empty.
pub fn report(title: &str, violations: &[Violation], guidance: &[&str]) {
    if violations.is_empty() {
        return;
    }
    eprintln!("\n❌ {title}\n");
    for violation in violations {
        eprintln!("  ❌ {violation}");
    }
    eprintln!();
    for line in guidance {
        eprintln!("  {line}");
    }
    panic!("\nFound {} violation(s). Fix these before merging!", violations.len());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_async_function_detection() {
        let code = [
            "pub async fn bad() {",
            "    let s = std::fs::read_to_string(\"x\");",
            "}",
        ];
        assert!(is_in_async_function(&code, 1));
    }

    #[test]
    fn test_sync_function_detection() {
        let code = [
            "fn read_toml(path: &Path) -> Result<()> {",
            "    let s = std::fs::read_to_string(path);",
            "}",
        ];
        assert!(!is_in_async_function(&code, 1));

        let code = [
            "    pub(crate) fn helper() {",
            "        std::fs::write(\"x\", b\"\");",
            "    }",
        ];
        assert!(!is_in_async_function(&code, 1));
    }

    #[test]
    fn test_production_lines_stop_at_test_module() {
        let content = "fn a() {}\n#[cfg(test)]\nmod tests {}\n";
        assert_eq!(production_lines(content), vec!["fn a() {}"]);
    }

    #[test]
    fn test_code_part_strips_comments() {
        assert_eq!(code_part("let x = 1; // sleep(1)"), "let x = 1; ");
    }

    #[test]
    fn test_production_files_found() {
        let files = production_files();
        assert!(files.iter().any(|p| p.ends_with("ring_buffer.rs")));
        assert!(files.iter().any(|p| p.ends_with("main.rs")));
    }
}
