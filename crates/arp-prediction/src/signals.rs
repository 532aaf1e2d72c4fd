//! Static signals extracted from a change target
//!
//! Content is obtained through a [`TargetInspector`] so callers can score
//! targets that do not live on the local filesystem.

use crate::record::{IssueKind, PredictedIssue};
use arp_core::Severity;
use arp_store::ErrorPattern;
use regex::{Regex, RegexBuilder};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, warn};

/// Source of target content
pub trait TargetInspector: Send + Sync {
    /// Current content of `target`; `None` when absent or unreadable
    fn inspect(&self, target: &str) -> Option<String>;
}

/// Reads targets from disk, relative paths resolved against a root
#[derive(Debug, Clone)]
pub struct FsInspector {
    root: PathBuf,
}

impl FsInspector {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, target: &str) -> PathBuf {
        let path = Path::new(target);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

impl Default for FsInspector {
    fn default() -> Self {
        Self::new(".")
    }
}

impl TargetInspector for FsInspector {
    fn inspect(&self, target: &str) -> Option<String> {
        let path = self.resolve(target);
        if !path.is_file() {
            debug!(target, "target not present; content signals skipped");
            return None;
        }
        match std::fs::read_to_string(&path) {
            Ok(text) => Some(text),
            Err(e) => {
                warn!(target, error = %e, "could not read target");
                None
            }
        }
    }
}

/// File kind inferred from the extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Shell,
    Swift,
    Python,
    Other,
}

impl TargetKind {
    #[must_use]
    pub fn of(target: &str) -> Self {
        match Path::new(target).extension().and_then(|e| e.to_str()) {
            Some("sh" | "bash") => Self::Shell,
            Some("swift") => Self::Swift,
            Some("py") => Self::Python,
            _ => Self::Other,
        }
    }

    /// Extra risk carried by the kind itself
    #[must_use]
    pub fn weight(&self) -> f64 {
        match self {
            Self::Shell => 0.1,
            Self::Swift | Self::Python => 0.05,
            Self::Other => 0.0,
        }
    }
}

const CRITICAL_PATH_MARKERS: [&str; 4] = ["build", "deploy", "main", "core"];

/// Whether the target name suggests a build or entry-point path
#[must_use]
pub fn is_critical_path(target: &str) -> bool {
    let lower = target.to_ascii_lowercase();
    CRITICAL_PATH_MARKERS.iter().any(|m| lower.contains(m))
}

fn cached(cell: &'static OnceLock<Option<Regex>>, pattern: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern).ok()).as_ref()
}

fn function_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    cached(&RE, r"(?m)\b(?:fn|func|def|function)\s+\w+\s*[<(]")
}

fn force_unwrap_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    cached(&RE, r"\w+![^=]")
}

fn bare_except_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    cached(&RE, r"(?m)^\s*except\s*:")
}

/// Shape of the target content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TargetProfile {
    pub lines: usize,
    /// Deepest indentation in 4-column steps (tabs count as one step)
    pub max_nesting: usize,
    pub functions: usize,
}

impl TargetProfile {
    #[must_use]
    pub fn from_content(content: &str) -> Self {
        let mut max_nesting = 0;
        let mut lines = 0;
        for line in content.lines() {
            lines += 1;
            if line.trim().is_empty() {
                continue;
            }
            let columns: usize = line
                .chars()
                .take_while(|c| c.is_whitespace())
                .map(|c| if c == '\t' { 4 } else { 1 })
                .sum();
            max_nesting = max_nesting.max(columns / 4);
        }
        Self {
            lines,
            max_nesting,
            functions: function_regex().map_or(0, |re| re.find_iter(content).count()),
        }
    }

    /// Risk contributed by size and structure
    #[must_use]
    pub fn weight(&self, line_threshold: usize) -> f64 {
        let mut risk = if self.lines > line_threshold {
            0.25
        } else if self.lines > line_threshold * 3 / 5 {
            0.15
        } else if self.lines > line_threshold / 5 {
            0.05
        } else {
            0.0
        };
        if self.max_nesting > 6 {
            risk += 0.1;
        }
        if self.functions > 20 {
            risk += 0.05;
        }
        risk
    }

    #[must_use]
    pub fn complexity_issues(&self, line_threshold: usize) -> Vec<PredictedIssue> {
        let mut issues = Vec::new();
        if self.lines > line_threshold {
            issues.push(PredictedIssue::new(
                IssueKind::Complexity,
                Severity::Medium,
                "maintainability",
                format!(
                    "File has {} lines (>{line_threshold}), increasing failure risk",
                    self.lines
                ),
            ));
        }
        if self.functions > 20 {
            issues.push(PredictedIssue::new(
                IssueKind::Complexity,
                Severity::Low,
                "maintainability",
                format!("File has {} functions, consider splitting", self.functions),
            ));
        }
        if self.max_nesting > 6 {
            issues.push(PredictedIssue::new(
                IssueKind::Complexity,
                Severity::Medium,
                "maintainability",
                format!(
                    "Deep nesting detected (level {}), may cause logic errors",
                    self.max_nesting
                ),
            ));
        }
        issues
    }
}

/// Language-specific anti-patterns
#[must_use]
pub fn anti_patterns(kind: TargetKind, content: &str) -> Vec<PredictedIssue> {
    let mut issues = Vec::new();
    match kind {
        TargetKind::Shell => {
            if !content.contains("set -e") && !content.contains("set -euo pipefail") {
                issues.push(PredictedIssue::new(
                    IssueKind::AntiPattern,
                    Severity::High,
                    "error_handling",
                    "Missing error handling (set -e), script may fail silently",
                ));
            }
        }
        TargetKind::Python => {
            if bare_except_regex().is_some_and(|re| re.is_match(content)) {
                issues.push(PredictedIssue::new(
                    IssueKind::AntiPattern,
                    Severity::Medium,
                    "error_handling",
                    "Bare except clause detected, may hide errors",
                ));
            }
        }
        TargetKind::Swift => {
            let unwraps = force_unwrap_regex().map_or(0, |re| re.find_iter(content).count());
            if unwraps > 5 {
                issues.push(PredictedIssue::new(
                    IssueKind::AntiPattern,
                    Severity::Medium,
                    "safety",
                    format!("Excessive force unwrapping ({unwraps} instances), may cause crashes"),
                ));
            }
        }
        TargetKind::Other => {}
    }
    issues
}

/// Case-insensitive regex for a knowledge-base pattern; `None` if invalid
#[must_use]
pub fn compile_pattern(pattern: &str) -> Option<Regex> {
    if pattern.trim().is_empty() {
        return None;
    }
    RegexBuilder::new(pattern).case_insensitive(true).build().ok()
}

/// Known failure patterns matching `content`; invalid regexes are skipped
#[must_use]
pub fn known_patterns(patterns: &[ErrorPattern], content: &str) -> Vec<PredictedIssue> {
    patterns
        .iter()
        .filter(|p| !p.pattern.is_empty())
        .filter_map(|p| {
            match compile_pattern(&p.pattern) {
                Some(re) => re.is_match(content).then(|| {
                    let message = if p.message.is_empty() { "unknown" } else { &p.message };
                    let category = if p.category.is_empty() { "unknown" } else { &p.category };
                    PredictedIssue::new(
                        IssueKind::KnownPattern,
                        p.severity,
                        category,
                        format!("Code matches known failure pattern: {message}"),
                    )
                }),
                None => {
                    warn!(pattern = %p.pattern, "skipping invalid error pattern");
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_counts_lines_nesting_and_functions() {
        let src = "def a():\n    if x:\n        return 1\n\ndef b():\n    pass\n";
        let profile = TargetProfile::from_content(src);
        assert_eq!(profile.lines, 6);
        assert_eq!(profile.max_nesting, 2);
        assert_eq!(profile.functions, 2);
    }

    #[test]
    fn size_weight_steps() {
        let at = |lines| TargetProfile { lines, ..TargetProfile::default() }.weight(500);
        assert_eq!(at(50), 0.0);
        assert_eq!(at(101), 0.05);
        assert_eq!(at(301), 0.15);
        assert_eq!(at(500), 0.15);
        assert_eq!(at(501), 0.25);
    }

    #[test]
    fn shell_without_set_e_is_flagged_high() {
        let issues = anti_patterns(TargetKind::Shell, "#!/bin/sh\nmake\n");
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::High);

        assert!(anti_patterns(TargetKind::Shell, "#!/bin/sh\nset -e\nmake\n").is_empty());
    }

    #[test]
    fn python_bare_except() {
        let src = "try:\n    go()\nexcept:\n    pass\n";
        assert_eq!(anti_patterns(TargetKind::Python, src).len(), 1);
        let src = "try:\n    go()\nexcept ValueError:\n    pass\n";
        assert!(anti_patterns(TargetKind::Python, src).is_empty());
    }

    #[test]
    fn critical_path_names() {
        assert!(is_critical_path("scripts/build.sh"));
        assert!(is_critical_path("src/Core/Engine.swift"));
        assert!(!is_critical_path("ViewModel"));
    }

    #[test]
    fn known_patterns_match_case_insensitively() {
        let patterns = vec![
            ErrorPattern {
                pattern: "no such module".into(),
                severity: Severity::High,
                category: "build".into(),
                message: "missing module import".into(),
            },
            ErrorPattern {
                pattern: "([unclosed".into(),
                severity: Severity::Low,
                category: String::new(),
                message: String::new(),
            },
        ];
        let issues = known_patterns(&patterns, "error: No Such Module 'Foo'");
        assert_eq!(issues.len(), 1);
        assert!(issues[0].description.contains("missing module import"));
    }

    #[test]
    fn fs_inspector_missing_target_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let inspector = FsInspector::new(dir.path());
        assert!(inspector.inspect("absent.rs").is_none());
        std::fs::write(dir.path().join("present.rs"), "fn main() {}\n").unwrap();
        assert_eq!(inspector.inspect("present.rs").as_deref(), Some("fn main() {}\n"));
    }
}
