//! replace
//!
//! Pattern replacement engine.
//!
//! # Architecture
//!
//! The engine is purely computational: it is handed the list of files to
//! consider (tracked paths from the index, or blobs read from a commit
//! tree) and never talks to git or the network itself.
//!
//! - [`ReplacementEngine::apply`] reads, rewrites and writes files on disk
//! - [`ReplacementEngine::preview`] evaluates in-memory contents only
//!
//! Both walk files in sorted path order and produce the same
//! [`ChangeSummary`] for the same inputs.
//!
//! # Eligibility
//!
//! A file is skipped when it is excluded, lives under a hidden directory
//! (unless hidden directories are included), or is not text. Text means
//! valid UTF-8 without NUL bytes.
//!
//! # Example
//!
//! ```
//! use converge::replace::{ExclusionSet, ReplacementEngine, ReplacementSet};
//!
//! let rules = ReplacementSet::compile([("old-org", "new-org")]).unwrap();
//! let engine = ReplacementEngine::new(rules, ExclusionSet::default(), false);
//!
//! let summary = engine.preview(
//!     "svc",
//!     vec![("README.md".to_string(), b"see old-org/tool".to_vec())],
//! );
//! assert_eq!(summary.changed_count(), 1);
//! ```

pub mod exclude;
pub mod rules;

pub use exclude::ExclusionSet;
pub use rules::{ReplacementError, ReplacementSet, Rule, TextOutcome};

use std::fs;
use std::path::Path;

use serde::Serialize;
use tracing::{debug, trace};

/// Matches of one pattern in one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatternCount {
    pub pattern: String,
    pub count: usize,
}

/// What the rules did to one file. Only files with matches are reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileReport {
    pub path: String,
    pub changed: bool,
    pub matches: Vec<PatternCount>,
}

/// Per-pattern aggregate across a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatternTotal {
    pub pattern: String,
    pub count: usize,
    pub files: Vec<String>,
}

/// Outcome of one engine pass over a repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSummary {
    /// Patterns in declaration order.
    pub patterns: Vec<String>,
    /// Files with at least one match, in path order.
    pub files: Vec<FileReport>,
}

impl ChangeSummary {
    pub fn changed_files(&self) -> impl Iterator<Item = &str> {
        self.files
            .iter()
            .filter(|f| f.changed)
            .map(|f| f.path.as_str())
    }

    pub fn changed_count(&self) -> usize {
        self.files.iter().filter(|f| f.changed).count()
    }

    /// True when no file would change.
    pub fn is_unchanged(&self) -> bool {
        self.changed_count() == 0
    }

    /// Totals per pattern, in declaration order, including patterns
    /// that matched nothing.
    pub fn pattern_totals(&self) -> Vec<PatternTotal> {
        self.patterns
            .iter()
            .map(|pattern| {
                let mut total = PatternTotal {
                    pattern: pattern.clone(),
                    count: 0,
                    files: Vec::new(),
                };
                for file in &self.files {
                    if let Some(m) = file.matches.iter().find(|m| &m.pattern == pattern) {
                        total.count += m.count;
                        total.files.push(file.path.clone());
                    }
                }
                total
            })
            .collect()
    }
}

/// Rules, exclusions and the hidden-directory switch, bundled for a run.
#[derive(Debug, Clone)]
pub struct ReplacementEngine {
    rules: ReplacementSet,
    exclusions: ExclusionSet,
    include_hidden_dirs: bool,
}

impl ReplacementEngine {
    pub fn new(rules: ReplacementSet, exclusions: ExclusionSet, include_hidden_dirs: bool) -> Self {
        Self {
            rules,
            exclusions,
            include_hidden_dirs,
        }
    }

    pub fn rules(&self) -> &ReplacementSet {
        &self.rules
    }

    /// Whether a path is considered at all, before looking at its content.
    pub fn is_eligible(&self, repo: &str, rel_path: &str) -> bool {
        if self.exclusions.is_excluded(repo, rel_path) {
            return false;
        }
        if !self.include_hidden_dirs && in_hidden_dir(rel_path) {
            return false;
        }
        true
    }

    /// Evaluate rules over raw file bytes. `None` for non-text content.
    pub fn evaluate(&self, bytes: &[u8]) -> Option<TextOutcome> {
        if bytes.contains(&0) {
            return None;
        }
        let text = std::str::from_utf8(bytes).ok()?;
        Some(self.rules.apply_text(text))
    }

    /// Evaluate in-memory `(path, contents)` pairs without writing anything.
    pub fn preview(&self, repo: &str, files: Vec<(String, Vec<u8>)>) -> ChangeSummary {
        let mut files = files;
        files.sort_by(|a, b| a.0.cmp(&b.0));

        let mut summary = self.empty_summary();
        for (path, bytes) in files {
            if !self.is_eligible(repo, &path) {
                continue;
            }
            let Some(outcome) = self.evaluate(&bytes) else {
                trace!(file = %path, "skipping non-text file");
                continue;
            };
            let changed = outcome.content.as_bytes() != bytes.as_slice();
            self.record(&mut summary, path, changed, &outcome);
        }
        summary
    }

    /// Apply rules to files under `root`, writing only files whose content
    /// changes. `files` are paths relative to `root`, `/`-separated.
    ///
    /// # Errors
    ///
    /// [`ReplacementError::Io`] if an eligible file cannot be read or written.
    pub fn apply(
        &self,
        root: &Path,
        repo: &str,
        files: &[String],
    ) -> Result<ChangeSummary, ReplacementError> {
        let mut files: Vec<&String> = files.iter().collect();
        files.sort();
        files.dedup();

        let mut summary = self.empty_summary();
        for path in files {
            if !self.is_eligible(repo, path) {
                continue;
            }
            let full = root.join(path);
            match fs::symlink_metadata(&full) {
                Ok(meta) if meta.is_file() => {}
                // Deleted in the worktree, a symlink, or a submodule.
                _ => continue,
            }

            let bytes = fs::read(&full).map_err(|source| ReplacementError::Io {
                action: "read",
                path: path.clone(),
                source,
            })?;
            let Some(outcome) = self.evaluate(&bytes) else {
                trace!(file = %path, "skipping non-text file");
                continue;
            };

            let changed = outcome.content.as_bytes() != bytes.as_slice();
            if changed {
                fs::write(&full, outcome.content.as_bytes()).map_err(|source| {
                    ReplacementError::Io {
                        action: "write",
                        path: path.clone(),
                        source,
                    }
                })?;
                debug!(file = %path, matches = outcome.total_matches(), "rewrote file");
            }
            self.record(&mut summary, path.clone(), changed, &outcome);
        }
        Ok(summary)
    }

    fn empty_summary(&self) -> ChangeSummary {
        ChangeSummary {
            patterns: self.rules.patterns().map(str::to_string).collect(),
            files: Vec::new(),
        }
    }

    fn record(&self, summary: &mut ChangeSummary, path: String, changed: bool, outcome: &TextOutcome) {
        if outcome.total_matches() == 0 && !changed {
            return;
        }
        let matches = self
            .rules
            .patterns()
            .zip(&outcome.counts)
            .filter(|(_, count)| **count > 0)
            .map(|(pattern, count)| PatternCount {
                pattern: pattern.to_string(),
                count: *count,
            })
            .collect();
        summary.files.push(FileReport {
            path,
            changed,
            matches,
        });
    }
}

/// Does any directory component of the path start with '.'?
fn in_hidden_dir(rel_path: &str) -> bool {
    let mut components: Vec<&str> = rel_path.split('/').collect();
    components.pop();
    components.iter().any(|c| c.starts_with('.'))
}
