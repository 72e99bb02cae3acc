//! replace::exclude
//!
//! `<repoName>/<relativePath>` exclusion entries.

use glob::{MatchOptions, Pattern};

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

#[derive(Debug, Clone)]
enum Entry {
    Glob(Pattern),
    Literal(String),
}

/// Files skipped by the replacement engine, keyed by target name.
#[derive(Debug, Clone, Default)]
pub struct ExclusionSet {
    entries: Vec<Entry>,
}

impl ExclusionSet {
    /// Build from raw entries. Entries that are not valid globs match literally.
    pub fn new<'a>(entries: impl IntoIterator<Item = &'a str>) -> Self {
        let entries = entries
            .into_iter()
            .map(normalize)
            .filter(|e| !e.is_empty())
            .map(|e| match Pattern::new(&e) {
                Ok(pattern) => Entry::Glob(pattern),
                Err(_) => Entry::Literal(e),
            })
            .collect();
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Is `rel_path` (relative to the repository root) excluded for `repo`?
    pub fn is_excluded(&self, repo: &str, rel_path: &str) -> bool {
        let key = format!("{}/{}", repo, normalize(rel_path));
        self.entries.iter().any(|entry| match entry {
            Entry::Glob(pattern) => pattern.as_str() == key || pattern.matches_with(&key, MATCH_OPTIONS),
            Entry::Literal(literal) => *literal == key,
        })
    }
}

fn normalize(path: &str) -> String {
    let path = path.trim().replace('\\', "/");
    path.trim_start_matches("./").to_string()
}
