//! `.gyattignore` pattern matching
//!
//! One pattern per line, blank lines and lines starting with `#` skipped,
//! `!pattern` negates a prior match. Later lines take precedence over
//! earlier ones, matching the ordering rule `.gitignore` uses. Patterns are
//! compiled with `globset`, the matching engine the `ignore` crate itself is
//! built on.

use crate::error::{Error, Result};

#[derive(Debug)]
struct Rule {
    glob: globset::GlobMatcher,
    negate: bool,
}

/// Compiled set of ignore rules from a `.gyattignore` file.
#[derive(Debug)]
pub struct IgnoreRules {
    rules: Vec<Rule>,
}

impl IgnoreRules {
    pub fn empty() -> Self {
        IgnoreRules { rules: Vec::new() }
    }

    /// Parse `.gyattignore` contents, failing closed on the first bad
    /// pattern so a typo in the ignore file never silently under-ignores.
    pub fn parse(contents: &str) -> Result<Self> {
        let mut rules = Vec::new();

        for (line_number, raw_line) in contents.lines().enumerate() {
            let line = raw_line.trim_end();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (negate, pattern) = match line.strip_prefix('!') {
                Some(rest) => (true, rest),
                None => (false, line),
            };

            let glob_pattern = if pattern.ends_with('/') {
                format!("{}**", pattern)
            } else {
                pattern.to_string()
            };

            let glob = globset::Glob::new(&glob_pattern)
                .map_err(|_| Error::InvalidIgnorePattern {
                    line: line_number + 1,
                    pattern: pattern.to_string(),
                })?
                .compile_matcher();

            rules.push(Rule { glob, negate });
        }

        Ok(IgnoreRules { rules })
    }

    /// Whether `relative_path` (posix-separated, relative to the repo root)
    /// should be excluded from scanning.
    pub fn is_ignored(&self, relative_path: &str) -> bool {
        let mut ignored = false;
        for rule in &self.rules {
            if rule.glob.is_match(relative_path) {
                ignored = !rule.negate;
            }
        }
        ignored
    }
}
