//! Branch allowlists.
//!
//! Patterns are regular expressions compiled once when the rule store is
//! built. A ref is allowed when any pattern matches it. The relay does not
//! anchor patterns; `main` matches `refs/heads/main` and
//! `refs/heads/not-main` alike, so configurations that need exact matches
//! use `^...$`.
//!
//! Lookaround and backreferences are supported, so an entry such as
//! `^refs/heads/(?!wip/)` admits every branch outside `wip/`.

use fancy_regex::Regex;
use tracing::warn;

/// Ordered set of compiled branch patterns for one repository.
#[derive(Debug, Clone)]
pub struct BranchFilter {
    patterns: Vec<Regex>,
}

impl BranchFilter {
    /// Compile every pattern, failing on the first invalid one.
    ///
    /// # Errors
    ///
    /// Returns the offending pattern together with the regex error.
    pub fn compile<I, S>(patterns: I) -> Result<Self, (String, fancy_regex::Error)>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| {
                let p = p.as_ref();
                Regex::new(p).map_err(|e| (p.to_string(), e))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { patterns })
    }

    /// Whether `git_ref` matches at least one pattern.
    ///
    /// Evaluation stops at the first match. An empty filter admits nothing.
    /// A pattern that fails at match time, e.g. by exceeding the backtrack
    /// limit, counts as no match.
    pub fn matches(&self, git_ref: &str) -> bool {
        self.patterns.iter().any(|p| match p.is_match(git_ref) {
            Ok(matched) => matched,
            Err(e) => {
                warn!(pattern = p.as_str(), git_ref, error = %e, "Branch pattern failed to evaluate");
                false
            }
        })
    }

    /// Number of configured patterns.
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Whether the filter has no patterns.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// The source text of each pattern, in configuration order.
    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(Regex::as_str)
    }
}

#[cfg(test)]
#[path = "branch_filter_tests.rs"]
mod tests;
