//! Request path matching for authentication bypass.
//!
//! # Key invariants
//! - Entries without `*` are exact matches and are checked first.
//! - A trailing `*` matches any remainder, across any number of segments.
//! - A `*` anywhere else matches within exactly one `/`-separated segment.
//! - Paths are compared as given; `..` and `//` are not canonicalized.
//!
//! # Common pitfalls
//! - `/health` does not cover `/healthz`. Use `/health*` for a prefix.
use crate::{AuthzError, AuthzResult};
use std::collections::HashSet;

/// Glob match where `*` matches any run of bytes, including none.
pub fn wildcard_match(pattern: &str, value: &str) -> bool {
    if pattern == "*" {
        return true;
    }

    let (mut p_idx, mut v_idx) = (0usize, 0usize);
    let (mut star_idx, mut match_idx) = (None, 0usize);
    let pattern_bytes = pattern.as_bytes();
    let value_bytes = value.as_bytes();

    while v_idx < value_bytes.len() {
        if p_idx < pattern_bytes.len() && pattern_bytes[p_idx] == b'*' {
            star_idx = Some(p_idx);
            match_idx = v_idx;
            p_idx += 1;
            continue;
        }

        if p_idx < pattern_bytes.len() && pattern_bytes[p_idx] == value_bytes[v_idx] {
            p_idx += 1;
            v_idx += 1;
            continue;
        }

        if let Some(star) = star_idx {
            p_idx = star + 1;
            match_idx += 1;
            v_idx = match_idx;
            continue;
        }

        return false;
    }

    while p_idx < pattern_bytes.len() && pattern_bytes[p_idx] == b'*' {
        p_idx += 1;
    }

    p_idx == pattern_bytes.len()
}

/// A compiled glob over `/`-separated path segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<String>,
    open_ended: bool,
}

impl PathPattern {
    pub fn compile(pattern: &str) -> AuthzResult<Self> {
        if pattern.trim().is_empty() {
            return Err(AuthzError::InvalidPathPattern(pattern.to_string()));
        }
        let (body, open_ended) = match pattern.strip_suffix('*') {
            Some(head) => (head, true),
            None => (pattern, false),
        };
        Ok(Self {
            raw: pattern.to_string(),
            segments: body.split('/').map(str::to_string).collect(),
            open_ended,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn matches(&self, path: &str) -> bool {
        let parts: Vec<&str> = path.split('/').collect();
        if !self.open_ended {
            return parts.len() == self.segments.len()
                && self
                    .segments
                    .iter()
                    .zip(&parts)
                    .all(|(segment, part)| wildcard_match(segment, part));
        }

        // The last compiled segment is a prefix of its path segment; whatever
        // follows it is unconstrained.
        let Some((last, fixed)) = self.segments.split_last() else {
            return true;
        };
        if parts.len() < self.segments.len() {
            return false;
        }
        let fixed_ok = fixed
            .iter()
            .zip(&parts)
            .all(|(segment, part)| wildcard_match(segment, part));
        fixed_ok && wildcard_match(&format!("{last}*"), parts[fixed.len()])
    }
}

/// Decides which request paths bypass authentication.
///
/// Built once at startup; `matches` does no allocation on the exact-match
/// fast path.
#[derive(Debug, Clone, Default)]
pub struct SkipPathMatcher {
    exact: HashSet<String>,
    patterns: Vec<PathPattern>,
}

impl SkipPathMatcher {
    /// # Errors
    /// - [`AuthzError::InvalidPathPattern`] for empty entries.
    pub fn new<I, S>(paths: I) -> AuthzResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut matcher = Self::default();
        for path in paths {
            let path = path.as_ref();
            if path.trim().is_empty() {
                return Err(AuthzError::InvalidPathPattern(path.to_string()));
            }
            if path.contains('*') {
                matcher.patterns.push(PathPattern::compile(path)?);
            } else {
                matcher.exact.insert(path.to_string());
            }
        }
        Ok(matcher)
    }

    pub fn matches(&self, path: &str) -> bool {
        if self.exact.contains(path) {
            return true;
        }
        self.patterns.iter().any(|pattern| pattern.matches(path))
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.patterns.is_empty()
    }
}
