// path.rs: AssertionPath, the structural position of an assertion.
//
// A policy is a tree of assertions. Each assertion is identified by the
// sequence of ordinals leading to it: `[3]` is the third line of the top-level
// policy, `[3, 2]` is the second line of the fragment included at line 3.
// Paths compare structurally and order lexicographically, so they can be used
// as set/map keys and compared for "has execution moved past this point".

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Immutable, structurally compared assertion position.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssertionPath(Vec<u32>);

impl AssertionPath {
    pub fn new(segments: impl Into<Vec<u32>>) -> Self {
        Self(segments.into())
    }

    pub fn segments(&self) -> &[u32] {
        &self.0
    }

    /// Nesting depth (1 for a top-level assertion).
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// Whether execution at `self` has reached or moved past `target`.
    pub fn reached(&self, target: &AssertionPath) -> bool {
        self >= target
    }

    /// Whether `self` lies strictly inside the assertion at `ancestor`.
    pub fn is_nested_under(&self, ancestor: &AssertionPath) -> bool {
        self.0.len() > ancestor.0.len() && self.0.starts_with(&ancestor.0)
    }
}

impl From<Vec<u32>> for AssertionPath {
    fn from(segments: Vec<u32>) -> Self {
        Self(segments)
    }
}

impl From<&[u32]> for AssertionPath {
    fn from(segments: &[u32]) -> Self {
        Self(segments.to_vec())
    }
}

impl fmt::Display for AssertionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for segment in &self.0 {
            if !first {
                write!(f, ".")?;
            }
            write!(f, "{}", segment)?;
            first = false;
        }
        Ok(())
    }
}

/// Parses the dotted form produced by `Display` (e.g. `"3.1"`).
impl FromStr for AssertionPath {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err("empty assertion path".to_string());
        }
        trimmed
            .split('.')
            .map(|part| {
                part.parse::<u32>()
                    .map_err(|e| format!("invalid path segment '{}': {}", part, e))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(AssertionPath)
    }
}
