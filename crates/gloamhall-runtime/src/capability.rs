//! Capability tags declared by plugins.
//!
//! Tags are free-form strings; the host and other plugins use them for
//! coarse feature queries ("which plugins provide a renderer?"). They carry
//! no enforcement; access control is not this runtime's job.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A set of capability tags.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CapabilitySet {
    tags: HashSet<String>,
}

impl CapabilitySet {
    /// Create an empty capability set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from a list of tag strings.
    pub fn from_strings<I, S>(strings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tags = strings
            .into_iter()
            .map(|s| s.as_ref().to_string())
            .collect();
        Self { tags }
    }

    /// Add a tag to the set.
    pub fn add(&mut self, tag: impl Into<String>) {
        self.tags.insert(tag.into());
    }

    /// Check whether the set contains a tag.
    pub fn has(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Check if this set is a superset of another.
    pub fn contains_all(&self, other: &CapabilitySet) -> bool {
        other.tags.is_subset(&self.tags)
    }

    /// Iterate over the tags.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(String::as_str)
    }

    /// Number of tags in the set.
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}
