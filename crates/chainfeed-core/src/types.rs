//! Shared types for the pipeline.

use serde::{Deserialize, Serialize};

/// Block height — the single ordering key for the event log and every checkpoint.
pub type Height = u64;

// ─── EventFilter ─────────────────────────────────────────────────────────────

/// The set of event names a consumer listens to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFilter {
    names: Vec<String>,
}

impl EventFilter {
    /// Build a filter from a list of event names. Duplicates are dropped.
    pub fn names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut filter = Self::default();
        for name in names {
            filter = filter.name(name);
        }
        filter
    }

    /// Add one event name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.names.contains(&name) {
            self.names.push(name);
        }
        self
    }

    /// Returns `true` if events called `name` pass the filter.
    ///
    /// Unlike an address filter, an empty interest set matches nothing.
    pub fn matches(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.names
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
