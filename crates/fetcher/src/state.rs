//! Per-object fetch state

use std::collections::HashMap;

use chrono::{DateTime, Utc};

/// Last-observed modification time per remote object name
///
/// Scoped to one fetcher and its watch prefixes. Recorded timestamps are
/// monotonic: an entry never moves backwards, so an object whose remote
/// timestamp regresses is not re-downloaded.
#[derive(Debug, Default)]
pub struct FetchState {
    seen: HashMap<String, DateTime<Utc>>,
}

impl FetchState {
    /// Create an empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an object should be downloaded this cycle
    ///
    /// True for unseen names and for strictly newer timestamps; equal or
    /// older timestamps are a no-op.
    pub fn is_new(&self, name: &str, last_modified: DateTime<Utc>) -> bool {
        match self.seen.get(name) {
            Some(previous) => last_modified > *previous,
            None => true,
        }
    }

    /// Record a successfully downloaded object
    pub fn record(&mut self, name: &str, last_modified: DateTime<Utc>) {
        match self.seen.get_mut(name) {
            Some(previous) => {
                if last_modified > *previous {
                    *previous = last_modified;
                }
            }
            None => {
                self.seen.insert(name.to_string(), last_modified);
            }
        }
    }

    /// Number of tracked objects
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Whether any objects are tracked
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
