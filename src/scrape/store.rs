use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

// ─── Public types ────────────────────────────────────────────────

/// The latest rendered exposition text and when it was produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub rendered: String,
    /// `None` until the first successful refresh.
    pub last_success: Option<DateTime<Utc>>,
}

impl Snapshot {
    /// Fresh iff `now − last_success < max_age`.
    pub fn is_fresh(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        let Some(last) = self.last_success else {
            return false;
        };
        match (now - last).to_std() {
            Ok(age) => age < max_age,
            // Refreshed "in the future" relative to `now`: clock skew, not staleness.
            Err(_) => true,
        }
    }
}

/// Thread-safe snapshot holder.
/// The refresh task calls `replace()`, request handlers call `read_fresh()`.
pub struct SnapshotStore {
    inner: RwLock<Snapshot>,
}

// ─── SnapshotStore impl ──────────────────────────────────────────

impl SnapshotStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Snapshot::default()),
        }
    }

    /// Swap in a freshly rendered snapshot under the exclusive lock.
    pub fn replace(&self, rendered: String, at: DateTime<Utc>) {
        *self.inner.write() = Snapshot {
            rendered,
            last_success: Some(at),
        };
    }

    /// The cached text, if it is younger than `max_age`.
    pub fn read_fresh(&self, now: DateTime<Utc>, max_age: Duration) -> Option<String> {
        let snapshot = self.inner.read();
        snapshot
            .is_fresh(now, max_age)
            .then(|| snapshot.rendered.clone())
    }

    pub fn last_success(&self) -> Option<DateTime<Utc>> {
        self.inner.read().last_success
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}
