//! Time-ordered, TTL-bounded snapshot history

use std::collections::VecDeque;

use tracing::{debug, warn};

use crate::game::Snapshot;

/// Snapshots on either side of a query time
#[derive(Debug, Clone, Copy)]
pub struct Bracket<'a> {
    /// Newest snapshot strictly older than the query time
    pub before: Option<&'a Snapshot>,
    /// Oldest snapshot at or after the query time
    pub after: Option<&'a Snapshot>,
}

/// Snapshot history, newest first.
///
/// Timestamps are strictly decreasing from front to back. Expired entries
/// are evicted lazily, on the next insert.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    snapshots: VecDeque<Snapshot>,
    ttl: f64,
}

impl SnapshotStore {
    pub fn new(ttl: f64) -> Self {
        Self {
            snapshots: VecDeque::new(),
            ttl,
        }
    }

    /// Insert `snapshot` as the newest entry, evicting anything older than
    /// `now - ttl` first.
    ///
    /// Returns `false` (and stores nothing) if the snapshot is not newer than
    /// the current newest entry or has already expired.
    pub fn record(&mut self, snapshot: Snapshot, now: f64) -> bool {
        let horizon = now - self.ttl;

        while self
            .snapshots
            .back()
            .is_some_and(|oldest| oldest.timestamp() < horizon)
        {
            self.snapshots.pop_back();
        }

        if let Some(newest) = self.snapshots.front() {
            if snapshot.timestamp() <= newest.timestamp() {
                warn!(
                    timestamp = snapshot.timestamp(),
                    newest = newest.timestamp(),
                    "Dropping snapshot that is not newer than the stored history"
                );
                return false;
            }
        }

        if snapshot.timestamp() < horizon {
            warn!(
                timestamp = snapshot.timestamp(),
                horizon, "Dropping snapshot that arrived already expired"
            );
            return false;
        }

        debug!(
            timestamp = snapshot.timestamp(),
            entities = snapshot.entities().len(),
            stored = self.snapshots.len() + 1,
            "Recorded snapshot"
        );
        self.snapshots.push_front(snapshot);
        true
    }

    /// Find the snapshots surrounding `time`.
    ///
    /// Scanning newest to oldest, `before` is the first entry older than
    /// `time` and `after` the last entry seen before it.
    pub fn find_bracket(&self, time: f64) -> Bracket<'_> {
        let mut after = None;

        for snapshot in &self.snapshots {
            if snapshot.timestamp() < time {
                return Bracket {
                    before: Some(snapshot),
                    after,
                };
            }
            after = Some(snapshot);
        }

        Bracket {
            before: None,
            after,
        }
    }

    pub fn latest(&self) -> Option<&Snapshot> {
        self.snapshots.front()
    }

    /// Stored snapshots, newest first
    pub fn iter(&self) -> impl Iterator<Item = &Snapshot> {
        self.snapshots.iter()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn ttl(&self) -> f64 {
        self.ttl
    }
}
