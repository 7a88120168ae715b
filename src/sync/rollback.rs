//! Lag compensation: rewind live transforms for a hit-test, then restore

use std::ops::{Deref, DerefMut};

use tracing::{debug, warn};

use crate::game::{EntityId, EntityTable, Snapshot};

use super::interpolate::sample;
use super::store::SnapshotStore;
use super::SyncError;

/// Live world captured when a rollback began
#[derive(Debug)]
struct SavedWorld {
    states: EntityTable,
}

/// Rewinds the world to a historical instant.
///
/// At most one rollback is active at a time. The snapshot history is only
/// read; everything written goes to live entity transforms and is undone by
/// [`RollbackEngine::end`].
#[derive(Debug, Default)]
pub struct RollbackEngine {
    saved: Option<SavedWorld>,
}

impl RollbackEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.saved.is_some()
    }

    /// Save the live world, then move every entity except `attacker` to where
    /// it was at `time`.
    ///
    /// If no snapshot newer than `time` is stored, the live world itself is
    /// the far side of the bracket. If nothing older is stored the world is
    /// left as it is (the rollback is still active and must be ended).
    pub fn begin(
        &mut self,
        world: &mut EntityTable,
        history: &SnapshotStore,
        time: f64,
        now: f64,
        attacker: EntityId,
    ) -> Result<(), SyncError> {
        if self.saved.is_some() {
            return Err(SyncError::NestedRollback);
        }

        let current = Snapshot::capture(now, world, Vec::new());
        self.saved = Some(SavedWorld {
            states: world.clone(),
        });

        let bracket = history.find_bracket(time);
        let Some(before) = bracket.before else {
            warn!(time, "No snapshot old enough, rollback leaves world unchanged");
            return Ok(());
        };
        let after = bracket.after.unwrap_or(&current);

        for (id, state) in world.iter_mut().filter(|(id, _)| **id != attacker) {
            if let Some(past) = sample(before, after, id, time) {
                state.position = past.position;
                state.rotation = past.rotation;
                state.orbit = past.orbit;
            }
        }

        debug!(
            time,
            before = before.timestamp(),
            after = after.timestamp(),
            "Rolled back world"
        );
        Ok(())
    }

    /// Restore every entity saved by [`begin`](Self::begin). No-op when no
    /// rollback is active.
    pub fn end(&mut self, world: &mut EntityTable) {
        let Some(saved) = self.saved.take() else {
            return;
        };

        for (id, state) in saved.states {
            if let Some(live) = world.get_mut(&id) {
                *live = state;
            }
        }
    }

    /// Begin a rollback whose end is tied to the returned guard
    pub fn scope<'a>(
        &'a mut self,
        world: &'a mut EntityTable,
        history: &SnapshotStore,
        time: f64,
        now: f64,
        attacker: EntityId,
    ) -> Result<RollbackScope<'a>, SyncError> {
        self.begin(world, history, time, now, attacker)?;
        Ok(RollbackScope {
            engine: self,
            world,
        })
    }
}

/// Rewound view of the world. Dropping it restores the live state, on every
/// exit path including unwinding.
pub struct RollbackScope<'a> {
    engine: &'a mut RollbackEngine,
    world: &'a mut EntityTable,
}

impl Deref for RollbackScope<'_> {
    type Target = EntityTable;

    fn deref(&self) -> &EntityTable {
        self.world
    }
}

impl DerefMut for RollbackScope<'_> {
    fn deref_mut(&mut self) -> &mut EntityTable {
        self.world
    }
}

impl Drop for RollbackScope<'_> {
    fn drop(&mut self) {
        self.engine.end(self.world);
    }
}
