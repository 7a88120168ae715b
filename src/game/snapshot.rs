//! Snapshot building

use std::collections::BTreeMap;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::entity::{EntityId, EntityTable, PlayerSnapshot};

/// A shot fired during the tick a snapshot covers. Never carried into a
/// later snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Shot {
    pub shooter_id: EntityId,
    pub origin: Vec3,
    pub destination: Vec3,
}

/// Immutable capture of every tracked entity at one network time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    timestamp: f64,
    entities: BTreeMap<EntityId, PlayerSnapshot>,
    shots: Vec<Shot>,
}

impl Snapshot {
    pub fn new(
        timestamp: f64,
        entities: BTreeMap<EntityId, PlayerSnapshot>,
        shots: Vec<Shot>,
    ) -> Self {
        Self {
            timestamp,
            entities,
            shots,
        }
    }

    /// Capture the renderable subset of every live entity
    pub fn capture(timestamp: f64, world: &EntityTable, shots: Vec<Shot>) -> Self {
        let entities = world
            .iter()
            .map(|(id, state)| (*id, state.to_snapshot()))
            .collect();
        Self::new(timestamp, entities, shots)
    }

    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn entities(&self) -> &BTreeMap<EntityId, PlayerSnapshot> {
        &self.entities
    }

    pub fn entity(&self, id: &EntityId) -> Option<&PlayerSnapshot> {
        self.entities.get(id)
    }

    pub fn shots(&self) -> &[Shot] {
        &self.shots
    }
}
