//! Client side: entity lifecycle, per-frame prediction and interpolation

use tracing::{debug, info, warn};

use crate::config::Tuning;
use crate::game::{Command, EntityId, EntityMode, EntityState, EntityTable, Shot, Snapshot};

use super::interpolate::RemoteInterpolator;
use super::predict::ClientPredictor;
use super::store::SnapshotStore;

/// Samples after which the latency mean starts a new window
const LATENCY_WINDOW: u32 = 1000;

/// Something the presentation layer should react to
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// An entity appeared in the snapshot stream
    Spawned { id: EntityId, local: bool },
    /// An entity disappeared from the newest snapshot
    Despawned(EntityId),
    /// The local player fired; rendered immediately, never again on arrival
    Fired { shot_time: f64 },
    /// Another player's shot, as resolved by the server
    RemoteShot(Shot),
}

/// Running mean of one-way snapshot trip time
#[derive(Debug, Clone, Copy, Default)]
struct LatencyEstimate {
    total: f64,
    samples: u32,
}

impl LatencyEstimate {
    fn record(&mut self, sample: f64) {
        // Restart the window with the current mean as its only sample
        if self.samples >= LATENCY_WINDOW {
            self.total /= f64::from(self.samples);
            self.samples = 1;
        }
        self.total += sample;
        self.samples += 1;
    }

    fn mean(&self) -> Option<f64> {
        (self.samples > 0).then(|| self.total / f64::from(self.samples))
    }
}

/// Everything one client keeps in sync with the server
#[derive(Debug)]
pub struct ClientSync {
    local_id: EntityId,
    tuning: Tuning,
    store: SnapshotStore,
    /// Present once the local entity has appeared in a snapshot
    predictor: Option<ClientPredictor>,
    remotes: EntityTable,
    interpolator: RemoteInterpolator,
    events: Vec<ClientEvent>,
    latency: LatencyEstimate,
}

impl ClientSync {
    pub fn new(local_id: EntityId, tuning: Tuning) -> Self {
        Self {
            local_id,
            tuning,
            store: SnapshotStore::new(tuning.snapshot_ttl),
            predictor: None,
            remotes: EntityTable::new(),
            interpolator: RemoteInterpolator::new(),
            events: Vec::new(),
            latency: LatencyEstimate::default(),
        }
    }

    pub fn local_id(&self) -> EntityId {
        self.local_id
    }

    /// Predicted local entity, once spawned
    pub fn local(&self) -> Option<&EntityState> {
        self.predictor.as_ref().map(ClientPredictor::state)
    }

    pub fn predictor(&self) -> Option<&ClientPredictor> {
        self.predictor.as_ref()
    }

    pub fn remotes(&self) -> &EntityTable {
        &self.remotes
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    /// Mean one-way trip time of received snapshots
    pub fn latency(&self) -> Option<f64> {
        self.latency.mean()
    }

    pub fn drain_events(&mut self) -> Vec<ClientEvent> {
        std::mem::take(&mut self.events)
    }

    /// Record an authoritative snapshot and bring the entity set in line
    /// with it.
    ///
    /// Returns `false` if the store refused the snapshot (not newer than the
    /// history, or already expired); nothing else changes in that case.
    pub fn apply_inbound_snapshot(&mut self, snapshot: Snapshot, now: f64) -> bool {
        self.latency.record(now - snapshot.timestamp());

        if !self.store.record(snapshot, now) {
            return false;
        }
        let Some(latest) = self.store.latest() else {
            return false;
        };

        for (id, entry) in latest.entities() {
            if *id == self.local_id {
                if self.predictor.is_none() {
                    self.predictor = Some(ClientPredictor::new(*id, entry, self.tuning));
                    self.events.push(ClientEvent::Spawned { id: *id, local: true });
                    info!(entity_id = %id, "Local player spawned");
                }
            } else if !self.remotes.contains_key(id) {
                self.remotes
                    .insert(*id, EntityState::from_snapshot(EntityMode::Remote, entry));
                self.events.push(ClientEvent::Spawned { id: *id, local: false });
                info!(entity_id = %id, "Remote player spawned");
            }
        }

        let departed: Vec<EntityId> = self
            .remotes
            .keys()
            .filter(|id| latest.entity(id).is_none())
            .copied()
            .collect();
        for id in departed {
            self.remotes.remove(&id);
            self.interpolator.forget(&id);
            self.events.push(ClientEvent::Despawned(id));
            info!(entity_id = %id, "Remote player removed");
        }
        if self.predictor.is_some() && latest.entity(&self.local_id).is_none() {
            self.predictor = None;
            self.events.push(ClientEvent::Despawned(self.local_id));
            info!(entity_id = %self.local_id, "Local player removed");
        }

        self.events.extend(
            latest
                .shots()
                .iter()
                .filter(|shot| shot.shooter_id != self.local_id)
                .map(|shot| ClientEvent::RemoteShot(*shot)),
        );

        true
    }

    /// Feed one locally sampled command into prediction.
    ///
    /// Returns a batch to send when the flush interval has elapsed. Commands
    /// sampled before the local entity exists are dropped.
    pub fn push_command(&mut self, command: Command, frame_delta: f64) -> Option<Vec<Command>> {
        let Some(predictor) = self.predictor.as_mut() else {
            debug!(timestamp = command.timestamp, "Local entity not spawned, command dropped");
            return None;
        };

        let (outcome, batch) = predictor.push(command, frame_delta);
        if let Some(shot_time) = outcome.shot_time {
            self.events.push(ClientEvent::Fired { shot_time });
        }
        batch
    }

    /// Per-frame update: interpolate remotes at the render time, then
    /// reconcile the local entity against the newest snapshot.
    pub fn tick(&mut self, now: f64, delta: f32) {
        let render_time = now - self.tuning.render_delay;
        let bracket = self.store.find_bracket(render_time);

        match (bracket.before, bracket.after) {
            (Some(before), Some(after)) => {
                self.interpolator.update(
                    &mut self.remotes,
                    before,
                    after,
                    render_time,
                    delta,
                    &self.tuning,
                );
            }
            (Some(before), None) => {
                warn!(
                    render_time,
                    newest = before.timestamp(),
                    "No snapshot past render time, remote interpolation skipped"
                );
            }
            (None, oldest) => {
                warn!(
                    render_time,
                    oldest = oldest.map(Snapshot::timestamp),
                    "No snapshot before render time, remotes left unrendered"
                );
            }
        }

        let Some(predictor) = self.predictor.as_mut() else {
            return;
        };
        match self.store.latest() {
            Some(latest) => {
                if let Err(e) = predictor.reconcile(latest) {
                    warn!(error = %e, "Reconciliation skipped");
                }
            }
            None => warn!("No snapshot received yet, reconciliation skipped"),
        }
    }
}
