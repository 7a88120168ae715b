//! Authoritative side: input queue, per-tick simulation and snapshot output

use std::collections::VecDeque;

use glam::Vec3;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, error, info, trace, warn};

use crate::config::Tuning;
use crate::game::combat::{apply_hit, muzzle_position};
use crate::game::{
    CapsuleHitTester, Command, EntityId, EntityMode, EntityState, EntityTable, HitTester, PlayerSnapshot, Shot,
    Snapshot,
};

use super::rollback::RollbackEngine;
use super::store::SnapshotStore;
use super::SyncError;

/// Radius of the disc players spawn on
const SPAWN_RADIUS: f32 = 10.0;

/// Server-side synchronization state.
///
/// Owns the authoritative copy of every entity. Inbound command batches are
/// queued in arrival order and only applied on [`tick`](Self::tick).
pub struct ServerSync<H = CapsuleHitTester> {
    tuning: Tuning,
    entities: EntityTable,
    queue: VecDeque<(EntityId, Command)>,
    /// Shots fired since the last outbound snapshot
    pending_shots: Vec<Shot>,
    history: SnapshotStore,
    rollback: RollbackEngine,
    hit_tester: H,
    rng: ChaCha8Rng,
}

impl ServerSync<CapsuleHitTester> {
    pub fn new(tuning: Tuning, seed: u64) -> Self {
        Self::with_hit_tester(tuning, CapsuleHitTester::new(tuning.melee_reach), seed)
    }
}

impl<H: HitTester> ServerSync<H> {
    pub fn with_hit_tester(tuning: Tuning, hit_tester: H, seed: u64) -> Self {
        Self {
            tuning,
            entities: EntityTable::new(),
            queue: VecDeque::new(),
            pending_shots: Vec::new(),
            history: SnapshotStore::new(tuning.snapshot_ttl),
            rollback: RollbackEngine::new(),
            hit_tester,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn tuning(&self) -> &Tuning {
        &self.tuning
    }

    pub fn entities(&self) -> &EntityTable {
        &self.entities
    }

    pub fn entity(&self, id: &EntityId) -> Option<&EntityState> {
        self.entities.get(id)
    }

    pub fn entity_mut(&mut self, id: &EntityId) -> Option<&mut EntityState> {
        self.entities.get_mut(id)
    }

    pub fn history(&self) -> &SnapshotStore {
        &self.history
    }

    /// Commands queued but not yet applied
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Random point on the spawn disc and a random facing, in degrees
    fn spawn_point(&mut self) -> (Vec3, f32) {
        let angle = self.rng.gen_range(0.0..std::f32::consts::TAU);
        let distance = self.rng.gen_range(0.0..SPAWN_RADIUS);
        let facing = self.rng.gen_range(0.0..360.0);
        (Vec3::new(angle.cos() * distance, 0.0, angle.sin() * distance), facing)
    }

    /// Create the authoritative entity for a newly connected player.
    ///
    /// Its applied-command time starts at `now`, so the first command it
    /// accepts is integrated over the time since connecting.
    pub fn on_connect(&mut self, id: EntityId, now: f64) -> PlayerSnapshot {
        if let Some(existing) = self.entities.get(&id) {
            warn!(entity_id = %id, "Player already connected");
            return existing.to_snapshot();
        }

        let (position, facing) = self.spawn_point();
        let state = EntityState::spawn(EntityMode::Authoritative, position, facing, now, &self.tuning);
        self.entities.insert(id, state);

        info!(entity_id = %id, x = position.x, z = position.z, "Player connected");
        state.to_snapshot()
    }

    pub fn on_disconnect(&mut self, id: EntityId) {
        if self.entities.remove(&id).is_none() {
            return;
        }
        self.queue.retain(|(sender, _)| *sender != id);
        info!(entity_id = %id, "Player disconnected");
    }

    /// Replace a player's entity with a fresh one at a new spawn point.
    ///
    /// The applied-command time carries over so commands already applied to
    /// the old entity are not applied again.
    pub fn request_respawn(&mut self, id: EntityId) -> Result<(), SyncError> {
        let last_applied = self
            .entities
            .get(&id)
            .map(|state| state.last_applied_command_time)
            .ok_or(SyncError::UnknownSender(id))?;

        let (position, facing) = self.spawn_point();
        let fresh = EntityState::spawn(EntityMode::Authoritative, position, facing, last_applied, &self.tuning);
        self.entities.insert(id, fresh);

        info!(entity_id = %id, x = position.x, z = position.z, "Player respawned");
        Ok(())
    }

    /// Queue a batch of commands from `sender`, in arrival order.
    ///
    /// A batch from an id with no entity is dropped as a whole.
    pub fn apply_inbound_commands(&mut self, sender: EntityId, commands: &[Command]) -> Result<usize, SyncError> {
        if !self.entities.contains_key(&sender) {
            warn!(entity_id = %sender, commands = commands.len(), "Dropping commands from unknown sender");
            return Err(SyncError::UnknownSender(sender));
        }

        self.queue.extend(commands.iter().map(|command| (sender, *command)));
        Ok(commands.len())
    }

    /// Advance the simulation: drain the command queue, resolve shots and
    /// melee strikes, then refresh dead flags.
    pub fn tick(&mut self, now: f64) {
        while let Some((sender, command)) = self.queue.pop_front() {
            let Some(state) = self.entities.get_mut(&sender) else {
                continue;
            };

            if state.mode != EntityMode::Authoritative {
                warn!(entity_id = %sender, mode = ?state.mode, "Entity is not server-driven, command refused");
                continue;
            }

            if command.timestamp <= state.last_applied_command_time {
                trace!(
                    entity_id = %sender,
                    timestamp = command.timestamp,
                    last_applied = state.last_applied_command_time,
                    "Dropping stale command"
                );
                continue;
            }

            let outcome = state.apply_command(&command, &self.tuning);
            debug!(entity_id = %sender, timestamp = command.timestamp, "Applied command");

            if let Some(shot_time) = outcome.shot_time {
                self.resolve_shot(sender, shot_time, now);
            }
        }

        self.resolve_melee(now);

        for state in self.entities.values_mut() {
            state.is_dead = state.hp <= 0;
        }
    }

    /// Hit-test a ranged shot against the world as the shooter saw it
    fn resolve_shot(&mut self, shooter: EntityId, shot_time: f64, now: f64) {
        let outcome = {
            let scope = match self
                .rollback
                .scope(&mut self.entities, &self.history, shot_time, now, shooter)
            {
                Ok(scope) => scope,
                Err(e) => {
                    error!(entity_id = %shooter, error = %e, "Shot abandoned");
                    return;
                }
            };

            let Some(state) = scope.get(&shooter) else {
                return;
            };
            let origin = muzzle_position(state);
            let Some(destination) = self.hit_tester.point_of_aim(shooter, &scope) else {
                return;
            };
            let hit = self.hit_tester.body_part_at(destination, shooter, &scope);
            (origin, destination, hit)
        };

        let (origin, destination, hit) = outcome;
        self.pending_shots.push(Shot {
            shooter_id: shooter,
            origin,
            destination,
        });

        if let Some(hit) = hit {
            if let Some(damage) = apply_hit(&mut self.entities, hit, self.tuning.base_damage) {
                info!(
                    shooter = %shooter,
                    target = %hit.target,
                    part = ?hit.part,
                    damage,
                    "Shot landed"
                );
            }
        }
    }

    /// Collision pass for every entity mid-swing
    fn resolve_melee(&mut self, now: f64) {
        let strikers: Vec<(EntityId, f64)> = self
            .entities
            .iter()
            .filter(|(_, state)| state.is_striking(&self.tuning))
            .filter_map(|(id, state)| state.swing_started_at.map(|started| (*id, started)))
            .collect();

        for (attacker, started) in strikers {
            let time = started - self.tuning.render_delay;
            let contact = match self
                .rollback
                .scope(&mut self.entities, &self.history, time, now, attacker)
            {
                Ok(scope) => self.hit_tester.melee_contact(attacker, &scope),
                Err(e) => {
                    error!(entity_id = %attacker, error = %e, "Melee hit-test abandoned");
                    continue;
                }
            };

            let Some(hit) = contact else {
                continue;
            };
            if let Some(state) = self.entities.get_mut(&attacker) {
                state.has_swing_struck = true;
            }
            if let Some(damage) = apply_hit(&mut self.entities, hit, self.tuning.base_damage) {
                info!(
                    attacker = %attacker,
                    target = %hit.target,
                    part = ?hit.part,
                    damage,
                    "Swing landed"
                );
            }
        }
    }

    /// Package the world into the next snapshot, record it locally and hand
    /// it back for broadcast. Clears the pending shots.
    pub fn produce_outbound_snapshot(&mut self, now: f64) -> Snapshot {
        let shots = std::mem::take(&mut self.pending_shots);
        let snapshot = Snapshot::capture(now, &self.entities, shots);
        self.history.record(snapshot.clone(), now);
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{BodyPart, Hit, Weapon};
    use std::cell::RefCell;
    use uuid::Uuid;

    fn connected(ids: &[EntityId]) -> ServerSync {
        let mut server = ServerSync::new(Tuning::default(), 7);
        for id in ids {
            server.on_connect(*id, 0.0);
        }
        server
    }

    #[test]
    fn stale_commands_are_dropped_in_arrival_order() {
        let id = Uuid::new_v4();
        let mut server = connected(&[id]);

        let batch = [
            Command::moving(1.0, 0.0, 1.0),
            Command::moving(1.2, 0.0, 1.0),
            Command::moving(0.9, 0.0, 1.0),
        ];
        assert_eq!(server.apply_inbound_commands(id, &batch).unwrap(), 3);
        server.tick(1.3);

        assert_eq!(server.entity(&id).unwrap().last_applied_command_time, 1.2);
        assert_eq!(server.queued(), 0);
    }

    #[test]
    fn duplicate_timestamp_is_discarded() {
        let id = Uuid::new_v4();
        let mut server = connected(&[id]);

        server.apply_inbound_commands(id, &[Command::moving(1.0, 0.0, 1.0)]).unwrap();
        server.tick(1.0);
        let after_first = *server.entity(&id).unwrap();

        server.apply_inbound_commands(id, &[Command::moving(1.0, 1.0, 1.0)]).unwrap();
        server.tick(1.1);
        assert_eq!(*server.entity(&id).unwrap(), after_first);
    }

    #[test]
    fn commands_only_drive_authoritative_entities() {
        let id = Uuid::new_v4();
        let mut server = connected(&[id]);
        server.entity_mut(&id).unwrap().mode = EntityMode::Remote;
        let before = *server.entity(&id).unwrap();

        server.apply_inbound_commands(id, &[Command::moving(1.0, 0.0, 1.0)]).unwrap();
        server.tick(1.0);

        assert_eq!(*server.entity(&id).unwrap(), before);
        assert_eq!(server.queued(), 0);
    }

    #[test]
    fn unknown_sender_batch_is_rejected_whole() {
        let mut server = connected(&[]);
        let stranger = Uuid::new_v4();
        let result = server.apply_inbound_commands(stranger, &[Command::idle(1.0)]);
        assert!(matches!(result, Err(SyncError::UnknownSender(id)) if id == stranger));
        assert_eq!(server.queued(), 0);
    }

    #[test]
    fn disconnect_removes_entity_and_queued_commands() {
        let id = Uuid::new_v4();
        let mut server = connected(&[id]);
        server.apply_inbound_commands(id, &[Command::idle(1.0)]).unwrap();
        server.on_disconnect(id);

        assert!(server.entity(&id).is_none());
        assert_eq!(server.queued(), 0);
        assert!(server.produce_outbound_snapshot(1.0).entities().is_empty());
    }

    #[test]
    fn respawn_keeps_applied_command_time() {
        let id = Uuid::new_v4();
        let mut server = connected(&[id]);
        server.apply_inbound_commands(id, &[Command::moving(2.0, 0.0, 1.0)]).unwrap();
        server.tick(2.0);
        server.entity_mut(&id).unwrap().hp = -10;
        server.tick(2.0);
        assert!(server.entity(&id).unwrap().is_dead);

        server.request_respawn(id).unwrap();
        let respawned = server.entity(&id).unwrap();
        assert_eq!(respawned.last_applied_command_time, 2.0);
        assert_eq!(respawned.hp, Tuning::default().max_hp);
        assert!(!respawned.is_dead);

        assert!(matches!(
            server.request_respawn(Uuid::new_v4()),
            Err(SyncError::UnknownSender(_))
        ));
    }

    #[test]
    fn outbound_snapshot_is_recorded_and_clears_shots() {
        let id = Uuid::new_v4();
        let mut server = connected(&[id]);
        server.pending_shots.push(Shot {
            shooter_id: id,
            origin: Vec3::ZERO,
            destination: Vec3::Z,
        });

        let first = server.produce_outbound_snapshot(1.0);
        assert_eq!(first.shots().len(), 1);
        assert!(first.entity(&id).is_some());
        assert_eq!(server.history().latest().map(Snapshot::timestamp), Some(1.0));

        let second = server.produce_outbound_snapshot(1.1);
        assert!(second.shots().is_empty());
    }

    /// Reports a torso hit on whichever entity stands at the origin of the
    /// x axis, and remembers where it saw the target.
    struct ProbeAtOrigin {
        target: EntityId,
        seen: RefCell<Vec<Vec3>>,
    }

    impl HitTester for ProbeAtOrigin {
        fn point_of_aim(&self, _shooter: EntityId, world: &EntityTable) -> Option<Vec3> {
            let target = world.get(&self.target)?;
            self.seen.borrow_mut().push(target.position);
            Some(target.position)
        }

        fn body_part_at(&self, point: Vec3, _exclude: EntityId, _world: &EntityTable) -> Option<Hit> {
            (point.x == 0.0).then_some(Hit {
                target: self.target,
                part: BodyPart::Torso,
            })
        }

        fn melee_contact(&self, _attacker: EntityId, _world: &EntityTable) -> Option<Hit> {
            None
        }
    }

    #[test]
    fn shots_are_tested_against_the_rewound_world() {
        let tuning = Tuning::default();
        let shooter = Uuid::new_v4();
        let target = Uuid::new_v4();
        let probe = ProbeAtOrigin {
            target,
            seen: RefCell::new(Vec::new()),
        };
        let mut server = ServerSync::with_hit_tester(tuning, probe, 1);
        server.on_connect(shooter, 0.0);
        server.on_connect(target, 0.0);

        // Target stood at x=0 for the recorded history, then moved away
        server.entity_mut(&target).unwrap().position = Vec3::ZERO;
        server.produce_outbound_snapshot(1.0);
        server.produce_outbound_snapshot(1.1);
        server.entity_mut(&target).unwrap().position = Vec3::new(10.0, 0.0, 0.0);
        server.entity_mut(&shooter).unwrap().weapon = Weapon::Revolver;

        let fire = Command {
            timestamp: 1.15,
            fire: true,
            fire_edge: true,
            ..Command::default()
        };
        server.apply_inbound_commands(shooter, &[fire]).unwrap();
        server.tick(1.2);

        assert_eq!(server.hit_tester.seen.borrow().as_slice(), &[Vec3::ZERO]);
        assert_eq!(server.entity(&target).unwrap().hp, tuning.max_hp - tuning.base_damage);
        assert_eq!(server.entity(&target).unwrap().position.x, 10.0);

        let snapshot = server.produce_outbound_snapshot(1.2);
        assert_eq!(snapshot.shots().len(), 1);
        assert_eq!(snapshot.shots()[0].shooter_id, shooter);
        assert_eq!(snapshot.shots()[0].destination, Vec3::ZERO);
    }

    #[test]
    fn a_swing_lands_once() {
        let tuning = Tuning::default();
        let attacker = Uuid::new_v4();
        let victim = Uuid::new_v4();
        let mut server = connected(&[attacker, victim]);
        *server.entity_mut(&attacker).unwrap() =
            EntityState::spawn(EntityMode::Authoritative, Vec3::ZERO, 0.0, 0.0, &tuning);
        *server.entity_mut(&victim).unwrap() =
            EntityState::spawn(EntityMode::Authoritative, Vec3::new(0.0, 0.0, 1.2), 180.0, 0.0, &tuning);

        let raise = Command {
            timestamp: 1.0,
            fire: true,
            equip_primary: true,
            ..Command::default()
        };
        server.apply_inbound_commands(attacker, &[raise, Command::idle(1.1)]).unwrap();
        server.tick(1.1);

        let attacker_state = server.entity(&attacker).unwrap();
        assert_eq!(attacker_state.weapon, Weapon::Machete);
        assert!(attacker_state.has_swing_struck);
        let hp_after_hit = server.entity(&victim).unwrap().hp;
        assert!(hp_after_hit < tuning.max_hp);

        server.apply_inbound_commands(attacker, &[Command::idle(1.2)]).unwrap();
        server.tick(1.2);
        assert_eq!(server.entity(&victim).unwrap().hp, hp_after_hit);
    }
}
