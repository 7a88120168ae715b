//! Per-player simulation state and the deterministic command transition

use std::collections::BTreeMap;

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Tuning;

use super::command::Command;
use super::orbit::Orbit;
use super::weapon::{Weapon, WeaponClass};

pub type EntityId = Uuid;

/// Live entities keyed by id. Ordered so every pass over the world visits
/// entities in the same sequence on every run.
pub type EntityTable = BTreeMap<EntityId, EntityState>;

/// Which role drives an entity's state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityMode {
    /// The client's own entity: commands applied speculatively, reconciled on snapshots
    Local,
    /// Another player on a client: rebuilt every frame from snapshot history
    Remote,
    /// Server copy: commands applied as the source of truth
    Authoritative,
}

/// Renderable subset of an entity, as carried inside a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub position: Vec3,
    pub rotation: Quat,
    pub x_movement: f32,
    pub z_movement: f32,
    pub orbit: Orbit,
    pub weapon: Weapon,
    pub weapon_raised: bool,
    pub weapon_blocking: bool,
    pub last_applied_command_time: f64,
    pub hp: i32,
    pub is_dead: bool,
    pub has_swing_struck: bool,
}

/// Side effects of a command that the caller must act on
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CommandOutcome {
    /// A ranged shot was fired; the value is the network time the shooter was
    /// looking at the world (command time minus render delay)
    pub shot_time: Option<f64>,
}

/// Full simulation state of one player
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntityState {
    pub mode: EntityMode,
    pub position: Vec3,
    pub rotation: Quat,
    /// Smoothed strafe scalar
    pub x_movement: f32,
    /// Smoothed forward scalar
    pub z_movement: f32,
    pub orbit: Orbit,
    pub weapon: Weapon,
    pub weapon_raised: bool,
    pub weapon_blocking: bool,
    /// Set once the current swing has landed so it cannot land again
    pub has_swing_struck: bool,
    /// Command time at which the current melee strike began. Server only,
    /// never replicated.
    pub swing_started_at: Option<f64>,
    pub hp: i32,
    pub is_dead: bool,
    /// Never decreases while this state is alive
    pub last_applied_command_time: f64,
}

impl EntityState {
    /// Fresh entity standing at `position`, facing `facing_yaw` degrees
    pub fn spawn(
        mode: EntityMode,
        position: Vec3,
        facing_yaw: f32,
        last_applied_command_time: f64,
        tuning: &Tuning,
    ) -> Self {
        Self {
            mode,
            position,
            rotation: Quat::from_rotation_y(facing_yaw.to_radians()),
            x_movement: 0.0,
            z_movement: 0.0,
            orbit: Orbit::around(position, facing_yaw, tuning),
            weapon: Weapon::Unarmed,
            weapon_raised: false,
            weapon_blocking: false,
            has_swing_struck: false,
            swing_started_at: None,
            hp: tuning.max_hp,
            is_dead: false,
            last_applied_command_time,
        }
    }

    /// Entity built from a replicated snapshot entry
    pub fn from_snapshot(mode: EntityMode, snapshot: &PlayerSnapshot) -> Self {
        Self {
            mode,
            position: snapshot.position,
            rotation: snapshot.rotation,
            x_movement: snapshot.x_movement,
            z_movement: snapshot.z_movement,
            orbit: snapshot.orbit,
            weapon: snapshot.weapon,
            weapon_raised: snapshot.weapon_raised,
            weapon_blocking: snapshot.weapon_blocking,
            has_swing_struck: snapshot.has_swing_struck,
            swing_started_at: None,
            hp: snapshot.hp,
            is_dead: snapshot.is_dead,
            last_applied_command_time: snapshot.last_applied_command_time,
        }
    }

    pub fn to_snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            position: self.position,
            rotation: self.rotation,
            x_movement: self.x_movement,
            z_movement: self.z_movement,
            orbit: self.orbit,
            weapon: self.weapon,
            weapon_raised: self.weapon_raised,
            weapon_blocking: self.weapon_blocking,
            last_applied_command_time: self.last_applied_command_time,
            hp: self.hp,
            is_dead: self.is_dead,
            has_swing_struck: self.has_swing_struck,
        }
    }

    /// Overwrite every replicated field with `snapshot`
    pub fn sync_to(&mut self, snapshot: &PlayerSnapshot) {
        self.position = snapshot.position;
        self.rotation = snapshot.rotation;
        self.x_movement = snapshot.x_movement;
        self.z_movement = snapshot.z_movement;
        self.orbit = snapshot.orbit;
        self.weapon = snapshot.weapon;
        self.weapon_raised = snapshot.weapon_raised;
        self.weapon_blocking = snapshot.weapon_blocking;
        self.last_applied_command_time = snapshot.last_applied_command_time;
        self.hp = snapshot.hp;
        self.is_dead = snapshot.is_dead;
        self.has_swing_struck = snapshot.has_swing_struck;
    }

    /// Mid-swing with a melee weapon and the swing has not landed yet
    pub fn is_striking(&self, tuning: &Tuning) -> bool {
        if self.has_swing_struck || self.weapon.class() != WeaponClass::Melee {
            return false;
        }
        self.swing_started_at
            .map(|started| self.last_applied_command_time - started < tuning.swing_duration)
            .unwrap_or(false)
    }

    /// Advance this entity by one command.
    ///
    /// The steps always run in the same order: equip, attack/defend, orbit,
    /// movement, then the applied-time stamp. Motion is integrated over the
    /// command-time step, so the result depends only on `(self, command)`.
    pub fn apply_command(&mut self, command: &Command, tuning: &Tuning) -> CommandOutcome {
        let step = command.timestamp - self.last_applied_command_time;

        self.manage_weapon(command);
        let outcome = self.manage_attack(command, tuning);
        self.orbit
            .update(command.mouse_dx, command.mouse_dy, self.position, tuning);
        self.manage_movement(step as f32, command.move_h, command.move_v, tuning);

        self.last_applied_command_time = command.timestamp;
        outcome
    }

    fn manage_weapon(&mut self, command: &Command) {
        if command.equip_primary {
            self.weapon = Weapon::Machete;
        } else if command.equip_secondary {
            self.weapon = Weapon::Revolver;
        }
    }

    fn manage_attack(&mut self, command: &Command, tuning: &Tuning) -> CommandOutcome {
        let mut outcome = CommandOutcome::default();

        match self.weapon.class() {
            WeaponClass::Unarmed => {
                self.weapon_raised = false;
            }
            WeaponClass::Melee => {
                let was_raised = self.weapon_raised;
                self.weapon_raised = command.fire;
                self.weapon_blocking = command.block;

                if command.fire {
                    self.has_swing_struck = false;
                    self.swing_started_at = None;
                } else if was_raised {
                    // Releasing a raised blade is what swings it
                    self.swing_started_at = Some(command.timestamp);
                }
            }
            WeaponClass::Ranged => {
                self.weapon_raised = true;
                if command.fire_edge {
                    outcome.shot_time = Some(command.timestamp - tuning.render_delay);
                }
            }
        }

        outcome
    }

    fn manage_movement(&mut self, step: f32, horizontal: f32, vertical: f32, tuning: &Tuning) {
        let x_velocity = horizontal * tuning.run_speed;
        let z_velocity = vertical * tuning.run_speed;

        // The movement scalars ease toward the target velocity; position below
        // uses the raw velocity so input takes effect immediately.
        let factor = (tuning.move_smoothing * step).clamp(0.0, 1.0);
        self.x_movement = smooth_scalar(self.x_movement, x_velocity, factor, tuning.movement_deadzone);
        self.z_movement = smooth_scalar(self.z_movement, z_velocity, factor, tuning.movement_deadzone);

        if self.x_movement != 0.0
            || self.z_movement != 0.0
            || self.weapon_raised
            || self.weapon_blocking
        {
            self.track_camera(step, tuning);
        }

        let forward = self.rotation * Vec3::Z;
        let right = self.rotation * Vec3::X;
        self.position += step * (forward * z_velocity + right * x_velocity);
    }

    fn track_camera(&mut self, step: f32, tuning: &Tuning) {
        let camera_forward = self.orbit.forward();
        let flat = Vec3::new(camera_forward.x, 0.0, camera_forward.z);
        if flat.length_squared() <= f32::EPSILON {
            return;
        }

        let target = Quat::from_rotation_y(flat.x.atan2(flat.z));
        let factor = (tuning.turn_smoothing * step).clamp(0.0, 1.0);
        self.rotation = self.rotation.lerp(target, factor);
    }
}

fn smooth_scalar(current: f32, target: f32, factor: f32, deadzone: f32) -> f32 {
    let smoothed = current + (target - current) * factor;
    // Shrinking and already tiny: snap instead of creeping toward zero forever
    if smoothed.abs() < deadzone && smoothed.abs() < current.abs() {
        0.0
    } else {
        smoothed
    }
}

/// Pure form of [`EntityState::apply_command`]
pub fn apply_command(
    state: &EntityState,
    command: &Command,
    tuning: &Tuning,
) -> (EntityState, CommandOutcome) {
    let mut next = *state;
    let outcome = next.apply_command(command, tuning);
    (next, outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> EntityState {
        EntityState::spawn(
            EntityMode::Authoritative,
            Vec3::ZERO,
            0.0,
            0.0,
            &Tuning::default(),
        )
    }

    #[test]
    fn movement_integrates_over_command_step() {
        let tuning = Tuning::default();
        let mut state = fresh();

        state.apply_command(&Command::moving(0.5, 0.0, 1.0), &tuning);

        // Facing +Z, forward at run speed for half a second
        assert!((state.position.z - 2.0).abs() < 1e-4);
        assert_eq!(state.last_applied_command_time, 0.5);
    }

    #[test]
    fn equip_primary_wins_over_secondary() {
        let tuning = Tuning::default();
        let mut state = fresh();
        let command = Command {
            timestamp: 0.1,
            equip_primary: true,
            equip_secondary: true,
            ..Command::default()
        };

        state.apply_command(&command, &tuning);
        assert_eq!(state.weapon, Weapon::Machete);
    }

    #[test]
    fn ranged_fires_only_on_press_edge() {
        let tuning = Tuning::default();
        let mut state = fresh();
        state.weapon = Weapon::Revolver;

        let held = Command {
            timestamp: 1.0,
            fire: true,
            ..Command::default()
        };
        assert_eq!(state.apply_command(&held, &tuning).shot_time, None);
        assert!(state.weapon_raised);

        let pressed = Command {
            timestamp: 1.1,
            fire: true,
            fire_edge: true,
            ..Command::default()
        };
        let outcome = state.apply_command(&pressed, &tuning);
        assert_eq!(outcome.shot_time, Some(1.1 - tuning.render_delay));
    }

    #[test]
    fn releasing_melee_starts_a_strike() {
        let tuning = Tuning::default();
        let mut state = fresh();
        state.weapon = Weapon::Machete;
        state.has_swing_struck = true;

        let raise = Command {
            timestamp: 1.0,
            fire: true,
            ..Command::default()
        };
        state.apply_command(&raise, &tuning);
        assert!(state.weapon_raised);
        assert!(!state.has_swing_struck);
        assert!(!state.is_striking(&tuning));

        state.apply_command(&Command::idle(1.1), &tuning);
        assert_eq!(state.swing_started_at, Some(1.1));
        assert!(state.is_striking(&tuning));

        state.apply_command(&Command::idle(2.0), &tuning);
        assert!(!state.is_striking(&tuning));
    }

    #[test]
    fn unarmed_lowers_weapon() {
        let tuning = Tuning::default();
        let mut state = fresh();
        state.weapon_raised = true;
        state.apply_command(&Command::idle(0.1), &tuning);
        assert!(!state.weapon_raised);
    }

    #[test]
    fn movement_scalar_snaps_to_zero_near_rest() {
        assert_eq!(smooth_scalar(0.15, 0.0, 0.5, 0.1), 0.0);
        // Growing from zero is never snapped
        assert!(smooth_scalar(0.0, 4.0, 0.01, 0.1) > 0.0);
    }

    #[test]
    fn snapshot_round_trip_preserves_replicated_fields() {
        let tuning = Tuning::default();
        let mut state = fresh();
        state.apply_command(&Command::moving(0.3, 1.0, 1.0), &tuning);

        let rebuilt = EntityState::from_snapshot(EntityMode::Remote, &state.to_snapshot());
        assert_eq!(rebuilt.to_snapshot(), state.to_snapshot());
    }
}
