//! Remote-entity interpolation between bracketing snapshots

use std::collections::HashMap;

use glam::{Quat, Vec3};
use tracing::{debug, warn};

use crate::config::Tuning;
use crate::game::{EntityId, EntityMode, EntityTable, Orbit, PlayerSnapshot, Snapshot};

/// Position of `time` between two snapshot timestamps, clamped to [0, 1]
pub fn interpolation_factor(before: f64, after: f64, time: f64) -> f32 {
    let span = after - before;
    if span <= 0.0 {
        return 0.0;
    }
    ((time - before) / span).clamp(0.0, 1.0) as f32
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a * (1.0 - t) + b * t
}

fn lerp_vec(a: Vec3, b: Vec3, t: f32) -> Vec3 {
    a * (1.0 - t) + b * t
}

fn nlerp(a: Quat, b: Quat, t: f32) -> Quat {
    if t <= 0.0 {
        a
    } else if t >= 1.0 {
        b
    } else {
        a.lerp(b, t)
    }
}

/// Blend two snapshot entries.
///
/// Continuous fields are interpolated; discrete ones (weapon, flags, hp,
/// applied-command time) are taken from `before` as-is.
pub fn interpolate(before: &PlayerSnapshot, after: &PlayerSnapshot, t: f32) -> PlayerSnapshot {
    PlayerSnapshot {
        position: lerp_vec(before.position, after.position, t),
        rotation: nlerp(before.rotation, after.rotation, t),
        x_movement: lerp(before.x_movement, after.x_movement, t),
        z_movement: lerp(before.z_movement, after.z_movement, t),
        orbit: Orbit {
            yaw: lerp(before.orbit.yaw, after.orbit.yaw, t),
            pitch: lerp(before.orbit.pitch, after.orbit.pitch, t),
            position: lerp_vec(before.orbit.position, after.orbit.position, t),
            rotation: nlerp(before.orbit.rotation, after.orbit.rotation, t),
        },
        ..*before
    }
}

/// Interpolated entry for `id` at `time`, if both snapshots contain it
pub fn sample(before: &Snapshot, after: &Snapshot, id: &EntityId, time: f64) -> Option<PlayerSnapshot> {
    let start = before.entity(id)?;
    let end = after.entity(id)?;
    let t = interpolation_factor(before.timestamp(), after.timestamp(), time);
    Some(interpolate(start, end, t))
}

/// Critically damped spring toward `target`.
///
/// `velocity` carries the filter state between frames.
pub fn smooth_damp(current: Vec3, target: Vec3, velocity: &mut Vec3, smooth_time: f32, delta: f32) -> Vec3 {
    if delta <= 0.0 {
        return current;
    }

    let smooth_time = smooth_time.max(0.0001);
    let omega = 2.0 / smooth_time;
    let x = omega * delta;
    let decay = 1.0 / (1.0 + x + 0.48 * x * x + 0.235 * x * x * x);

    let change = current - target;
    let temp = (*velocity + omega * change) * delta;
    *velocity = (*velocity - omega * temp) * decay;
    let mut output = target + (change + temp) * decay;

    // Do not overshoot
    if (target - current).dot(output - target) > 0.0 {
        output = target;
        *velocity = (output - target) / delta;
    }

    output
}

/// Rebuilds remote entities every frame from snapshot history
#[derive(Debug, Default)]
pub struct RemoteInterpolator {
    velocities: HashMap<EntityId, Vec3>,
}

impl RemoteInterpolator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place every remote entity in `remotes` at `render_time` between
    /// `before` and `after`. Entities missing from either snapshot, and any
    /// entity not in [`EntityMode::Remote`], are left where they are.
    pub fn update(
        &mut self,
        remotes: &mut EntityTable,
        before: &Snapshot,
        after: &Snapshot,
        render_time: f64,
        delta: f32,
        tuning: &Tuning,
    ) {
        for (id, state) in remotes.iter_mut() {
            if state.mode != EntityMode::Remote {
                debug!(entity_id = %id, mode = ?state.mode, "Not a remote entity, interpolation skipped");
                continue;
            }
            let Some(target) = sample(before, after, id, render_time) else {
                warn!(entity_id = %id, render_time, "Entity missing from bracket, interpolation skipped");
                continue;
            };

            let velocity = self.velocities.entry(*id).or_insert(Vec3::ZERO);
            let smoothed = smooth_damp(
                state.position,
                target.position,
                velocity,
                tuning.smooth_interpolation_time,
                delta,
            );

            state.sync_to(&target);
            state.position = smoothed;
        }
    }

    /// Drop filter state for an entity that left
    pub fn forget(&mut self, id: &EntityId) {
        self.velocities.remove(id);
    }
}
