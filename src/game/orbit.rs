//! Third-person camera orbit carried by every entity

use glam::{EulerRot, Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::config::Tuning;

/// Mouse deltas are scaled by this before the configured orbit speed
const MOUSE_SCALE: f32 = 0.02;

/// Camera orbit around an entity.
///
/// `yaw`/`pitch` are the authoritative angles (degrees); `position` and
/// `rotation` are the transform derived from them on the last update and are
/// replicated as-is so that remote views do not have to re-derive them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Orbit {
    pub yaw: f32,
    pub pitch: f32,
    pub position: Vec3,
    pub rotation: Quat,
}

impl Default for Orbit {
    fn default() -> Self {
        Self {
            yaw: 0.0,
            pitch: 0.0,
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
        }
    }
}

impl Orbit {
    /// Orbit looking along the entity's facing, already placed around `target`
    pub fn around(target: Vec3, facing_yaw: f32, tuning: &Tuning) -> Self {
        let mut orbit = Self {
            yaw: facing_yaw,
            ..Self::default()
        };
        orbit.update(0.0, 0.0, target, tuning);
        orbit
    }

    /// Turn the orbit by mouse deltas and re-derive its transform around `target`
    pub fn update(&mut self, mouse_dx: f32, mouse_dy: f32, target: Vec3, tuning: &Tuning) {
        self.yaw += mouse_dx * tuning.orbit_speed_x * MOUSE_SCALE;
        self.pitch -= mouse_dy * tuning.orbit_speed_y * MOUSE_SCALE;
        self.pitch = clamp_angle(self.pitch, tuning.pitch_min, tuning.pitch_max);

        self.rotation = Quat::from_euler(
            EulerRot::YXZ,
            self.yaw.to_radians(),
            self.pitch.to_radians(),
            0.0,
        );
        self.position = self.rotation * tuning.orbit_offset + target;
    }

    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::Z
    }
}

/// Wrap once into (-360, 360) then clamp
pub fn clamp_angle(mut angle: f32, min: f32, max: f32) -> f32 {
    if angle < -360.0 {
        angle += 360.0;
    }
    if angle > 360.0 {
        angle -= 360.0;
    }
    angle.clamp(min, max)
}
