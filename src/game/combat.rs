//! Combat system - body parts, damage, hit detection

use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::entity::{EntityId, EntityState, EntityTable};

/// Region of a body a hit landed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BodyPart {
    Head,
    Torso,
    Legs,
}

impl BodyPart {
    /// Damage multiplier applied to the base damage
    pub fn damage_scale(self) -> f32 {
        match self {
            Self::Head => 3.34,
            Self::Torso => 1.0,
            Self::Legs => 0.67,
        }
    }
}

/// A body part of some entity that a strike or shot touched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hit {
    pub target: EntityId,
    pub part: BodyPart,
}

/// Base damage scaled by body part, truncated toward zero
pub fn scaled_damage(base_damage: i32, part: BodyPart) -> i32 {
    (base_damage as f32 * part.damage_scale()) as i32
}

/// Apply a hit to the live world. Returns the damage dealt, or `None` if the
/// target is gone.
pub fn apply_hit(world: &mut EntityTable, hit: Hit, base_damage: i32) -> Option<i32> {
    let target = world.get_mut(&hit.target)?;
    let damage = scaled_damage(base_damage, hit.part);
    target.hp -= damage;
    Some(damage)
}

/// Where a shot leaves the weapon
pub fn muzzle_position(state: &EntityState) -> Vec3 {
    state.position + state.rotation * Vec3::new(0.3, 1.4, 0.5)
}

/// Collision capability the hit-tests are run against.
///
/// Implementations read entity transforms straight out of `world`, which
/// during lag compensation holds rewound state.
pub trait HitTester {
    /// Point under the shooter's crosshair, blocked by anything between the
    /// muzzle and that point
    fn point_of_aim(&self, shooter: EntityId, world: &EntityTable) -> Option<Vec3>;

    /// Body part (of an entity other than `exclude`) occupying `point`
    fn body_part_at(&self, point: Vec3, exclude: EntityId, world: &EntityTable) -> Option<Hit>;

    /// First body part of another entity that the attacker's blade touches
    fn melee_contact(&self, attacker: EntityId, world: &EntityTable) -> Option<Hit>;
}

/// Hit-tester approximating each body part with a sphere stacked on the
/// entity's position.
#[derive(Debug, Clone)]
pub struct CapsuleHitTester {
    /// Farthest distance a crosshair ray travels
    pub aim_range: f32,
    /// Distance in front of the entity the blade reaches
    pub melee_reach: f32,
    pub blade_radius: f32,
    /// Tolerance when probing a point for a body part
    pub probe_radius: f32,
}

/// (part, height above the feet, radius)
const BODY_PARTS: [(BodyPart, f32, f32); 3] = [
    (BodyPart::Head, 1.75, 0.2),
    (BodyPart::Torso, 1.2, 0.4),
    (BodyPart::Legs, 0.5, 0.45),
];

impl CapsuleHitTester {
    pub fn new(melee_reach: f32) -> Self {
        Self {
            aim_range: 100.0,
            melee_reach,
            blade_radius: 0.45,
            probe_radius: 0.001,
        }
    }

    fn blade_center(&self, attacker: &EntityState) -> Vec3 {
        attacker.position + attacker.rotation * Vec3::new(0.0, 1.2, self.melee_reach * 0.5)
    }

    /// Nearest body-part intersection along a ray, ignoring `exclude`
    fn raycast(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        exclude: EntityId,
        world: &EntityTable,
    ) -> Option<f32> {
        let direction = direction.normalize_or_zero();
        if direction == Vec3::ZERO {
            return None;
        }

        world
            .iter()
            .filter(|(id, _)| **id != exclude)
            .flat_map(|(_, state)| {
                BODY_PARTS
                    .iter()
                    .map(move |(_, height, radius)| (state.position + Vec3::Y * *height, *radius))
            })
            .filter_map(|(center, radius)| ray_sphere(origin, direction, center, radius))
            .filter(|distance| *distance <= max_distance)
            .min_by(|a, b| a.total_cmp(b))
    }
}

impl Default for CapsuleHitTester {
    fn default() -> Self {
        Self::new(2.0)
    }
}

impl HitTester for CapsuleHitTester {
    fn point_of_aim(&self, shooter: EntityId, world: &EntityTable) -> Option<Vec3> {
        let state = world.get(&shooter)?;
        let origin = state.orbit.position;
        let direction = state.orbit.forward();

        let distance = self
            .raycast(origin, direction, self.aim_range, shooter, world)
            .unwrap_or(self.aim_range);
        let crosshair = origin + direction * distance;

        // Something between the muzzle and the crosshair point takes the shot instead
        let muzzle = muzzle_position(state);
        let to_target = crosshair - muzzle;
        let blocked = self
            .raycast(muzzle, to_target, to_target.length() - self.probe_radius, shooter, world)
            .map(|d| muzzle + to_target.normalize_or_zero() * d);

        Some(blocked.unwrap_or(crosshair))
    }

    fn body_part_at(&self, point: Vec3, exclude: EntityId, world: &EntityTable) -> Option<Hit> {
        world
            .iter()
            .filter(|(id, _)| **id != exclude)
            .find_map(|(id, state)| {
                BODY_PARTS.iter().find_map(|(part, height, radius)| {
                    let center = state.position + Vec3::Y * *height;
                    (center.distance(point) <= radius + self.probe_radius).then_some(Hit {
                        target: *id,
                        part: *part,
                    })
                })
            })
    }

    fn melee_contact(&self, attacker: EntityId, world: &EntityTable) -> Option<Hit> {
        let state = world.get(&attacker)?;
        let blade = self.blade_center(state);

        world
            .iter()
            .filter(|(id, _)| **id != attacker)
            .filter(|(_, other)| other.position.distance(state.position) <= self.melee_reach * 2.0)
            .find_map(|(id, other)| {
                BODY_PARTS.iter().find_map(|(part, height, radius)| {
                    let center = other.position + Vec3::Y * *height;
                    (center.distance(blade) <= radius + self.blade_radius).then_some(Hit {
                        target: *id,
                        part: *part,
                    })
                })
            })
    }
}

/// Distance along a normalized ray to the first intersection with a sphere
fn ray_sphere(origin: Vec3, direction: Vec3, center: Vec3, radius: f32) -> Option<f32> {
    let offset = origin - center;
    let b = offset.dot(direction);
    let c = offset.length_squared() - radius * radius;
    let discriminant = b * b - c;
    if discriminant < 0.0 {
        return None;
    }

    let sqrt = discriminant.sqrt();
    let near = -b - sqrt;
    let far = -b + sqrt;
    if near >= 0.0 {
        Some(near)
    } else if far >= 0.0 {
        Some(far)
    } else {
        None
    }
}
