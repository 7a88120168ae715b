//! Game simulation modules

pub mod combat;
pub mod command;
pub mod entity;
pub mod orbit;
pub mod snapshot;
pub mod weapon;

pub use combat::{BodyPart, CapsuleHitTester, Hit, HitTester};
pub use command::Command;
pub use entity::{
    apply_command, CommandOutcome, EntityId, EntityMode, EntityState, EntityTable, PlayerSnapshot,
};
pub use orbit::Orbit;
pub use snapshot::{Shot, Snapshot};
pub use weapon::{Weapon, WeaponClass};
