//! Player input commands

use serde::{Deserialize, Serialize};

/// One frame of player input, stamped with the network time it was sampled at.
///
/// Commands are produced by an input collaborator and never mutated
/// afterwards; the simulation only ever reads them.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Command {
    pub timestamp: f64,
    /// Strafe axis (-1.0 = left, 1.0 = right)
    pub move_h: f32,
    /// Forward axis (-1.0 = back, 1.0 = forward)
    pub move_v: f32,
    pub sneak: bool,
    pub mouse_dx: f32,
    pub mouse_dy: f32,
    /// Primary button held
    pub fire: bool,
    /// Primary button went down this frame
    pub fire_edge: bool,
    /// Secondary button held
    pub block: bool,
    pub equip_primary: bool,
    pub equip_secondary: bool,
}

impl Command {
    /// An idle command (no buttons, no movement) at `timestamp`
    pub fn idle(timestamp: f64) -> Self {
        Self {
            timestamp,
            ..Self::default()
        }
    }

    /// Movement-only command
    pub fn moving(timestamp: f64, move_h: f32, move_v: f32) -> Self {
        Self {
            timestamp,
            move_h,
            move_v,
            ..Self::default()
        }
    }
}
