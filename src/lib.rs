//! Arena Sync - state synchronization core for an authoritative
//! multiplayer arena game
//!
//! - `game`: per-player simulation state and the deterministic command step
//! - `sync`: snapshot history, prediction, interpolation and lag compensation
//! - `wire`: binary codec and message envelopes
//! - `net`: in-process loopback transport

pub mod config;
pub mod game;
pub mod net;
pub mod sync;
pub mod util;
pub mod wire;
