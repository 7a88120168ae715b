//! State synchronization between the authoritative server and its clients

pub mod client;
pub mod interpolate;
pub mod predict;
pub mod rollback;
pub mod server;
pub mod store;

use thiserror::Error;

use crate::game::EntityId;

pub use client::{ClientEvent, ClientSync};
pub use interpolate::{interpolate, interpolation_factor, smooth_damp, RemoteInterpolator};
pub use predict::ClientPredictor;
pub use rollback::{RollbackEngine, RollbackScope};
pub use server::ServerSync;
pub use store::{Bracket, SnapshotStore};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Command batch from unknown sender {0}")]
    UnknownSender(EntityId),

    #[error("Rollback requested while another rollback is active")]
    NestedRollback,

    #[error("Snapshot does not contain local entity {0}")]
    NoLocalEntity(EntityId),
}
