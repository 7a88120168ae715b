//! Transport envelopes exchanged between clients and the server
//!
//! Bulk payloads (command batches, snapshot bodies) are carried as bytes
//! produced by [`super::codec`]; the envelopes only add routing.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::game::{Command, EntityId, Snapshot};

use super::codec::{self, CodecError};

/// Messages sent from client to server. The sender is implied by the
/// connection they arrive on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Join the simulation
    Connect,

    /// Commands packed back to back, see [`codec::encode_command_batch`]
    Commands { payload: Bytes },

    /// Ask for a fresh entity at a new spawn point
    Respawn,

    /// Leave the simulation
    Disconnect,
}

impl ClientMsg {
    pub fn commands(batch: &[Command]) -> Self {
        Self::Commands {
            payload: codec::encode_command_batch(batch),
        }
    }
}

/// Messages sent from server to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Connection accepted
    Welcome {
        entity_id: EntityId,
        server_time: f64,
    },

    /// Authoritative world state (sent at regular intervals)
    Snapshot {
        /// Network time the snapshot was taken; becomes its timestamp
        sent_at: f64,
        payload: Bytes,
    },
}

impl ServerMsg {
    pub fn snapshot(snapshot: &Snapshot) -> Result<Self, CodecError> {
        Ok(Self::Snapshot {
            sent_at: snapshot.timestamp(),
            payload: codec::encode_snapshot(snapshot)?,
        })
    }
}

/// A client message tagged with the connection it came from
#[derive(Debug, Clone)]
pub struct PlayerInput {
    pub entity_id: EntityId,
    pub msg: ClientMsg,
}
