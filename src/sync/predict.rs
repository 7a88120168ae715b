//! Client-side prediction and reconciliation for the local player

use std::collections::VecDeque;

use tracing::{debug, trace};

use crate::config::Tuning;
use crate::game::{Command, CommandOutcome, EntityId, EntityMode, EntityState, PlayerSnapshot, Snapshot};

use super::SyncError;

/// Predicts the local entity ahead of the server.
///
/// Invariant: `state` equals the authoritative entry of the last reconciled
/// snapshot with every command the server has not confirmed replayed on top,
/// unacknowledged first, then unsent, each in creation order.
#[derive(Debug, Clone)]
pub struct ClientPredictor {
    id: EntityId,
    state: EntityState,
    /// Generated since the last flush
    unsent: Vec<Command>,
    /// Flushed, not yet covered by a snapshot's applied-command time
    unacknowledged: VecDeque<Command>,
    since_flush: f64,
    send_interval: f64,
    last_snapshot_time: Option<f64>,
    tuning: Tuning,
}

impl ClientPredictor {
    pub fn new(id: EntityId, authoritative: &PlayerSnapshot, tuning: Tuning) -> Self {
        Self {
            id,
            state: EntityState::from_snapshot(EntityMode::Local, authoritative),
            unsent: Vec::new(),
            unacknowledged: VecDeque::new(),
            since_flush: 0.0,
            send_interval: tuning.input_send_interval,
            last_snapshot_time: None,
            tuning,
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Predicted state of the local entity
    pub fn state(&self) -> &EntityState {
        &self.state
    }

    pub fn unsent(&self) -> &[Command] {
        &self.unsent
    }

    pub fn unacknowledged(&self) -> impl Iterator<Item = &Command> {
        self.unacknowledged.iter()
    }

    /// Apply a freshly sampled command and buffer it for the server.
    ///
    /// Returns the command's outcome and, once `input_send_interval` has
    /// elapsed, the batch of commands to send now.
    pub fn push(&mut self, command: Command, frame_delta: f64) -> (CommandOutcome, Option<Vec<Command>>) {
        let outcome = self.state.apply_command(&command, &self.tuning);
        self.unsent.push(command);

        self.since_flush += frame_delta;
        let batch = if self.since_flush > self.send_interval {
            Some(self.flush())
        } else {
            None
        };

        (outcome, batch)
    }

    /// Move every unsent command to the unacknowledged buffer and return
    /// them for sending.
    pub fn flush(&mut self) -> Vec<Command> {
        self.since_flush = 0.0;
        let batch = std::mem::take(&mut self.unsent);
        self.unacknowledged.extend(batch.iter().copied());
        batch
    }

    /// Reconcile against an authoritative snapshot.
    ///
    /// Returns `Ok(false)` if this snapshot was already reconciled against.
    pub fn reconcile(&mut self, snapshot: &Snapshot) -> Result<bool, SyncError> {
        if self.last_snapshot_time == Some(snapshot.timestamp()) {
            return Ok(false);
        }

        let authoritative = snapshot
            .entity(&self.id)
            .ok_or(SyncError::NoLocalEntity(self.id))?;
        self.last_snapshot_time = Some(snapshot.timestamp());

        let ack_time = authoritative.last_applied_command_time;
        let mut acknowledged = 0usize;
        while self
            .unacknowledged
            .front()
            .is_some_and(|command| command.timestamp <= ack_time)
        {
            self.unacknowledged.pop_front();
            acknowledged += 1;
        }

        self.state.sync_to(authoritative);

        for command in self.unacknowledged.iter().chain(self.unsent.iter()) {
            self.state.apply_command(command, &self.tuning);
            trace!(timestamp = command.timestamp, "Replayed command");
        }

        debug!(
            snapshot_time = snapshot.timestamp(),
            ack_time,
            acknowledged,
            replayed = self.unacknowledged.len() + self.unsent.len(),
            "Reconciled local entity"
        );
        Ok(true)
    }
}
