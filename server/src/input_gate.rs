//! Per-tick input buffering between the network loop and the simulation
//!
//! The gate keeps at most one pending input frame per connection. Repeated
//! submissions within a tick overwrite each other (last write wins), and
//! input from connections that are not in a room is dropped, since the
//! simulation is room-scoped. `drain` swaps in an empty batch so a frame is
//! either wholly in one tick's batch or wholly in the next, never split.

use crate::registry::ConnectionRegistry;
use log::debug;
use shared::{ConnectionId, InputFrame};
use std::collections::HashMap;

/// The batch handed to the simulation: most recent frame per connection.
pub type InputBatch = HashMap<ConnectionId, InputFrame>;

/// Buffers input frames between simulation ticks.
#[derive(Debug, Default)]
pub struct InputGate {
    pending: InputBatch,
}

impl InputGate {
    pub fn new() -> Self {
        Self {
            pending: HashMap::new(),
        }
    }

    /// Records the connection's input for the current tick, overwriting any
    /// earlier frame from the same connection. Frames from connections not
    /// currently in a room are silently dropped.
    pub fn submit(
        &mut self,
        registry: &ConnectionRegistry,
        connection: ConnectionId,
        frame: InputFrame,
    ) {
        if registry.room_of(connection).is_none() {
            debug!("Dropping input from connection {} (not in a room)", connection);
            return;
        }

        self.pending.insert(connection, frame);
    }

    /// Takes the pending batch, leaving an empty one for the next tick.
    pub fn drain(&mut self) -> InputBatch {
        std::mem::take(&mut self.pending)
    }

    /// Drops any pending frame for a connection that is leaving or
    /// disconnecting, so stale input never reaches the simulation.
    pub fn forget(&mut self, connection: ConnectionId) {
        self.pending.remove(&connection);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
