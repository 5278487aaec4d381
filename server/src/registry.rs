//! Connection registry tracking live clients and their room membership
//!
//! This module handles the server-side bookkeeping of connected clients:
//! - Connection lifecycle (register, unregister, timeout detection)
//! - Display-name validation and storage
//! - The non-owning back-reference from a connection to its current room
//!
//! The registry owns every `Connection` record exclusively. It never touches
//! room membership lists itself; the room store writes the back-reference
//! through `set_room` when membership changes.

use log::info;
use shared::{ConnectionId, MAX_NAME_LEN};
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Errors from registry operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    /// Proposed name is empty or longer than `MAX_NAME_LEN` characters.
    InvalidName,
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::InvalidName => write!(f, "invalid player name"),
        }
    }
}

impl std::error::Error for RegistryError {}

/// A registered client connection.
///
/// The `room` field is a back-reference only: the room store owns the
/// membership list, this is the connection's view of it.
#[derive(Debug)]
pub struct Connection {
    /// Unique connection identifier assigned by the server
    pub id: ConnectionId,
    /// Network address for sending responses
    pub addr: SocketAddr,
    /// Last time we received any packet from this connection
    pub last_seen: Instant,
    /// Display name; starts as a server-assigned placeholder
    pub name: String,
    /// Id of the room this connection is currently in, if any
    pub room: Option<String>,
}

impl Connection {
    pub fn new(id: ConnectionId, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
            name: format!("player-{}", id),
            room: None,
        }
    }

    /// Marks the connection as recently active.
    pub fn refresh_last_seen(&mut self) {
        self.last_seen = Instant::now();
    }

    /// Returns true if no packets have arrived within `timeout`.
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }

    /// Name as shown to other players: `name#id`. The id suffix keeps
    /// display names unambiguous since names carry no uniqueness constraint.
    pub fn display_name(&self) -> String {
        format!("{}#{}", self.name, self.id)
    }
}

/// Owns all connection records and enforces the server-wide client cap.
pub struct ConnectionRegistry {
    /// Registered connections indexed by their unique id
    connections: HashMap<ConnectionId, Connection>,
    /// Next available connection id
    next_id: ConnectionId,
    /// Maximum number of concurrent connections allowed
    max_connections: usize,
}

impl ConnectionRegistry {
    /// Creates an empty registry with the given connection cap.
    /// Connection ids start from 1 and increment per registration.
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: HashMap::new(),
            next_id: 1,
            max_connections,
        }
    }

    /// Registers a new connection, returning its assigned id, or `None`
    /// when the server is at capacity.
    pub fn register(&mut self, addr: SocketAddr) -> Option<ConnectionId> {
        if self.connections.len() >= self.max_connections {
            return None;
        }

        let id = self.next_id;
        self.next_id += 1;

        let connection = Connection::new(id, addr);
        info!("Player {} connected from {}", connection.display_name(), addr);
        self.connections.insert(id, connection);

        Some(id)
    }

    /// Removes a connection record. Idempotent: unregistering an unknown id
    /// is a no-op returning false.
    ///
    /// Room cleanup is not performed here; the disconnect path runs
    /// leave-room processing against the room store first, then unregisters.
    pub fn unregister(&mut self, id: ConnectionId) -> bool {
        if let Some(connection) = self.connections.remove(&id) {
            info!("Player {} disconnected", connection.display_name());
            true
        } else {
            false
        }
    }

    /// Validates and stores a display name, returning the applied name
    /// unchanged. Empty names and names over `MAX_NAME_LEN` characters are
    /// rejected; no uniqueness is enforced across connections.
    pub fn set_name(&mut self, id: ConnectionId, name: &str) -> Result<String, RegistryError> {
        if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
            return Err(RegistryError::InvalidName);
        }

        if let Some(connection) = self.connections.get_mut(&id) {
            info!(
                "Player {} changed name to: {}",
                connection.display_name(),
                name
            );
            connection.name = name.to_string();
        }

        Ok(name.to_string())
    }

    pub fn lookup(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    pub fn lookup_mut(&mut self, id: ConnectionId) -> Option<&mut Connection> {
        self.connections.get_mut(&id)
    }

    /// Finds a connection id by network address, for associating incoming
    /// datagrams with an existing connection.
    pub fn find_by_addr(&self, addr: SocketAddr) -> Option<ConnectionId> {
        self.connections
            .iter()
            .find(|(_, connection)| connection.addr == addr)
            .map(|(id, _)| *id)
    }

    /// Writes the room back-reference for a connection.
    pub fn set_room(&mut self, id: ConnectionId, room: Option<String>) {
        if let Some(connection) = self.connections.get_mut(&id) {
            connection.room = room;
        }
    }

    /// The room id the connection is currently in, if any.
    pub fn room_of(&self, id: ConnectionId) -> Option<&str> {
        self.connections.get(&id).and_then(|c| c.room.as_deref())
    }

    /// Display name for broadcasts and logs; falls back to the placeholder
    /// form for ids that are already gone.
    pub fn display_name(&self, id: ConnectionId) -> String {
        match self.connections.get(&id) {
            Some(connection) => connection.display_name(),
            None => format!("player-{}#{}", id, id),
        }
    }

    pub fn addr_of(&self, id: ConnectionId) -> Option<SocketAddr> {
        self.connections.get(&id).map(|c| c.addr)
    }

    /// Collects connections that have gone silent past `timeout`.
    ///
    /// Records are not removed here: the caller routes each id through the
    /// full disconnect path so room leave processing runs before the record
    /// is discarded.
    pub fn check_timeouts(&self, timeout: Duration) -> Vec<ConnectionId> {
        self.connections
            .iter()
            .filter(|(_, connection)| connection.is_timed_out(timeout))
            .map(|(id, _)| *id)
            .collect()
    }

    /// Returns the number of currently registered connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Returns true if no connections are registered.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
