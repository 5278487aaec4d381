//! Room store owning room entities and their membership
//!
//! Rooms are created with an opaque random id token (collision-retried a
//! bounded number of times), hold their members in join order, and are
//! destroyed as soon as the last member leaves. A connection is in at most
//! one room at a time; the store writes the connection-side back-reference
//! through the registry on every membership change.

use crate::registry::ConnectionRegistry;
use log::{error, info};
use rand::Rng;
use shared::{ConnectionId, ID_GENERATION_ATTEMPTS};
use std::collections::HashMap;
use std::fmt;

/// Errors from room store operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomError {
    /// No room exists with the requested id.
    InvalidId,
    /// The room's member count equals its capacity.
    Full,
    /// Random id generation kept colliding past the retry bound.
    IdGenerationFailed,
}

impl fmt::Display for RoomError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoomError::InvalidId => write!(f, "invalid room id"),
            RoomError::Full => write!(f, "room is full"),
            RoomError::IdGenerationFailed => write!(f, "room id generation failed"),
        }
    }
}

impl std::error::Error for RoomError {}

/// A bounded group of connections sharing broadcasts and simulation ticks.
#[derive(Debug)]
pub struct Room {
    id: String,
    /// Members in join order; broadcast fan-out iterates this order.
    members: Vec<ConnectionId>,
    capacity: usize,
    quickplay: bool,
    /// Monotonic creation sequence, used for oldest-first quickplay scans.
    created_seq: u64,
}

impl Room {
    fn new(id: String, capacity: usize, quickplay: bool, created_seq: u64) -> Self {
        Self {
            id,
            members: Vec::new(),
            capacity,
            quickplay,
            created_seq,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn members(&self) -> &[ConnectionId] {
        &self.members
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.members.contains(&id)
    }

    pub fn is_full(&self) -> bool {
        self.members.len() >= self.capacity
    }

    pub fn is_quickplay(&self) -> bool {
        self.quickplay
    }

    pub fn created_seq(&self) -> u64 {
        self.created_seq
    }

    /// Occupancy string for log lines, e.g. "3/8".
    pub fn occupancy(&self) -> String {
        format!("{}/{}", self.members.len(), self.capacity)
    }
}

/// Result of a successful join: the room id and the members that were
/// already present (the join-broadcast audience).
#[derive(Debug, PartialEq, Eq)]
pub struct JoinOutcome {
    pub room_id: String,
    pub notify: Vec<ConnectionId>,
}

/// Result of a leave that removed a member: the room id and the members
/// remaining after removal (the leave-broadcast audience).
#[derive(Debug, PartialEq, Eq)]
pub struct LeaveOutcome {
    pub room_id: String,
    pub notify: Vec<ConnectionId>,
}

/// Owns all room entities, generates unique ids, enforces capacity.
pub struct RoomStore {
    rooms: HashMap<String, Room>,
    created_counter: u64,
}

impl RoomStore {
    pub fn new() -> Self {
        Self {
            rooms: HashMap::new(),
            created_counter: 0,
        }
    }

    /// Creates a room and auto-joins the creator as its first member.
    ///
    /// Fails with `IdGenerationFailed` if `ID_GENERATION_ATTEMPTS` random
    /// tokens all collide with existing room ids.
    pub fn create_room(
        &mut self,
        capacity: usize,
        quickplay: bool,
        creator: ConnectionId,
        registry: &mut ConnectionRegistry,
    ) -> Result<JoinOutcome, RoomError> {
        let id = self.generate_id(&mut rand::thread_rng())?;

        self.created_counter += 1;
        let room = Room::new(id.clone(), capacity.max(1), quickplay, self.created_counter);
        self.rooms.insert(id.clone(), room);

        // A freshly created room always has space for its creator.
        self.join_room(&id, creator, registry)
    }

    /// Appends a connection to the room's member set.
    ///
    /// A duplicate join by an already-joined connection is idempotent and
    /// returns the room with an empty broadcast audience.
    pub fn join_room(
        &mut self,
        room_id: &str,
        connection: ConnectionId,
        registry: &mut ConnectionRegistry,
    ) -> Result<JoinOutcome, RoomError> {
        let room = self.rooms.get_mut(room_id).ok_or(RoomError::InvalidId)?;

        if room.contains(connection) {
            return Ok(JoinOutcome {
                room_id: room.id.clone(),
                notify: Vec::new(),
            });
        }

        if room.is_full() {
            return Err(RoomError::Full);
        }

        let notify = room.members.clone();
        room.members.push(connection);
        registry.set_room(connection, Some(room.id.clone()));

        info!(
            "Player {} joined room {} ({})",
            registry.display_name(connection),
            room.id,
            room.occupancy()
        );

        Ok(JoinOutcome {
            room_id: room.id.clone(),
            notify,
        })
    }

    /// Removes a connection from its current room, if it has one.
    ///
    /// Returns `None` when the connection was in no room (leaving is
    /// best-effort and idempotent). Destroys the room when its member set
    /// becomes empty, freeing the id.
    pub fn leave_room(
        &mut self,
        connection: ConnectionId,
        registry: &mut ConnectionRegistry,
    ) -> Option<LeaveOutcome> {
        let room_id = registry.room_of(connection)?.to_string();
        registry.set_room(connection, None);

        let room = match self.rooms.get_mut(&room_id) {
            Some(room) => room,
            // Back-reference pointed at a room that is already gone;
            // treat as a no-op leave.
            None => return None,
        };

        let before = room.members.len();
        room.members.retain(|m| *m != connection);
        if room.members.len() == before {
            return None;
        }

        info!(
            "Player {} left room {} ({})",
            registry.display_name(connection),
            room.id,
            room.occupancy()
        );

        let notify = room.members.clone();

        if room.members.is_empty() {
            self.rooms.remove(&room_id);
            info!("Room {} destroyed (empty)", room_id);
        }

        Some(LeaveOutcome { room_id, notify })
    }

    pub fn get(&self, room_id: &str) -> Option<&Room> {
        self.rooms.get(room_id)
    }

    /// Iterates all existing rooms in no particular order.
    pub fn rooms(&self) -> impl Iterator<Item = &Room> {
        self.rooms.values()
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Draws random id tokens until one does not collide with an existing
    /// room, bounded by `ID_GENERATION_ATTEMPTS`.
    fn generate_id(&self, rng: &mut impl Rng) -> Result<String, RoomError> {
        for _ in 0..ID_GENERATION_ATTEMPTS {
            let candidate = format!("{:08x}", rng.gen::<u32>());
            if !self.rooms.contains_key(&candidate) {
                return Ok(candidate);
            }
        }

        error!(
            "Room id generation failed after {} attempts ({} rooms)",
            ID_GENERATION_ATTEMPTS,
            self.rooms.len()
        );
        Err(RoomError::IdGenerationFailed)
    }
}

impl Default for RoomStore {
    fn default() -> Self {
        Self::new()
    }
}
