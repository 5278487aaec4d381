//! Quickplay matchmaking over the room store
//!
//! Picks the oldest quickplay room with free capacity so existing rooms
//! fill up before new ones open, falling back to creating a fresh
//! quickplay room. All calls happen on the coordinator's single event
//! loop, so concurrent quickplay requests are applied one at a time and
//! can neither double-book a slot nor overfill a room.

use crate::registry::ConnectionRegistry;
use crate::rooms::{JoinOutcome, RoomError, RoomStore};
use log::debug;
use shared::ConnectionId;

/// Joins the connection to an eligible quickplay room, creating one with
/// `default_capacity` when no room has space.
pub fn find_or_create_quickplay(
    store: &mut RoomStore,
    connection: ConnectionId,
    default_capacity: usize,
    registry: &mut ConnectionRegistry,
) -> Result<JoinOutcome, RoomError> {
    let candidate = store
        .rooms()
        .filter(|room| room.is_quickplay() && !room.is_full())
        .min_by_key(|room| room.created_seq())
        .map(|room| room.id().to_string());

    match candidate {
        Some(room_id) => {
            debug!(
                "Quickplay match: connection {} into existing room {}",
                connection, room_id
            );
            store.join_room(&room_id, connection, registry)
        }
        None => {
            debug!(
                "Quickplay match: no open room, creating one for connection {}",
                connection
            );
            store.create_room(default_capacity, true, connection, registry)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    fn registry_with(count: usize) -> (ConnectionRegistry, Vec<ConnectionId>) {
        let mut registry = ConnectionRegistry::new(64);
        let ids = (0..count)
            .map(|i| {
                let addr: SocketAddr = format!("127.0.0.1:{}", 9100 + i).parse().unwrap();
                registry.register(addr).unwrap()
            })
            .collect();
        (registry, ids)
    }

    #[test]
    fn test_creates_room_when_none_eligible() {
        let mut store = RoomStore::new();
        let (mut registry, ids) = registry_with(1);

        let outcome = find_or_create_quickplay(&mut store, ids[0], 4, &mut registry).unwrap();

        let room = store.get(&outcome.room_id).unwrap();
        assert!(room.is_quickplay());
        assert_eq!(room.members(), &[ids[0]]);
    }

    #[test]
    fn test_fills_existing_room_before_opening_new() {
        let mut store = RoomStore::new();
        let (mut registry, ids) = registry_with(5);

        // Capacity 4: the first four land in the same room, the fifth
        // forces a new one.
        let first = find_or_create_quickplay(&mut store, ids[0], 4, &mut registry).unwrap();
        for id in &ids[1..4] {
            let outcome = find_or_create_quickplay(&mut store, *id, 4, &mut registry).unwrap();
            assert_eq!(outcome.room_id, first.room_id);
        }

        let fifth = find_or_create_quickplay(&mut store, ids[4], 4, &mut registry).unwrap();
        assert_ne!(fifth.room_id, first.room_id);

        assert_eq!(store.get(&first.room_id).unwrap().members().len(), 4);
        assert_eq!(store.get(&fifth.room_id).unwrap().members().len(), 1);
    }

    #[test]
    fn test_skips_private_rooms() {
        let mut store = RoomStore::new();
        let (mut registry, ids) = registry_with(2);

        let private = store.create_room(8, false, ids[0], &mut registry).unwrap();
        let outcome = find_or_create_quickplay(&mut store, ids[1], 8, &mut registry).unwrap();

        assert_ne!(outcome.room_id, private.room_id);
    }

    #[test]
    fn test_prefers_oldest_open_room() {
        let mut store = RoomStore::new();
        let (mut registry, ids) = registry_with(3);

        let older = store.create_room(4, true, ids[0], &mut registry).unwrap();
        let newer = store.create_room(4, true, ids[1], &mut registry).unwrap();

        let outcome = find_or_create_quickplay(&mut store, ids[2], 4, &mut registry).unwrap();
        assert_eq!(outcome.room_id, older.room_id);
        assert_ne!(outcome.room_id, newer.room_id);
    }

    #[test]
    fn test_skips_full_quickplay_room() {
        let mut store = RoomStore::new();
        let (mut registry, ids) = registry_with(3);

        // Capacity 2 fills with the first two quickplay requests.
        let full = find_or_create_quickplay(&mut store, ids[0], 2, &mut registry).unwrap();
        find_or_create_quickplay(&mut store, ids[1], 2, &mut registry).unwrap();

        let outcome = find_or_create_quickplay(&mut store, ids[2], 2, &mut registry).unwrap();
        assert_ne!(outcome.room_id, full.room_id);
    }
}
