//! Session coordinator translating protocol requests into room operations
//!
//! The coordinator is the protocol-facing facade: it maps each inbound
//! request onto the registry, room store, matchmaker, and input gate, and
//! returns the responses and broadcasts to send. It is also the only layer
//! that turns component errors into wire-level `ErrorCode`s; the stores
//! below it never produce client-facing output.
//!
//! All calls run on the server's single event loop, so every membership
//! mutation is serialized. The coordinator itself holds no sockets, which
//! keeps the full request surface testable without networking.

use crate::input_gate::{InputBatch, InputGate};
use crate::matchmaker;
use crate::registry::{ConnectionRegistry, RegistryError};
use crate::rooms::{JoinOutcome, LeaveOutcome, RoomError, RoomStore};
use log::warn;
use shared::{ConnectionId, ErrorCode, JoinTarget, Packet, DEFAULT_ROOM_CAPACITY};

/// An outbound packet addressed to one connection.
#[derive(Debug)]
pub struct Reply {
    pub to: ConnectionId,
    pub packet: Packet,
}

/// Room sizing configuration supplied by the host.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    /// Capacity of explicitly created rooms.
    pub room_capacity: usize,
    /// Capacity of rooms opened by quickplay matchmaking.
    pub quickplay_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            room_capacity: DEFAULT_ROOM_CAPACITY,
            quickplay_capacity: DEFAULT_ROOM_CAPACITY,
        }
    }
}

/// Owns the room store and input gate; drives both from protocol requests.
pub struct SessionCoordinator {
    rooms: RoomStore,
    gate: InputGate,
    config: SessionConfig,
}

impl SessionCoordinator {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            rooms: RoomStore::new(),
            gate: InputGate::new(),
            config,
        }
    }

    /// Handles one request from a registered connection, returning the
    /// packets to send in order.
    pub fn handle(
        &mut self,
        registry: &mut ConnectionRegistry,
        from: ConnectionId,
        packet: Packet,
    ) -> Vec<Reply> {
        match packet {
            Packet::SetNameRequest { name } => self.handle_set_name(registry, from, &name),
            Packet::InputRequest { frame } => {
                self.gate.submit(registry, from, frame);
                Vec::new()
            }
            Packet::CreateRoomRequest { quickplay } => {
                self.handle_create_room(registry, from, quickplay)
            }
            Packet::JoinRoomRequest { target } => self.handle_join_room(registry, from, target),
            Packet::LeaveRoomRequest => self.handle_leave_room(registry, from),
            other => {
                // Connect/Disconnect are consumed by the transport layer;
                // anything else from a client is malformed traffic.
                warn!(
                    "Connection {} sent unexpected packet: {:?}",
                    from, other
                );
                vec![Reply {
                    to: from,
                    packet: Packet::Error {
                        code: ErrorCode::InvalidData,
                    },
                }]
            }
        }
    }

    /// Runs room cleanup for a closing connection and discards its record.
    /// Returns the leave broadcasts for the remaining room members.
    ///
    /// Leave processing runs strictly before `unregister` so the member's
    /// display name is still available for the broadcast.
    pub fn handle_disconnect(
        &mut self,
        registry: &mut ConnectionRegistry,
        from: ConnectionId,
    ) -> Vec<Reply> {
        self.gate.forget(from);

        let name = registry.display_name(from);
        let replies = match self.rooms.leave_room(from, registry) {
            Some(outcome) => leave_broadcasts(&outcome, &name),
            None => Vec::new(),
        };

        registry.unregister(from);
        replies
    }

    /// Hands the tick's input batch to the caller, leaving an empty batch.
    pub fn drain_inputs(&mut self) -> InputBatch {
        self.gate.drain()
    }

    pub fn rooms(&self) -> &RoomStore {
        &self.rooms
    }

    fn handle_set_name(
        &mut self,
        registry: &mut ConnectionRegistry,
        from: ConnectionId,
        name: &str,
    ) -> Vec<Reply> {
        match registry.set_name(from, name) {
            Ok(applied) => vec![Reply {
                to: from,
                packet: Packet::SetNameResponse { name: applied },
            }],
            Err(RegistryError::InvalidName) => vec![Reply {
                to: from,
                packet: Packet::Error {
                    code: ErrorCode::InvalidName,
                },
            }],
        }
    }

    fn handle_create_room(
        &mut self,
        registry: &mut ConnectionRegistry,
        from: ConnectionId,
        quickplay: bool,
    ) -> Vec<Reply> {
        // Creating a room implies leaving the current one.
        let mut replies = self.implicit_leave(registry, from);

        let capacity = if quickplay {
            self.config.quickplay_capacity
        } else {
            self.config.room_capacity
        };

        match self.rooms.create_room(capacity, quickplay, from, registry) {
            Ok(outcome) => {
                replies.extend(join_replies(registry, from, &outcome));
            }
            Err(err) => {
                replies.push(Reply {
                    to: from,
                    packet: Packet::JoinRoomResponse {
                        outcome: Err(room_error_code(err)),
                    },
                });
            }
        }
        replies
    }

    fn handle_join_room(
        &mut self,
        registry: &mut ConnectionRegistry,
        from: ConnectionId,
        target: JoinTarget,
    ) -> Vec<Reply> {
        match target {
            JoinTarget::Room(room_id) => {
                // Rejoining the current room is idempotent and leaves
                // membership untouched.
                if registry.room_of(from) == Some(room_id.as_str()) {
                    return vec![Reply {
                        to: from,
                        packet: Packet::JoinRoomResponse { outcome: Ok(room_id) },
                    }];
                }

                // Validate the target before leaving the current room, so a
                // failed join does not evict the requester.
                let check = match self.rooms.get(&room_id) {
                    None => Some(RoomError::InvalidId),
                    Some(room) if room.is_full() => Some(RoomError::Full),
                    Some(_) => None,
                };
                if let Some(err) = check {
                    return vec![Reply {
                        to: from,
                        packet: Packet::JoinRoomResponse {
                            outcome: Err(room_error_code(err)),
                        },
                    }];
                }

                let mut replies = self.implicit_leave(registry, from);
                match self.rooms.join_room(&room_id, from, registry) {
                    Ok(outcome) => replies.extend(join_replies(registry, from, &outcome)),
                    Err(err) => replies.push(Reply {
                        to: from,
                        packet: Packet::JoinRoomResponse {
                            outcome: Err(room_error_code(err)),
                        },
                    }),
                }
                replies
            }
            JoinTarget::Quickplay => {
                let mut replies = self.implicit_leave(registry, from);
                let result = matchmaker::find_or_create_quickplay(
                    &mut self.rooms,
                    from,
                    self.config.quickplay_capacity,
                    registry,
                );
                match result {
                    Ok(outcome) => replies.extend(join_replies(registry, from, &outcome)),
                    Err(err) => replies.push(Reply {
                        to: from,
                        packet: Packet::JoinRoomResponse {
                            outcome: Err(room_error_code(err)),
                        },
                    }),
                }
                replies
            }
        }
    }

    fn handle_leave_room(
        &mut self,
        registry: &mut ConnectionRegistry,
        from: ConnectionId,
    ) -> Vec<Reply> {
        self.gate.forget(from);

        let name = registry.display_name(from);
        let mut replies = Vec::new();
        let left = match self.rooms.leave_room(from, registry) {
            Some(outcome) => {
                replies.extend(leave_broadcasts(&outcome, &name));
                true
            }
            None => false,
        };

        replies.push(Reply {
            to: from,
            packet: Packet::LeaveRoomResponse { left },
        });
        replies
    }

    /// Leaves the current room without a response packet, used when a
    /// create/join/quickplay request moves a connection between rooms.
    fn implicit_leave(
        &mut self,
        registry: &mut ConnectionRegistry,
        from: ConnectionId,
    ) -> Vec<Reply> {
        self.gate.forget(from);
        let name = registry.display_name(from);
        match self.rooms.leave_room(from, registry) {
            Some(outcome) => leave_broadcasts(&outcome, &name),
            None => Vec::new(),
        }
    }
}

/// The joiner's response plus join broadcasts to the members that were
/// already present.
fn join_replies(
    registry: &ConnectionRegistry,
    joiner: ConnectionId,
    outcome: &JoinOutcome,
) -> Vec<Reply> {
    let name = registry.display_name(joiner);
    let mut replies = vec![Reply {
        to: joiner,
        packet: Packet::JoinRoomResponse {
            outcome: Ok(outcome.room_id.clone()),
        },
    }];
    for member in &outcome.notify {
        replies.push(Reply {
            to: *member,
            packet: Packet::PlayerJoinedBroadcast { name: name.clone() },
        });
    }
    replies
}

/// Leave broadcasts to the members remaining in the room.
fn leave_broadcasts(outcome: &LeaveOutcome, name: &str) -> Vec<Reply> {
    outcome
        .notify
        .iter()
        .map(|member| Reply {
            to: *member,
            packet: Packet::PlayerLeftBroadcast {
                name: name.to_string(),
            },
        })
        .collect()
}

fn room_error_code(err: RoomError) -> ErrorCode {
    match err {
        RoomError::InvalidId => ErrorCode::InvalidRoomId,
        RoomError::Full => ErrorCode::RoomFull,
        RoomError::IdGenerationFailed => ErrorCode::IdGenerationFailed,
    }
}
