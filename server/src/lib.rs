//! # Room Server Library
//!
//! Authoritative server for a real-time multiplayer room/session protocol.
//! It tracks client connections, groups them into bounded-capacity rooms
//! (explicitly created or quickplay-matched), fans room events out to
//! members, and batches player input per fixed simulation tick for a
//! host-supplied simulation callback.
//!
//! ## Architecture
//!
//! All protocol state mutation happens on a single event loop
//! (`network::Server::run`), so room membership changes and input drains
//! are serialized without fine-grained locking. Dedicated tokio tasks feed
//! that loop: a datagram receiver, an outbound sender, and a timeout
//! sweeper that turns silent connections into disconnect events.
//!
//! ## Module Organization
//!
//! - [`registry`]: connection records, id assignment, names, addresses,
//!   last-seen tracking, and the room back-reference.
//! - [`rooms`]: room entities with random-token ids (bounded collision
//!   retry), join-ordered membership, capacity enforcement, and
//!   empty-room destruction.
//! - [`matchmaker`]: quickplay selection, oldest open quickplay room or
//!   a fresh one.
//! - [`input_gate`]: per-tick input batching, last write wins per
//!   connection.
//! - [`session`]: the protocol facade mapping requests to operations and
//!   producing responses/broadcasts; the only error-to-wire translation
//!   point.
//! - [`network`]: UDP transport, channels, the tick loop, and the
//!   [`network::Simulation`] callback seam.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::{NullSimulation, Server, ServerConfig};
//! use server::session::SessionConfig;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig {
//!         max_clients: 64,
//!         session: SessionConfig::default(),
//!     };
//!
//!     let mut server = Server::new(
//!         "127.0.0.1:8080",
//!         Duration::from_millis(50), // 20Hz simulation tick
//!         config,
//!         Box::new(NullSimulation),
//!     )
//!     .await?;
//!
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod input_gate;
pub mod matchmaker;
pub mod network;
pub mod registry;
pub mod rooms;
pub mod session;
