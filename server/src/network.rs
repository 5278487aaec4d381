//! Server network layer handling UDP communications and the tick loop

use crate::input_gate::InputBatch;
use crate::registry::ConnectionRegistry;
use crate::session::{Reply, SessionConfig, SessionCoordinator};
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{ConnectionId, Packet, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::interval;

/// Connections silent for this long are treated as disconnected.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Host-supplied simulation stepped once per tick with the drained batch.
/// The server never interprets the input payloads itself.
pub trait Simulation: Send {
    fn advance(&mut self, tick: u64, inputs: InputBatch);
}

/// Simulation that discards every batch, for hosts that only want the
/// room/session layer.
pub struct NullSimulation;

impl Simulation for NullSimulation {
    fn advance(&mut self, _tick: u64, _inputs: InputBatch) {}
}

/// Messages sent from network tasks to the main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived {
        packet: Packet,
        addr: SocketAddr,
    },
    ClientTimeout {
        connection_id: ConnectionId,
    },
    #[allow(dead_code)]
    Shutdown,
}

/// Messages sent from the main loop to the network sender task
#[derive(Debug)]
pub enum GameMessage {
    SendPacket { packet: Packet, addr: SocketAddr },
}

/// Server runtime configuration.
#[derive(Debug, Clone, Copy)]
pub struct ServerConfig {
    pub max_clients: usize,
    pub session: SessionConfig,
}

/// Main server coordinating the transport and the session layer
pub struct Server {
    socket: Arc<UdpSocket>,
    registry: Arc<RwLock<ConnectionRegistry>>,
    session: SessionCoordinator,
    simulation: Box<dyn Simulation + Sync>,
    tick_duration: Duration,
    tick: u64,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: mpsc::UnboundedReceiver<GameMessage>,
}

impl Server {
    pub async fn new(
        addr: &str,
        tick_duration: Duration,
        config: ServerConfig,
        simulation: Box<dyn Simulation + Sync>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            registry: Arc::new(RwLock::new(ConnectionRegistry::new(config.max_clients))),
            session: SessionCoordinator::new(config.session),
            simulation,
            tick_duration,
            tick: 0,
            server_tx,
            server_rx,
            game_tx,
            game_rx,
        })
    }

    /// Address the server socket is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Spawns task that continuously listens for incoming datagrams
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 2048];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        } else {
                            warn!("Failed to deserialize packet from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that processes the outgoing packet queue
    fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let mut game_rx = std::mem::replace(&mut self.game_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                match message {
                    GameMessage::SendPacket { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                }
            }
        });
    }

    /// Spawns task that monitors connection timeouts
    fn spawn_timeout_checker(&self) {
        let registry = Arc::clone(&self.registry);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let registry_guard = registry.read().await;
                    registry_guard.check_timeouts(CLIENT_TIMEOUT)
                };

                for connection_id in timed_out {
                    if let Err(e) = server_tx.send(ServerMessage::ClientTimeout { connection_id }) {
                        error!("Failed to send timeout message: {}", e);
                        break;
                    }
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let data = serialize(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self.game_tx.send(GameMessage::SendPacket { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    /// Queues the coordinator's replies, resolving each target connection
    /// to its network address.
    async fn send_replies(&self, replies: Vec<Reply>) {
        let registry = self.registry.read().await;
        for reply in replies {
            match registry.addr_of(reply.to) {
                Some(addr) => self.send_packet(reply.packet, addr),
                // Target vanished between the operation and the send;
                // nothing to deliver.
                None => debug!("Dropping reply to gone connection {}", reply.to),
            }
        }
    }

    /// Processes one inbound packet against the session layer
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        match packet {
            Packet::Connect { client_version } => {
                info!(
                    "Client connecting from {} (version: {})",
                    addr, client_version
                );

                if client_version != PROTOCOL_VERSION {
                    self.send_packet(
                        Packet::Disconnected {
                            reason: "Protocol version mismatch".to_string(),
                        },
                        addr,
                    );
                    return;
                }

                // A reconnect from the same address replaces the old
                // connection, running its full disconnect path first.
                let existing = {
                    let registry = self.registry.read().await;
                    registry.find_by_addr(addr)
                };
                if let Some(existing_id) = existing {
                    info!("Replacing existing connection {} from {}", existing_id, addr);
                    self.disconnect(existing_id).await;
                }

                let registered = {
                    let mut registry = self.registry.write().await;
                    registry.register(addr)
                };

                match registered {
                    Some(connection_id) => {
                        self.send_packet(Packet::Connected { connection_id }, addr);
                    }
                    None => {
                        self.send_packet(
                            Packet::Disconnected {
                                reason: "Server full".to_string(),
                            },
                            addr,
                        );
                    }
                }
            }

            Packet::Disconnect => {
                let connection_id = {
                    let registry = self.registry.read().await;
                    registry.find_by_addr(addr)
                };
                if let Some(connection_id) = connection_id {
                    self.disconnect(connection_id).await;
                }
            }

            request => {
                let connection_id = {
                    let mut registry = self.registry.write().await;
                    match registry.find_by_addr(addr) {
                        Some(id) => {
                            if let Some(connection) = registry.lookup_mut(id) {
                                connection.refresh_last_seen();
                            }
                            Some(id)
                        }
                        None => None,
                    }
                };

                match connection_id {
                    Some(connection_id) => {
                        let replies = {
                            let mut registry = self.registry.write().await;
                            self.session.handle(&mut registry, connection_id, request)
                        };
                        self.send_replies(replies).await;
                    }
                    None => {
                        warn!("Request from unconnected address {}", addr);
                    }
                }
            }
        }
    }

    /// Runs the full disconnect path for one connection: room leave
    /// broadcasts first, then the registry record is discarded.
    async fn disconnect(&mut self, connection_id: ConnectionId) {
        let replies = {
            let mut registry = self.registry.write().await;
            self.session.handle_disconnect(&mut registry, connection_id)
        };
        self.send_replies(replies).await;
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.spawn_timeout_checker();

        let mut tick_interval = interval(self.tick_duration);

        info!("Server started successfully");

        loop {
            tokio::select! {
                // Handle network events
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(ServerMessage::ClientTimeout { connection_id }) => {
                            info!("Connection {} timed out", connection_id);
                            self.disconnect(connection_id).await;
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                // Advance the simulation at the fixed tick rate
                _ = tick_interval.tick() => {
                    self.tick += 1;
                    let batch = self.session.drain_inputs();
                    self.simulation.advance(self.tick, batch);

                    // Periodic occupancy monitoring
                    if self.tick % 300 == 0 {
                        let connections = {
                            let registry = self.registry.read().await;
                            registry.len()
                        };
                        if connections > 0 {
                            debug!(
                                "Tick {}: {} connections, {} rooms",
                                self.tick,
                                connections,
                                self.session.rooms().len()
                            );
                        }
                    }
                },
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};
    use tokio::sync::mpsc;

    #[test]
    fn test_server_message_creation() {
        let packet = Packet::Connect {
            client_version: PROTOCOL_VERSION,
        };
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 8080);

        let msg = ServerMessage::PacketReceived {
            packet: packet.clone(),
            addr,
        };

        match msg {
            ServerMessage::PacketReceived { packet: p, addr: a } => {
                assert_eq!(a, addr);
                match p {
                    Packet::Connect { client_version } => {
                        assert_eq!(client_version, PROTOCOL_VERSION);
                    }
                    _ => panic!("Unexpected packet type"),
                }
            }
            _ => panic!("Unexpected message type"),
        }
    }

    #[test]
    fn test_client_timeout_message() {
        let connection_id = 42;
        let msg = ServerMessage::ClientTimeout { connection_id };

        match msg {
            ServerMessage::ClientTimeout { connection_id: id } => {
                assert_eq!(id, connection_id);
            }
            _ => panic!("Unexpected message type"),
        }
    }

    #[test]
    fn test_game_message_send_packet() {
        let packet = Packet::Connected { connection_id: 123 };
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1)), 9090);

        let msg = GameMessage::SendPacket {
            packet: packet.clone(),
            addr,
        };

        match msg {
            GameMessage::SendPacket { packet: p, addr: a } => {
                assert_eq!(a, addr);
                match p {
                    Packet::Connected { connection_id } => {
                        assert_eq!(connection_id, 123);
                    }
                    _ => panic!("Unexpected packet type"),
                }
            }
        }
    }

    #[test]
    fn test_channel_communication() {
        let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

        let packet = Packet::Disconnect;
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 8080);

        assert!(tx
            .send(ServerMessage::PacketReceived { packet, addr })
            .is_ok());

        let received = rx.try_recv();
        assert!(received.is_ok());

        match received.unwrap() {
            ServerMessage::PacketReceived { packet: p, addr: a } => {
                assert_eq!(a, addr);
                assert!(matches!(p, Packet::Disconnect));
            }
            _ => panic!("Unexpected message type"),
        }
    }

    #[test]
    fn test_null_simulation_accepts_batches() {
        let mut simulation = NullSimulation;
        simulation.advance(1, InputBatch::new());

        let mut batch = InputBatch::new();
        batch.insert(
            1,
            shared::InputFrame {
                sequence: 1,
                timestamp: 0,
                data: vec![1, 2, 3],
            },
        );
        simulation.advance(2, batch);
    }

    #[tokio::test]
    async fn test_server_binds_ephemeral_port() {
        let config = ServerConfig {
            max_clients: 4,
            session: SessionConfig::default(),
        };

        let server = Server::new(
            "127.0.0.1:0",
            Duration::from_millis(16),
            config,
            Box::new(NullSimulation),
        )
        .await
        .unwrap();

        let addr = server.local_addr().unwrap();
        assert_ne!(addr.port(), 0);
    }

    #[test]
    fn test_buffer_bounds() {
        let buffer_size = 2048;

        // Typical request packets are far below the datagram buffer.
        let typical_sizes = vec![16, 64, 128, 512];
        for size in typical_sizes {
            assert!(size < buffer_size, "Packet size {} exceeds buffer", size);
        }
    }

    #[test]
    fn test_tick_duration_validation() {
        let valid_durations = vec![
            Duration::from_millis(16), // 60 Hz
            Duration::from_millis(33), // 30 Hz
            Duration::from_millis(50), // 20 Hz, the original server's rate
        ];

        for duration in valid_durations {
            assert!(duration.as_millis() > 0);
            assert!(duration.as_millis() < 1000);
        }
    }

    #[test]
    fn test_client_version_compatibility() {
        let supported_versions = [PROTOCOL_VERSION];
        let test_versions = vec![0, PROTOCOL_VERSION, 2, 999];

        for version in test_versions {
            let is_supported = supported_versions.contains(&version);

            if version == PROTOCOL_VERSION {
                assert!(is_supported);
            } else {
                assert!(!is_supported);
            }
        }
    }
}
