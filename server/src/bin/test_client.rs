use bincode::{deserialize, serialize};
use shared::{InputFrame, JoinTarget, Packet, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::net::UdpSocket;
use tokio::time::{sleep, timeout};

// Get current timestamp in milliseconds
fn get_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

async fn send(socket: &UdpSocket, server_addr: SocketAddr, packet: &Packet) {
    let data = serialize(packet).expect("serialize packet");
    socket
        .send_to(&data, server_addr)
        .await
        .expect("send packet");
    println!("-> {:?}", packet);
}

async fn recv(socket: &UdpSocket) -> Option<Packet> {
    let mut buf = [0u8; 2048];
    match timeout(Duration::from_secs(2), socket.recv_from(&mut buf)).await {
        Ok(Ok((len, _))) => match deserialize::<Packet>(&buf[0..len]) {
            Ok(packet) => {
                println!("<- {:?}", packet);
                Some(packet)
            }
            Err(e) => {
                println!("Failed to deserialize server packet: {}", e);
                None
            }
        },
        _ => {
            println!("No response from server");
            None
        }
    }
}

/// Smoke-test client exercising the full request catalogue against a
/// running server: connect, set name, create a room, push input frames,
/// leave, quickplay, disconnect.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    println!("Client socket bound to {}", socket.local_addr()?);

    let server_addr = "127.0.0.1:8080".parse::<SocketAddr>()?;

    send(
        &socket,
        server_addr,
        &Packet::Connect {
            client_version: PROTOCOL_VERSION,
        },
    )
    .await;

    match recv(&socket).await {
        Some(Packet::Connected { connection_id }) => {
            println!("Connected with connection id {}", connection_id);
        }
        other => {
            println!("Connection refused: {:?}", other);
            return Ok(());
        }
    }

    send(
        &socket,
        server_addr,
        &Packet::SetNameRequest {
            name: "smoketest".to_string(),
        },
    )
    .await;
    recv(&socket).await;

    send(
        &socket,
        server_addr,
        &Packet::CreateRoomRequest { quickplay: false },
    )
    .await;
    let room_id = match recv(&socket).await {
        Some(Packet::JoinRoomResponse { outcome: Ok(id) }) => id,
        other => {
            println!("Room creation failed: {:?}", other);
            return Ok(());
        }
    };
    println!("In room {}", room_id);

    // A few input frames; the server buffers the latest one per tick.
    for sequence in 1..=5u32 {
        send(
            &socket,
            server_addr,
            &Packet::InputRequest {
                frame: InputFrame {
                    sequence,
                    timestamp: get_timestamp(),
                    data: vec![sequence as u8],
                },
            },
        )
        .await;
        sleep(Duration::from_millis(100)).await;
    }

    send(&socket, server_addr, &Packet::LeaveRoomRequest).await;
    recv(&socket).await;

    send(
        &socket,
        server_addr,
        &Packet::JoinRoomRequest {
            target: JoinTarget::Quickplay,
        },
    )
    .await;
    recv(&socket).await;

    send(&socket, server_addr, &Packet::Disconnect).await;
    println!("Done");

    Ok(())
}
