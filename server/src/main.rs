use clap::Parser;
use log::{debug, info};
use server::input_gate::InputBatch;
use server::network::{Server, ServerConfig, Simulation};
use server::session::SessionConfig;
use std::time::Duration;

/// Simulation stub for standalone operation: logs drained batches so the
/// room layer can run without a game attached.
struct LoggingSimulation;

impl Simulation for LoggingSimulation {
    fn advance(&mut self, tick: u64, inputs: InputBatch) {
        if !inputs.is_empty() {
            debug!("Tick {}: {} input frames", tick, inputs.len());
        }
    }
}

/// Main-method of the application.
/// Parses command-line arguments, then runs the room server event loop.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Server IP address to bind to
        #[clap(short = 'H', long, default_value = "127.0.0.1")]
        host: String,
        /// Server port to listen on
        #[clap(short, long, default_value = "8080")]
        port: u16,
        /// Tick rate (simulation steps per second)
        #[clap(short, long, default_value = "20")]
        tick_rate: u32,
        /// Maximum concurrent client connections
        #[clap(long, default_value = "64")]
        max_clients: usize,
        /// Capacity of explicitly created rooms
        #[clap(long, default_value = "8")]
        room_capacity: usize,
        /// Capacity of rooms opened by quickplay matchmaking
        #[clap(long, default_value = "8")]
        quickplay_capacity: usize,
    }

    env_logger::init();
    let args = Args::parse();

    let config = ServerConfig {
        max_clients: args.max_clients,
        session: SessionConfig {
            room_capacity: args.room_capacity,
            quickplay_capacity: args.quickplay_capacity,
        },
    };

    let address = format!("{}:{}", args.host, args.port);
    let tick_duration = Duration::from_secs_f64(1.0 / args.tick_rate as f64);

    let mut server = Server::new(
        &address,
        tick_duration,
        config,
        Box::new(LoggingSimulation),
    )
    .await?;

    tokio::select! {
        result = server.run() => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    Ok(())
}
