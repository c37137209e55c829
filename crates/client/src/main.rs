mod net;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use net::{ClientConfig, NetworkClient};
use ripple::PacketLossSimulation;

#[derive(Parser)]
#[command(name = "ripple-client")]
#[command(about = "Ripple headless client")]
struct Args {
    /// TOML file; command-line flags override its values.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(
        short,
        long,
        help = "Server address to connect to (e.g., 127.0.0.1:27015)"
    )]
    server: Option<String>,

    #[arg(short, long)]
    tick_rate: Option<u32>,

    #[arg(short, long, help = "Disconnect after this many seconds")]
    duration: Option<u64>,

    #[arg(long, help = "Enable packet loss simulation towards the server")]
    simulate_packet_loss: bool,

    #[arg(long, default_value_t = 0.0, help = "Packet loss percentage (0-100)")]
    loss_percent: f32,

    #[arg(long, default_value_t = 0, help = "Minimum latency in ms")]
    min_latency: u32,

    #[arg(long, default_value_t = 0, help = "Maximum latency in ms")]
    max_latency: u32,

    #[arg(long, default_value_t = 0, help = "Jitter in ms")]
    jitter: u32,
}

impl Args {
    fn to_config(&self) -> Result<ClientConfig> {
        let mut config = match &self.config {
            Some(path) => ClientConfig::load_from_path(path)?,
            None => ClientConfig::default(),
        };

        if let Some(server) = &self.server {
            config.server = server.clone();
        }
        if let Some(tick_rate) = self.tick_rate {
            config.tick_rate = tick_rate;
        }
        if self.simulate_packet_loss {
            config.packet_loss = PacketLossSimulation {
                enabled: true,
                loss_percent: self.loss_percent,
                min_latency_ms: self.min_latency,
                max_latency_ms: self.max_latency,
                jitter_ms: self.jitter,
            };
        }

        Ok(config)
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = args.to_config()?;
    let server_addr = config.server_addr()?;

    let mut client = NetworkClient::new(config)?;
    log::info!("Client bound to {}", client.local_addr());
    client.connect(server_addr);
    let stats = client.run(args.duration.map(Duration::from_secs))?;

    log::info!(
        "Disconnected: {} packets sent, {} received, {} stale, {} malformed",
        stats.packets_sent,
        stats.packets_received,
        stats.packets_stale,
        stats.packets_malformed
    );

    Ok(())
}
