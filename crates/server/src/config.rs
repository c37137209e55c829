use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use ripple::{PacketLossSimulation, SessionConfig};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    pub tick_rate: u32,
    pub max_clients: usize,
    /// Seconds of silence before a session is dropped.
    pub timeout_secs: u64,
    /// Avatars spawn on a circle of this radius around the origin.
    pub spawn_radius: f32,
    pub session: SessionConfig,
    /// Impairment applied to every newly accepted peer.
    pub packet_loss: PacketLossSimulation,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: ripple::DEFAULT_PORT,
            tick_rate: ripple::DEFAULT_TICK_RATE,
            max_clients: 32,
            timeout_secs: 10,
            spawn_radius: 4.0,
            session: SessionConfig::default(),
            packet_loss: PacketLossSimulation::default(),
        }
    }
}

impl ServerConfig {
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}
