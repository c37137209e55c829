use std::fs;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;

use ripple::{PacketLossSimulation, SessionConfig};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub server: String,
    pub tick_rate: u32,
    /// Frames the local input runs ahead of the newest server frame.
    pub input_lead: i32,
    /// Frames the rendered world trails the newest server frame.
    pub interpolation_delay: i32,
    pub connection_timeout_secs: u64,
    pub stats_interval_secs: f32,
    pub session: SessionConfig,
    pub packet_loss: PacketLossSimulation,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: format!("127.0.0.1:{}", ripple::DEFAULT_PORT),
            tick_rate: ripple::DEFAULT_TICK_RATE,
            input_lead: 2,
            interpolation_delay: 2,
            connection_timeout_secs: 10,
            stats_interval_secs: 1.0,
            session: SessionConfig::default(),
            packet_loss: PacketLossSimulation::default(),
        }
    }
}

impl ClientConfig {
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn server_addr(&self) -> Result<SocketAddr> {
        self.server
            .to_socket_addrs()
            .with_context(|| format!("Invalid server address {}", self.server))?
            .next()
            .ok_or_else(|| anyhow!("Server address {} did not resolve", self.server))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: ClientConfig = toml::from_str(
            r#"
            server = "127.0.0.1:4000"
            input_lead = 4

            [session]
            redundancy = 8
            "#,
        )
        .unwrap();

        assert_eq!(config.input_lead, 4);
        assert_eq!(config.interpolation_delay, 2);
        assert_eq!(config.session.redundancy, 8);
        assert_eq!(config.server_addr().unwrap().port(), 4000);
        assert!(!config.packet_loss.is_active());
    }

    #[test]
    fn bad_address_is_an_error() {
        let config = ClientConfig {
            server: "not an address".to_string(),
            ..ClientConfig::default()
        };
        assert!(config.server_addr().is_err());
    }
}
