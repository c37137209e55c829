use serde::Deserialize;

/// Artificial link impairment applied by the transports.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PacketLossSimulation {
    pub enabled: bool,
    /// Percentage of datagrams dropped, 0-100.
    pub loss_percent: f32,
    pub min_latency_ms: u32,
    pub max_latency_ms: u32,
    pub jitter_ms: u32,
}

impl PacketLossSimulation {
    pub fn is_active(&self) -> bool {
        self.enabled
            && (self.loss_percent > 0.0 || self.max_latency_ms > 0 || self.jitter_ms > 0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct NetworkStats {
    pub packets_sent: u64,
    pub packets_received: u64,
    pub packets_stale: u64,
    pub packets_malformed: u64,
    pub packets_acked: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    /// `None` until enough acknowledgements have been sampled.
    pub rtt_ms: Option<f32>,
    /// Fraction of sent packets old enough to be considered lost, 0-1.
    pub packet_loss: f32,
}

impl NetworkStats {
    pub fn packet_loss_percent(&self) -> f32 {
        self.packet_loss * 100.0
    }
}
