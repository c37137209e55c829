use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use ripple::{
    ClientSession, FixedTimestep, NetworkStats, SessionEvent, Snapshot, UdpEndpoint, UdpPeer,
};

use super::config::ClientConfig;
use super::input::ScriptedInput;

pub struct NetworkClient {
    endpoint: UdpEndpoint,
    session: Option<ClientSession<UdpPeer>>,
    config: ClientConfig,
    timestep: FixedTimestep,
    input: ScriptedInput,
    /// Set once the local frame counter has been aligned to the server's.
    synced: bool,
    view: Snapshot,
    has_view: bool,
    last_update: Instant,
    last_stats_log: Instant,
}

impl NetworkClient {
    pub fn new(config: ClientConfig) -> io::Result<Self> {
        let endpoint = UdpEndpoint::bind("0.0.0.0:0")?;

        Ok(Self {
            endpoint,
            session: None,
            timestep: FixedTimestep::new(config.tick_rate),
            input: ScriptedInput::new(config.tick_rate),
            synced: false,
            view: Snapshot::new(0),
            has_view: false,
            last_update: Instant::now(),
            last_stats_log: Instant::now(),
            config,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.endpoint.local_addr()
    }

    pub fn connect(&mut self, server_addr: SocketAddr) {
        log::info!("Connecting to {}", server_addr);

        let mut peer = self.endpoint.connect(server_addr);
        peer.set_packet_loss_sim(self.config.packet_loss.clone());

        let mut session = ClientSession::new(0, peer, self.config.session.clone());
        session.pump();

        self.session = Some(session);
        self.synced = false;
        self.has_view = false;
        self.timestep.reset();
        self.last_update = Instant::now();
    }

    pub fn disconnect(&mut self) {
        if let Some(mut session) = self.session.take() {
            if let Some(addr) = session.channel().map(|c| c.socket().addr()) {
                self.endpoint.disconnect(addr);
            }
            session.close();
        }
        self.synced = false;
        self.has_view = false;
    }

    pub fn is_connected(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.is_connected())
    }

    pub fn is_synced(&self) -> bool {
        self.synced
    }

    pub fn frame(&self) -> i32 {
        self.timestep.frame()
    }

    /// Interpolated world as of the last update, if any snapshot has arrived.
    pub fn view(&self) -> Option<&Snapshot> {
        self.has_view.then_some(&self.view)
    }

    pub fn stats(&self) -> NetworkStats {
        self.session
            .as_ref()
            .map(|s| s.stats())
            .unwrap_or_default()
    }

    /// Runs until the connection drops or `duration` elapses and returns the
    /// final channel statistics.
    pub fn run(&mut self, duration: Option<Duration>) -> io::Result<NetworkStats> {
        let start = Instant::now();
        let mut stats = self.stats();
        while self.is_connected() {
            if duration.is_some_and(|d| start.elapsed() >= d) {
                break;
            }
            self.update()?;
            stats = self.stats();
            std::thread::sleep(Duration::from_millis(1));
        }
        self.disconnect();
        Ok(stats)
    }

    pub fn update(&mut self) -> io::Result<()> {
        let now = Instant::now();
        let elapsed = now - self.last_update;
        self.last_update = now;

        self.endpoint.poll()?;

        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };

        for event in session.pump() {
            match event {
                SessionEvent::ServerFrame { frame, .. } if !self.synced => {
                    let aligned = frame.saturating_add(self.config.input_lead);
                    log::info!("Synchronized to server frame {}, input at {}", frame, aligned);
                    self.timestep.set_frame(aligned);
                    self.synced = true;
                }
                SessionEvent::Disconnected => {
                    log::warn!("Connection closed");
                }
                _ => {}
            }
        }

        if session.is_timed_out(Duration::from_secs(self.config.connection_timeout_secs)) {
            log::warn!(
                "No data from server for {}s, disconnecting",
                self.config.connection_timeout_secs
            );
            self.disconnect();
            return Ok(());
        }

        self.timestep.accumulate(elapsed.as_secs_f32());
        while let Some(frame) = self.timestep.consume_tick() {
            // Until the first snapshot arrives, frame 0 doubles as the hello.
            let frame = if self.synced { frame } else { 0 };
            let command = self.input.sample(frame).to_command(frame);
            session.record_user_command(command);
            if let Err(e) = session.transmit_client_frame(frame) {
                log::warn!("Failed to send frame {}: {}", frame, e);
            }
        }

        if self.synced {
            let delay = f64::from(self.config.input_lead + self.config.interpolation_delay);
            let time = self.timestep.render_time() - delay;
            self.has_view = session.get_snapshot(time, &mut self.view);
        }

        if self.last_stats_log.elapsed().as_secs_f32() >= self.config.stats_interval_secs {
            self.last_stats_log = Instant::now();
            let stats = session.stats();
            let frames = session.frames();
            log::info!(
                "Frame {} | server {} acked {} | ping {} | loss {:.1}% | entities {}",
                self.timestep.frame(),
                frames.received,
                frames.acknowledged,
                stats
                    .rtt_ms
                    .map(|ms| format!("{:.1}ms", ms))
                    .unwrap_or_else(|| "-".to_string()),
                stats.packet_loss_percent(),
                if self.has_view { self.view.entities.len() } else { 0 }
            );
            if let Some(graph) = session.graph() {
                let counts = graph.counts(frames.requested);
                log::debug!(
                    "Frame graph: {} received, {} filled, {} late, {} missing",
                    counts.received,
                    counts.filled,
                    counts.late,
                    counts.missing
                );
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use glam::Vec3;
    use ripple::{SessionConfig, SessionManager, World};

    use super::*;

    fn wait_until(mut done: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < Duration::from_millis(1000) {
            if done() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        false
    }

    #[test]
    fn client_synchronizes_to_server_frame() {
        let mut server_endpoint = UdpEndpoint::bind("127.0.0.1:0").unwrap();
        server_endpoint.set_server_mode(true);
        let mut sessions = SessionManager::new(4, SessionConfig::default());

        let mut client = NetworkClient::new(ClientConfig::default()).unwrap();
        client.connect(server_endpoint.local_addr());
        assert!(client.is_connected());
        assert!(client.view().is_none());

        // The client announces itself before it knows the server frame.
        let mut server_addr = None;
        assert!(wait_until(|| {
            client.update().unwrap();
            for peer in server_endpoint.poll().unwrap() {
                let addr = peer.addr();
                sessions.accept(addr, peer).unwrap();
                server_addr = Some(addr);
            }
            server_addr.is_some()
        }));
        sessions.pump_all();

        let mut world = World::new();
        world.set_frame(100);
        world.spawn(Vec3::ZERO);
        let addr = server_addr.unwrap();
        sessions
            .get_mut(&addr)
            .unwrap()
            .transmit_server_frame(&world.snapshot())
            .unwrap();

        assert!(wait_until(|| {
            client.update().unwrap();
            client.is_synced()
        }));
        assert!(client.frame() >= 100 + client.config.input_lead);
        assert_eq!(client.view().map(|v| v.frame), Some(100));

        client.disconnect();
        assert!(!client.is_connected());
    }
}
