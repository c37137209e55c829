use std::collections::{HashMap, VecDeque};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use ripple::net::FrameCounters;
use ripple::{
    FixedTimestep, NetworkStats, PacketLossSimulation, SessionEvent, SessionManager, UdpEndpoint,
    UdpPeer, World,
};

use crate::config::ServerConfig;
use crate::events::{DisconnectReason, ServerEvent};
use crate::simulation::{spawn_point, step_world};

#[derive(Debug, Clone)]
struct ClientMeta {
    addr: SocketAddr,
    connected_at: Instant,
}

pub struct GameServer {
    endpoint: UdpEndpoint,
    sessions: SessionManager<UdpPeer>,
    config: ServerConfig,
    world: World,
    /// Session id to the entity it drives.
    avatars: HashMap<u32, u16>,
    clients: HashMap<u32, ClientMeta>,
    timestep: FixedTimestep,
    last_update: Instant,
    running: Arc<AtomicBool>,
    start_time: Instant,
    pending_events: VecDeque<ServerEvent>,
}

impl GameServer {
    pub fn new(config: ServerConfig) -> io::Result<Self> {
        let mut endpoint = UdpEndpoint::bind(config.bind_addr())?;
        endpoint.set_server_mode(true);

        Ok(Self {
            endpoint,
            sessions: SessionManager::with_timeout(
                config.max_clients,
                config.session.clone(),
                config.timeout_secs,
            ),
            world: World::new(),
            avatars: HashMap::new(),
            clients: HashMap::new(),
            timestep: FixedTimestep::new(config.tick_rate),
            last_update: Instant::now(),
            running: Arc::new(AtomicBool::new(true)),
            start_time: Instant::now(),
            pending_events: VecDeque::new(),
            config,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.endpoint.local_addr()
    }

    pub fn running(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn drain_events(&mut self) -> impl Iterator<Item = ServerEvent> + '_ {
        self.pending_events.drain(..)
    }

    pub fn run(&mut self) {
        while self.running.load(Ordering::SeqCst) {
            self.tick_once();
            for event in self.pending_events.drain(..) {
                log_event(&event);
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        self.shutdown_connections();
    }

    pub fn shutdown_connections(&mut self) {
        let ids: Vec<u32> = self.sessions.iter().map(|(_, s)| s.id()).collect();
        for id in ids {
            self.kick_client(id);
        }
    }

    pub fn kick_client(&mut self, session_id: u32) {
        let Some(addr) = self.clients.get(&session_id).map(|c| c.addr) else {
            return;
        };
        self.drop_client(session_id, addr, DisconnectReason::Kicked);
    }

    pub fn tick_once(&mut self) {
        let now = Instant::now();
        let elapsed = now - self.last_update;
        self.last_update = now;
        self.timestep.accumulate(elapsed.as_secs_f32());

        if let Err(e) = self.process_network() {
            self.pending_events.push_back(ServerEvent::Error {
                message: format!("Network error: {}", e),
            });
        }

        while self.timestep.consume_tick().is_some() {
            self.tick();
        }
    }

    fn tick(&mut self) {
        let dt = self.timestep.dt();
        step_world(&mut self.world, &mut self.sessions, &self.avatars, dt);

        let snapshot = self.world.snapshot();
        for (addr, session) in self.sessions.iter_mut() {
            if !session.is_connected() {
                continue;
            }
            if let Err(e) = session.transmit_server_frame(&snapshot) {
                self.pending_events.push_back(ServerEvent::Error {
                    message: format!("Failed to send frame {} to {}: {}", snapshot.frame, addr, e),
                });
            }
        }

        for (addr, session_id) in self.sessions.cleanup_timed_out() {
            self.forget_client(session_id, addr, DisconnectReason::Timeout);
        }
    }

    fn process_network(&mut self) -> io::Result<()> {
        for mut peer in self.endpoint.poll()? {
            let addr = peer.addr();
            peer.set_packet_loss_sim(self.config.packet_loss.clone());

            if let Err(e) = self.sessions.accept(addr, peer) {
                self.endpoint.disconnect(addr);
                self.pending_events.push_back(ServerEvent::ConnectionDenied {
                    addr,
                    reason: e.to_string(),
                });
            }
        }

        for (addr, event) in self.sessions.pump_all() {
            match event {
                SessionEvent::Connected => self.spawn_avatar(addr),
                SessionEvent::Disconnected => {
                    if let Some(id) = self.sessions.get(&addr).map(|s| s.id()) {
                        self.drop_client(id, addr, DisconnectReason::Closed);
                    }
                }
                SessionEvent::ClientFrame { .. } | SessionEvent::ServerFrame { .. } => {}
            }
        }

        Ok(())
    }

    fn spawn_avatar(&mut self, addr: SocketAddr) {
        let Some(session_id) = self.sessions.get(&addr).map(|s| s.id()) else {
            return;
        };

        let position = spawn_point(session_id, self.config.spawn_radius);
        let entity_id = self.world.spawn(position);
        self.avatars.insert(session_id, entity_id);
        self.clients.insert(
            session_id,
            ClientMeta {
                addr,
                connected_at: Instant::now(),
            },
        );

        self.pending_events.push_back(ServerEvent::ClientConnected {
            session_id,
            addr,
            entity_id,
        });
    }

    fn drop_client(&mut self, session_id: u32, addr: SocketAddr, reason: DisconnectReason) {
        self.sessions.remove(&addr);
        self.forget_client(session_id, addr, reason);
    }

    fn forget_client(&mut self, session_id: u32, addr: SocketAddr, reason: DisconnectReason) {
        self.endpoint.disconnect(addr);
        if let Some(entity_id) = self.avatars.remove(&session_id) {
            self.world.despawn(entity_id);
        }
        if self.clients.remove(&session_id).is_some() {
            self.pending_events
                .push_back(ServerEvent::ClientDisconnected { session_id, reason });
        }
    }

    pub fn stats(&self) -> ServerStats {
        let mut network = NetworkStats::default();
        let mut rtt_sum = 0.0;
        let mut rtt_samples = 0;
        let mut loss_sum = 0.0;
        let mut connected = 0;

        for (_, session) in self.sessions.iter().filter(|(_, s)| s.is_connected()) {
            let stats = session.stats();
            network.packets_sent += stats.packets_sent;
            network.packets_received += stats.packets_received;
            network.packets_stale += stats.packets_stale;
            network.packets_malformed += stats.packets_malformed;
            network.packets_acked += stats.packets_acked;
            network.bytes_sent += stats.bytes_sent;
            network.bytes_received += stats.bytes_received;
            if let Some(rtt) = stats.rtt_ms {
                rtt_sum += rtt;
                rtt_samples += 1;
            }
            loss_sum += stats.packet_loss;
            connected += 1;
        }

        if rtt_samples > 0 {
            network.rtt_ms = Some(rtt_sum / rtt_samples as f32);
        }
        if connected > 0 {
            network.packet_loss = loss_sum / connected as f32;
        }

        ServerStats {
            frame: self.world.frame(),
            uptime_secs: self.start_time.elapsed().as_secs(),
            client_count: connected,
            max_clients: self.config.max_clients,
            entity_count: self.world.entity_count(),
            network,
        }
    }

    pub fn session_infos(&self) -> Vec<SessionInfo> {
        let mut infos: Vec<SessionInfo> = self
            .sessions
            .iter()
            .filter(|(_, s)| s.is_connected())
            .map(|(addr, session)| SessionInfo {
                session_id: session.id(),
                addr: *addr,
                entity_id: self.avatars.get(&session.id()).copied(),
                connected_secs: self
                    .clients
                    .get(&session.id())
                    .map(|c| c.connected_at.elapsed().as_secs())
                    .unwrap_or(0),
                ping_ms: session.ping(),
                packet_loss: session.packet_loss(),
                frames: session.frames(),
                packet_loss_sim: session
                    .channel()
                    .map(|c| c.socket().packet_loss_sim().clone())
                    .unwrap_or_default(),
            })
            .collect();
        infos.sort_by_key(|info| info.session_id);
        infos
    }

    pub fn set_packet_loss_sim(&mut self, session_id: u32, sim: PacketLossSimulation) {
        let Some(addr) = self.clients.get(&session_id).map(|c| c.addr) else {
            return;
        };
        if let Some(channel) = self.sessions.get_mut(&addr).and_then(|s| s.channel_mut()) {
            channel.socket_mut().set_packet_loss_sim(sim);
        }
    }
}

pub fn log_event(event: &ServerEvent) {
    match event {
        ServerEvent::ClientConnected {
            session_id,
            addr,
            entity_id,
        } => log::info!(
            "Client {} connected from {} (entity {})",
            session_id,
            addr,
            entity_id
        ),
        ServerEvent::ClientDisconnected { session_id, reason } => {
            log::info!("Client {} {}", session_id, reason.as_str())
        }
        ServerEvent::ConnectionDenied { addr, reason } => {
            log::warn!("Connection denied to {}: {}", addr, reason)
        }
        ServerEvent::Error { message } => log::error!("{}", message),
    }
}

#[derive(Debug, Clone)]
pub struct ServerStats {
    pub frame: i32,
    pub uptime_secs: u64,
    pub client_count: usize,
    pub max_clients: usize,
    pub entity_count: usize,
    pub network: NetworkStats,
}

#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub session_id: u32,
    pub addr: SocketAddr,
    pub entity_id: Option<u16>,
    pub connected_secs: u64,
    pub ping_ms: Option<f32>,
    pub packet_loss: f32,
    pub frames: FrameCounters,
    pub packet_loss_sim: PacketLossSimulation,
}
