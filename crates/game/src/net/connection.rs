use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use super::protocol::PacketError;
use super::session::{ClientSession, SessionConfig, SessionEvent, SessionState};
use super::transport::DatagramSocket;

const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Server-side registry of client sessions keyed by remote address.
#[derive(Debug)]
pub struct SessionManager<S> {
    sessions: HashMap<SocketAddr, ClientSession<S>>,
    next_session_id: u32,
    max_sessions: usize,
    timeout: Duration,
    config: SessionConfig,
}

impl<S: DatagramSocket> SessionManager<S> {
    pub fn new(max_sessions: usize, config: SessionConfig) -> Self {
        Self::with_timeout(max_sessions, config, DEFAULT_TIMEOUT_SECS)
    }

    pub fn with_timeout(max_sessions: usize, config: SessionConfig, timeout_secs: u64) -> Self {
        Self {
            sessions: HashMap::new(),
            next_session_id: 1,
            max_sessions,
            timeout: Duration::from_secs(timeout_secs),
            config,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Registers a session for `addr`. The socket is closed and the peer
    /// refused when the server is full or the address already has a session.
    pub fn accept(&mut self, addr: SocketAddr, mut socket: S) -> Result<u32, PacketError> {
        if self.sessions.contains_key(&addr) {
            log::warn!("Refusing {}: address already has a session", addr);
            socket.close();
            return Err(PacketError::DuplicatePeer);
        }
        if self.sessions.len() >= self.max_sessions {
            log::warn!("Refusing {}: server full", addr);
            socket.close();
            return Err(PacketError::ServerFull);
        }

        let id = self.next_session_id;
        self.next_session_id = self.next_session_id.wrapping_add(1).max(1);
        self.sessions
            .insert(addr, ClientSession::new(id, socket, self.config.clone()));
        log::info!("Session {} created for {}", id, addr);
        Ok(id)
    }

    pub fn get(&self, addr: &SocketAddr) -> Option<&ClientSession<S>> {
        self.sessions.get(addr)
    }

    pub fn get_mut(&mut self, addr: &SocketAddr) -> Option<&mut ClientSession<S>> {
        self.sessions.get_mut(addr)
    }

    pub fn get_by_id(&self, id: u32) -> Option<(&SocketAddr, &ClientSession<S>)> {
        self.sessions.iter().find(|(_, s)| s.id() == id)
    }

    /// Closes and forgets the session for `addr`.
    pub fn remove(&mut self, addr: &SocketAddr) -> Option<ClientSession<S>> {
        let mut session = self.sessions.remove(addr)?;
        session.close();
        Some(session)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SocketAddr, &ClientSession<S>)> {
        self.sessions.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&SocketAddr, &mut ClientSession<S>)> {
        self.sessions.iter_mut()
    }

    pub fn pump_all(&mut self) -> Vec<(SocketAddr, SessionEvent)> {
        self.pump_all_at(Instant::now())
    }

    pub fn pump_all_at(&mut self, now: Instant) -> Vec<(SocketAddr, SessionEvent)> {
        let mut events = Vec::new();
        for (addr, session) in &mut self.sessions {
            events.extend(session.pump_at(now).into_iter().map(|event| (*addr, event)));
        }
        events
    }

    pub fn cleanup_timed_out(&mut self) -> Vec<(SocketAddr, u32)> {
        self.cleanup_timed_out_at(Instant::now())
    }

    /// Drops sessions that disconnected or have been silent for longer than
    /// the timeout.
    pub fn cleanup_timed_out_at(&mut self, now: Instant) -> Vec<(SocketAddr, u32)> {
        let expired: Vec<(SocketAddr, u32)> = self
            .sessions
            .iter()
            .filter(|(_, s)| {
                s.state() == SessionState::Disconnected || s.is_timed_out_at(self.timeout, now)
            })
            .map(|(&addr, s)| (addr, s.id()))
            .collect();

        for (addr, id) in &expired {
            if self.sessions.get(addr).is_some_and(|s| s.is_connected()) {
                log::info!("Session {} timed out", id);
            }
            self.remove(addr);
        }

        expired
    }

    pub fn connected_count(&self) -> usize {
        self.sessions.values().filter(|s| s.is_connected()).count()
    }

    pub fn total_count(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::transport::{LoopbackSocket, TransportEvent, loopback_pair};

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn accept_until_full() {
        let mut manager: SessionManager<LoopbackSocket> =
            SessionManager::new(2, SessionConfig::default());

        let (a, _pa) = loopback_pair();
        let (b, _pb) = loopback_pair();
        let (c, mut pc) = loopback_pair();

        assert_eq!(manager.accept(addr(1), a).unwrap(), 1);
        assert_eq!(manager.accept(addr(2), b).unwrap(), 2);
        assert!(matches!(
            manager.accept(addr(3), c),
            Err(PacketError::ServerFull)
        ));

        pc.poll_event();
        assert_eq!(pc.poll_event(), Some(TransportEvent::Close));

        let events = manager.pump_all();
        assert_eq!(events.len(), 2);
        assert_eq!(manager.connected_count(), 2);
    }

    #[test]
    fn second_socket_for_same_address_refused() {
        let mut manager: SessionManager<LoopbackSocket> =
            SessionManager::new(4, SessionConfig::default());

        let (a, _pa) = loopback_pair();
        let (b, mut pb) = loopback_pair();

        let id = manager.accept(addr(1), a).unwrap();
        assert!(matches!(
            manager.accept(addr(1), b),
            Err(PacketError::DuplicatePeer)
        ));

        pb.poll_event();
        assert_eq!(pb.poll_event(), Some(TransportEvent::Close));
        assert_eq!(manager.total_count(), 1);
        assert_eq!(manager.get(&addr(1)).map(|s| s.id()), Some(id));
    }

    #[test]
    fn cleanup_removes_silent_sessions() {
        let mut manager: SessionManager<LoopbackSocket> =
            SessionManager::with_timeout(4, SessionConfig::default(), 1);

        let (a, _pa) = loopback_pair();
        manager.accept(addr(1), a).unwrap();
        manager.pump_all();

        let now = Instant::now();
        assert!(manager.cleanup_timed_out_at(now).is_empty());

        let expired = manager.cleanup_timed_out_at(now + Duration::from_secs(3));
        assert_eq!(expired, vec![(addr(1), 1)]);
        assert_eq!(manager.total_count(), 0);
    }

    #[test]
    fn cleanup_removes_disconnected_sessions() {
        let mut manager: SessionManager<LoopbackSocket> =
            SessionManager::new(4, SessionConfig::default());

        let (a, pa) = loopback_pair();
        manager.accept(addr(1), a).unwrap();
        drop(pa);
        manager.pump_all();

        assert_eq!(manager.cleanup_timed_out().len(), 1);
        assert!(manager.get(&addr(1)).is_none());
    }
}
