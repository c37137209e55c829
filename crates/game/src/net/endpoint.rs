use std::collections::HashMap;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::time::Instant;

use super::protocol::MAX_PACKET_SIZE;
use super::simulator::LinkSimulator;
use super::stats::PacketLossSimulation;
use super::transport::{DatagramSocket, TransportEvent};

/// Non-blocking UDP socket demultiplexed into one [`UdpPeer`] per remote address.
///
/// Nothing is read from the OS socket until [`UdpEndpoint::poll`] runs, which
/// routes every pending datagram to its peer's event queue.
pub struct UdpEndpoint {
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
    peers: HashMap<SocketAddr, Sender<TransportEvent>>,
    recv_buffer: Box<[u8; MAX_PACKET_SIZE + 1]>,
    accept_unknown: bool,
}

impl UdpEndpoint {
    pub fn bind<A: ToSocketAddrs>(addr: A) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_nonblocking(true)?;

        let local_addr = socket.local_addr()?;
        log::debug!("UDP endpoint bound to {local_addr}");

        Ok(Self {
            socket: Arc::new(socket),
            local_addr,
            peers: HashMap::new(),
            recv_buffer: Box::new([0u8; MAX_PACKET_SIZE + 1]),
            accept_unknown: false,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// When set, datagrams from unknown addresses open a new peer instead of
    /// being ignored.
    pub fn set_server_mode(&mut self, enabled: bool) {
        self.accept_unknown = enabled;
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn connect(&mut self, addr: SocketAddr) -> UdpPeer {
        let peer = self.open_peer(addr);
        log::info!("Opened UDP peer {addr}");
        peer
    }

    /// Routes every datagram waiting on the socket and returns the peers
    /// opened by unknown addresses during this call.
    pub fn poll(&mut self) -> io::Result<Vec<UdpPeer>> {
        let mut opened = Vec::new();

        loop {
            let (size, addr) = match self.socket.recv_from(&mut self.recv_buffer[..]) {
                Ok(received) => received,
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                // ICMP port unreachable from a vanished peer surfaces here on some platforms.
                Err(ref e) if e.kind() == io::ErrorKind::ConnectionReset => continue,
                Err(e) => return Err(e),
            };

            if size > MAX_PACKET_SIZE {
                log::warn!("Dropping oversized datagram from {addr}");
                continue;
            }
            let data = self.recv_buffer[..size].to_vec();

            if !self.peers.contains_key(&addr) {
                if !self.accept_unknown {
                    log::trace!("Ignoring datagram from unknown address {addr}");
                    continue;
                }
                log::info!("Accepted UDP peer {addr}");
                opened.push(self.open_peer(addr));
            }

            let delivered = self
                .peers
                .get(&addr)
                .is_some_and(|tx| tx.send(TransportEvent::Message(data)).is_ok());
            if !delivered {
                // Receiving half was dropped by its owner.
                self.peers.remove(&addr);
            }
        }

        Ok(opened)
    }

    /// Forgets `addr` and queues a `Close` for its peer.
    pub fn disconnect(&mut self, addr: SocketAddr) {
        if let Some(tx) = self.peers.remove(&addr) {
            let _ = tx.send(TransportEvent::Close);
            log::debug!("Disconnected UDP peer {addr}");
        }
    }

    fn open_peer(&mut self, addr: SocketAddr) -> UdpPeer {
        let (tx, rx) = mpsc::channel();
        let _ = tx.send(TransportEvent::Open);
        self.peers.insert(addr, tx);

        UdpPeer {
            socket: Arc::clone(&self.socket),
            addr,
            inbound: rx,
            link: LinkSimulator::default(),
            closed: false,
        }
    }
}

/// One remote address on a shared [`UdpEndpoint`].
pub struct UdpPeer {
    socket: Arc<UdpSocket>,
    addr: SocketAddr,
    inbound: Receiver<TransportEvent>,
    link: LinkSimulator,
    closed: bool,
}

impl UdpPeer {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn packet_loss_sim(&self) -> &PacketLossSimulation {
        self.link.config()
    }

    pub fn set_packet_loss_sim(&mut self, config: PacketLossSimulation) {
        if config.is_active() {
            log::info!("Simulating link impairment towards {}: {config:?}", self.addr);
        }
        self.link.set_config(config);
    }

    fn flush(&mut self, now: Instant) -> io::Result<()> {
        while let Some(data) = self.link.pop_ready(now) {
            self.socket.send_to(&data, self.addr)?;
        }
        Ok(())
    }
}

impl DatagramSocket for UdpPeer {
    fn send(&mut self, datagram: &[u8]) -> io::Result<()> {
        if self.closed {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "udp peer is closed",
            ));
        }

        let now = Instant::now();
        self.flush(now)?;
        if let Some(data) = self.link.admit(datagram.to_vec(), now) {
            self.socket.send_to(&data, self.addr)?;
        }
        Ok(())
    }

    fn poll_event(&mut self) -> Option<TransportEvent> {
        if self.closed {
            return None;
        }
        if let Err(e) = self.flush(Instant::now()) {
            log::warn!("Failed to flush delayed datagrams to {}: {e}", self.addr);
        }

        match self.inbound.try_recv() {
            Ok(TransportEvent::Close) | Err(TryRecvError::Disconnected) => {
                self.closed = true;
                Some(TransportEvent::Close)
            }
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) => None,
        }
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use super::*;

    fn poll_until<F: FnMut() -> bool>(mut f: F) {
        for _ in 0..200 {
            if f() {
                return;
            }
            thread::sleep(Duration::from_millis(5));
        }
        panic!("condition not met in time");
    }

    #[test]
    fn test_server_mode_opens_peer() {
        let mut server = UdpEndpoint::bind("127.0.0.1:0").unwrap();
        server.set_server_mode(true);
        let mut client = UdpEndpoint::bind("127.0.0.1:0").unwrap();

        let mut to_server = client.connect(server.local_addr());
        assert_eq!(to_server.poll_event(), Some(TransportEvent::Open));
        to_server.send(b"hello").unwrap();

        let mut accepted = Vec::new();
        poll_until(|| {
            accepted.extend(server.poll().unwrap());
            !accepted.is_empty()
        });

        let peer = &mut accepted[0];
        assert_eq!(peer.addr(), client.local_addr());
        assert_eq!(peer.poll_event(), Some(TransportEvent::Open));
        assert_eq!(
            peer.poll_event(),
            Some(TransportEvent::Message(b"hello".to_vec()))
        );
        assert_eq!(server.peer_count(), 1);
    }

    #[test]
    fn test_unknown_address_ignored_by_client() {
        let mut a = UdpEndpoint::bind("127.0.0.1:0").unwrap();
        let mut b = UdpEndpoint::bind("127.0.0.1:0").unwrap();

        let mut to_a = b.connect(a.local_addr());
        to_a.send(b"x").unwrap();
        thread::sleep(Duration::from_millis(20));

        assert!(a.poll().unwrap().is_empty());
        assert_eq!(a.peer_count(), 0);
    }

    #[test]
    fn test_disconnect_closes_peer() {
        let mut endpoint = UdpEndpoint::bind("127.0.0.1:0").unwrap();
        let addr: SocketAddr = "127.0.0.1:9".parse().unwrap();
        let mut peer = endpoint.connect(addr);

        assert_eq!(peer.poll_event(), Some(TransportEvent::Open));
        endpoint.disconnect(addr);
        assert_eq!(peer.poll_event(), Some(TransportEvent::Close));
        assert!(peer.send(b"late").is_err());
    }
}
