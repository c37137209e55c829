use std::io;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::time::Instant;

use super::simulator::LinkSimulator;
use super::stats::PacketLossSimulation;

/// Lifecycle and data events surfaced by a datagram transport, queued until
/// the owner of the session polls them between simulation steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Open,
    Message(Vec<u8>),
    Close,
}

/// Unreliable, unordered, message-oriented transport bound to one peer.
pub trait DatagramSocket {
    fn send(&mut self, datagram: &[u8]) -> io::Result<()>;

    fn poll_event(&mut self) -> Option<TransportEvent>;

    fn close(&mut self);
}

impl<T: DatagramSocket + ?Sized> DatagramSocket for Box<T> {
    fn send(&mut self, datagram: &[u8]) -> io::Result<()> {
        (**self).send(datagram)
    }

    fn poll_event(&mut self) -> Option<TransportEvent> {
        (**self).poll_event()
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// In-process transport; see [`loopback_pair`].
///
/// Datagrams held back by the link simulator are released whenever this end
/// sends or polls.
#[derive(Debug)]
pub struct LoopbackSocket {
    outbound: Sender<TransportEvent>,
    inbound: Receiver<TransportEvent>,
    link: LinkSimulator,
    closed: bool,
}

/// Two connected sockets; each starts with an `Open` event queued.
pub fn loopback_pair() -> (LoopbackSocket, LoopbackSocket) {
    let (to_a, from_b) = mpsc::channel();
    let (to_b, from_a) = mpsc::channel();

    let _ = to_a.send(TransportEvent::Open);
    let _ = to_b.send(TransportEvent::Open);

    let a = LoopbackSocket {
        outbound: to_b,
        inbound: from_b,
        link: LinkSimulator::default(),
        closed: false,
    };
    let b = LoopbackSocket {
        outbound: to_a,
        inbound: from_a,
        link: LinkSimulator::default(),
        closed: false,
    };
    (a, b)
}

impl LoopbackSocket {
    /// Impairs datagrams sent from this end.
    pub fn set_link(&mut self, link: LinkSimulator) {
        self.link = link;
    }

    pub fn set_packet_loss_sim(&mut self, config: PacketLossSimulation) {
        self.link.set_config(config);
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn flush(&mut self, now: Instant) {
        while let Some(data) = self.link.pop_ready(now) {
            let _ = self.outbound.send(TransportEvent::Message(data));
        }
    }
}

impl DatagramSocket for LoopbackSocket {
    fn send(&mut self, datagram: &[u8]) -> io::Result<()> {
        if self.closed {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "loopback socket is closed",
            ));
        }

        let now = Instant::now();
        self.flush(now);
        if let Some(data) = self.link.admit(datagram.to_vec(), now) {
            // Peer gone is indistinguishable from loss on an unreliable link.
            let _ = self.outbound.send(TransportEvent::Message(data));
        }
        Ok(())
    }

    fn poll_event(&mut self) -> Option<TransportEvent> {
        if self.closed {
            return None;
        }
        self.flush(Instant::now());

        match self.inbound.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.closed = true;
                Some(TransportEvent::Close)
            }
        }
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            let _ = self.outbound.send(TransportEvent::Close);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_opens_both_ends() {
        let (mut a, mut b) = loopback_pair();
        assert_eq!(a.poll_event(), Some(TransportEvent::Open));
        assert_eq!(b.poll_event(), Some(TransportEvent::Open));
        assert_eq!(a.poll_event(), None);
    }

    #[test]
    fn datagrams_cross_over() {
        let (mut a, mut b) = loopback_pair();
        a.poll_event();
        b.poll_event();

        a.send(&[1, 2, 3]).unwrap();
        assert_eq!(b.poll_event(), Some(TransportEvent::Message(vec![1, 2, 3])));
        assert_eq!(a.poll_event(), None);
    }

    #[test]
    fn close_notifies_peer() {
        let (mut a, mut b) = loopback_pair();
        b.poll_event();

        a.close();
        assert!(a.send(&[0]).is_err());
        assert_eq!(b.poll_event(), Some(TransportEvent::Close));
    }

    #[test]
    fn dropped_peer_reads_as_close() {
        let (mut a, b) = loopback_pair();
        a.poll_event();
        drop(b);
        assert_eq!(a.poll_event(), Some(TransportEvent::Close));
        assert_eq!(a.poll_event(), None);
    }
}
