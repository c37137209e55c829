mod channel;
mod connection;
mod endpoint;
mod graph;
mod history;
mod msg;
mod protocol;
mod sequence;
mod session;
mod simulator;
mod stats;
mod transport;

pub use channel::{Ack, Channel, Delivery, MAX_RTT, PING_MIN_ACKS};
pub use connection::SessionManager;
pub use endpoint::{UdpEndpoint, UdpPeer};
pub use graph::{FrameCounts, FrameGraph, FrameStatus};
pub use history::{ACK_BITFIELD_BITS, HISTORY_CAPACITY, PacketBuffer, PacketRecord};
pub use msg::{CodecError, Msg};
pub use protocol::{
    DEFAULT_PORT, DEFAULT_TICK_RATE, FrameKind, HEADER_SIZE, MAX_PACKET_SIZE, MAX_PAYLOAD_SIZE,
    PacketError, PacketHeader,
};
pub use sequence::{SEQUENCE_DOMAIN, sequence_distance, sequence_greater_than, wrap_sequence};
pub use session::{ClientSession, FrameCounters, SessionConfig, SessionEvent, SessionState};
pub use simulator::LinkSimulator;
pub use stats::{NetworkStats, PacketLossSimulation};
pub use transport::{DatagramSocket, LoopbackSocket, TransportEvent, loopback_pair};
