pub mod net;
pub mod simulation;
pub mod snapshot;

pub use net::{
    Channel, ClientSession, DEFAULT_PORT, DEFAULT_TICK_RATE, DatagramSocket, FrameGraph,
    FrameStatus, LoopbackSocket, MAX_PACKET_SIZE, MAX_PAYLOAD_SIZE, NetworkStats, PacketError,
    PacketHeader, PacketLossSimulation, SessionConfig, SessionEvent, SessionManager, SessionState,
    TransportEvent, UdpEndpoint, UdpPeer,
};
pub use simulation::{Actions, FixedTimestep, UserCommand, UserCommandBuffer};
pub use snapshot::{EntityState, Snapshot, SnapshotBuffer, World};
