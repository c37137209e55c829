//! Per-peer frame protocol on top of a [`Channel`].
//!
//! Clients send one client frame per simulation step carrying the newest user
//! command plus a few older ones, so a lost datagram is usually covered by the
//! next one. Servers send one server frame per step carrying a snapshot,
//! encoded as a delta against the newest snapshot the client reports holding.
//! Channel acks only say a datagram arrived, not that its snapshot could be
//! rebuilt, so they never pick the baseline.

use std::time::{Duration, Instant};

use serde::Deserialize;

use super::channel::{Ack, Channel};
use super::graph::{FrameGraph, FrameStatus};
use super::msg::Msg;
use super::protocol::{FrameKind, MAX_PAYLOAD_SIZE, PacketError};
use super::stats::NetworkStats;
use super::transport::{DatagramSocket, TransportEvent};
use crate::simulation::{UserCommand, UserCommandBuffer};
use crate::snapshot::{Snapshot, SnapshotBuffer};

/// Kind byte, frame number and newest held snapshot frame.
const CLIENT_FRAME_HEADER: usize = 9;
const MAX_COMMANDS_PER_FRAME: usize = (MAX_PAYLOAD_SIZE - CLIENT_FRAME_HEADER) / UserCommand::WIRE_SIZE;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Most user commands carried by one client frame.
    pub redundancy: usize,
    pub command_capacity: usize,
    pub snapshot_capacity: usize,
    pub delta_snapshots: bool,
    /// Records per-frame arrival status when set.
    pub graph_capacity: Option<usize>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            redundancy: 5,
            command_capacity: 64,
            snapshot_capacity: 32,
            delta_snapshots: true,
            graph_capacity: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Free,
    Connected,
    Disconnected,
}

/// Frame bookkeeping; `-1` means no frame yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCounters {
    /// Newest frame the local simulation asked this session for.
    pub requested: i32,
    pub received: i32,
    pub transmitted: i32,
    /// Newest locally transmitted frame the peer acknowledged.
    pub acknowledged: i32,
    /// Newest snapshot the peer reports holding; server frames are delta
    /// encoded against it.
    pub baseline: i32,
}

impl Default for FrameCounters {
    fn default() -> Self {
        Self {
            requested: -1,
            received: -1,
            transmitted: -1,
            acknowledged: -1,
            baseline: -1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Connected,
    Disconnected,
    ClientFrame { frame: i32, new_commands: usize },
    ServerFrame { frame: i32, delta: bool },
}

#[derive(Debug)]
pub struct ClientSession<S> {
    id: u32,
    state: SessionState,
    channel: Option<Channel<S>>,
    frames: FrameCounters,
    commands: UserCommandBuffer,
    snapshots: SnapshotBuffer,
    graph: Option<FrameGraph>,
    config: SessionConfig,
    scratch: Msg<Vec<u8>>,
    last_receive_time: Instant,
}

impl<S: DatagramSocket> ClientSession<S> {
    pub fn new(id: u32, socket: S, config: SessionConfig) -> Self {
        Self {
            id,
            state: SessionState::Free,
            channel: Some(Channel::new(socket)),
            frames: FrameCounters::default(),
            commands: UserCommandBuffer::new(config.command_capacity),
            snapshots: SnapshotBuffer::new(config.snapshot_capacity),
            graph: config.graph_capacity.map(FrameGraph::new),
            scratch: Msg::with_capacity(MAX_PAYLOAD_SIZE),
            last_receive_time: Instant::now(),
            config,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    pub fn frames(&self) -> FrameCounters {
        self.frames
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// `None` once the session has been closed.
    pub fn channel(&self) -> Option<&Channel<S>> {
        self.channel.as_ref()
    }

    pub fn channel_mut(&mut self) -> Option<&mut Channel<S>> {
        self.channel.as_mut()
    }

    pub fn commands(&self) -> &UserCommandBuffer {
        &self.commands
    }

    pub fn snapshots(&self) -> &SnapshotBuffer {
        &self.snapshots
    }

    pub fn graph(&self) -> Option<&FrameGraph> {
        self.graph.as_ref()
    }

    pub fn ping(&self) -> Option<f32> {
        self.channel.as_ref()?.ping()
    }

    pub fn packet_loss(&self) -> f32 {
        self.channel.as_ref().map_or(0.0, |c| c.packet_loss())
    }

    pub fn stats(&self) -> NetworkStats {
        self.channel
            .as_ref()
            .map(|c| c.stats())
            .unwrap_or_default()
    }

    pub fn last_receive_time(&self) -> Instant {
        self.last_receive_time
    }

    pub fn touch(&mut self) {
        self.last_receive_time = Instant::now();
    }

    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.is_timed_out_at(timeout, Instant::now())
    }

    pub fn is_timed_out_at(&self, timeout: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.last_receive_time) > timeout
    }

    pub fn pump(&mut self) -> Vec<SessionEvent> {
        self.pump_at(Instant::now())
    }

    /// Drains the transport's queued events into the session buffers.
    ///
    /// Bad datagrams are logged and dropped; nothing received here can fail
    /// the caller's simulation step.
    pub fn pump_at(&mut self, now: Instant) -> Vec<SessionEvent> {
        let mut events = Vec::new();

        while let Some(event) = self
            .channel
            .as_mut()
            .and_then(|channel| channel.socket_mut().poll_event())
        {
            match event {
                TransportEvent::Open => {
                    if self.state == SessionState::Free {
                        self.state = SessionState::Connected;
                        self.last_receive_time = now;
                        log::info!("Session {} connected", self.id);
                        events.push(SessionEvent::Connected);
                    }
                }
                TransportEvent::Message(data) => {
                    if self.state != SessionState::Connected {
                        log::debug!("Session {} ignoring datagram before open", self.id);
                        continue;
                    }
                    match self.receive_datagram(&data, now) {
                        Ok(Some(event)) => events.push(event),
                        Ok(None) => {}
                        Err(e) => log::warn!("Session {} discarded datagram: {}", self.id, e),
                    }
                }
                TransportEvent::Close => {
                    log::info!("Session {} closed by transport", self.id);
                    self.release();
                    events.push(SessionEvent::Disconnected);
                }
            }
        }

        events
    }

    fn receive_datagram(
        &mut self,
        data: &[u8],
        now: Instant,
    ) -> Result<Option<SessionEvent>, PacketError> {
        let channel = self.channel.as_mut().ok_or(PacketError::NotConnected)?;
        let Some(delivery) = channel.receive_at(data, now)? else {
            return Ok(None);
        };
        self.last_receive_time = now;

        for ack in &delivery.acks {
            self.on_ack(ack);
        }

        let mut msg = Msg::new(&delivery.payload[..]);
        match FrameKind::try_from(msg.read_u8()?)? {
            FrameKind::Client => self.receive_client_frame(&mut msg).map(Some),
            FrameKind::Server => self.receive_server_frame(&mut msg).map(Some),
        }
    }

    fn on_ack(&mut self, ack: &Ack) {
        let frame = ack.tag as i32;
        if frame > self.frames.acknowledged {
            self.frames.acknowledged = frame;
        }
    }

    fn receive_client_frame(&mut self, msg: &mut Msg<&[u8]>) -> Result<SessionEvent, PacketError> {
        let frame = msg.read_i32()?;
        if frame < 0 {
            return Err(PacketError::Malformed("negative frame"));
        }
        let held = msg.read_i32()?;
        if held < -1 {
            return Err(PacketError::Malformed("negative snapshot frame"));
        }
        let remaining = msg.remaining();
        if remaining == 0 || remaining % UserCommand::WIRE_SIZE != 0 {
            return Err(PacketError::Malformed("client frame body"));
        }
        let count = remaining / UserCommand::WIRE_SIZE;

        if frame > self.frames.received {
            self.frames.received = frame;
        }
        if held > self.frames.baseline {
            self.frames.baseline = held;
        }

        let mut new_commands = 0;
        for index in 0..count {
            let command_frame = frame - index as i32;
            let command = UserCommand::decode(msg, command_frame)?;
            if !self.commands.set(command) {
                continue;
            }
            new_commands += 1;

            if let Some(graph) = self.graph.as_mut() {
                let status = if command_frame <= self.frames.requested {
                    FrameStatus::Late
                } else if index == 0 {
                    FrameStatus::Received
                } else {
                    FrameStatus::Filled
                };
                graph.mark(command_frame, status);
            }
        }

        Ok(SessionEvent::ClientFrame {
            frame,
            new_commands,
        })
    }

    fn receive_server_frame(&mut self, msg: &mut Msg<&[u8]>) -> Result<SessionEvent, PacketError> {
        let wire = Snapshot::decode(msg)?;
        let frame = wire.frame;
        let delta = wire.is_delta();

        let snapshot = match wire.baseline {
            None => wire,
            Some(baseline) => {
                let base = self
                    .snapshots
                    .get(baseline)
                    .ok_or(PacketError::MissingBaseline(baseline))?;
                wire.apply_to(base)?
            }
        };

        if !self.snapshots.push(snapshot) {
            log::trace!("Session {} already holds snapshot {}", self.id, frame);
            return Ok(SessionEvent::ServerFrame { frame, delta });
        }
        if frame > self.frames.received {
            self.frames.received = frame;
        }

        if let Some(graph) = self.graph.as_mut() {
            let requested = self.frames.requested;
            if requested >= 0 {
                let oldest = frame.saturating_sub(graph.capacity() as i32 - 1);
                for skipped in (requested + 1).max(oldest)..frame {
                    if graph.status(skipped) == FrameStatus::Missing
                        && !self.snapshots.contains(skipped)
                    {
                        graph.mark(skipped, FrameStatus::Filled);
                    }
                }
            }

            let status = if frame <= requested {
                FrameStatus::Late
            } else {
                FrameStatus::Received
            };
            graph.mark(frame, status);
        }

        Ok(SessionEvent::ServerFrame { frame, delta })
    }

    /// Stores a locally sampled command for transmission. Returns false if
    /// the frame was already recorded.
    pub fn record_user_command(&mut self, command: UserCommand) -> bool {
        self.commands.set(command)
    }

    /// Number of commands a client frame for `frame` carries: the configured
    /// redundancy, cut back to the frames the peer has not acknowledged.
    pub fn redundancy_window(&self, frame: i32) -> usize {
        let unacknowledged = frame.saturating_sub(self.frames.acknowledged).max(1) as usize;
        self.config
            .redundancy
            .min(unacknowledged)
            .min(self.commands.capacity())
            .clamp(1, MAX_COMMANDS_PER_FRAME)
    }

    pub fn transmit_client_frame(&mut self, frame: i32) -> Result<u16, PacketError> {
        self.transmit_client_frame_at(frame, Instant::now())
    }

    /// Sends the command for `frame` followed by up to
    /// [`redundancy_window`](Self::redundancy_window) - 1 earlier ones,
    /// newest first. The command for `frame` must have been recorded.
    pub fn transmit_client_frame_at(&mut self, frame: i32, now: Instant) -> Result<u16, PacketError> {
        if self.state != SessionState::Connected {
            return Err(PacketError::NotConnected);
        }
        let window = self.redundancy_window(frame);
        let channel = self.channel.as_mut().ok_or(PacketError::NotConnected)?;

        self.scratch.reset();
        self.scratch.write_u8(FrameKind::Client as u8)?;
        self.scratch.write_i32(frame)?;
        self.scratch
            .write_i32(self.snapshots.latest_frame().unwrap_or(-1))?;
        for index in 0..window {
            let command_frame = frame - index as i32;
            match self.commands.get(command_frame) {
                Some(command) => command.encode(&mut self.scratch)?,
                None if index == 0 => return Err(PacketError::MissingCommand(frame)),
                // Frame numbers are implied by position, so stop at the first gap.
                None => break,
            }
        }

        let sequence = channel.send_at(self.scratch.as_bytes(), Some(frame as u32), now)?;
        self.frames.transmitted = frame;
        Ok(sequence)
    }

    pub fn transmit_server_frame(&mut self, snapshot: &Snapshot) -> Result<u16, PacketError> {
        self.transmit_server_frame_at(snapshot, Instant::now())
    }

    /// Sends `snapshot`, as a delta when the snapshot the peer last reported
    /// holding is still buffered, and keeps a copy as a future baseline.
    pub fn transmit_server_frame_at(
        &mut self,
        snapshot: &Snapshot,
        now: Instant,
    ) -> Result<u16, PacketError> {
        if self.state != SessionState::Connected {
            return Err(PacketError::NotConnected);
        }
        let channel = self.channel.as_mut().ok_or(PacketError::NotConnected)?;

        let baseline = if self.config.delta_snapshots {
            self.snapshots
                .get(self.frames.baseline)
                .filter(|base| base.frame < snapshot.frame)
        } else {
            None
        };
        let delta;
        let wire = match baseline {
            Some(base) => {
                delta = snapshot.delta_from(base);
                &delta
            }
            None => snapshot,
        };

        let size = 1 + wire.encoded_len();
        if size > MAX_PAYLOAD_SIZE {
            log::error!(
                "Session {}: snapshot {} is {} bytes, too large for buffer",
                self.id,
                snapshot.frame,
                size
            );
            return Err(PacketError::TooLarge(size));
        }

        self.scratch.reset();
        self.scratch.write_u8(FrameKind::Server as u8)?;
        wire.encode(&mut self.scratch)?;

        let sequence = channel.send_at(self.scratch.as_bytes(), Some(snapshot.frame as u32), now)?;
        self.snapshots.push(snapshot.clone());
        self.frames.transmitted = snapshot.frame;
        Ok(sequence)
    }

    /// The client's command for `frame`. A missing command is replaced by the
    /// newest earlier one (or an idle command) so the simulation keeps going.
    pub fn get_user_command(&mut self, frame: i32) -> UserCommand {
        if frame > self.frames.requested {
            self.frames.requested = frame;
        }

        if let Some(command) = self.commands.get(frame) {
            return *command;
        }

        let fallback = self.commands.nearest_at_or_before(frame).map(|command| UserCommand {
            frame,
            ..*command
        });
        if self.commands.latest_frame().is_some() {
            log::warn!(
                "Session {}: no command for frame {}, reusing last known input",
                self.id,
                frame
            );
        }
        fallback.unwrap_or_else(|| UserCommand::idle(frame))
    }

    /// Interpolated world at fractional frame `time`. Falls back to the newest
    /// snapshot when nothing at or before `time` is buffered. Returns false
    /// only when no snapshot has arrived at all.
    pub fn get_snapshot(&mut self, time: f64, dst: &mut Snapshot) -> bool {
        let frame = time.floor() as i32;
        if frame > self.frames.requested {
            self.frames.requested = frame;
        }

        if self.snapshots.lerp_snapshot(time, dst) {
            if !self.snapshots.contains(frame) {
                log::warn!(
                    "Session {}: snapshot {} missing, holding frame {}",
                    self.id,
                    frame,
                    dst.frame
                );
            }
            return true;
        }

        match self.snapshots.latest() {
            Some(latest) => {
                log::warn!(
                    "Session {}: no snapshot at or before {:.2}, using {}",
                    self.id,
                    time,
                    latest.frame
                );
                dst.clone_from(latest);
                true
            }
            None => false,
        }
    }

    /// Closes the transport and releases the channel. The session cannot be
    /// reopened.
    pub fn close(&mut self) {
        if self.state != SessionState::Disconnected {
            log::info!("Session {} closed", self.id);
        }
        self.release();
    }

    fn release(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            channel.close();
        }
        self.state = SessionState::Disconnected;
    }
}
