/// Transfer state machine shared by both roles.
///
/// ```text
/// TransferHeader -> ItemHeader -> [ItemContent] -> ItemHeader -> ... -> Finished
///                   (zero-size items skip ItemContent)
/// ```
///
/// A `Transfer` is driven entirely by events: transport notifications fed
/// through `handle`, periodic `tick`s for the speed sampler, and `cancel`.
/// It never blocks and never returns an error to the caller; every failure
/// lands in `state() == Failed` with a message in `error()`.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::error::TransferError;
use crate::item::{Bundle, HandlerRegistry};
use crate::logging::{TransferEvent, TransferLog, TransferLogger};
use crate::protocol::{BLOCK_SIZE, MAX_BLOCK_SIZE, Packet, PacketDecoder, PacketType};
use crate::receiver::ReceiveSide;
use crate::sender::SendSide;
use crate::stats::{SPEED_INTERVAL, SpeedSampler, TransferStats};
use crate::transport::{Transport, TransportEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Send,
    Receive,
}

/// Overall transfer state. `Succeeded` and `Failed` are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Sender is dialing the peer.
    Connecting,
    InProgress,
    Succeeded,
    Failed,
}

impl State {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Connecting => "connecting",
            Self::InProgress => "in progress",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Position within the header / item / content sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolState {
    TransferHeader,
    ItemHeader,
    ItemContent,
    Finished,
}

/// Change notifications, queued in the order they happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferChange {
    DeviceName(String),
    Progress(u8),
    /// Bytes per second.
    Speed(u64),
    State(State),
    Error(String),
}

/// Configuration for a transfer.
#[derive(Clone)]
pub struct TransferConfig {
    /// Name announced to the peer in the transfer header.
    pub device_name: String,
    /// Content bytes read per Binary packet. Clamped to `1..=MAX_BLOCK_SIZE`.
    pub block_size: usize,
    pub speed_interval: Duration,
    pub logger: Option<Arc<dyn TransferLogger>>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            device_name: "ferry".into(),
            block_size: BLOCK_SIZE,
            speed_interval: SPEED_INTERVAL,
            logger: None,
        }
    }
}

/// State shared by both roles: counters, notifications and the transport.
pub(crate) struct Core {
    pub id: Uuid,
    pub direction: Direction,
    pub transport: Box<dyn Transport>,
    pub decoder: PacketDecoder,
    pub state: State,
    pub protocol_state: ProtocolState,
    pub stats: TransferStats,
    pub progress: u8,
    pub speed: SpeedSampler,
    pub device_name: String,
    pub error: Option<String>,
    pub changes: VecDeque<TransferChange>,
    pub logger: Option<Arc<dyn TransferLogger>>,
    pub started: Instant,
    pub in_flight: bool,
}

impl Core {
    fn new(direction: Direction, transport: Box<dyn Transport>, config: &TransferConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            direction,
            transport,
            decoder: PacketDecoder::new(),
            state: State::Connecting,
            protocol_state: ProtocolState::TransferHeader,
            stats: TransferStats::default(),
            progress: 0,
            speed: SpeedSampler::new(config.speed_interval),
            device_name: String::new(),
            error: None,
            changes: VecDeque::new(),
            logger: config.logger.clone(),
            started: Instant::now(),
            in_flight: false,
        }
    }

    pub fn log(&self, event: TransferEvent) {
        if let Some(ref logger) = self.logger {
            let component = match self.direction {
                Direction::Send => "sender",
                Direction::Receive => "receiver",
            };
            logger.log(TransferLog {
                component,
                transfer_id: self.id,
                event,
            });
        }
    }

    pub fn set_state(&mut self, state: State) {
        if self.state != state {
            self.state = state;
            self.changes.push_back(TransferChange::State(state));
        }
    }

    pub fn set_device_name(&mut self, name: String) {
        if self.device_name != name {
            self.device_name = name.clone();
            self.changes.push_back(TransferChange::DeviceName(name));
        }
    }

    /// Account for content bytes moved and notify if the percentage changed.
    pub fn add_bytes(&mut self, count: u64) {
        self.stats.bytes_transferred += count;
        let progress = self.stats.progress();
        if progress != self.progress {
            self.progress = progress;
            self.changes.push_back(TransferChange::Progress(progress));
        }
    }

    pub fn send_packet(&mut self, packet: Packet) -> Result<(), TransferError> {
        let frame = packet.encode().map_err(TransferError::Outgoing)?;
        self.transport.send(frame);
        self.in_flight = true;
        Ok(())
    }

    /// Fail the transfer. Later packets are never processed.
    pub fn set_error(&mut self, message: String, send_to_peer: bool) {
        if self.state.is_terminal() {
            return;
        }
        if send_to_peer {
            if let Ok(frame) = Packet::error(&message).encode() {
                self.transport.send(frame);
            }
        }
        self.log(TransferEvent::Error {
            message: message.clone(),
            notified_peer: send_to_peer,
        });

        self.error = Some(message.clone());
        self.changes.push_back(TransferChange::Error(message));
        self.set_state(State::Failed);
        self.finish();
    }

    pub fn set_success(&mut self, send_to_peer: bool) {
        if self.state.is_terminal() {
            return;
        }
        if send_to_peer {
            if let Ok(frame) = Packet::success().encode() {
                self.transport.send(frame);
            }
        }
        self.log(TransferEvent::TransferComplete {
            total_bytes: self.stats.bytes_transferred,
            duration_ms: self.started.elapsed().as_millis() as u64,
        });

        self.set_state(State::Succeeded);
        self.finish();
    }

    fn finish(&mut self) {
        self.speed.stop();
        self.transport.close();
        self.protocol_state = ProtocolState::Finished;
    }
}

enum Role {
    Sending(SendSide),
    Receiving(ReceiveSide),
}

impl Role {
    /// Close whatever item is open. Content already written stays in place.
    fn release_item(&mut self) {
        match self {
            Self::Sending(sender) => sender.release(),
            Self::Receiving(receiver) => receiver.release(),
        }
    }
}

/// One transfer in one direction over one transport.
pub struct Transfer {
    core: Core,
    role: Role,
}

impl Transfer {
    /// Create a transfer that sends `bundle` and start dialing `addr`.
    ///
    /// `peer_name` is the display name of the receiving device.
    pub fn sending(
        config: TransferConfig,
        peer_name: impl Into<String>,
        addr: SocketAddr,
        transport: Box<dyn Transport>,
        bundle: Bundle,
    ) -> Self {
        let mut core = Core::new(Direction::Send, transport, &config);
        core.set_device_name(peer_name.into());
        let item_count = bundle.item_count();
        let count = u32::try_from(item_count);
        core.stats = TransferStats::new(bundle.total_size(), count.unwrap_or(u32::MAX));

        let block_size = config.block_size.clamp(1, MAX_BLOCK_SIZE);
        let sender = SendSide::new(bundle, config.device_name, block_size);
        let mut transfer = Self {
            core,
            role: Role::Sending(sender),
        };

        if count.is_err() {
            transfer.fail(TransferError::TooManyItems(item_count));
            return transfer;
        }
        transfer.core.log(TransferEvent::Connecting {
            addr: addr.to_string(),
        });
        transfer.core.transport.connect(addr);
        transfer
    }

    /// Create a transfer that receives over an already connected transport.
    pub fn receiving(
        config: TransferConfig,
        transport: Box<dyn Transport>,
        registry: Arc<HandlerRegistry>,
    ) -> Self {
        let mut core = Core::new(Direction::Receive, transport, &config);
        core.state = State::InProgress;
        core.speed.start(Instant::now(), 0);

        Self {
            core,
            role: Role::Receiving(ReceiveSide::new(registry)),
        }
    }

    /// Feed one transport event into the state machine.
    pub fn handle(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connected => self.on_connected(),
            TransportEvent::Flushed => self.on_flushed(),
            TransportEvent::Data(data) => self.on_data(&data),
            TransportEvent::Error(message) => self.fail(TransferError::Transport(message)),
        }
    }

    /// Abort the transfer and tell the peer. No-op once finished.
    pub fn cancel(&mut self) {
        if self.core.state.is_terminal() {
            return;
        }
        self.fail(TransferError::Cancelled);
    }

    /// Drive the speed sampler. Call once per `speed_interval()`; each call
    /// samples over the time since the previous one.
    pub fn tick(&mut self, now: Instant) {
        if let Some(speed) = self.core.speed.sample(now, self.core.stats.bytes_transferred) {
            self.core.changes.push_back(TransferChange::Speed(speed));
        }
    }

    /// Next queued change notification.
    pub fn poll_change(&mut self) -> Option<TransferChange> {
        self.core.changes.pop_front()
    }

    /// All queued change notifications, oldest first.
    pub fn drain_changes(&mut self) -> impl Iterator<Item = TransferChange> + '_ {
        self.core.changes.drain(..)
    }

    pub fn id(&self) -> Uuid {
        self.core.id
    }

    pub fn direction(&self) -> Direction {
        self.core.direction
    }

    pub fn state(&self) -> State {
        self.core.state
    }

    pub fn protocol_state(&self) -> ProtocolState {
        self.core.protocol_state
    }

    /// Whole-number progress, 0 - 100.
    pub fn progress(&self) -> u8 {
        self.core.progress
    }

    /// Bytes per second at the last sample.
    pub fn speed(&self) -> u64 {
        self.core.speed.speed()
    }

    pub fn speed_interval(&self) -> Duration {
        self.core.speed.interval()
    }

    pub fn stats(&self) -> TransferStats {
        self.core.stats
    }

    pub fn device_name(&self) -> &str {
        &self.core.device_name
    }

    pub fn error(&self) -> Option<&str> {
        self.core.error.as_deref()
    }

    /// True once the transfer has succeeded or failed.
    pub fn is_finished(&self) -> bool {
        self.core.state.is_terminal()
    }

    fn on_connected(&mut self) {
        if self.core.state != State::Connecting {
            return;
        }
        self.core.log(TransferEvent::Connected);
        self.core.set_state(State::InProgress);
        self.core
            .speed
            .start(Instant::now(), self.core.stats.bytes_transferred);
        self.send_next();
    }

    fn on_flushed(&mut self) {
        if !self.core.in_flight {
            return;
        }
        self.core.in_flight = false;
        if self.core.state == State::InProgress {
            self.send_next();
        }
    }

    fn send_next(&mut self) {
        let result = match &mut self.role {
            Role::Sending(sender) => sender.step(&mut self.core),
            Role::Receiving(_) => Ok(()),
        };
        if let Err(err) = result {
            self.fail(err);
        }
    }

    fn on_data(&mut self, data: &[u8]) {
        if self.core.state.is_terminal() {
            return;
        }
        self.core.decoder.extend(data);
        loop {
            match self.core.decoder.next_packet() {
                Ok(Some(packet)) => {
                    self.process(packet);
                    if self.core.state.is_terminal() {
                        return;
                    }
                }
                Ok(None) => return,
                Err(err) => {
                    self.fail(err.into());
                    return;
                }
            }
        }
    }

    fn process(&mut self, packet: Packet) {
        if packet.kind == PacketType::Error {
            let mut message = packet.text();
            if message.is_empty() {
                message = "transfer aborted by peer".into();
            }
            self.fail(TransferError::Peer(message));
            return;
        }

        let result = match &mut self.role {
            Role::Sending(_) => {
                // The receiver's Success is the only packet a sender expects.
                if self.core.protocol_state == ProtocolState::Finished
                    && packet.kind == PacketType::Success
                {
                    self.core.set_success(false);
                    Ok(())
                } else {
                    Err(TransferError::UnexpectedPacket(packet.kind))
                }
            }
            Role::Receiving(receiver) => receiver.process(&mut self.core, packet),
        };

        if let Err(err) = result {
            if let TransferError::UnexpectedPacket(kind) = &err {
                self.core.log(TransferEvent::UnexpectedPacket {
                    kind: kind.to_string(),
                });
            }
            self.fail(err);
        }
    }

    fn fail(&mut self, err: TransferError) {
        if self.core.state.is_terminal() {
            return;
        }
        self.role.release_item();
        let notify = err.notify_peer();
        self.core.set_error(err.to_string(), notify);
    }
}

impl std::fmt::Debug for Transfer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transfer")
            .field("id", &self.core.id)
            .field("direction", &self.core.direction)
            .field("state", &self.core.state)
            .field("protocol_state", &self.core.protocol_state)
            .field("stats", &self.core.stats)
            .field("error", &self.core.error)
            .finish()
    }
}
