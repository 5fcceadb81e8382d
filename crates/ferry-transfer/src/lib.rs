/// Ferry Transfer: the transfer protocol engine.
///
/// Moves an ordered bundle of items (files, directories, custom types) from a
/// sender to a receiver over one reliable byte stream:
/// - Length-prefixed packet codec (Success / Error / Json / Binary)
/// - JSON transfer and item headers with decimal-string sizes
/// - Symmetric send/receive state machine with one packet in flight
/// - Whole-percent progress and periodic bytes-per-second sampling
/// - Error propagation to the peer and cancellation
///
/// The engine does no I/O. Drivers own a `Transport`, feed its events into
/// `Transfer::handle` and read back `TransferChange` notifications.

pub mod error;
pub mod header;
pub mod item;
pub mod logging;
pub mod memory;
pub mod protocol;
pub mod stats;
pub mod transfer;
pub mod transport;

mod receiver;
mod sender;


// Re-export key types for convenience.
pub use error::TransferError;
pub use header::{ItemHeader, TYPE_DIRECTORY, TYPE_FILE, TransferHeader};
pub use item::{Bundle, Handler, HandlerRegistry, Item, ItemError, OpenMode};
pub use logging::{NullLogger, TracingLogger, TransferEvent, TransferLog, TransferLogger};
pub use memory::{MemoryHandler, MemoryItem, ReceivedItem};
pub use protocol::{
    BLOCK_SIZE, FrameError, MAX_BLOCK_SIZE, MAX_FRAME_LEN, Packet, PacketDecoder, PacketType,
    encode_packet,
};
pub use stats::{SPEED_INTERVAL, SpeedSampler, TransferStats, progress_percent};
pub use transfer::{Direction, ProtocolState, State, Transfer, TransferChange, TransferConfig};
pub use transport::{Transport, TransportEvent};
