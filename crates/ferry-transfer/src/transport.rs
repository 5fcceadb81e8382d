/// The byte channel beneath a transfer.
///
/// The engine never performs I/O itself. It calls into a `Transport` to
/// dial, queue frames and close, and the owner of the transfer feeds the
/// transport's events back in through `Transfer::handle`.

use std::net::SocketAddr;

use bytes::Bytes;

/// Something that happened on the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// An outbound connection was established.
    Connected,
    /// The previously queued frame was fully written.
    Flushed,
    /// Bytes arrived from the peer. Frame boundaries are not preserved.
    Data(Bytes),
    /// The connection failed (reset, timeout, closed by peer, ...).
    Error(String),
}

pub trait Transport: Send {
    /// Begin dialing `addr`. Success is reported with `TransportEvent::Connected`.
    fn connect(&mut self, addr: SocketAddr);

    /// Queue one encoded frame for transmission.
    fn send(&mut self, frame: Bytes);

    /// Flush queued frames, then close the connection.
    fn close(&mut self);
}
