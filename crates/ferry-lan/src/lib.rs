/// Ferry LAN: runs transfers over TCP with tokio.
///
/// - `TcpTransport`: socket-backed `Transport` with one writer task per connection
/// - `run_transfer`: async driver for a single `Transfer`
/// - `TransferServer`: accept loop producing receiving transfers

pub mod driver;
pub mod server;
pub mod transport;

pub use driver::{CLOSE_GRACE, format_bytes, log_change, run_transfer, send_bundle};
pub use server::TransferServer;
pub use transport::{CLOSED_BY_PEER, EventReceiver, TcpTransport, tune};

/// Default TCP port for transfers.
pub const DEFAULT_PORT: u16 = 40818;
