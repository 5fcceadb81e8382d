/// Failure taxonomy for a transfer.
///
/// Every variant ends the transfer. The `Display` text is what the transfer
/// reports as its error and what an outbound `Error` packet carries.

use crate::item::ItemError;
use crate::protocol::{FrameError, PacketType};

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    // Local resource errors
    #[error("unable to open \"{name}\": {source}")]
    ItemOpen { name: String, source: ItemError },
    #[error("unable to read \"{name}\": {source}")]
    ItemRead { name: String, source: ItemError },
    #[error("unable to write \"{name}\": {source}")]
    ItemWrite { name: String, source: ItemError },
    #[error("unable to close \"{name}\": {source}")]
    ItemClose { name: String, source: ItemError },
    #[error("unable to create item \"{name}\": {source}")]
    ItemCreate { name: String, source: ItemError },
    #[error("unable to encode {what}: {source}")]
    Encode {
        what: &'static str,
        source: serde_json::Error,
    },
    #[error("unable to send packet: {0}")]
    Outgoing(#[source] FrameError),
    #[error("too many items to send: {0}")]
    TooManyItems(usize),

    // Protocol errors
    #[error("unable to parse {what}: {source}")]
    Malformed {
        what: &'static str,
        source: serde_json::Error,
    },
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("protocol error - unexpected packet ({0})")]
    UnexpectedPacket(PacketType),
    #[error("unrecognized item type \"{0}\"")]
    UnrecognizedItemType(String),
    #[error("size mismatch for \"{name}\": {received} bytes received, {expected} announced")]
    SizeMismatch {
        name: String,
        expected: u64,
        received: u64,
    },

    // Remote and transport errors
    #[error("{0}")]
    Peer(String),
    #[error("{0}")]
    Transport(String),

    #[error("transfer cancelled")]
    Cancelled,
}

impl TransferError {
    /// Whether the peer should be told about this failure with an `Error` packet.
    ///
    /// False when the error came from the peer or the connection is unusable.
    pub fn notify_peer(&self) -> bool {
        !matches!(
            self,
            Self::Frame(_) | Self::Peer(_) | Self::Transport(_) | Self::TooManyItems(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notify_peer() {
        assert!(TransferError::Cancelled.notify_peer());
        assert!(TransferError::UnrecognizedItemType("symlink".into()).notify_peer());
        assert!(!TransferError::Frame(FrameError::ZeroLength).notify_peer());
        assert!(!TransferError::Peer("disk full".into()).notify_peer());
        assert!(!TransferError::Transport("connection reset".into()).notify_peer());
        assert!(TransferError::Outgoing(FrameError::TooLarge(1 << 25)).notify_peer());
        assert!(!TransferError::TooManyItems(usize::MAX).notify_peer());
    }

    #[test]
    fn test_messages() {
        assert_eq!(TransferError::Cancelled.to_string(), "transfer cancelled");
        assert_eq!(
            TransferError::UnrecognizedItemType("symlink".into()).to_string(),
            "unrecognized item type \"symlink\""
        );
        assert_eq!(
            TransferError::UnexpectedPacket(PacketType::Binary).to_string(),
            "protocol error - unexpected packet (binary)"
        );
    }
}
