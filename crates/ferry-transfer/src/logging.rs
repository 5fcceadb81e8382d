/// Transfer logging trait for structured lifecycle logs.
///
/// The engine reports milestones (connection, headers, items, completion,
/// failure) as `TransferLog` entries. Embedders pick where they go.

use std::fmt;

use uuid::Uuid;

/// Structured log entry for a transfer.
#[derive(Debug, Clone)]
pub struct TransferLog {
    pub component: &'static str,
    pub transfer_id: Uuid,
    pub event: TransferEvent,
}

/// Transfer events that can be logged.
#[derive(Debug, Clone)]
pub enum TransferEvent {
    /// Sender: dialing the peer
    Connecting { addr: String },
    /// Sender: transport connected
    Connected,
    /// Transfer header sent or received
    Header {
        device_name: String,
        bytes_total: u64,
        item_count: u32,
    },
    /// Item header sent or received
    ItemStarted {
        index: u32,
        name: String,
        item_type: String,
        size: u64,
    },
    /// Item fully sent or written
    ItemCompleted { index: u32, name: String },
    /// Packet that the current state does not accept
    UnexpectedPacket { kind: String },
    /// Transfer succeeded
    TransferComplete { total_bytes: u64, duration_ms: u64 },
    /// Transfer failed
    Error { message: String, notified_peer: bool },
}

impl fmt::Display for TransferEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting { addr } => write!(f, "connecting addr={}", addr),
            Self::Connected => write!(f, "connected"),
            Self::Header { device_name, bytes_total, item_count } => {
                write!(f, "header device={:?} bytes={} items={}", device_name, bytes_total, item_count)
            }
            Self::ItemStarted { index, name, item_type, size } => {
                write!(f, "item_started idx={} name={:?} type={} size={}", index, name, item_type, size)
            }
            Self::ItemCompleted { index, name } => {
                write!(f, "item_completed idx={} name={:?}", index, name)
            }
            Self::UnexpectedPacket { kind } => write!(f, "unexpected_packet kind={}", kind),
            Self::TransferComplete { total_bytes, duration_ms } => {
                write!(f, "transfer_complete bytes={} duration_ms={}", total_bytes, duration_ms)
            }
            Self::Error { message, notified_peer } => {
                write!(f, "error notified_peer={}: {}", notified_peer, message)
            }
        }
    }
}

/// Trait for transfer logging. Implementations can write to tracing,
/// collect entries, or discard them.
pub trait TransferLogger: Send + Sync {
    fn log(&self, entry: TransferLog);
}

/// Logger that uses the `tracing` crate.
pub struct TracingLogger;

impl TransferLogger for TracingLogger {
    fn log(&self, entry: TransferLog) {
        let TransferLog {
            component,
            transfer_id,
            event,
        } = entry;
        match event {
            TransferEvent::ItemStarted { .. } | TransferEvent::ItemCompleted { .. } => {
                tracing::debug!(component, %transfer_id, "{}", event)
            }
            TransferEvent::Error { .. } | TransferEvent::UnexpectedPacket { .. } => {
                tracing::warn!(component, %transfer_id, "{}", event)
            }
            _ => tracing::info!(component, %transfer_id, "{}", event),
        }
    }
}

/// No-op logger that discards all log entries.
pub struct NullLogger;

impl TransferLogger for NullLogger {
    fn log(&self, _entry: TransferLog) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_display() {
        let event = TransferEvent::Header {
            device_name: "laptop".into(),
            bytes_total: 4,
            item_count: 1,
        };
        assert_eq!(event.to_string(), "header device=\"laptop\" bytes=4 items=1");

        let event = TransferEvent::Error {
            message: "transfer cancelled".into(),
            notified_peer: true,
        };
        assert_eq!(event.to_string(), "error notified_peer=true: transfer cancelled");
    }

    #[test]
    fn test_loggers_accept_entries() {
        let entry = TransferLog {
            component: "sender",
            transfer_id: Uuid::new_v4(),
            event: TransferEvent::Connected,
        };
        NullLogger.log(entry.clone());
        TracingLogger.log(entry);
    }
}
