//! Async driver: pumps transport events, speed ticks and cancellation into a
//! `Transfer` until it finishes.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use ferry_transfer::{Bundle, State, Transfer, TransferChange, TransferConfig, TransportEvent};

use crate::transport::{EventReceiver, TcpTransport};

/// How long to wait for the final packet to be flushed after the transfer
/// has finished.
pub const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Run `transfer` to a terminal state, calling `on_change` for every change
/// notification in order. Returns the finished transfer.
pub async fn run_transfer<F>(
    mut transfer: Transfer,
    mut events: EventReceiver,
    cancel: CancellationToken,
    mut on_change: F,
) -> Transfer
where
    F: FnMut(&Transfer, TransferChange),
{
    let mut ticker = tokio::time::interval(transfer.speed_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        while let Some(change) = transfer.poll_change() {
            // Sampling starts at InProgress; align the period with it.
            if change == TransferChange::State(State::InProgress) {
                ticker.reset();
            }
            on_change(&transfer, change);
        }
        if transfer.is_finished() {
            break;
        }

        tokio::select! {
            event = events.recv() => match event {
                Some(event) => transfer.handle(event),
                None => transfer.handle(TransportEvent::Error("transport closed".into())),
            },
            _ = ticker.tick() => transfer.tick(Instant::now()),
            _ = cancel.cancelled() => {
                debug!(transfer_id = %transfer.id(), "cancel requested");
                transfer.cancel();
            }
        }
    }

    // Let the transport flush the final Success / Error packet.
    let drained = tokio::time::timeout(CLOSE_GRACE, async {
        while events.recv().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        warn!(transfer_id = %transfer.id(), "transport did not close in time");
    }

    transfer
}

/// Dial `addr` and send `bundle`.
pub async fn send_bundle<F>(
    config: TransferConfig,
    addr: SocketAddr,
    bundle: Bundle,
    cancel: CancellationToken,
    on_change: F,
) -> Transfer
where
    F: FnMut(&Transfer, TransferChange),
{
    let (transport, events) = TcpTransport::dialer();
    let transfer = Transfer::sending(config, addr.to_string(), addr, Box::new(transport), bundle);
    run_transfer(transfer, events, cancel, on_change).await
}

/// Change callback that reports through `tracing`.
pub fn log_change(transfer: &Transfer, change: TransferChange) {
    let id = transfer.id();
    match change {
        TransferChange::DeviceName(name) => info!(transfer_id = %id, "peer is {:?}", name),
        TransferChange::Progress(progress) => {
            debug!(transfer_id = %id, progress, "progress {}%", progress)
        }
        TransferChange::Speed(speed) => {
            debug!(transfer_id = %id, speed, "speed {}/s", format_bytes(speed))
        }
        TransferChange::State(State::Failed) => {}
        TransferChange::State(state) => info!(transfer_id = %id, "transfer {}", state),
        TransferChange::Error(message) => warn!(transfer_id = %id, "transfer failed: {}", message),
    }
}

/// Human-readable byte count, e.g. `1.5 MB`.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }
}
