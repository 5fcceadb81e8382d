//! TCP transport for the transfer engine.
//!
//! The engine calls `Transport` methods synchronously, so `TcpTransport` only
//! queues commands. A per-connection task owns the socket: it dials (or wraps
//! an accepted stream), writes queued frames in order and reports each one
//! with `Flushed`, and a reader task forwards received bytes as `Data`.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use ferry_transfer::{Transport, TransportEvent};

/// 4 MB socket buffers for throughput.
const SOCKET_BUF_SIZE: usize = 4 * 1024 * 1024;

const READ_BUF_SIZE: usize = 64 * 1024;

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Error reported when the peer closes the connection first.
pub const CLOSED_BY_PEER: &str = "connection closed by peer";

enum Command {
    Connect(SocketAddr),
    Send(Bytes),
    Close,
}

pub type EventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

/// Handle given to the engine. Must be created inside a tokio runtime.
pub struct TcpTransport {
    commands: mpsc::UnboundedSender<Command>,
}

impl TcpTransport {
    /// Transport that dials once the engine asks it to connect.
    pub fn dialer() -> (Self, EventReceiver) {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        tokio::spawn(dial(commands_rx, events_tx));
        (Self { commands: commands_tx }, events_rx)
    }

    /// Transport over a stream that is already connected.
    pub fn accepted(stream: TcpStream) -> (Self, EventReceiver) {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_connection(stream, commands_rx, events_tx));
        (Self { commands: commands_tx }, events_rx)
    }

    fn command(&self, command: Command) {
        // A send error means the connection task is gone and has already
        // reported why.
        let _ = self.commands.send(command);
    }
}

impl Transport for TcpTransport {
    fn connect(&mut self, addr: SocketAddr) {
        self.command(Command::Connect(addr));
    }

    fn send(&mut self, frame: Bytes) {
        self.command(Command::Send(frame));
    }

    fn close(&mut self) {
        self.command(Command::Close);
    }
}

/// Set socket options for throughput.
pub fn tune(stream: &TcpStream) -> io::Result<()> {
    let sock_ref = socket2::SockRef::from(stream);
    sock_ref.set_nodelay(true)?;
    sock_ref.set_send_buffer_size(SOCKET_BUF_SIZE)?;
    sock_ref.set_recv_buffer_size(SOCKET_BUF_SIZE)?;
    Ok(())
}

async fn dial(
    mut commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    let addr = loop {
        match commands.recv().await {
            Some(Command::Connect(addr)) => break addr,
            Some(Command::Close) | None => return,
            Some(Command::Send(_)) => {
                warn!("dropping frame queued before connect");
            }
        }
    };

    let stream = match tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            let _ = events.send(TransportEvent::Error(format!(
                "unable to connect to {}: {}",
                addr, e
            )));
            return;
        }
        Err(_) => {
            let _ = events.send(TransportEvent::Error(format!(
                "unable to connect to {}: timed out",
                addr
            )));
            return;
        }
    };

    debug!("connected to {}", addr);
    let _ = events.send(TransportEvent::Connected);
    run_connection(stream, commands, events).await;
}

async fn run_connection(
    stream: TcpStream,
    mut commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    if let Err(e) = tune(&stream) {
        warn!("unable to set socket options: {}", e);
    }

    let (mut reader, mut writer) = stream.into_split();

    let read_events = events.clone();
    let read_handle = tokio::spawn(async move {
        let mut buf = vec![0u8; READ_BUF_SIZE];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) => {
                    let _ = read_events.send(TransportEvent::Error(CLOSED_BY_PEER.into()));
                    break;
                }
                Ok(n) => {
                    let data = Bytes::copy_from_slice(&buf[..n]);
                    if read_events.send(TransportEvent::Data(data)).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    let _ = read_events.send(TransportEvent::Error(e.to_string()));
                    break;
                }
            }
        }
    });

    // Frames are written strictly in order; each write completes before the next.
    while let Some(command) = commands.recv().await {
        match command {
            Command::Send(frame) => {
                if let Err(e) = writer.write_all(&frame).await {
                    let _ = events.send(TransportEvent::Error(e.to_string()));
                    break;
                }
                let _ = events.send(TransportEvent::Flushed);
            }
            Command::Close => {
                if let Err(e) = writer.shutdown().await {
                    debug!("shutdown failed: {}", e);
                }
                break;
            }
            Command::Connect(addr) => {
                warn!("ignoring connect to {}: already connected", addr);
            }
        }
    }

    read_handle.abort();
}
