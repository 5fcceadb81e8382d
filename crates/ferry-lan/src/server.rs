//! Receive server: accepts TCP connections and runs one receiving transfer
//! per connection.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use ferry_transfer::{HandlerRegistry, Transfer, TransferChange, TransferConfig};

use crate::driver::{log_change, run_transfer};
use crate::transport::{EventReceiver, TcpTransport};

pub struct TransferServer {
    listener: TcpListener,
    config: TransferConfig,
    registry: Arc<HandlerRegistry>,
}

impl TransferServer {
    pub async fn bind(
        addr: SocketAddr,
        config: TransferConfig,
        registry: HandlerRegistry,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("listening for transfers on {}", listener.local_addr()?);
        Ok(Self {
            listener,
            config,
            registry: Arc::new(registry),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Wait for the next connection and set up its receiving transfer.
    pub async fn accept(&self) -> io::Result<(Transfer, EventReceiver)> {
        let (stream, addr) = self.listener.accept().await?;
        info!("incoming transfer from {}", addr);
        Ok(self.receive_on(stream))
    }

    /// Accept a single connection and run its transfer to completion.
    pub async fn accept_one<F>(&self, cancel: CancellationToken, on_change: F) -> io::Result<Transfer>
    where
        F: FnMut(&Transfer, TransferChange),
    {
        let (transfer, events) = self.accept().await?;
        Ok(run_transfer(transfer, events, cancel, on_change).await)
    }

    fn receive_on(&self, stream: TcpStream) -> (Transfer, EventReceiver) {
        let (transport, events) = TcpTransport::accepted(stream);
        let transfer =
            Transfer::receiving(self.config.clone(), Box::new(transport), self.registry.clone());
        (transfer, events)
    }

    /// Accept connections until `cancel` fires, running transfers concurrently.
    /// Cancelling also cancels every active transfer; `run` returns once they
    /// have all finished.
    pub async fn run<F>(self, cancel: CancellationToken, on_finished: F)
    where
        F: Fn(&Transfer) + Send + Sync + 'static,
    {
        let on_finished = Arc::new(on_finished);
        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        info!("incoming transfer from {}", addr);
                        let (transfer, events) = self.receive_on(stream);
                        let cancel = cancel.child_token();
                        let on_finished = on_finished.clone();
                        tasks.spawn(async move {
                            let transfer = run_transfer(transfer, events, cancel, log_change).await;
                            on_finished(&transfer);
                        });
                    }
                    Err(e) => {
                        error!("accept error: {}", e);
                    }
                },
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
                _ = cancel.cancelled() => break,
            }
        }

        while tasks.join_next().await.is_some() {}
        info!("transfer server stopped");
    }
}
