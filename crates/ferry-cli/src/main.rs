/// Ferry: send files and directories to another device on the local network.
///
/// ```text
/// ferry send <addr> <paths...>              send files / directories
/// ferry receive [--listen] [--dir] [--once] receive into a directory
/// ```
///
/// Configuration comes from `FERRY_*` environment variables (and `.env`);
/// command line flags take precedence. Ctrl-C cancels active transfers and
/// tells the peer.

mod config;

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use ferry_fs::{FilesystemHandler, build_bundle};
use ferry_lan::{TransferServer, format_bytes, log_change, run_transfer, send_bundle};
use ferry_transfer::{State, Transfer};

use crate::config::Config;

#[derive(Parser)]
#[command(name = "ferry", version, about = "Local network file transfer")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Name announced to the peer (overrides FERRY_DEVICE_NAME).
    #[arg(long, global = true)]
    name: Option<String>,

    /// Bytes per content packet (overrides FERRY_BLOCK_SIZE).
    #[arg(long, global = true)]
    block_size: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Send files and directories to a receiving device.
    Send {
        /// Receiver address: `host`, `host:port` or `ip:port`.
        addr: String,
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Receive transfers into a directory.
    Receive {
        /// Address to listen on [default: 0.0.0.0:FERRY_PORT].
        #[arg(long)]
        listen: Option<SocketAddr>,
        /// Destination directory (overrides FERRY_TRANSFER_DIR).
        #[arg(long)]
        dir: Option<PathBuf>,
        /// Exit after the first transfer.
        #[arg(long)]
        once: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ferry=info,ferry_lan=info,ferry_transfer=info".into()),
        )
        .init();

    let cli = Cli::parse();

    // Config
    let mut config = Config::from_env()?;
    if let Some(name) = cli.name {
        config.device_name = name;
    }
    if let Some(block_size) = cli.block_size {
        config.block_size = block_size;
    }
    config.validate()?;

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));

    match cli.command {
        Commands::Send { addr, paths } => send(&config, &addr, &paths, cancel).await,
        Commands::Receive { listen, dir, once } => {
            let listen =
                listen.unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], config.port)));
            let dir = dir.unwrap_or_else(|| config.transfer_dir.clone());
            receive(&config, listen, &dir, once, cancel).await
        }
    }
}

async fn send(
    config: &Config,
    addr: &str,
    paths: &[PathBuf],
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let addr = resolve_addr(addr, config.port).await?;
    let bundle = build_bundle(paths).context("unable to read items to send")?;
    info!(
        "sending {} item(s), {} to {}",
        bundle.item_count(),
        format_bytes(bundle.total_size()),
        addr
    );

    let transfer = send_bundle(config.transfer_config(), addr, bundle, cancel, log_change).await;
    report(&transfer)
}

async fn receive(
    config: &Config,
    listen: SocketAddr,
    dir: &Path,
    once: bool,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("unable to create {}", dir.display()))?;
    info!("saving received items to {}", dir.display());

    let server = TransferServer::bind(
        listen,
        config.transfer_config(),
        FilesystemHandler::registry(dir),
    )
    .await
    .with_context(|| format!("unable to listen on {}", listen))?;

    if once {
        let (transfer, events) = tokio::select! {
            accepted = server.accept() => accepted?,
            _ = cancel.cancelled() => return Ok(()),
        };
        let transfer = run_transfer(transfer, events, cancel, log_change).await;
        return report(&transfer);
    }

    server
        .run(cancel, |transfer| {
            if let Err(e) = report(transfer) {
                warn!("{:#}", e);
            }
        })
        .await;
    Ok(())
}

/// Resolve `host`, `host:port`, `ip` or `ip:port`, using `default_port` when
/// none is given.
async fn resolve_addr(addr: &str, default_port: u16) -> anyhow::Result<SocketAddr> {
    if let Ok(addr) = addr.parse::<SocketAddr>() {
        return Ok(addr);
    }
    if let Ok(ip) = addr.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, default_port));
    }

    let mut found = if addr.contains(':') {
        tokio::net::lookup_host(addr).await.map(|it| it.collect::<Vec<_>>())
    } else {
        tokio::net::lookup_host((addr, default_port))
            .await
            .map(|it| it.collect::<Vec<_>>())
    }
    .with_context(|| format!("unable to resolve {}", addr))?
    .into_iter();

    match found.next() {
        Some(addr) => Ok(addr),
        None => bail!("no addresses found for {}", addr),
    }
}

fn report(transfer: &Transfer) -> anyhow::Result<()> {
    let stats = transfer.stats();
    match transfer.state() {
        State::Succeeded => {
            info!(
                "transfer with {:?} complete: {} item(s), {}",
                transfer.device_name(),
                stats.item_count,
                format_bytes(stats.bytes_transferred)
            );
            Ok(())
        }
        _ => bail!(
            "transfer with {:?} failed: {}",
            transfer.device_name(),
            transfer.error().unwrap_or("unknown error")
        ),
    }
}

async fn cancel_on_signal(cancel: CancellationToken) {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, cancelling..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, cancelling..."),
                }
            }
            Err(e) => {
                warn!("unable to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, cancelling...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, cancelling...");
    }
    cancel.cancel();

    // A second signal while transfers wind down exits immediately.
    if tokio::signal::ctrl_c().await.is_ok() {
        std::process::exit(130);
    }
}
