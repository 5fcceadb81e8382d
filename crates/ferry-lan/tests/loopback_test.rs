use std::fs;
use std::net::SocketAddr;
use std::sync::Arc;

use ferry_fs::{FilesystemHandler, build_bundle};
use ferry_lan::{TransferServer, send_bundle};
use ferry_transfer::{
    Bundle, HandlerRegistry, MemoryHandler, MemoryItem, State, TYPE_FILE, Transfer,
    TransferChange, TransferConfig,
};
use tokio_util::sync::CancellationToken;

fn config(name: &str) -> TransferConfig {
    TransferConfig {
        device_name: name.into(),
        block_size: 1024,
        ..TransferConfig::default()
    }
}

fn memory_registry() -> (HandlerRegistry, MemoryHandler) {
    let handler = MemoryHandler::new();
    let mut registry = HandlerRegistry::new();
    registry.add(TYPE_FILE, Arc::new(handler.clone()));
    (registry, handler)
}

async fn server(registry: HandlerRegistry) -> (TransferServer, SocketAddr) {
    let server = TransferServer::bind("127.0.0.1:0".parse().unwrap(), config("desktop"), registry)
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    (server, addr)
}

/// Run one receiver and one sender against each other.
async fn exchange(
    registry: HandlerRegistry,
    bundle: Bundle,
    cancel_sender: bool,
) -> (Transfer, Transfer, Vec<TransferChange>) {
    let (server, addr) = server(registry).await;
    let receiving = tokio::spawn(async move {
        server
            .accept_one(CancellationToken::new(), |_, _| {})
            .await
            .unwrap()
    });

    let cancel = CancellationToken::new();
    if cancel_sender {
        cancel.cancel();
    }
    let mut changes = Vec::new();
    let sending = send_bundle(config("laptop"), addr, bundle, cancel, |_, change| {
        changes.push(change)
    })
    .await;

    (sending, receiving.await.unwrap(), changes)
}

#[tokio::test]
async fn test_memory_items_over_tcp() {
    let (registry, handler) = memory_registry();
    let mut bundle = Bundle::new();
    bundle.add(Box::new(MemoryItem::new("hello.txt", b"hello world".to_vec())));
    bundle.add(Box::new(MemoryItem::new("empty.txt", Vec::new())));
    bundle.add(Box::new(MemoryItem::new("blob.bin", vec![42u8; 10_000])));

    let (sending, receiving, changes) = exchange(registry, bundle, false).await;

    assert_eq!(sending.state(), State::Succeeded, "{:?}", sending.error());
    assert_eq!(receiving.state(), State::Succeeded, "{:?}", receiving.error());
    assert_eq!(receiving.device_name(), "laptop");
    assert_eq!(receiving.stats().bytes_transferred, 10_011);
    assert_eq!(sending.progress(), 100);

    let received = handler.received();
    assert_eq!(received.len(), 3);
    assert_eq!(received[0].data, b"hello world");
    assert!(received[1].data.is_empty());
    assert_eq!(received[2].data, vec![42u8; 10_000]);

    assert_eq!(changes[0], TransferChange::DeviceName(sending.device_name().to_string()));
    assert_eq!(changes[1], TransferChange::State(State::InProgress));
    assert_eq!(changes.last(), Some(&TransferChange::State(State::Succeeded)));
}

#[tokio::test]
async fn test_directory_tree_over_tcp() {
    let source = tempfile::tempdir().unwrap();
    let dest = tempfile::tempdir().unwrap();
    let photos = source.path().join("photos");
    fs::create_dir_all(photos.join("2024")).unwrap();
    fs::write(photos.join("a.jpg"), vec![1u8; 5000]).unwrap();
    fs::write(photos.join("2024/b.jpg"), b"bbb").unwrap();
    fs::create_dir(photos.join("empty")).unwrap();

    let bundle = build_bundle(&[&photos]).unwrap();
    let (sending, receiving, _) =
        exchange(FilesystemHandler::registry(dest.path()), bundle, false).await;

    assert_eq!(sending.state(), State::Succeeded, "{:?}", sending.error());
    assert_eq!(receiving.state(), State::Succeeded, "{:?}", receiving.error());
    assert_eq!(
        fs::read(dest.path().join("photos/a.jpg")).unwrap(),
        vec![1u8; 5000]
    );
    assert_eq!(fs::read(dest.path().join("photos/2024/b.jpg")).unwrap(), b"bbb");
    assert!(dest.path().join("photos/empty").is_dir());
}

#[tokio::test]
async fn test_receiver_rejection_reaches_sender() {
    let (registry, handler) = memory_registry();
    let mut bundle = Bundle::new();
    bundle.add(Box::new(MemoryItem::with_type("symlink", "link", Vec::new())));

    let (sending, receiving, _) = exchange(registry, bundle, false).await;

    assert_eq!(receiving.state(), State::Failed);
    assert_eq!(receiving.error(), Some("unrecognized item type \"symlink\""));
    assert_eq!(sending.state(), State::Failed);
    assert_eq!(sending.error(), receiving.error());
    assert!(handler.received().is_empty());
}

#[tokio::test]
async fn test_cancelled_sender_notifies_receiver() {
    let (registry, _) = memory_registry();
    let mut bundle = Bundle::new();
    bundle.add(Box::new(MemoryItem::new("a.txt", b"data".to_vec())));

    let (sending, receiving, _) = exchange(registry, bundle, true).await;

    assert_eq!(sending.state(), State::Failed);
    assert_eq!(sending.error(), Some("transfer cancelled"));
    assert_eq!(receiving.state(), State::Failed);
    assert_eq!(receiving.error(), Some("transfer cancelled"));
}

#[tokio::test]
async fn test_connection_refused() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut bundle = Bundle::new();
    bundle.add(Box::new(MemoryItem::new("a.txt", b"data".to_vec())));
    let sending =
        send_bundle(config("laptop"), addr, bundle, CancellationToken::new(), |_, _| {}).await;

    assert_eq!(sending.state(), State::Failed);
    assert!(sending.error().unwrap().starts_with("unable to connect"));
}
