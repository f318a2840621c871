//! End-to-end tests for the QUIC single-use ingress.

use std::{sync::Arc, time::Duration};

use noob_channel_bot::{
    AdminVault, AllocatorConfig, ChannelAllocator, ChaoticStorage, Dispatcher, MemoryStorage,
    NeverReset, NoE2eClient, QuinnTransport, SeededEnv, Storage,
    dispatch::SingleUseCallback,
    rotation::IN_CURRENT_CHANNEL_KEY,
    transport::{MAX_REQUEST_BYTES, insecure_client_config, request_channel},
};
use noob_channel_crypto::ChannelDefinition;
use tempfile::{TempDir, tempdir};

struct Harness<S: Storage> {
    transport: Arc<QuinnTransport>,
    allocator: Arc<ChannelAllocator<SeededEnv, S>>,
    _vault: TempDir,
}

fn start<S: Storage>(store: S) -> Harness<S> {
    start_with(store, QuinnTransport::bind("127.0.0.1:0", None, None).unwrap())
}

fn start_with<S: Storage>(store: S, transport: QuinnTransport) -> Harness<S> {
    let vault = tempdir().unwrap();
    let allocator = Arc::new(
        ChannelAllocator::open(
            store,
            SeededEnv::new(21),
            AdminVault::open(vault.path()).unwrap(),
            AllocatorConfig::default(),
            Box::new(NeverReset::default()),
        )
        .unwrap(),
    );

    let transport = Arc::new(transport);
    let handler: Arc<dyn SingleUseCallback> =
        Arc::new(Dispatcher::new(Arc::clone(&allocator), NoE2eClient));

    let serving = Arc::clone(&transport);
    tokio::spawn(async move { serving.serve(handler).await });

    Harness { transport, allocator, _vault: vault }
}

#[tokio::test(flavor = "multi_thread")]
async fn request_returns_current_channel() {
    let harness = start(MemoryStorage::new());
    let addr = harness.transport.local_addr().unwrap();

    let bytes = request_channel(addr, "localhost", insecure_client_config().unwrap(), b"join")
        .await
        .unwrap();

    let definition = ChannelDefinition::from_bytes(&bytes).unwrap();
    let state = harness.allocator.snapshot().unwrap();
    assert_eq!(definition, state.current_channel);
    assert_eq!(state.occupancy, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn each_request_is_one_join() {
    let harness = start(MemoryStorage::new());
    let addr = harness.transport.local_addr().unwrap();

    for _ in 0..3 {
        request_channel(addr, "localhost", insecure_client_config().unwrap(), b"").await.unwrap();
    }

    assert_eq!(harness.allocator.snapshot().unwrap().occupancy, 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_admission_gets_no_reply() {
    let store = ChaoticStorage::targeted(MemoryStorage::new());
    let harness = start(store.clone());
    let addr = harness.transport.local_addr().unwrap();
    store.fail_writes_to(IN_CURRENT_CHANNEL_KEY);

    let result = request_channel(addr, "localhost", insecure_client_config().unwrap(), b"").await;

    assert!(result.is_err());
    assert_eq!(harness.allocator.snapshot().unwrap().occupancy, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn oversized_request_is_dropped() {
    let harness = start(MemoryStorage::new());
    let addr = harness.transport.local_addr().unwrap();
    let payload = vec![0u8; MAX_REQUEST_BYTES + 1];

    let result =
        request_channel(addr, "localhost", insecure_client_config().unwrap(), &payload).await;

    assert!(result.is_err());
    assert_eq!(harness.allocator.snapshot().unwrap().occupancy, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn unfinished_request_is_dropped_after_read_timeout() {
    let transport = QuinnTransport::bind("127.0.0.1:0", None, None)
        .unwrap()
        .with_read_timeout(Duration::from_millis(200));
    let harness = start_with(MemoryStorage::new(), transport);
    let addr = harness.transport.local_addr().unwrap();

    let mut endpoint = quinn::Endpoint::client("127.0.0.1:0".parse().unwrap()).unwrap();
    endpoint.set_default_client_config(insecure_client_config().unwrap());
    let connection = endpoint.connect(addr, "localhost").unwrap().await.unwrap();
    let (mut send, mut recv) = connection.open_bi().await.unwrap();

    // Part of a payload, never finished
    send.write_all(b"jo").await.unwrap();

    let reply = tokio::time::timeout(Duration::from_secs(10), recv.read_to_end(1024))
        .await
        .expect("server should give up on the stream");

    assert!(reply.is_err(), "stream is reset, not answered");
    assert_eq!(harness.allocator.snapshot().unwrap().occupancy, 0);
    drop(send);
}
