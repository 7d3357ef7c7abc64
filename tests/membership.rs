//! Discovery, liveness, quorum health and lifecycle of live coordinators

mod common;

use common::{fleet, node, shutdown, start, wait_until};
use keyfleet::coordinator::awaiter::Completion;
use keyfleet::coordinator::message::{encode, Command, Message, DATAGRAM_SIZE};
use keyfleet::coordinator::{PeerId, State};
use keyfleet::transport::{MemoryNetwork, MemoryTransport, Transport};
use keyfleet::{Error, Owner};
use std::net::SocketAddr;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Receive on `probe` until a frame with `command` arrives from `from`
async fn expect_frame(probe: &MemoryTransport, command: Command, from: SocketAddr) -> PeerId {
    let mut buf = vec![0u8; DATAGRAM_SIZE];
    let wait = async {
        loop {
            let (len, addr) = probe.listen(&mut buf).await.unwrap();
            if let Ok(msg) = Message::decode(&buf[..len], addr) {
                if msg.command == command && addr == from {
                    return msg.sender;
                }
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), wait)
        .await
        .expect("frame never arrived")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_quorum_convergence() {
    let net = MemoryNetwork::new();
    let nodes = fleet(&net, 4).await;
    for (node, _) in &nodes {
        assert!(node.is_armed());
        assert_eq!(node.peer_count(), 3);
        assert!(!node.state().is_terminal());
    }
    shutdown(nodes).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_knock_is_welcomed() {
    let net = MemoryNetwork::new();
    let nodes = fleet(&net, 1).await;
    let (a, _) = &nodes[0];
    let probe = net.endpoint();

    let knock = encode(Command::Knock, &PeerId::random(), &[]);
    probe.send_all(&knock).await.unwrap();
    let sender = expect_frame(&probe, Command::Welcome, a.transport().local_addr()).await;
    assert_eq!(sender, a.id());

    shutdown(nodes).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_silent_peer_is_evicted() {
    let net = MemoryNetwork::new();
    let nodes = fleet(&net, 1).await;
    let (a, _) = &nodes[0];

    // a peer that knocks once and never answers digest checks
    let probe = net.endpoint();
    probe
        .send_all(&encode(Command::Knock, &PeerId::random(), &[]))
        .await
        .unwrap();
    wait_until("probe registered", || a.peer_count() == 1).await;
    wait_until("unarmed by silent peer", || !a.is_armed()).await;

    // liveness window passes, the fleet shrinks back to one
    wait_until("probe evicted", || a.peer_count() == 0).await;
    wait_until("re-armed", || a.is_armed()).await;

    shutdown(nodes).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_isolated_peer_drops_out() {
    let net = MemoryNetwork::new();
    let nodes = fleet(&net, 3).await;
    net.isolate(nodes[2].0.transport().local_addr());

    let (a, _) = &nodes[0];
    let (b, _) = &nodes[1];
    wait_until("isolated peer evicted", || {
        a.peer_count() == 1 && b.peer_count() == 1
    })
    .await;
    wait_until("survivors armed", || a.is_armed() && b.is_armed()).await;

    shutdown(nodes).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_short_datagram_is_dropped() {
    let net = MemoryNetwork::new();
    let nodes = fleet(&net, 1).await;
    let (a, _) = &nodes[0];
    let probe = net.endpoint();

    probe.send_all(&[0u8; 7]).await.unwrap();
    probe.send_all(b"WANTalpha").await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(!a.state().is_terminal());
    assert!(a.is_armed());
    assert_eq!(a.peer_count(), 0);
    assert!(a.owned_keys().is_empty());

    let cancel = CancellationToken::new();
    assert_eq!(a.check_key(&cancel, "alpha").await.unwrap(), Owner::Mine);

    shutdown(nodes).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_manage_runs_once() {
    let net = MemoryNetwork::new();
    let a = node(&net);
    let handle = start(&a);
    wait_until("started", || a.state() != State::Created).await;

    assert!(matches!(a.manage().await, Err(Error::AlreadyStarted)));

    a.stop();
    assert!(handle.await.unwrap().is_ok());
    assert_eq!(a.state(), State::Closed);
}

#[tokio::test]
async fn test_stop_before_manage() {
    let net = MemoryNetwork::new();
    let a = node(&net);
    a.stop();
    assert_eq!(a.state(), State::Deactivated);
    assert!(matches!(a.manage().await, Err(Error::AlreadyStarted)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_transport_failure_breaks_coordinator() {
    let net = MemoryNetwork::new();
    let a = node(&net);
    let handle = start(&a);
    wait_until("started", || a.state() != State::Created).await;

    a.transport().close();
    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("manage did not return")
        .unwrap();
    assert!(matches!(result, Err(Error::Io(_))));
    assert_eq!(a.state(), State::Broken);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_broken_coordinator_refuses_keys() {
    let net = MemoryNetwork::new();
    let mut nodes = fleet(&net, 1).await;
    let (a, handle) = nodes.remove(0);
    assert!(a.is_armed());

    a.transport().close();
    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("manage did not return")
        .unwrap();
    assert!(matches!(result, Err(Error::Io(_))));
    assert_eq!(a.state(), State::Broken);
    assert!(!a.is_armed());

    let cancel = CancellationToken::new();
    assert!(matches!(
        a.check_key(&cancel, "alpha").await,
        Err(Error::NotReady)
    ));
    assert!(a.owned_keys().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stopped_coordinator_refuses_keys() {
    let net = MemoryNetwork::new();
    let mut nodes = fleet(&net, 1).await;
    let (a, handle) = nodes.remove(0);

    a.stop();
    handle.await.unwrap().unwrap();
    assert_eq!(a.state(), State::Closed);
    assert!(!a.is_armed());

    let cancel = CancellationToken::new();
    assert!(matches!(
        a.check_key(&cancel, "alpha").await,
        Err(Error::NotReady)
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_silent_peer_blocks_only_unanimous_rounds() {
    let net = MemoryNetwork::new();
    let nodes = fleet(&net, 3).await;
    let (a, _) = &nodes[0];

    // every live peer answers KNCK with WLCM
    assert_eq!(
        a.broadcast_and_await_all(Command::Knock, &[], Command::Welcome)
            .await
            .unwrap(),
        Completion::Reached
    );

    let probe = net.endpoint();
    probe
        .send_all(&encode(Command::Knock, &PeerId::random(), &[]))
        .await
        .unwrap();
    wait_until("silent peer registered", || a.peer_count() == 3).await;

    assert_eq!(
        a.broadcast_and_await_majority(Command::Knock, &[], Command::Welcome)
            .await
            .unwrap(),
        Completion::Reached
    );
    assert!(matches!(
        a.broadcast_and_await_all(Command::Knock, &[], Command::Welcome)
            .await,
        Err(Error::Timeout(_))
    ));

    shutdown(nodes).await;
}
