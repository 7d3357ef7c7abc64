//! Shared fixtures for fleet tests

#![allow(dead_code)]

use keyfleet::common::ProtocolConfig;
use keyfleet::transport::{MemoryNetwork, MemoryTransport};
use keyfleet::{Coordinator, Result};
use std::time::Duration;
use tokio::task::JoinHandle;

pub type Node = Coordinator<MemoryTransport>;

/// Protocol timings shrunk so a fleet arms within a few hundred ms
pub fn fast_protocol() -> ProtocolConfig {
    ProtocolConfig {
        tick_ms: 5,
        await_timeout_ms: 100,
        candidacy_ttl_ms: 400,
        liveness_window_ms: 1_000,
        discovery_interval_ms: 100,
        claim_attempts: 8,
        quorum_retries: 3,
        retry_jitter_ms: [10, 60],
        max_key_len: 128,
    }
}

pub fn node(net: &MemoryNetwork) -> Node {
    node_with(net, fast_protocol())
}

pub fn node_with(net: &MemoryNetwork, config: ProtocolConfig) -> Node {
    Coordinator::with_config(net.endpoint(), config).unwrap()
}

pub fn start(node: &Node) -> JoinHandle<Result<()>> {
    let node = node.clone();
    tokio::spawn(async move { node.manage().await })
}

/// Start `n` nodes and wait until every one of them is armed with a full view
pub async fn fleet(net: &MemoryNetwork, n: usize) -> Vec<(Node, JoinHandle<Result<()>>)> {
    fleet_with(net, n, fast_protocol()).await
}

pub async fn fleet_with(
    net: &MemoryNetwork,
    n: usize,
    config: ProtocolConfig,
) -> Vec<(Node, JoinHandle<Result<()>>)> {
    let nodes: Vec<_> = (0..n)
        .map(|_| {
            let node = node_with(net, config.clone());
            let handle = start(&node);
            (node, handle)
        })
        .collect();
    wait_until("fleet armed", || {
        nodes
            .iter()
            .all(|(node, _)| node.is_armed() && node.peer_count() == n - 1)
    })
    .await;
    nodes
}

pub async fn wait_until(what: &str, cond: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while !cond() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub async fn shutdown(nodes: Vec<(Node, JoinHandle<Result<()>>)>) {
    for (node, handle) in nodes {
        node.stop();
        handle.await.unwrap().unwrap();
    }
}
