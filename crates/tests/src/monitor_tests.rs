//! Connection lifecycle tests against mock ledger nodes.
//!
//! Each test stands up one or more in-process mock nodes, runs real
//! connection tasks against them with shortened timing, and asserts on the
//! registry state the tasks produce.

use crate::mock_infrastructure::{wait_until, MockNodeServer};
use forkwatch_core::{
    config::{AppConfig, NodeEndpoint},
    detector::{self, Decision, IncompleteReason},
    registry::NodeRegistry,
    runtime::Monitor,
    upstream::{ConnectionManager, Timing},
};
use std::{sync::Arc, time::Duration};
use tokio::sync::broadcast;

/// Shortened intervals so lifecycle tests finish in milliseconds. Keep-alive
/// probing is pushed out of the way for tests that do not exercise it.
fn fast_timing() -> Timing {
    Timing {
        keepalive_interval: Duration::from_secs(60),
        keepalive_timeout: Duration::from_secs(30),
        subscribe_ack_timeout: Duration::from_millis(500),
        message_timeout: Duration::from_secs(30),
        retry_backoff: Duration::from_millis(100),
        poll_timeout: Duration::from_millis(50),
    }
}

fn spawn_manager(
    registry: &Arc<NodeRegistry>,
    name: &str,
    url: String,
    timing: Timing,
    shutdown_tx: &broadcast::Sender<()>,
) -> tokio::task::JoinHandle<()> {
    let writer = registry.claim(name).unwrap();
    let manager = ConnectionManager::new(writer, url, timing, registry.clone());
    tokio::spawn(manager.run(shutdown_tx.subscribe()))
}

fn node_connected(registry: &NodeRegistry, name: &str) -> bool {
    registry
        .observe()
        .iter()
        .any(|node| node.name.as_ref() == name && node.is_connected)
}

fn node_height(registry: &NodeRegistry, name: &str) -> Option<u64> {
    registry
        .observe()
        .iter()
        .find(|node| node.name.as_ref() == name)
        .and_then(|node| node.last_height)
}

#[tokio::test]
async fn test_subscribes_and_ingests_momentums() {
    let server = MockNodeServer::new().await.unwrap();
    server.send_subscription_ack("sub-1").await;
    server.send_momentum(1000, "aa11").await;

    let registry = Arc::new(NodeRegistry::new(["alpha"]));
    let (shutdown_tx, _) = broadcast::channel(1);
    let task = spawn_manager(&registry, "alpha", server.url(), fast_timing(), &shutdown_tx);

    assert!(
        wait_until(Duration::from_secs(3), || node_height(&registry, "alpha") == Some(1000))
            .await,
        "momentum should reach the registry"
    );
    assert!(node_connected(&registry, "alpha"));
    assert_eq!(server.subscription_request_count().await, 1);

    let snapshot = registry.snapshot();
    let momentums = &snapshot["alpha"].momentums;
    assert_eq!(momentums.len(), 1);
    assert!(!momentums[0].is_stale);

    shutdown_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(2), task).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_agreeing_nodes_reach_consensus() {
    let server_x = MockNodeServer::new().await.unwrap();
    let server_y = MockNodeServer::new().await.unwrap();
    for server in [&server_x, &server_y] {
        server.send_subscription_ack("sub").await;
        server.send_momentum(500, "same-hash").await;
    }

    let registry = Arc::new(NodeRegistry::new(["x", "y"]));
    let (shutdown_tx, _) = broadcast::channel(1);
    let task_x = spawn_manager(&registry, "x", server_x.url(), fast_timing(), &shutdown_tx);
    let task_y = spawn_manager(&registry, "y", server_y.url(), fast_timing(), &shutdown_tx);

    assert!(
        wait_until(Duration::from_secs(3), || {
            node_height(&registry, "x") == Some(500) && node_height(&registry, "y") == Some(500)
        })
        .await
    );

    assert_eq!(
        detector::scan(&registry),
        Decision::Consensus { height: 500, hash: "same-hash".to_string() }
    );

    shutdown_tx.send(()).unwrap();
    for task in [task_x, task_y] {
        tokio::time::timeout(Duration::from_secs(2), task).await.unwrap().unwrap();
    }
}

#[tokio::test]
async fn test_divergent_hashes_surface_as_fork() {
    let server_x = MockNodeServer::new().await.unwrap();
    let server_y = MockNodeServer::new().await.unwrap();
    server_x.send_subscription_ack("sub").await;
    server_x.send_momentum(500, "canonical").await;
    server_y.send_subscription_ack("sub").await;
    server_y.send_momentum(500, "divergent").await;

    let registry = Arc::new(NodeRegistry::new(["x", "y"]));
    let (shutdown_tx, _) = broadcast::channel(1);
    let task_x = spawn_manager(&registry, "x", server_x.url(), fast_timing(), &shutdown_tx);
    let task_y = spawn_manager(&registry, "y", server_y.url(), fast_timing(), &shutdown_tx);

    assert!(
        wait_until(Duration::from_secs(3), || {
            node_height(&registry, "x") == Some(500) && node_height(&registry, "y") == Some(500)
        })
        .await
    );

    let Decision::Fork { height, hashes } = detector::scan(&registry) else {
        panic!("expected fork decision");
    };
    assert_eq!(height, 500);
    assert_eq!(hashes["x"], "canonical");
    assert_eq!(hashes["y"], "divergent");

    shutdown_tx.send(()).unwrap();
    for task in [task_x, task_y] {
        tokio::time::timeout(Duration::from_secs(2), task).await.unwrap().unwrap();
    }
}

#[tokio::test]
async fn test_unreachable_node_keeps_fork_check_incomplete() {
    let server_x = MockNodeServer::new().await.unwrap();
    server_x.send_subscription_ack("sub").await;
    server_x.send_momentum(500, "canonical").await;

    // Node "y" is configured but never comes online.
    let registry = Arc::new(NodeRegistry::new(["x", "y"]));
    let (shutdown_tx, _) = broadcast::channel(1);
    let task = spawn_manager(&registry, "x", server_x.url(), fast_timing(), &shutdown_tx);

    assert!(
        wait_until(Duration::from_secs(3), || node_height(&registry, "x") == Some(500)).await
    );
    assert_eq!(
        detector::scan(&registry),
        Decision::Incomplete(IncompleteReason::Disconnected)
    );

    shutdown_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(2), task).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_subscription_rejection_keeps_retrying() {
    let server = MockNodeServer::new().await.unwrap();
    server.send_subscription_rejection().await;

    let registry = Arc::new(NodeRegistry::new(["alpha"]));
    let (shutdown_tx, _) = broadcast::channel(1);
    let task = spawn_manager(&registry, "alpha", server.url(), fast_timing(), &shutdown_tx);

    // The node never becomes connected, and the manager keeps re-subscribing
    // through the fixed backoff.
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    let mut retried = false;
    while std::time::Instant::now() < deadline {
        if server.subscription_request_count().await >= 2 {
            retried = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(retried, "a rejected subscribe should be retried after the backoff");
    assert!(!node_connected(&registry, "alpha"));

    shutdown_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(2), task).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_reconnects_after_peer_close() {
    let server = MockNodeServer::new().await.unwrap();
    server.send_subscription_ack("sub-1").await;
    server.send_momentum(10, "h10").await;

    let registry = Arc::new(NodeRegistry::new(["alpha"]));
    let (shutdown_tx, _) = broadcast::channel(1);
    let task = spawn_manager(&registry, "alpha", server.url(), fast_timing(), &shutdown_tx);

    assert!(
        wait_until(Duration::from_secs(3), || node_height(&registry, "alpha") == Some(10)).await
    );

    server.send_close().await;
    assert!(
        wait_until(Duration::from_secs(3), || !node_connected(&registry, "alpha")).await,
        "peer close should disconnect the node"
    );

    // Retained momentums are marked stale but not dropped.
    let snapshot = registry.snapshot();
    assert_eq!(snapshot["alpha"].momentums.len(), 1);
    assert!(snapshot["alpha"].momentums[0].is_stale);

    // The node comes back; the manager re-subscribes on its fixed backoff.
    server.send_subscription_ack("sub-2").await;
    assert!(
        wait_until(Duration::from_secs(5), || node_connected(&registry, "alpha")).await,
        "manager should reconnect after the backoff"
    );

    shutdown_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(2), task).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_silent_connection_is_presumed_dead() {
    // The node acks and pushes one momentum, then goes silent without ever
    // closing the transport. The health monitor must force the disconnect.
    let server = MockNodeServer::new().await.unwrap();
    server.send_subscription_ack("sub-1").await;
    server.send_momentum(77, "h77").await;

    let timing = Timing {
        message_timeout: Duration::from_millis(300),
        ..fast_timing()
    };
    let registry = Arc::new(NodeRegistry::new(["alpha"]));
    let (shutdown_tx, _) = broadcast::channel(1);
    let task = spawn_manager(&registry, "alpha", server.url(), timing, &shutdown_tx);

    assert!(
        wait_until(Duration::from_secs(3), || node_height(&registry, "alpha") == Some(77)).await
    );
    assert!(
        wait_until(Duration::from_secs(3), || !node_connected(&registry, "alpha")).await,
        "silence past the message timeout should force a disconnect"
    );

    let snapshot = registry.snapshot();
    assert!(snapshot["alpha"].momentums.iter().all(|m| m.is_stale));

    shutdown_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(2), task).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_monitor_runtime_connects_and_shuts_down() {
    let server = MockNodeServer::new().await.unwrap();
    server.send_subscription_ack("sub-1").await;

    let config = AppConfig {
        nodes: vec![NodeEndpoint { name: "mock".to_string(), ws_url: server.url() }],
        ..AppConfig::default()
    };
    let monitor = Monitor::start(&config).unwrap();
    let registry = monitor.registry();

    assert!(
        wait_until(Duration::from_secs(3), || node_connected(&registry, "mock")).await,
        "monitor-spawned task should connect"
    );

    tokio::time::timeout(Duration::from_secs(5), monitor.shutdown())
        .await
        .expect("shutdown should complete promptly");
    assert!(!node_connected(&registry, "mock"));
}
