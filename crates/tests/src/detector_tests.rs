//! Fork detection scenarios over multi-node registries.
//!
//! These drive the detector through the registry exactly as the connection
//! tasks do, rather than through hand-built observations.

use forkwatch_core::{
    detector::{self, Decision, IncompleteReason},
    registry::{NodeRegistry, NodeWriter},
};
use std::sync::Arc;

fn three_node_registry() -> (Arc<NodeRegistry>, NodeWriter, NodeWriter, NodeWriter) {
    let registry = Arc::new(NodeRegistry::new(["x", "y", "z"]));
    let x = registry.claim("x").unwrap();
    let y = registry.claim("y").unwrap();
    let z = registry.claim("z").unwrap();
    (registry, x, y, z)
}

fn bring_online(writer: &NodeWriter, height: u64, hash: &str) {
    writer.mark_connected(format!("sub-{}", writer.name()));
    writer.accept_momentum(height, hash);
}

#[test]
fn test_all_nodes_agreeing_is_consensus() {
    let (registry, x, y, z) = three_node_registry();
    bring_online(&x, 100, "H1");
    bring_online(&y, 100, "H1");
    bring_online(&z, 100, "H1");

    assert_eq!(
        detector::scan(&registry),
        Decision::Consensus { height: 100, hash: "H1".to_string() }
    );
}

#[test]
fn test_single_divergent_hash_is_a_fork() {
    let (registry, x, y, z) = three_node_registry();
    bring_online(&x, 100, "H1");
    bring_online(&y, 100, "H2");
    bring_online(&z, 100, "H1");

    let Decision::Fork { height, hashes } = detector::scan(&registry) else {
        panic!("expected fork decision");
    };
    assert_eq!(height, 100);
    assert_eq!(hashes["x"], "H1");
    assert_eq!(hashes["y"], "H2");
    assert_eq!(hashes["z"], "H1");
}

#[test]
fn test_lagging_node_is_height_mismatch_not_fork() {
    let (registry, x, y, z) = three_node_registry();
    bring_online(&x, 100, "H1");
    bring_online(&y, 99, "H0");
    bring_online(&z, 100, "H1");

    assert_eq!(
        detector::scan(&registry),
        Decision::Incomplete(IncompleteReason::HeightMismatch)
    );
}

#[test]
fn test_disconnected_node_skips_check_even_with_agreement() {
    // Two agreeing nodes are never promoted to a 2-of-3 consensus.
    let (registry, x, y, _z) = three_node_registry();
    bring_online(&x, 100, "H1");
    bring_online(&y, 100, "H1");

    assert_eq!(
        detector::scan(&registry),
        Decision::Incomplete(IncompleteReason::Disconnected)
    );
}

#[test]
fn test_connected_but_silent_node_is_no_data() {
    let (registry, x, y, z) = three_node_registry();
    bring_online(&x, 100, "H1");
    bring_online(&y, 100, "H1");
    z.mark_connected("sub-z".to_string());

    assert_eq!(detector::scan(&registry), Decision::Incomplete(IncompleteReason::NoData));
}

#[test]
fn test_scan_is_idempotent_on_unchanged_registry() {
    let (registry, x, y, z) = three_node_registry();
    bring_online(&x, 100, "H1");
    bring_online(&y, 100, "H2");
    bring_online(&z, 100, "H1");

    let first = detector::scan(&registry);
    let second = detector::scan(&registry);
    assert_eq!(first, second);
}

#[test]
fn test_fork_resolves_to_consensus_on_next_momentum() {
    let (registry, x, y, z) = three_node_registry();
    bring_online(&x, 100, "H1");
    bring_online(&y, 100, "H2");
    bring_online(&z, 100, "H1");
    assert!(matches!(detector::scan(&registry), Decision::Fork { .. }));

    // The divergent node catches up with the canonical chain.
    x.accept_momentum(101, "H3");
    y.accept_momentum(101, "H3");
    z.accept_momentum(101, "H3");

    assert_eq!(
        detector::scan(&registry),
        Decision::Consensus { height: 101, hash: "H3".to_string() }
    );
}

#[test]
fn test_check_uses_last_accepted_despite_stale_markers() {
    // Staleness marks retained momentums, but last_height/last_hash always
    // reflect the most recently accepted momentum. A node that bounced and
    // reconnected without new data still participates with its old report.
    let (registry, x, y, z) = three_node_registry();
    bring_online(&x, 100, "H1");
    bring_online(&y, 100, "H1");
    bring_online(&z, 100, "H1");

    z.mark_disconnected();
    z.mark_connected("sub-z2".to_string());

    assert_eq!(
        detector::scan(&registry),
        Decision::Consensus { height: 100, hash: "H1".to_string() }
    );
}
