//! Cross-node fork detection.
//!
//! Run after every accepted momentum on any node, the detector compares the
//! last accepted height/hash across the whole registry and classifies the
//! result. It requires unanimous connectivity — a partial quorum is never
//! evaluated — and keeps no state between invocations: every call
//! re-evaluates from current registry contents, so the same registry always
//! yields the same decision.

use crate::registry::{NodeObservation, NodeRegistry};
use std::{collections::BTreeMap, sync::Arc};
use tracing::{debug, info, warn};

/// Why a fork check could not be carried out.
///
/// These are normal, expected outcomes during startup and resync — not
/// errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncompleteReason {
    /// At least one configured node is disconnected.
    Disconnected,
    /// At least one node has not yet reported a momentum.
    NoData,
    /// Nodes report different heights (still syncing to a common point).
    HeightMismatch,
}

impl IncompleteReason {
    /// Static label used as a structured log field.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::NoData => "no-data",
            Self::HeightMismatch => "height-mismatch",
        }
    }
}

/// Outcome of one fork check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// All nodes agree on the same momentum at the same height.
    Consensus { height: u64, hash: String },
    /// Nodes at the same height disagree on the hash — the signal this
    /// system exists to produce.
    Fork { height: u64, hashes: BTreeMap<Arc<str>, String> },
    /// The check could not run to completion; see [`IncompleteReason`].
    Incomplete(IncompleteReason),
}

/// Classifies the given observations.
///
/// Pure and idempotent: no side effects, no retained state. The observations
/// must cover every configured node — the unanimity requirement is over the
/// full set, not over whichever nodes happen to be reachable.
#[must_use]
pub fn evaluate(observations: &[NodeObservation]) -> Decision {
    if observations.is_empty() {
        return Decision::Incomplete(IncompleteReason::NoData);
    }

    if observations.iter().any(|node| !node.is_connected) {
        return Decision::Incomplete(IncompleteReason::Disconnected);
    }

    let mut reports = Vec::with_capacity(observations.len());
    for node in observations {
        match (&node.last_height, &node.last_hash) {
            (Some(height), Some(hash)) => reports.push((node.name.clone(), *height, hash)),
            _ => return Decision::Incomplete(IncompleteReason::NoData),
        }
    }

    let height = reports[0].1;
    if reports.iter().any(|(_, h, _)| *h != height) {
        return Decision::Incomplete(IncompleteReason::HeightMismatch);
    }

    let reference_hash = reports[0].2;
    if reports.iter().all(|(_, _, hash)| *hash == reference_hash) {
        return Decision::Consensus { height, hash: reference_hash.clone() };
    }

    let hashes = reports
        .into_iter()
        .map(|(name, _, hash)| (name, hash.clone()))
        .collect();
    Decision::Fork { height, hashes }
}

/// Runs a fork check over the registry and logs the decision.
///
/// Consensus is logged at info, a fork at warn, and incomplete checks at
/// debug (they fire on every momentum during startup and resync).
pub fn scan(registry: &NodeRegistry) -> Decision {
    let decision = evaluate(&registry.observe());
    match &decision {
        Decision::Consensus { height, hash } => {
            info!(height, hash = %hash, "nodes in consensus");
        }
        Decision::Fork { height, hashes } => {
            warn!(height, "fork detected: nodes disagree at equal height");
            for (node, hash) in hashes {
                warn!(node = %node, hash = %hash, "diverging momentum hash");
            }
        }
        Decision::Incomplete(reason) => {
            debug!(reason = reason.as_str(), "fork check incomplete");
        }
    }
    decision
}
