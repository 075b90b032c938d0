//! Liveness monitoring for node connections.
//!
//! A TCP connection can die without either side noticing — half-open
//! sockets, a node that stopped pushing. The health monitor catches these by
//! watching the time since the node last produced any traffic, and forcing
//! disconnection when it exceeds the message timeout even though the
//! transport itself never signaled closure.

use super::errors::NodeError;
use crate::registry::NodeWriter;
use std::time::Duration;
use tracing::warn;

/// Evaluates staleness of a node's last-received-message time.
#[derive(Debug, Clone)]
pub struct HealthMonitor {
    message_timeout: Duration,
}

impl HealthMonitor {
    #[must_use]
    pub fn new(message_timeout: Duration) -> Self {
        Self { message_timeout }
    }

    /// Precondition check run before each receive while connected.
    ///
    /// If the node has gone silent past the message timeout, runs the shared
    /// disconnection routine on the registry entry and reports the failure;
    /// the caller closes the transport and exits its loop. Calling this on
    /// an already-disconnected node is a no-op.
    pub fn check(&self, writer: &NodeWriter) -> Result<(), NodeError> {
        if !writer.is_connected() {
            return Ok(());
        }

        let age = writer.last_message_age();
        if age > self.message_timeout {
            warn!(
                node = %writer.name(),
                age_ms = u64::try_from(age.as_millis()).unwrap_or(u64::MAX),
                timeout_ms = u64::try_from(self.message_timeout.as_millis()).unwrap_or(u64::MAX),
                "no traffic within message timeout, forcing disconnect"
            );
            writer.mark_disconnected();
            return Err(NodeError::HealthTimeout(age));
        }

        Ok(())
    }
}
