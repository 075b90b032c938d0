//! Monitor runtime: task orchestration and graceful shutdown.
//!
//! [`Monitor::start`] builds the registry, claims one writer per node, and
//! spawns one [`ConnectionManager`](crate::upstream::ConnectionManager) task
//! per configured node. Shutdown is coordinated through a broadcast channel
//! handed to each task at spawn time; [`Monitor::shutdown`] signals it and
//! awaits every task's termination before returning.

use crate::{
    config::AppConfig,
    registry::NodeRegistry,
    upstream::ConnectionManager,
};
use std::sync::Arc;
use thiserror::Error;
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{error, info};

/// Errors that can occur when starting the monitor.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// Configuration validation failed.
    #[error("configuration invalid: {0}")]
    Config(String),
}

/// Running fork monitor: one connection task per configured node plus the
/// shared registry.
pub struct Monitor {
    registry: Arc<NodeRegistry>,
    shutdown_tx: broadcast::Sender<()>,
    tasks: Vec<JoinHandle<()>>,
}

impl Monitor {
    /// Validates the configuration and spawns one connection task per node.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::Config`] if validation fails.
    pub fn start(config: &AppConfig) -> Result<Self, MonitorError> {
        config.validate().map_err(MonitorError::Config)?;

        let registry = Arc::new(NodeRegistry::new(config.nodes.iter().map(|n| n.name.as_str())));
        let (shutdown_tx, _) = broadcast::channel(16);
        let timing = config.timing.timing();

        let mut tasks = Vec::with_capacity(config.nodes.len());
        for node in &config.nodes {
            let Some(writer) = registry.claim(&node.name) else {
                // Unreachable after validation, but a duplicate name must
                // never silently share a writer.
                return Err(MonitorError::Config(format!("duplicate node name: {}", node.name)));
            };
            let manager = ConnectionManager::new(
                writer,
                node.ws_url.clone(),
                timing.clone(),
                registry.clone(),
            );
            tasks.push(tokio::spawn(manager.run(shutdown_tx.subscribe())));
        }

        info!(node_count = tasks.len(), "fork monitor started");
        Ok(Self { registry, shutdown_tx, tasks })
    }

    /// Returns the shared registry for read-only consumers.
    #[must_use]
    pub fn registry(&self) -> Arc<NodeRegistry> {
        self.registry.clone()
    }

    /// Creates a new shutdown receiver for external coordination.
    #[must_use]
    pub fn shutdown_receiver(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Signals shutdown to every connection task and awaits their
    /// termination.
    pub async fn shutdown(self) {
        info!("initiating monitor shutdown");
        let _ = self.shutdown_tx.send(());
        for task in self.tasks {
            if let Err(err) = task.await {
                if !err.is_cancelled() {
                    error!(error = %err, "monitor task failed during shutdown");
                }
            }
        }
        info!("monitor shutdown complete");
    }
}
