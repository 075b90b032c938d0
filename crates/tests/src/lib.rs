//! Integration tests for the Forkwatch fork monitor.
//!
//! Test modules:
//!
//! - `detector_tests`: Fork detection scenarios across multi-node registries
//! - `monitor_tests`: Connection lifecycle against mock WebSocket nodes —
//!   subscription, ingestion, health timeouts, reconnection, shutdown
//! - `mock_infrastructure`: Reusable mock ledger node for testing without a
//!   real node
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --package tests
//! ```
//!
//! Everything here runs against in-process mock nodes bound to loopback
//! ports; no external infrastructure is required.

#[cfg(test)]
mod detector_tests;

#[cfg(test)]
mod monitor_tests;

/// Mock infrastructure for testing
pub mod mock_infrastructure;
