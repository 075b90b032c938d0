//! # Forkwatch Core
//!
//! Core library for the Forkwatch multi-node ledger fork monitor.
//!
//! Forkwatch maintains live WebSocket subscriptions to several independent
//! blockchain nodes that are expected to agree on a single canonical ledger,
//! and raises an observable signal when they disagree (a "fork").
//!
//! This crate provides the foundational components for:
//!
//! - **[`registry`]**: Per-node state with single-writer-per-entry discipline.
//!   Each node's connection task claims an exclusive writer handle at startup;
//!   everything else reads through snapshots.
//!
//! - **[`upstream`]**: Per-node connection lifecycle management — WebSocket
//!   handshake, momentum subscription, keep-alive probing, message ingestion,
//!   and liveness monitoring.
//!
//! - **[`detector`]**: The cross-node fork detection algorithm, a pure scan
//!   over the registry run after every accepted momentum.
//!
//! - **[`runtime`]**: Task orchestration — spawns one monitor task per
//!   configured node and coordinates graceful shutdown.
//!
//! - **[`config`]**: Layered application configuration (defaults, TOML file,
//!   environment overrides).
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                         Monitor                            │
//! │  ┌──────────────────┐ ┌──────────────────┐  ┌───────────┐  │
//! │  │ ConnectionManager│ │ ConnectionManager│  │    ...    │  │
//! │  │    (node hc1)    │ │  (node zenonhub) │  │ (per node)│  │
//! │  └────────┬─────────┘ └────────┬─────────┘  └─────┬─────┘  │
//! │           │ writes own entry   │                  │        │
//! │           ▼                    ▼                  ▼        │
//! │  ┌──────────────────────────────────────────────────────┐  │
//! │  │                     NodeRegistry                     │  │
//! │  └───────────┬──────────────────────────┬───────────────┘  │
//! │              │ read-only scan           │ read-only        │
//! │              ▼                          ▼                  │
//! │       ┌──────────────┐          ┌───────────────┐          │
//! │       │ ForkDetector │          │ HTTP snapshot │          │
//! │       └──────────────┘          └───────────────┘          │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each connection task runs a retry-forever state machine:
//! `Disconnected → Connecting → AwaitingSubscriptionAck → Connected`, with a
//! fixed backoff between attempts. Only a process-wide shutdown signal, passed
//! explicitly to every task, terminates the loop.

pub mod config;
pub mod detector;
pub mod registry;
pub mod runtime;
pub mod types;
pub mod upstream;
