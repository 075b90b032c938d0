//! Failure taxonomy for node connections.
//!
//! None of these are fatal: every variant feeds the same
//! disconnect-and-retry path, and the monitor is designed to run
//! indefinitely and self-heal. Only an explicit shutdown signal ends a
//! connection task.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur on a single node connection.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum NodeError {
    /// WebSocket-level failure during handshake, send, or receive.
    #[error("transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    /// The transport ended without an error value (peer close, stream end,
    /// or an unanswered keep-alive probe).
    #[error("connection closed: {0}")]
    Closed(&'static str),

    /// No subscription acknowledgment arrived within the configured window.
    #[error("subscribe acknowledgment timed out")]
    SubscribeTimeout,

    /// The node answered the subscribe request without a `result` field.
    #[error("subscribe rejected by node: {0}")]
    SubscribeRejected(String),

    /// A frame that could not be parsed where a well-formed one was
    /// required (the subscribe acknowledgment). Malformed frames inside the
    /// ingestion loop are logged and discarded instead.
    #[error("malformed message: {0}")]
    Malformed(String),

    /// The node produced no traffic within the message timeout; the
    /// connection is presumed dead even though the transport never closed.
    #[error("no traffic for {0:?}, connection presumed dead")]
    HealthTimeout(Duration),
}

impl NodeError {
    /// Static label used as a structured log field.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Closed(_) => "closed",
            Self::SubscribeTimeout => "subscribe_timeout",
            Self::SubscribeRejected(_) => "subscribe_rejected",
            Self::Malformed(_) => "malformed",
            Self::HealthTimeout(_) => "health_timeout",
        }
    }
}
