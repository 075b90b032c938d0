//! JSON-RPC wire types for the momentum subscription protocol.
//!
//! Nodes speak JSON-RPC 2.0 over WebSocket. The monitor sends exactly one
//! request per connection — the momentum subscription — and then consumes
//! push notifications. Everything here is shape-tolerant: nodes are untrusted
//! peers and a malformed frame must never take the connection down.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC protocol version sent on every request.
pub const JSONRPC_VERSION: &str = "2.0";

/// Subscription method understood by ledger nodes.
pub const SUBSCRIBE_METHOD: &str = "ledger.subscribe";

/// Subscription channel carrying momentum announcements.
pub const MOMENTUMS_CHANNEL: &str = "momentums";

/// A JSON-RPC 2.0 request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    pub params: Value,
}

/// Builds the fixed momentum subscription request.
///
/// The wire shape is part of the node contract and never varies:
/// `{"jsonrpc":"2.0","id":1,"method":"ledger.subscribe","params":["momentums"]}`.
#[must_use]
pub fn subscribe_request() -> JsonRpcRequest {
    JsonRpcRequest {
        jsonrpc: JSONRPC_VERSION.to_string(),
        id: 1,
        method: SUBSCRIBE_METHOD.to_string(),
        params: serde_json::json!([MOMENTUMS_CHANNEL]),
    }
}

/// Extracts the subscription token from a subscribe acknowledgment.
///
/// A successful acknowledgment carries an opaque token in `result`. Absence
/// of `result` (or an explicit `null`) is a protocol failure. Tokens are
/// usually strings but the value is opaque, so any non-null shape is accepted
/// and carried verbatim.
#[must_use]
pub fn subscription_ack(value: &Value) -> Option<String> {
    match value.get("result") {
        None | Some(Value::Null) => None,
        Some(Value::String(token)) => Some(token.clone()),
        Some(other) => Some(other.to_string()),
    }
}

/// The height/hash pair announced by a momentum push notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MomentumHeader {
    pub height: u64,
    pub hash: String,
}

impl MomentumHeader {
    /// Parses a push notification into a momentum header.
    ///
    /// Notifications carry `params.result`, an array whose first element has
    /// at least `height` (integer) and `hash` (string). Returns `None` for
    /// anything else — acknowledgments, keep-alive chatter, or frames with an
    /// unexpected shape.
    #[must_use]
    pub fn from_notification(value: &Value) -> Option<Self> {
        let first = value.get("params")?.get("result")?.as_array()?.first()?;
        let height = first.get("height")?.as_u64()?;
        let hash = first.get("hash")?.as_str()?;
        Some(Self { height, hash: hash.to_string() })
    }
}
