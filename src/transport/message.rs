//! Editor channel message protocol.
//!
//! JSON messages over WebSocket, tagged by `type`.
//!
//! # Client → server
//!
//! - `save_properties`: patch an element by module id and node id
//! - `save_node`: patch an element by Live Node id
//! - `read_tree`: correlate a rendered tree snapshot
//! - `pong`: keep-alive reply
//!
//! # Server → client
//!
//! - `connected`: sent once after the handshake
//! - `ack`: result of a request, echoing its `request_id`
//! - `tree`: the correlated forest for a `read_tree`
//! - `module_updated`: a module has a new generation
//! - `ping`: keep-alive

use crate::correlate::{Boundary, CorrelateError, LiveForest, SnapshotTree};
use crate::patch::{Patch, PatchError, PatchRequest, PatchStage};
use crate::registry::{ElementKey, ModuleEntry};
use crate::syntax::NodeId;
use serde::{Deserialize, Serialize};

/// Correlation id chosen by the client, echoed back verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(u64),
    Text(String),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    SaveProperties {
        #[serde(default, alias = "requestId")]
        request_id: Option<RequestId>,
        #[serde(alias = "moduleId")]
        module_id: String,
        #[serde(alias = "nodeId")]
        node_id: NodeId,
        patch: Patch,
        #[serde(default)]
        fingerprint: Option<String>,
    },
    SaveNode {
        #[serde(default, alias = "requestId")]
        request_id: Option<RequestId>,
        id: ElementKey,
        patch: Patch,
    },
    ReadTree {
        #[serde(default, alias = "requestId")]
        request_id: Option<RequestId>,
        #[serde(default)]
        anchor: Option<Boundary>,
        /// Absent when the page has no introspection hook.
        #[serde(default)]
        tree: Option<SnapshotTree>,
    },
    Pong {
        ts: u64,
    },
}

impl ClientMessage {
    pub fn from_json(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }
}

/// A patch as queued for the patch actor.
#[derive(Debug, Clone)]
pub enum SaveTarget {
    Element(PatchRequest),
    Node { id: ElementKey, patch: Patch },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorPayload {
    pub kind: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<PatchStage>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Connected {
        version: String,
    },
    Ack {
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<RequestId>,
        ok: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<ErrorPayload>,
    },
    Tree {
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<RequestId>,
        forest: LiveForest,
    },
    ModuleUpdated {
        module_id: String,
        fingerprint: String,
    },
    Ping {
        ts: u64,
    },
}

impl ServerMessage {
    pub fn connected() -> Self {
        Self::Connected {
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn ok(request_id: Option<RequestId>) -> Self {
        Self::Ack {
            request_id,
            ok: true,
            error: None,
        }
    }

    pub fn failed(request_id: Option<RequestId>, kind: &str, message: impl Into<String>) -> Self {
        Self::Ack {
            request_id,
            ok: false,
            error: Some(ErrorPayload {
                kind: kind.to_string(),
                message: message.into(),
                stage: None,
            }),
        }
    }

    pub fn patch_failed(request_id: Option<RequestId>, err: &PatchError) -> Self {
        Self::Ack {
            request_id,
            ok: false,
            error: Some(ErrorPayload {
                kind: err.kind().to_string(),
                message: err.to_string(),
                stage: Some(err.stage()),
            }),
        }
    }

    pub fn correlate_failed(request_id: Option<RequestId>, err: &CorrelateError) -> Self {
        Self::failed(request_id, err.kind(), err.to_string())
    }

    pub fn tree(request_id: Option<RequestId>, forest: LiveForest) -> Self {
        Self::Tree { request_id, forest }
    }

    pub fn module_updated(entry: &ModuleEntry) -> Self {
        Self::ModuleUpdated {
            module_id: entry.id.clone(),
            fingerprint: entry.fingerprint.short(),
        }
    }

    pub fn ping() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        Self::Ping { ts }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"type":"ack","ok":false}"#.to_string())
    }
}
