//! Actor Message Definitions
//!
//! ```text
//! FsActor --Changed/Removed--> TransformActor --ModuleUpdated--> WsActor
//!                                                                 |  ^
//!                                            Save(client, target) v  | Reply
//!                                                              PatchActor
//! ```

use std::net::TcpStream;
use std::path::PathBuf;

use crate::transport::{RequestId, SaveTarget, ServerMessage};

/// Identifies one WebSocket connection for replies.
pub type ClientId = u64;

// =============================================================================
// TransformActor Messages
// =============================================================================

#[derive(Debug)]
pub enum TransformMsg {
    /// Created or modified modules to re-instrument
    Changed(Vec<PathBuf>),
    /// Deleted modules to evict
    Removed(Vec<PathBuf>),
    /// Config changed: re-instrument everything
    Rescan,
    Shutdown,
}

// =============================================================================
// PatchActor Messages
// =============================================================================

#[derive(Debug)]
pub enum PatchMsg {
    Save {
        client: ClientId,
        request_id: Option<RequestId>,
        target: SaveTarget,
    },
    Shutdown,
}

// =============================================================================
// WsActor Messages
// =============================================================================

pub enum WsMsg {
    /// Send to every client
    Broadcast(ServerMessage),
    /// Send to one client
    Reply {
        client: ClientId,
        message: ServerMessage,
    },
    /// Raw stream from the listener, handshake pending
    AddClient(TcpStream),
    Shutdown,
}
