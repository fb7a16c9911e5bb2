//! WebSocket Actor - Bidirectional Communication
//!
//! This actor is responsible for:
//! - Managing editor client connections
//! - Broadcasting `module_updated` and keep-alive pings
//! - Replying to one client (acks, correlated trees)
//! - Receiving client messages: saves go to the PatchActor, `read_tree` is
//!   answered on the reader thread since correlation never touches the disk
//!
//! # Architecture
//!
//! ```text
//! TransformActor/PatchActor --[Broadcast/Reply]--> WsActor --> Clients
//!                                                     ^            |
//!               PatchActor <--[Save]-- reader thread -+------------+
//! ```

use std::net::TcpStream;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tungstenite::WebSocket;
use tungstenite::protocol::Message;

use super::messages::{ClientId, PatchMsg, WsMsg};
use crate::correlate::Correlator;
use crate::patch::PatchRequest;
use crate::registry::ModuleRegistry;
use crate::transport::{ClientMessage, SaveTarget, ServerMessage};

/// Reader poll interval
const POLL_INTERVAL: Duration = Duration::from_millis(50);
/// Keep-alive ping interval
const PING_INTERVAL: Duration = Duration::from_secs(30);

struct Client {
    id: ClientId,
    ws: WebSocket<TcpStream>,
}

/// What the reader does with one inbound text frame.
enum Inbound {
    Reply(ServerMessage),
    Forward(PatchMsg),
    Ignore,
}

/// Shared with the reader thread.
#[derive(Clone)]
struct Shared {
    clients: Arc<Mutex<Vec<Client>>>,
    registry: Arc<ModuleRegistry>,
    attribute: Arc<str>,
    stop: Arc<AtomicBool>,
}

/// WebSocket Actor - manages client connections, replies and broadcasts
pub struct WsActor {
    rx: mpsc::Receiver<WsMsg>,
    /// Our own sender, handed to the reader thread for replies
    ws_tx: mpsc::Sender<WsMsg>,
    patch_tx: mpsc::Sender<PatchMsg>,
    shared: Shared,
    next_id: AtomicU64,
}

impl WsActor {
    pub fn new(
        rx: mpsc::Receiver<WsMsg>,
        ws_tx: mpsc::Sender<WsMsg>,
        patch_tx: mpsc::Sender<PatchMsg>,
        registry: Arc<ModuleRegistry>,
        attribute: &str,
    ) -> Self {
        Self {
            rx,
            ws_tx,
            patch_tx,
            shared: Shared {
                clients: Arc::new(Mutex::new(Vec::new())),
                registry,
                attribute: Arc::from(attribute),
                stop: Arc::new(AtomicBool::new(false)),
            },
            next_id: AtomicU64::new(1),
        }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        let shared = self.shared.clone();
        let ws_tx = self.ws_tx.clone();
        let patch_tx = self.patch_tx.clone();
        std::thread::spawn(move || client_reader_loop(&shared, &ws_tx, &patch_tx));

        while let Some(msg) = self.rx.recv().await {
            match msg {
                WsMsg::Broadcast(message) => self.broadcast(&message),
                WsMsg::Reply { client, message } => self.send_to(client, &message),
                WsMsg::AddClient(stream) => self.add_client(stream),
                WsMsg::Shutdown => {
                    crate::debug!("ws"; "shutting down");
                    self.shared.stop.store(true, Ordering::SeqCst);
                    let mut clients = self.shared.clients.lock();
                    for mut client in clients.drain(..) {
                        let _ = client.ws.close(None);
                    }
                    break;
                }
            }
        }
    }

    /// Handshake, then switch to non-blocking for polling reads.
    fn add_client(&self, stream: TcpStream) {
        match tungstenite::accept(stream) {
            Ok(mut ws) => {
                let _ = ws.get_ref().set_nonblocking(true);

                let connected = ServerMessage::connected();
                if let Err(e) = ws.send(Message::Text(connected.to_json().into())) {
                    crate::log!("ws"; "failed to send connected message: {}", e);
                    return;
                }

                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let mut clients = self.shared.clients.lock();
                crate::debug!("ws"; "client {} connected (total: {})", id, clients.len() + 1);
                clients.push(Client { id, ws });
            }
            Err(e) => crate::log!("ws"; "handshake failed: {}", e),
        }
    }

    fn broadcast(&self, message: &ServerMessage) {
        let mut clients = self.shared.clients.lock();
        if clients.is_empty() {
            crate::debug!("ws"; "no clients connected");
            return;
        }
        broadcast_locked(&mut clients, message);
    }

    fn send_to(&self, target: ClientId, message: &ServerMessage) {
        let mut clients = self.shared.clients.lock();
        let Some(index) = clients.iter().position(|c| c.id == target) else {
            crate::debug!("ws"; "client {} gone, dropping reply", target);
            return;
        };
        let text = Message::Text(message.to_json().into());
        if let Err(e) = clients[index].ws.send(text)
            && !is_would_block(&e)
        {
            crate::debug!("ws"; "client {} disconnected: {}", target, e);
            clients.remove(index);
        }
    }
}

fn broadcast_locked(clients: &mut Vec<Client>, message: &ServerMessage) {
    let text = Message::Text(message.to_json().into());
    let count = clients.len();
    clients.retain_mut(|client| match client.ws.send(text.clone()) {
        Ok(()) => true,
        Err(e) if is_would_block(&e) => true,
        Err(e) => {
            crate::debug!("ws"; "client {} disconnected: {}", client.id, e);
            false
        }
    });
    crate::debug!("ws"; "broadcast to {} clients", count);
}

fn is_would_block(e: &tungstenite::Error) -> bool {
    matches!(e, tungstenite::Error::Io(io) if io.kind() == std::io::ErrorKind::WouldBlock)
}

/// Background thread: poll every client, then act on what arrived with the
/// lock released so a full patch queue never stalls replies.
fn client_reader_loop(shared: &Shared, ws_tx: &mpsc::Sender<WsMsg>, patch_tx: &mpsc::Sender<PatchMsg>) {
    let mut last_ping = Instant::now();

    while !shared.stop.load(Ordering::SeqCst) && !crate::core::is_shutdown() {
        std::thread::sleep(POLL_INTERVAL);

        let mut inbound = Vec::new();
        {
            let mut clients = shared.clients.lock();
            clients.retain_mut(|client| loop {
                match client.ws.read() {
                    Ok(Message::Text(text)) => inbound.push((client.id, text.as_str().to_owned())),
                    Ok(Message::Close(_)) => {
                        crate::debug!("ws"; "client {} closed", client.id);
                        return false;
                    }
                    Ok(_) => {}
                    Err(ref e) if is_would_block(e) => return true,
                    Err(e) => {
                        crate::debug!("ws"; "client {} read error: {}", client.id, e);
                        return false;
                    }
                }
            });

            if last_ping.elapsed() >= PING_INTERVAL {
                last_ping = Instant::now();
                if !clients.is_empty() {
                    broadcast_locked(&mut clients, &ServerMessage::ping());
                }
            }
        }

        let correlator = Correlator::new(&shared.registry, &shared.attribute);
        for (client, text) in inbound {
            match handle_text(client, &text, &correlator) {
                Inbound::Reply(message) => {
                    if ws_tx.blocking_send(WsMsg::Reply { client, message }).is_err() {
                        return;
                    }
                }
                Inbound::Forward(msg) => {
                    if patch_tx.blocking_send(msg).is_err() {
                        return;
                    }
                }
                Inbound::Ignore => {}
            }
        }
    }
}

fn handle_text(client: ClientId, text: &str, correlator: &Correlator<'_>) -> Inbound {
    let message = match ClientMessage::from_json(text) {
        Ok(message) => message,
        Err(e) => {
            crate::log!("ws"; "invalid message from client {}: {}", client, e);
            return Inbound::Reply(ServerMessage::failed(None, "invalid_message", e.to_string()));
        }
    };

    match message {
        ClientMessage::SaveProperties {
            request_id,
            module_id,
            node_id,
            patch,
            fingerprint,
        } => Inbound::Forward(PatchMsg::Save {
            client,
            request_id,
            target: SaveTarget::Element(PatchRequest {
                module_id,
                node_id,
                patch,
                fingerprint,
            }),
        }),
        ClientMessage::SaveNode {
            request_id,
            id,
            patch,
        } => Inbound::Forward(PatchMsg::Save {
            client,
            request_id,
            target: SaveTarget::Node { id, patch },
        }),
        ClientMessage::ReadTree {
            request_id,
            anchor,
            tree,
        } => Inbound::Reply(match correlator.correlate(tree.as_ref(), anchor) {
            Ok(forest) => {
                crate::debug!("ws"; "correlated {} live nodes", forest.len());
                ServerMessage::tree(request_id, forest)
            }
            Err(e) => ServerMessage::correlate_failed(request_id, &e),
        }),
        ClientMessage::Pong { ts } => {
            crate::debug!("ws"; "pong from client {} ({})", client, ts);
            Inbound::Ignore
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::analyze;
    use crate::registry::{ElementKey, ModuleEntry};
    use crate::syntax::NodeId;
    use serde_json::{Value, json};
    use std::path::Path;

    const ATTR: &str = "data-pimento-node";

    fn registry() -> ModuleRegistry {
        let registry = ModuleRegistry::default();
        let path = Path::new("/app/src/Card.tsx");
        let text = "export const Card = () => <Box><Title text=\"Hi\" /></Box>;";
        let analysis = analyze(path, text, ATTR).unwrap();
        registry.insert(ModuleEntry::new(path, text.to_string(), analysis));
        registry
    }

    fn reply_json(inbound: Inbound) -> Value {
        match inbound {
            Inbound::Reply(message) => serde_json::from_str(&message.to_json()).unwrap(),
            _ => panic!("expected a reply"),
        }
    }

    #[test]
    fn test_save_properties_forwarded() {
        let registry = registry();
        let correlator = Correlator::new(&registry, ATTR);
        let text = json!({
            "type": "save_properties",
            "requestId": 4,
            "moduleId": "/app/src/Card.tsx",
            "nodeId": "node-2",
            "patch": [{"op": "replace", "path": ["text"], "value": "Hello"}]
        })
        .to_string();

        match handle_text(9, &text, &correlator) {
            Inbound::Forward(PatchMsg::Save {
                client,
                request_id,
                target: SaveTarget::Element(request),
            }) => {
                assert_eq!(client, 9);
                assert_eq!(request_id, Some(crate::transport::RequestId::Number(4)));
                assert_eq!(request.node_id, NodeId::new(2));
                assert_eq!(request.patch.operations().len(), 1);
            }
            _ => panic!("expected a forwarded save"),
        }
    }

    #[test]
    fn test_save_node_forwarded() {
        let registry = registry();
        let correlator = Correlator::new(&registry, ATTR);
        let key = ElementKey::new("/app/src/Card.tsx", NodeId::new(1));
        let text = json!({ "type": "save_node", "id": key.to_string(), "patch": [] }).to_string();

        assert!(matches!(
            handle_text(1, &text, &correlator),
            Inbound::Forward(PatchMsg::Save { target: SaveTarget::Node { id, .. }, .. }) if id == key
        ));
    }

    #[test]
    fn test_read_tree_replies_with_forest() {
        let registry = registry();
        let correlator = Correlator::new(&registry, ATTR);
        let text = json!({
            "type": "read_tree",
            "request_id": "r1",
            "tree": {
                "type": "Card",
                "children": [{
                    "type": "Box",
                    "props": { ATTR: { "moduleId": "/app/src/Card.tsx", "nodeId": "node-1" } },
                    "boundary": 11,
                    "children": [{
                        "type": "Title",
                        "props": {
                            "text": "Hi",
                            ATTR: { "moduleId": "/app/src/Card.tsx", "nodeId": "node-2" }
                        },
                        "boundary": 12
                    }]
                }]
            }
        })
        .to_string();

        let reply = reply_json(handle_text(1, &text, &correlator));
        assert_eq!(reply["type"], "tree");
        assert_eq!(reply["request_id"], "r1");
        let nodes = reply["forest"]["nodes"].as_array().unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[1]["jsxTagName"], "Title");
        assert_eq!(nodes[1]["props"], json!({ "text": "Hi" }));
    }

    #[test]
    fn test_read_tree_without_tree_fails() {
        let registry = registry();
        let correlator = Correlator::new(&registry, ATTR);
        let text = json!({ "type": "read_tree", "request_id": 2 }).to_string();

        let reply = reply_json(handle_text(1, &text, &correlator));
        assert_eq!(reply["type"], "ack");
        assert_eq!(reply["ok"], false);
        assert_eq!(reply["error"]["kind"], "introspection_unavailable");
    }

    #[test]
    fn test_invalid_message_and_pong() {
        let registry = registry();
        let correlator = Correlator::new(&registry, ATTR);

        let reply = reply_json(handle_text(1, "{\"type\":\"reload\"}", &correlator));
        assert_eq!(reply["error"]["kind"], "invalid_message");

        let pong = json!({ "type": "pong", "ts": 5 }).to_string();
        assert!(matches!(handle_text(1, &pong, &correlator), Inbound::Ignore));
    }
}
