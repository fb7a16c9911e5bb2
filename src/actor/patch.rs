//! Patch Actor
//!
//! Applies save requests strictly in arrival order: each patch reads the
//! registry entry the previous one wrote, so two edits to the same module
//! compose instead of racing.
//!
//! ```text
//! WsActor --[Save]--> PatchActor --[Reply to sender]--> WsActor
//!                          |
//!                          +------[module_updated]----> WsActor (broadcast)
//! ```

use std::sync::Arc;

use tokio::sync::mpsc;

use super::messages::{ClientId, PatchMsg, WsMsg};
use crate::logger::{status_error, status_success};
use crate::patch::{PatchEngine, PatchError, PatchOutcome};
use crate::transport::{RequestId, SaveTarget, ServerMessage};

pub struct PatchActor {
    rx: mpsc::Receiver<PatchMsg>,
    ws_tx: mpsc::Sender<WsMsg>,
    engine: Arc<PatchEngine>,
}

impl PatchActor {
    pub fn new(rx: mpsc::Receiver<PatchMsg>, ws_tx: mpsc::Sender<WsMsg>, engine: Arc<PatchEngine>) -> Self {
        Self { rx, ws_tx, engine }
    }

    pub async fn run(mut self) {
        while let Some(msg) = self.rx.recv().await {
            match msg {
                PatchMsg::Save {
                    client,
                    request_id,
                    target,
                } => self.handle_save(client, request_id, target).await,
                PatchMsg::Shutdown => {
                    crate::debug!("patch"; "shutting down");
                    break;
                }
            }
        }
    }

    async fn handle_save(&self, client: ClientId, request_id: Option<RequestId>, target: SaveTarget) {
        let engine = Arc::clone(&self.engine);
        // Awaited before the next message: this is what keeps patches FIFO.
        let result = tokio::task::spawn_blocking(move || apply_target(&engine, &target)).await;

        let reply = match result {
            Ok(Ok(outcome)) => {
                report_success(&outcome);
                if outcome.written {
                    let update = ServerMessage::module_updated(&outcome.entry);
                    let _ = self.ws_tx.send(WsMsg::Broadcast(update)).await;
                }
                ServerMessage::ok(request_id)
            }
            Ok(Err(err)) => {
                status_error(&format!("patch failed while {}", err.stage()), &err.to_string());
                ServerMessage::patch_failed(request_id, &err)
            }
            Err(e) => {
                crate::log!("patch"; "task panicked: {}", e);
                ServerMessage::failed(request_id, "internal", e.to_string())
            }
        };

        let _ = self
            .ws_tx
            .send(WsMsg::Reply {
                client,
                message: reply,
            })
            .await;
    }
}

fn apply_target(engine: &PatchEngine, target: &SaveTarget) -> Result<PatchOutcome, PatchError> {
    match target {
        SaveTarget::Element(request) => engine.apply(request),
        SaveTarget::Node { id, patch } => engine.apply_to_key(*id, patch),
    }
}

fn report_success(outcome: &PatchOutcome) {
    let path = outcome.entry.path.display();
    match (outcome.written, outcome.formatted) {
        (false, _) => status_success(&format!("{path} unchanged")),
        (true, true) => status_success(&format!("patched {path} (formatted)")),
        (true, false) => status_success(&format!("patched {path}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::{Patch, PatchRequest};
    use crate::pipeline::analyze;
    use crate::registry::{ModuleEntry, ModuleRegistry, module_id};
    use crate::syntax::NodeId;
    use std::fs;
    use tempfile::TempDir;

    const PAGE: &str = "export const Page = () => <Grid columns={[{ field: \"id\" }]} />;\n";

    fn setup() -> (TempDir, std::path::PathBuf, Arc<PatchEngine>) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Page.tsx");
        fs::write(&path, PAGE).unwrap();

        let registry = Arc::new(ModuleRegistry::default());
        let analysis = analyze(&path, PAGE, "data-pimento-node").unwrap();
        registry.insert(ModuleEntry::new(&path, PAGE.to_string(), analysis));
        let engine = PatchEngine::new(registry, "data-pimento-node".into(), None);
        (dir, path, Arc::new(engine))
    }

    fn save(path: &std::path::Path, request_id: u64, patch: &str) -> PatchMsg {
        PatchMsg::Save {
            client: 7,
            request_id: Some(RequestId::Number(request_id)),
            target: SaveTarget::Element(PatchRequest {
                module_id: module_id(path),
                node_id: NodeId::new(1),
                patch: Patch::from_json(patch).unwrap(),
                fingerprint: None,
            }),
        }
    }

    #[tokio::test]
    async fn test_patches_apply_in_order() {
        let (_dir, path, engine) = setup();
        let (tx, rx) = mpsc::channel(8);
        let (ws_tx, mut ws_rx) = mpsc::channel(16);
        let handle = tokio::spawn(PatchActor::new(rx, ws_tx, engine).run());

        tx.send(save(
            &path,
            1,
            r#"[{"op":"add","path":["columns",0,"type"],"value":"number"}]"#,
        ))
        .await
        .unwrap();
        tx.send(save(
            &path,
            2,
            r#"[{"op":"replace","path":["columns",0,"type"],"value":"text"}]"#,
        ))
        .await
        .unwrap();
        tx.send(PatchMsg::Shutdown).await.unwrap();
        handle.await.unwrap();

        let mut acks = Vec::new();
        let mut updates = 0;
        while let Ok(msg) = ws_rx.try_recv() {
            match msg {
                WsMsg::Reply { client, message } => {
                    assert_eq!(client, 7);
                    acks.push(message.to_json());
                }
                WsMsg::Broadcast(_) => updates += 1,
                _ => panic!("unexpected message"),
            }
        }
        assert_eq!(updates, 2);
        assert_eq!(acks.len(), 2);
        assert!(acks[0].contains("\"request_id\":1") && acks[0].contains("\"ok\":true"));
        assert!(acks[1].contains("\"request_id\":2") && acks[1].contains("\"ok\":true"));

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "export const Page = () => <Grid columns={[{ field: \"id\", type: \"text\" }]} />;\n"
        );
    }

    #[tokio::test]
    async fn test_failure_is_acked_with_kind() {
        let (_dir, path, engine) = setup();
        let (tx, rx) = mpsc::channel(8);
        let (ws_tx, mut ws_rx) = mpsc::channel(8);
        let handle = tokio::spawn(PatchActor::new(rx, ws_tx, engine).run());

        tx.send(save(
            &path,
            3,
            r#"[{"op":"replace","path":["rows"],"value":[]}]"#,
        ))
        .await
        .unwrap();
        tx.send(PatchMsg::Shutdown).await.unwrap();
        handle.await.unwrap();

        let Ok(WsMsg::Reply { message, .. }) = ws_rx.try_recv() else {
            panic!("expected a reply");
        };
        let json = message.to_json();
        assert!(json.contains("\"ok\":false"));
        assert!(json.contains("\"kind\":\"attribute_not_found\""));
        assert!(ws_rx.try_recv().is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), PAGE);
    }
}
