//! Actor Coordinator - Wires up the Serve Actor System
//!
//! # Responsibility
//!
//! The Coordinator is a **thin orchestrator** that:
//! - Creates communication channels
//! - Binds the WebSocket listener
//! - Wires up actors and runs them until shutdown
//!
//! It does NOT contain business logic - that lives in `pipeline/` and `patch/`.
//!
//! # Architecture
//!
//! ```text
//! FsActor --> TransformActor --> WsActor <--> PatchActor
//! (watch)      (instrument)      (clients)     (FIFO saves)
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam::channel::Receiver;
use tokio::sync::mpsc;

use super::fs::FsActor;
use super::messages::{PatchMsg, TransformMsg, WsMsg};
use super::patch::PatchActor;
use super::transform::TransformActor;
use super::ws::WsActor;
use crate::config::PimentoConfig;
use crate::patch::PatchEngine;
use crate::pipeline::ModuleTransformer;
use crate::transport::start_ws_server;

/// Channel buffer size
const CHANNEL_BUFFER: usize = 32;

/// Coordinator - wires up and runs the actor system
pub struct Coordinator {
    config: Arc<PimentoConfig>,
    transformer: Arc<ModuleTransformer>,
    engine: Arc<PatchEngine>,
    /// Optional shutdown signal receiver
    shutdown_rx: Option<Receiver<()>>,
}

impl Coordinator {
    pub fn new(
        config: Arc<PimentoConfig>,
        transformer: Arc<ModuleTransformer>,
        engine: Arc<PatchEngine>,
    ) -> Self {
        Self {
            config,
            transformer,
            engine,
            shutdown_rx: None,
        }
    }

    /// Set shutdown signal receiver
    pub fn with_shutdown_signal(mut self, rx: Receiver<()>) -> Self {
        self.shutdown_rx = Some(rx);
        self
    }

    /// Run the actor system. Returns once shutdown completes.
    pub async fn run(mut self) -> Result<()> {
        let (transform_tx, transform_rx) = mpsc::channel::<TransformMsg>(CHANNEL_BUFFER);
        let (patch_tx, patch_rx) = mpsc::channel::<PatchMsg>(CHANNEL_BUFFER);
        let (ws_tx, ws_rx) = mpsc::channel::<WsMsg>(CHANNEL_BUFFER);

        let serve = &self.config.serve;
        let addr: SocketAddr = start_ws_server(serve.interface, serve.port, ws_tx.clone())
            .context("websocket server failed")?;
        crate::log!("serve"; "ws://{}", addr);

        let fs_actor = if serve.watch {
            let actor = FsActor::new(&self.config, Arc::clone(&self.transformer), transform_tx.clone())
                .map_err(|e| anyhow::anyhow!("watcher failed: {}", e))?;
            Some(actor)
        } else {
            None
        };

        let transform_actor = TransformActor::new(
            transform_rx,
            ws_tx.clone(),
            Arc::clone(&self.config),
            Arc::clone(&self.transformer),
        );
        let patch_actor = PatchActor::new(patch_rx, ws_tx.clone(), Arc::clone(&self.engine));
        let ws_actor = WsActor::new(
            ws_rx,
            ws_tx.clone(),
            patch_tx.clone(),
            Arc::clone(self.transformer.registry()),
            &self.transformer.options().attribute,
        );

        crate::debug!("actor"; "start");
        let actors = Actors {
            fs: fs_actor,
            transform: transform_actor,
            patch: patch_actor,
            ws: ws_actor,
        };
        let senders = Senders {
            transform: transform_tx,
            patch: patch_tx,
            ws: ws_tx,
        };
        run_actors(actors, senders, self.shutdown_rx.take()).await;

        crate::debug!("actor"; "stopped");
        Ok(())
    }
}

struct Actors {
    fs: Option<FsActor>,
    transform: TransformActor,
    patch: PatchActor,
    ws: WsActor,
}

struct Senders {
    transform: mpsc::Sender<TransformMsg>,
    patch: mpsc::Sender<PatchMsg>,
    ws: mpsc::Sender<WsMsg>,
}

/// Run all actors concurrently until the shutdown signal, then stop them in
/// pipeline order so an in-flight patch still gets its reply out.
async fn run_actors(actors: Actors, senders: Senders, shutdown_rx: Option<Receiver<()>>) {
    let fs_handle = actors.fs.map(|fs| tokio::spawn(fs.run()));
    let transform_handle = tokio::spawn(actors.transform.run());
    let patch_handle = tokio::spawn(actors.patch.run());
    let ws_handle = tokio::spawn(actors.ws.run());

    match shutdown_rx {
        // Poll-based: the signal comes from the Ctrl+C handler thread.
        Some(rx) => loop {
            if rx.try_recv().is_ok() || crate::core::is_shutdown() {
                crate::debug!("actor"; "shutdown signal received");
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        },
        None => {
            let _ = ws_handle.await;
            return;
        }
    }

    if let Some(handle) = fs_handle {
        handle.abort();
    }
    let _ = senders.transform.send(TransformMsg::Shutdown).await;
    let _ = senders.patch.send(PatchMsg::Shutdown).await;

    let grace = Duration::from_millis(500);
    let _ = tokio::time::timeout(grace, transform_handle).await;
    let _ = tokio::time::timeout(grace, patch_handle).await;

    let _ = senders.ws.send(WsMsg::Shutdown).await;
    let _ = tokio::time::timeout(grace, ws_handle).await;
}
