//! `pimento serve`: instrument, watch, and accept patches over WebSocket.
//!
//! The actor system runs on its own thread with a small tokio runtime; the
//! main thread joins it after Ctrl+C.

use crate::{
    actor::Coordinator,
    cli::instrument::instrument_all,
    config::PimentoConfig,
    core::register_shutdown,
    log,
    patch::PatchEngine,
    pipeline::ModuleTransformer,
    registry::ModuleRegistry,
};
use anyhow::Result;
use crossbeam::channel::{self, Receiver};
use std::{
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

pub fn run(config: PimentoConfig) -> Result<()> {
    let config = Arc::new(config);
    let registry = Arc::new(ModuleRegistry::new(config.registry.capacity()));
    let transformer = Arc::new(ModuleTransformer::from_config(&config, Arc::clone(&registry))?);
    let engine = Arc::new(PatchEngine::from_config(&config, registry));

    let report = instrument_all(&config, &transformer, true)?;
    log!(
        "serve";
        "{} modules instrumented{}",
        report.transformed + report.reused,
        if report.failed > 0 {
            format!(", {} failed", report.failed)
        } else {
            String::new()
        }
    );

    let (shutdown_tx, shutdown_rx) = channel::unbounded::<()>();
    register_shutdown(shutdown_tx);

    let handle = spawn_actors(config, transformer, engine, shutdown_rx);
    let _ = handle.join();
    Ok(())
}

/// Spawn the actor system thread.
fn spawn_actors(
    config: Arc<PimentoConfig>,
    transformer: Arc<ModuleTransformer>,
    engine: Arc<PatchEngine>,
    shutdown_rx: Receiver<()>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let rt = match tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
        {
            Ok(rt) => rt,
            Err(e) => {
                log!("actor"; "failed to create tokio runtime: {}", e);
                return;
            }
        };

        rt.block_on(async {
            let coordinator =
                Coordinator::new(config, transformer, engine).with_shutdown_signal(shutdown_rx);
            if let Err(e) = coordinator.run().await {
                log!("actor"; "error: {:#}", e);
            }
        });
        rt.shutdown_timeout(Duration::from_millis(500));
    })
}
