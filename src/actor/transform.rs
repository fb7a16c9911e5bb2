//! Transform Actor
//!
//! Re-instruments changed modules, evicts removed ones, and tells clients
//! which modules now carry a new fingerprint.
//!
//! ```text
//! FsActor --[Changed/Removed/Rescan]--> TransformActor --[module_updated]--> WsActor
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;

use super::messages::{TransformMsg, WsMsg};
use crate::cli::instrument::{instrument_all, remove_output, write_output};
use crate::config::PimentoConfig;
use crate::logger::{status_error, status_success};
use crate::pipeline::{ModuleTransformer, TransformOutcome};
use crate::registry::{ModuleEntry, module_id};
use crate::transport::ServerMessage;

pub struct TransformActor {
    rx: mpsc::Receiver<TransformMsg>,
    ws_tx: mpsc::Sender<WsMsg>,
    config: Arc<PimentoConfig>,
    transformer: Arc<ModuleTransformer>,
}

/// Result of re-instrumenting one batch, computed off the async runtime.
#[derive(Default)]
struct BatchResult {
    updated: Vec<Arc<ModuleEntry>>,
    errors: Vec<(PathBuf, String)>,
}

impl TransformActor {
    pub fn new(
        rx: mpsc::Receiver<TransformMsg>,
        ws_tx: mpsc::Sender<WsMsg>,
        config: Arc<PimentoConfig>,
        transformer: Arc<ModuleTransformer>,
    ) -> Self {
        Self {
            rx,
            ws_tx,
            config,
            transformer,
        }
    }

    pub async fn run(mut self) {
        while let Some(msg) = self.rx.recv().await {
            match msg {
                TransformMsg::Changed(paths) => self.handle_changed(paths).await,
                TransformMsg::Removed(paths) => self.handle_removed(&paths),
                TransformMsg::Rescan => self.handle_rescan().await,
                TransformMsg::Shutdown => {
                    crate::debug!("transform"; "shutting down");
                    break;
                }
            }
        }
    }

    async fn handle_changed(&self, paths: Vec<PathBuf>) {
        let config = Arc::clone(&self.config);
        let transformer = Arc::clone(&self.transformer);

        let result =
            tokio::task::spawn_blocking(move || transform_batch(&config, &transformer, &paths))
                .await;
        let result = match result {
            Ok(result) => result,
            Err(e) => {
                crate::log!("transform"; "task panicked: {}", e);
                return;
            }
        };

        for entry in &result.updated {
            self.broadcast(ServerMessage::module_updated(entry)).await;
        }

        if let Some((path, error)) = result.errors.first() {
            let summary = format!("{}", self.config.root_relative(path).display());
            status_error(&summary, error);
        } else if !result.updated.is_empty() {
            status_success(&self.describe(&result.updated));
        }
    }

    fn handle_removed(&self, paths: &[PathBuf]) {
        let registry = self.transformer.registry();
        for path in paths {
            if registry.remove(&module_id(path)).is_some() {
                crate::debug!("transform"; "evicted {}", path.display());
            }
            remove_output(&self.config, path);
        }
        status_success(&format!("removed {} module(s)", paths.len()));
    }

    async fn handle_rescan(&self) {
        let config = Arc::clone(&self.config);
        let transformer = Arc::clone(&self.transformer);

        let report =
            tokio::task::spawn_blocking(move || instrument_all(&config, &transformer, false)).await;
        match report {
            Ok(Ok(report)) if report.failed == 0 => status_success(&format!(
                "re-instrumented {} modules",
                report.transformed + report.reused
            )),
            Ok(Ok(report)) => status_error(
                "re-instrument failed",
                &format!("{} module(s) did not parse", report.failed),
            ),
            Ok(Err(e)) => status_error("re-instrument failed", &format!("{e:#}")),
            Err(e) => crate::log!("transform"; "task panicked: {}", e),
        }
    }

    async fn broadcast(&self, message: ServerMessage) {
        let _ = self.ws_tx.send(WsMsg::Broadcast(message)).await;
    }

    fn describe(&self, updated: &[Arc<ModuleEntry>]) -> String {
        match updated {
            [entry] => format!(
                "instrumented {}",
                self.config.root_relative(&entry.path).display()
            ),
            _ => format!("instrumented {} modules", updated.len()),
        }
    }
}

fn transform_batch(
    config: &PimentoConfig,
    transformer: &ModuleTransformer,
    paths: &[PathBuf],
) -> BatchResult {
    let mut result = BatchResult::default();
    for path in paths {
        match transformer.transform_file(path) {
            Ok(TransformOutcome::Transformed(output)) => {
                if let Err(e) = write_output(config, path, &output.code) {
                    result.errors.push((path.clone(), format!("{e:#}")));
                    continue;
                }
                // A patch already registered this content; clients know it.
                if !output.reused {
                    result.updated.push(output.entry);
                }
            }
            Ok(TransformOutcome::NotApplicable) => {}
            Err(e) => result.errors.push((path.clone(), e.to_string())),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config_at;
    use crate::registry::ModuleRegistry;
    use std::fs;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Arc<PimentoConfig>, Arc<ModuleTransformer>) {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        let config = test_config_at(dir.path());
        let transformer =
            ModuleTransformer::from_config(&config, Arc::new(ModuleRegistry::default())).unwrap();
        (dir, Arc::new(config), Arc::new(transformer))
    }

    #[test]
    fn test_transform_batch() {
        let (dir, config, transformer) = setup();
        let good = dir.path().join("src/App.tsx");
        let bad = dir.path().join("src/Broken.tsx");
        fs::write(&good, "export const App = () => <main />;\n").unwrap();
        fs::write(&bad, "export const B = () => <main>;\n").unwrap();

        let result = transform_batch(&config, &transformer, &[good.clone(), bad.clone()]);
        assert_eq!(result.updated.len(), 1);
        assert_eq!(result.updated[0].path, good);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].0, bad);
        assert!(dir.path().join(".pimento/out/src/App.tsx").exists());

        // Unchanged content is reused and not announced again.
        let again = transform_batch(&config, &transformer, &[good]);
        assert!(again.updated.is_empty());
        assert!(again.errors.is_empty());
    }

    #[tokio::test]
    async fn test_actor_broadcasts_and_evicts() {
        let (dir, config, transformer) = setup();
        let app = dir.path().join("src/App.tsx");
        fs::write(&app, "export const App = () => <main />;\n").unwrap();

        let (tx, rx) = mpsc::channel(8);
        let (ws_tx, mut ws_rx) = mpsc::channel(8);
        let actor = TransformActor::new(rx, ws_tx, config, Arc::clone(&transformer));
        let handle = tokio::spawn(actor.run());

        tx.send(TransformMsg::Changed(vec![app.clone()])).await.unwrap();
        let Some(WsMsg::Broadcast(message)) = ws_rx.recv().await else {
            panic!("expected a broadcast");
        };
        assert!(message.to_json().contains("\"module_updated\""));
        assert!(transformer.registry().get(&module_id(&app)).is_some());

        tx.send(TransformMsg::Removed(vec![app.clone()])).await.unwrap();
        tx.send(TransformMsg::Shutdown).await.unwrap();
        handle.await.unwrap();
        assert!(transformer.registry().get(&module_id(&app)).is_none());
        assert!(!dir.path().join(".pimento/out/src/App.tsx").exists());
    }
}
