//! FileSystem Actor
//!
//! Watches the include base directories and the config file, and sends
//! debounced module changes to the TransformActor.
//!
//! ```text
//! Watcher → Debouncer (pure timing) → ChangeFilter (which modules) → TransformMsg
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use rustc_hash::FxHashMap;
use tokio::sync::mpsc;

use super::messages::TransformMsg;
use crate::config::PimentoConfig;
use crate::pipeline::ModuleTransformer;
use crate::registry::module_id;
use crate::utils::path::normalize_path;

const DEBOUNCE_MS: u64 = 300;
const REBUILD_COOLDOWN_MS: u64 = 800;

/// Editor artifacts and our own atomic-write temp files.
fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "tmp")
        || name.ends_with('~')
        || name.starts_with(".#")
}

pub struct FsActor {
    /// Sync -> async bridge for notify
    notify_rx: std::sync::mpsc::Receiver<notify::Result<notify::Event>>,
    /// Kept alive for the lifetime of the actor
    _watcher: RecommendedWatcher,
    transform_tx: mpsc::Sender<TransformMsg>,
    debouncer: Debouncer,
    filter: ChangeFilter,
}

impl FsActor {
    pub fn new(
        config: &PimentoConfig,
        transformer: Arc<ModuleTransformer>,
        transform_tx: mpsc::Sender<TransformMsg>,
    ) -> notify::Result<Self> {
        let (notify_tx, notify_rx) = std::sync::mpsc::channel();

        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = notify_tx.send(res);
        })?;

        for path in watch_paths(config, &transformer) {
            if path.exists() {
                let mode = if path.is_dir() {
                    RecursiveMode::Recursive
                } else {
                    RecursiveMode::NonRecursive
                };
                watcher.watch(&path, mode)?;
                crate::debug!("watch"; "watching {}", path.display());
            }
        }

        Ok(Self {
            notify_rx,
            _watcher: watcher,
            transform_tx,
            debouncer: Debouncer::new(),
            filter: ChangeFilter {
                transformer,
                config_path: config.config_path.clone(),
                output: config.build.output.clone(),
            },
        })
    }

    pub async fn run(self) {
        let notify_rx = self.notify_rx;
        let transform_tx = self.transform_tx;
        let filter = self.filter;
        let mut debouncer = self.debouncer;

        let (async_tx, mut async_rx) = mpsc::channel::<notify::Event>(64);

        std::thread::spawn(move || {
            while let Ok(result) = notify_rx.recv() {
                match result {
                    Ok(event) => {
                        if async_tx.blocking_send(event).is_err() {
                            break;
                        }
                    }
                    Err(e) => crate::log!("watch"; "notify error: {}", e),
                }
            }
        });

        loop {
            tokio::select! {
                biased;
                Some(event) = async_rx.recv() => debouncer.add_event(&event),
                _ = tokio::time::sleep(debouncer.sleep_duration()) => {
                    let Some(raw) = debouncer.take_if_ready() else {
                        continue;
                    };
                    for msg in filter.messages(raw) {
                        if transform_tx.send(msg).await.is_err() {
                            return;
                        }
                    }
                }
            }
        }
    }
}

fn watch_paths(config: &PimentoConfig, transformer: &ModuleTransformer) -> Vec<PathBuf> {
    let mut paths = transformer.matcher().base_dirs().to_vec();
    if config.config_path.exists() && !paths.iter().any(|p| config.config_path.starts_with(p)) {
        paths.push(config.config_path.clone());
    }
    paths
}

// =============================================================================
// Change types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChangeKind {
    Created,
    Modified,
    Removed,
}

impl ChangeKind {
    fn label(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Modified => "modified",
            Self::Removed => "removed",
        }
    }
}

// =============================================================================
// Debouncer - Pure timing and event deduplication
// =============================================================================

struct Debouncer {
    changes: FxHashMap<PathBuf, ChangeKind>,
    last_event: Option<std::time::Instant>,
    last_flush: Option<std::time::Instant>,
}

impl Debouncer {
    fn new() -> Self {
        Self {
            changes: FxHashMap::default(),
            last_event: None,
            last_flush: None,
        }
    }

    /// Add a notify event:
    /// - Remove + Create/Modify → Create/Modify (restored)
    /// - Modify + Remove → Remove
    /// - Create + Remove → dropped
    /// - otherwise the first event wins
    fn add_event(&mut self, event: &notify::Event) {
        use notify::EventKind;

        let kind = match event.kind {
            EventKind::Create(_) => ChangeKind::Created,
            EventKind::Remove(_) => ChangeKind::Removed,
            EventKind::Modify(modify) => {
                // Metadata-only changes (mtime, chmod)
                if matches!(modify, notify::event::ModifyKind::Metadata(_)) {
                    return;
                }
                ChangeKind::Modified
            }
            _ => return,
        };

        for path in &event.paths {
            if is_temp_file(path) {
                continue;
            }
            let path = normalize_path(path);

            if let Some(&existing) = self.changes.get(&path) {
                match (existing, kind) {
                    (ChangeKind::Removed, ChangeKind::Created | ChangeKind::Modified) => {
                        self.changes.insert(path, kind);
                    }
                    (ChangeKind::Modified, ChangeKind::Removed) => {
                        self.changes.insert(path, ChangeKind::Removed);
                    }
                    (ChangeKind::Created, ChangeKind::Removed) => {
                        self.changes.remove(&path);
                    }
                    _ => continue,
                }
                self.last_event = Some(std::time::Instant::now());
                continue;
            }

            crate::debug!("watch"; "{}: {}", kind.label(), path.display());
            self.changes.insert(path, kind);
            self.last_event = Some(std::time::Instant::now());
        }
    }

    fn take_if_ready(&mut self) -> Option<FxHashMap<PathBuf, ChangeKind>> {
        if !self.is_ready() {
            return None;
        }
        let changes = std::mem::take(&mut self.changes);
        self.last_event = None;
        self.last_flush = Some(std::time::Instant::now());
        Some(changes)
    }

    fn is_ready(&self) -> bool {
        let Some(last_event) = self.last_event else {
            return false;
        };
        if last_event.elapsed() < Duration::from_millis(DEBOUNCE_MS) {
            return false;
        }
        if let Some(last_flush) = self.last_flush
            && last_flush.elapsed() < Duration::from_millis(REBUILD_COOLDOWN_MS)
        {
            return false;
        }
        !self.changes.is_empty()
    }

    /// Sleep until the next moment the batch could be ready.
    fn sleep_duration(&self) -> Duration {
        let Some(last_event) = self.last_event else {
            return Duration::from_secs(86400);
        };

        let debounce_remaining =
            Duration::from_millis(DEBOUNCE_MS).saturating_sub(last_event.elapsed());
        let cooldown_remaining = self
            .last_flush
            .map(|t| Duration::from_millis(REBUILD_COOLDOWN_MS).saturating_sub(t.elapsed()))
            .unwrap_or(Duration::ZERO);

        debounce_remaining
            .max(cooldown_remaining)
            .max(Duration::from_millis(1))
    }
}

// =============================================================================
// ChangeFilter - which debounced paths matter
// =============================================================================

struct ChangeFilter {
    transformer: Arc<ModuleTransformer>,
    config_path: PathBuf,
    output: PathBuf,
}

impl ChangeFilter {
    fn messages(&self, raw: FxHashMap<PathBuf, ChangeKind>) -> Vec<TransformMsg> {
        if raw.contains_key(&self.config_path) {
            crate::log!("watch"; "config changed, re-instrumenting");
            return vec![TransformMsg::Rescan];
        }

        let mut changed = Vec::new();
        let mut removed = Vec::new();

        for (path, kind) in raw {
            if path.starts_with(&self.output) {
                continue;
            }
            match correct_by_existence(&path, kind) {
                Some(ChangeKind::Created | ChangeKind::Modified) => {
                    if path.is_file() && self.transformer.is_applicable(&path) {
                        changed.push(path);
                    }
                }
                Some(ChangeKind::Removed) => removed.extend(self.tracked_under(&path)),
                None => {}
            }
        }

        changed.sort();
        removed.sort();
        removed.dedup();

        // Removals first so a rename evicts before it re-registers.
        let mut messages = Vec::new();
        if !removed.is_empty() {
            messages.push(TransformMsg::Removed(removed));
        }
        if !changed.is_empty() {
            messages.push(TransformMsg::Changed(changed));
        }
        messages
    }

    /// Registered modules at `path` or, for a removed directory, below it.
    fn tracked_under(&self, path: &Path) -> Vec<PathBuf> {
        let registry = self.transformer.registry();
        if registry.get(&module_id(path)).is_some() {
            return vec![path.to_path_buf()];
        }
        registry
            .ids()
            .into_iter()
            .map(PathBuf::from)
            .filter(|p| p.starts_with(path) && !p.exists())
            .collect()
    }
}

/// Reconcile an event with what is on disk now. `None` drops it.
fn correct_by_existence(path: &Path, kind: ChangeKind) -> Option<ChangeKind> {
    let exists = path.exists();
    match kind {
        ChangeKind::Created if !exists => None,
        ChangeKind::Modified if !exists => Some(ChangeKind::Removed),
        ChangeKind::Removed if exists => Some(ChangeKind::Modified),
        other => Some(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config_at;
    use crate::registry::ModuleRegistry;
    use std::fs;
    use tempfile::TempDir;

    fn make_event(paths: Vec<&str>, kind: notify::EventKind) -> notify::Event {
        notify::Event {
            kind,
            paths: paths.into_iter().map(PathBuf::from).collect(),
            attrs: Default::default(),
        }
    }

    fn modify_kind() -> notify::EventKind {
        notify::EventKind::Modify(notify::event::ModifyKind::Data(
            notify::event::DataChange::Any,
        ))
    }

    fn create_kind() -> notify::EventKind {
        notify::EventKind::Create(notify::event::CreateKind::File)
    }

    fn remove_kind() -> notify::EventKind {
        notify::EventKind::Remove(notify::event::RemoveKind::File)
    }

    fn filter(dir: &TempDir) -> ChangeFilter {
        let config = test_config_at(dir.path());
        let registry = Arc::new(ModuleRegistry::default());
        let transformer = ModuleTransformer::from_config(&config, registry).unwrap();
        ChangeFilter {
            transformer: Arc::new(transformer),
            config_path: config.config_path.clone(),
            output: config.build.output.clone(),
        }
    }

    #[test]
    fn test_debouncer_empty() {
        let debouncer = Debouncer::new();
        assert!(!debouncer.is_ready());
        assert!(debouncer.sleep_duration() >= Duration::from_secs(3600));
    }

    #[test]
    fn test_event_routing_by_kind() {
        let mut debouncer = Debouncer::new();
        debouncer.add_event(&make_event(vec!["/tmp/a.tsx"], create_kind()));
        debouncer.add_event(&make_event(vec!["/tmp/b.tsx"], modify_kind()));
        debouncer.add_event(&make_event(vec!["/tmp/c.tsx"], remove_kind()));

        assert_eq!(debouncer.changes.len(), 3);
        assert_eq!(debouncer.changes[&PathBuf::from("/tmp/a.tsx")], ChangeKind::Created);
        assert_eq!(debouncer.changes[&PathBuf::from("/tmp/b.tsx")], ChangeKind::Modified);
        assert_eq!(debouncer.changes[&PathBuf::from("/tmp/c.tsx")], ChangeKind::Removed);
    }

    #[test]
    fn test_temp_files_ignored() {
        let mut debouncer = Debouncer::new();
        debouncer.add_event(&make_event(
            vec![
                "/tmp/.App.tsx.pimento-1.tmp",
                "/tmp/App.tsx~",
                "/tmp/.App.tsx.swp",
                "/tmp/.#App.tsx",
            ],
            modify_kind(),
        ));
        assert!(debouncer.changes.is_empty());
        assert!(debouncer.last_event.is_none());
    }

    #[test]
    fn test_dot_named_modules_kept() {
        let mut debouncer = Debouncer::new();
        debouncer.add_event(&make_event(vec!["/tmp/src/.storybook.tsx"], modify_kind()));
        assert_eq!(
            debouncer.changes[&PathBuf::from("/tmp/src/.storybook.tsx")],
            ChangeKind::Modified
        );
    }

    #[test]
    fn test_dedup_transitions() {
        let mut debouncer = Debouncer::new();
        debouncer.add_event(&make_event(vec!["/tmp/a.tsx"], remove_kind()));
        debouncer.add_event(&make_event(vec!["/tmp/a.tsx"], create_kind()));
        assert_eq!(debouncer.changes[&PathBuf::from("/tmp/a.tsx")], ChangeKind::Created);

        debouncer.add_event(&make_event(vec!["/tmp/b.tsx"], modify_kind()));
        debouncer.add_event(&make_event(vec!["/tmp/b.tsx"], remove_kind()));
        assert_eq!(debouncer.changes[&PathBuf::from("/tmp/b.tsx")], ChangeKind::Removed);

        debouncer.add_event(&make_event(vec!["/tmp/c.tsx"], create_kind()));
        debouncer.add_event(&make_event(vec!["/tmp/c.tsx"], remove_kind()));
        assert!(!debouncer.changes.contains_key(&PathBuf::from("/tmp/c.tsx")));
    }

    #[test]
    fn test_sleep_duration_respects_cooldown() {
        let mut debouncer = Debouncer::new();
        debouncer.last_event = Some(std::time::Instant::now());
        debouncer.last_flush = Some(std::time::Instant::now());

        let dur = debouncer.sleep_duration();
        assert!(dur >= Duration::from_millis(REBUILD_COOLDOWN_MS - 10));
        assert!(dur <= Duration::from_millis(REBUILD_COOLDOWN_MS + 10));
    }

    #[test]
    fn test_filter_changed_modules() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/App.tsx"), "<A />").unwrap();
        fs::write(dir.path().join("src/app.css"), "").unwrap();
        fs::write(dir.path().join("README.md"), "").unwrap();

        let filter = filter(&dir);
        let mut raw = FxHashMap::default();
        raw.insert(dir.path().join("src/App.tsx"), ChangeKind::Modified);
        raw.insert(dir.path().join("src/app.css"), ChangeKind::Modified);
        raw.insert(dir.path().join("README.md"), ChangeKind::Created);
        raw.insert(dir.path().join("src/Gone.tsx"), ChangeKind::Created);

        let messages = filter.messages(raw);
        assert_eq!(messages.len(), 1);
        assert!(matches!(
            &messages[0],
            TransformMsg::Changed(paths) if paths == &[dir.path().join("src/App.tsx")]
        ));
    }

    #[test]
    fn test_filter_dot_named_module() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        let hidden = dir.path().join("src/.preview.tsx");
        fs::write(&hidden, "<Preview />").unwrap();

        let mut raw = FxHashMap::default();
        raw.insert(hidden.clone(), ChangeKind::Modified);
        let messages = filter(&dir).messages(raw);
        assert!(matches!(
            &messages[..],
            [TransformMsg::Changed(paths)] if paths == std::slice::from_ref(&hidden)
        ));
    }

    #[test]
    fn test_filter_removed_tracked_only() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("src/nested")).unwrap();
        let tracked = dir.path().join("src/nested/Card.tsx");
        fs::write(&tracked, "<Card />").unwrap();

        let filter = filter(&dir);
        filter.transformer.transform_file(&tracked).unwrap();
        fs::remove_dir_all(dir.path().join("src/nested")).unwrap();

        let mut raw = FxHashMap::default();
        raw.insert(dir.path().join("src/nested"), ChangeKind::Removed);
        raw.insert(dir.path().join("src/Never.tsx"), ChangeKind::Removed);

        let messages = filter.messages(raw);
        assert_eq!(messages.len(), 1);
        assert!(matches!(&messages[0], TransformMsg::Removed(paths) if paths == &[tracked.clone()]));
    }

    #[test]
    fn test_filter_config_change_rescans() {
        let dir = TempDir::new().unwrap();
        let filter = filter(&dir);
        let mut raw = FxHashMap::default();
        raw.insert(dir.path().join("pimento.toml"), ChangeKind::Modified);
        assert!(matches!(filter.messages(raw).as_slice(), [TransformMsg::Rescan]));
    }

    #[test]
    fn test_filter_ignores_output() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join(".pimento/out/src");
        fs::create_dir_all(&out).unwrap();
        fs::write(out.join("App.tsx"), "").unwrap();

        let filter = filter(&dir);
        let mut raw = FxHashMap::default();
        raw.insert(out.join("App.tsx"), ChangeKind::Modified);
        assert!(filter.messages(raw).is_empty());
    }
}
