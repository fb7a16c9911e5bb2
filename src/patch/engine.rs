//! `applyPatch(moduleId, nodeId, patch)`.

use super::apply::apply_operation;
use super::error::{PatchError, PatchStage};
use super::format::Formatter;
use super::model::{Patch, PatchRequest};
use crate::config::PimentoConfig;
use crate::debug;
use crate::freshness::ContentHash;
use crate::pipeline::analyze;
use crate::registry::{ElementKey, ModuleEntry, ModuleRegistry};
use crate::syntax::{MarkupElement, MarkupTree, NodeId, parse_module};
use crate::utils::path::write_atomic;
use std::sync::Arc;

/// A committed patch.
#[derive(Debug)]
pub struct PatchOutcome {
    /// The registry entry for the written text.
    pub entry: Arc<ModuleEntry>,
    /// False when the patch produced the text already on disk.
    pub written: bool,
    pub formatted: bool,
}

/// Applies patches against the registry and writes the results back.
///
/// Not internally synchronized per module: callers must feed patches
/// through one queue so each one sees the generation its predecessor wrote.
#[derive(Debug)]
pub struct PatchEngine {
    registry: Arc<ModuleRegistry>,
    attribute: String,
    formatter: Option<Formatter>,
}

impl PatchEngine {
    pub fn new(registry: Arc<ModuleRegistry>, attribute: String, formatter: Option<Formatter>) -> Self {
        Self {
            registry,
            attribute,
            formatter,
        }
    }

    pub fn from_config(config: &PimentoConfig, registry: Arc<ModuleRegistry>) -> Self {
        Self::new(
            registry,
            config.transform.attribute.clone(),
            Formatter::from_config(config),
        )
    }

    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }

    /// Patch the element a Live Node id points at.
    pub fn apply_to_key(&self, key: ElementKey, patch: &Patch) -> Result<PatchOutcome, PatchError> {
        let (module_id, node_id) = self
            .registry
            .resolve(key)
            .ok_or_else(|| PatchError::UnknownElement { id: key.to_string() })?;
        self.apply(&PatchRequest {
            module_id,
            node_id,
            patch: patch.clone(),
            fingerprint: None,
        })
    }

    /// Run one request to completion. On error nothing has been written and
    /// the registry still holds the previous generation.
    pub fn apply(&self, request: &PatchRequest) -> Result<PatchOutcome, PatchError> {
        let PatchRequest {
            module_id,
            node_id,
            patch,
            fingerprint,
        } = request;

        let entry = self.resolve_module(module_id, fingerprint.as_deref())?;
        trace_stage(module_id, *node_id, PatchStage::ResolvingNode);
        let mut tree = Arc::clone(&entry.tree);
        locate(&tree, module_id, *node_id)?;

        trace_stage(module_id, *node_id, PatchStage::ApplyingOps);
        let mut text = entry.text.clone();
        for (i, op) in patch.operations().iter().enumerate() {
            if i > 0 {
                tree = Arc::new(parse_module(&entry.path, &text).map_err(PatchError::InvalidOutput)?);
            }
            let element = locate(&tree, module_id, *node_id)?;
            text = apply_operation(&text, element, op)?;
        }

        trace_stage(module_id, *node_id, PatchStage::Generating);
        if !patch.is_empty() {
            parse_module(&entry.path, &text).map_err(PatchError::InvalidOutput)?;
        }

        let mut formatted = false;
        if text != entry.text
            && let Some(formatter) = &self.formatter
        {
            trace_stage(module_id, *node_id, PatchStage::Formatting);
            if let Some(output) = formatter.format(&entry.path, &text) {
                match parse_module(&entry.path, &output) {
                    Ok(_) => {
                        text = output;
                        formatted = true;
                    }
                    Err(e) => crate::log!("format"; "discarded unparsable output: {e}"),
                }
            }
        }

        if text == entry.text {
            return Ok(PatchOutcome {
                entry,
                written: false,
                formatted,
            });
        }

        trace_stage(module_id, *node_id, PatchStage::Writing);
        write_atomic(&entry.path, text.as_bytes()).map_err(|source| PatchError::Io {
            path: entry.path.clone(),
            source,
        })?;

        let analysis =
            analyze(&entry.path, &text, &self.attribute).map_err(PatchError::InvalidOutput)?;
        let entry = self
            .registry
            .insert(ModuleEntry::new(&entry.path, text, analysis));

        Ok(PatchOutcome {
            entry,
            written: true,
            formatted,
        })
    }

    fn resolve_module(
        &self,
        module_id: &str,
        expected: Option<&str>,
    ) -> Result<Arc<ModuleEntry>, PatchError> {
        let not_found = || PatchError::ModuleNotFound {
            module_id: module_id.to_string(),
        };
        let stale = || PatchError::StaleModule {
            module_id: module_id.to_string(),
        };

        let entry = self.registry.get(module_id).ok_or_else(not_found)?;

        if let Some(expected) = expected
            && !entry.fingerprint.matches_hex(expected)
        {
            return Err(stale());
        }

        // The file changed under us and the watcher has not caught up yet.
        match ContentHash::of_file(&entry.path) {
            Some(on_disk) if on_disk != entry.fingerprint => Err(stale()),
            Some(_) => Ok(entry),
            None => Err(not_found()),
        }
    }
}

fn locate<'a>(
    tree: &'a MarkupTree,
    module_id: &str,
    node_id: NodeId,
) -> Result<&'a MarkupElement, PatchError> {
    tree.element(node_id).ok_or_else(|| PatchError::NodeNotFound {
        module_id: module_id.to_string(),
        node_id: node_id.to_string(),
    })
}

fn trace_stage(module_id: &str, node_id: NodeId, stage: PatchStage) {
    debug!("patch"; "{module_id} {node_id}: {stage}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const ATTR: &str = "data-pimento-node";

    const PAGE: &str = r#"import { Grid } from "./grid";

export function Page() {
  return (
    <Layout>
      <Header title="Users" />
      <Grid columns={[{field:"id"},{field:"name"}]} />
    </Layout>
  );
}
"#;

    fn setup(source: &str) -> (TempDir, PatchEngine, String) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Page.tsx");
        fs::write(&path, source).unwrap();

        let registry = Arc::new(ModuleRegistry::default());
        let analysis = analyze(&path, source, ATTR).unwrap();
        let entry = registry.insert(ModuleEntry::new(&path, source.to_string(), analysis));
        let module_id = entry.id.clone();

        (dir, PatchEngine::new(registry, ATTR.to_string(), None), module_id)
    }

    fn request(module_id: &str, node: u32, patch: &str) -> PatchRequest {
        PatchRequest {
            module_id: module_id.to_string(),
            node_id: NodeId::new(node),
            patch: Patch::from_json(patch).unwrap(),
            fingerprint: None,
        }
    }

    fn read(dir: &TempDir) -> String {
        fs::read_to_string(dir.path().join("Page.tsx")).unwrap()
    }

    #[test]
    fn test_scenario_nested_field() {
        let (dir, engine, id) = setup(PAGE);
        let outcome = engine
            .apply(&request(
                &id,
                3,
                r#"[{"op":"replace","path":["columns",0,"type"],"value":"number"}]"#,
            ))
            .unwrap();

        assert!(outcome.written);
        let expected = PAGE.replace(
            r#"<Grid columns={[{field:"id"},{field:"name"}]} />"#,
            r#"<Grid columns={[{field:"id",type:"number"},{field:"name"}]} />"#,
        );
        assert_eq!(read(&dir), expected);
        assert_eq!(outcome.entry.text, expected);
    }

    #[test]
    fn test_registry_updated_for_next_patch() {
        let (dir, engine, id) = setup(PAGE);
        engine
            .apply(&request(&id, 3, r#"[{"op":"add","path":["columns",1,"width"],"value":120}]"#))
            .unwrap();
        engine
            .apply(&request(&id, 3, r#"[{"op":"replace","path":["columns",1,"width"],"value":200}]"#))
            .unwrap();

        assert!(read(&dir).contains(r#"{field:"name",width:200}"#));
        let entry = engine.registry().get(&id).unwrap();
        assert_eq!(entry.fingerprint, ContentHash::of(&read(&dir)));
    }

    #[test]
    fn test_operations_compose_in_order() {
        let (dir, engine, id) = setup(PAGE);
        engine
            .apply(&request(
                &id,
                3,
                r#"[
                    {"op":"add","path":["columns",2],"value":{"field":"age"}},
                    {"op":"remove","path":["columns",0]},
                    {"op":"add","path":["dense"],"value":true}
                ]"#,
            ))
            .unwrap_err();
        // `dense` does not exist; nothing was written.
        assert_eq!(read(&dir), PAGE);

        engine
            .apply(&request(
                &id,
                3,
                r#"[
                    {"op":"add","path":["columns",2],"value":{"field":"age"}},
                    {"op":"remove","path":["columns",0]}
                ]"#,
            ))
            .unwrap();
        assert!(read(&dir).contains(r#"<Grid columns={[{field:"name"},{ field: "age" }]} />"#));
    }

    #[test]
    fn test_module_not_found() {
        let (_dir, engine, _) = setup(PAGE);
        let err = engine
            .apply(&request("/nope.tsx", 1, r#"[]"#))
            .unwrap_err();
        assert!(matches!(err, PatchError::ModuleNotFound { .. }));
        assert_eq!(err.stage(), PatchStage::ResolvingModule);
    }

    #[test]
    fn test_node_not_found() {
        let (dir, engine, id) = setup(PAGE);
        let err = engine
            .apply(&request(&id, 9, r#"[{"op":"remove","path":["x"]}]"#))
            .unwrap_err();
        assert!(matches!(err, PatchError::NodeNotFound { .. }));
        assert_eq!(read(&dir), PAGE);
    }

    #[test]
    fn test_attribute_not_found_leaves_file() {
        let (dir, engine, id) = setup(PAGE);
        let err = engine
            .apply(&request(&id, 2, r#"[{"op":"replace","path":["subtitle"],"value":"x"}]"#))
            .unwrap_err();
        assert!(matches!(err, PatchError::AttributeNotFound { .. }));
        assert_eq!(read(&dir), PAGE);
        assert_eq!(engine.registry().get(&id).unwrap().text, PAGE);
    }

    #[test]
    fn test_stale_fingerprint() {
        let (_dir, engine, id) = setup(PAGE);
        let mut req = request(&id, 2, r#"[{"op":"replace","path":["title"],"value":"x"}]"#);
        req.fingerprint = Some("0000000000000000".to_string());
        assert!(matches!(engine.apply(&req).unwrap_err(), PatchError::StaleModule { .. }));

        req.fingerprint = Some(ContentHash::of(PAGE).short());
        assert!(engine.apply(&req).is_ok());
    }

    #[test]
    fn test_stale_when_file_changed_on_disk() {
        let (dir, engine, id) = setup(PAGE);
        fs::write(dir.path().join("Page.tsx"), "export {};\n").unwrap();
        let err = engine
            .apply(&request(&id, 2, r#"[{"op":"replace","path":["title"],"value":"x"}]"#))
            .unwrap_err();
        assert!(matches!(err, PatchError::StaleModule { .. }));
        assert_eq!(read(&dir), "export {};\n");
    }

    #[test]
    fn test_unchanged_text_skips_write() {
        let (_dir, engine, id) = setup(PAGE);
        let outcome = engine
            .apply(&request(&id, 2, r#"[{"op":"replace","path":["title"],"value":"Users"}]"#))
            .unwrap();
        assert!(!outcome.written);
    }

    #[test]
    fn test_apply_to_key() {
        let (dir, engine, id) = setup(PAGE);
        let key = ElementKey::new(&id, NodeId::new(2));
        engine
            .apply_to_key(
                key,
                &Patch::from_json(r#"[{"op":"replace","path":["title"],"value":"People"}]"#).unwrap(),
            )
            .unwrap();
        assert!(read(&dir).contains(r#"<Header title="People" />"#));
    }

    #[test]
    fn test_apply_to_unknown_key() {
        let (dir, engine, _) = setup(PAGE);
        let key = ElementKey::new("/nowhere/Page.tsx", NodeId::new(1));
        let err = engine
            .apply_to_key(key, &Patch::from_json("[]").unwrap())
            .unwrap_err();
        assert!(matches!(&err, PatchError::UnknownElement { id } if *id == key.to_string()));
        assert_eq!(err.kind(), "unknown_element");
        assert_eq!(err.stage(), PatchStage::ResolvingNode);
        assert!(err.to_string().contains(&key.to_string()));
        assert_eq!(read(&dir), PAGE);
    }

    #[cfg(unix)]
    #[test]
    fn test_formatter_output_is_written() {
        let (dir, engine, id) = setup(PAGE);
        let formatter = Formatter::new(
            vec!["sh".into(), "-c".into(), "cat; echo '// formatted'".into()],
            dir.path().to_path_buf(),
        );
        let engine = PatchEngine::new(Arc::clone(engine.registry()), ATTR.to_string(), Some(formatter));
        let outcome = engine
            .apply(&request(&id, 2, r#"[{"op":"replace","path":["title"],"value":"People"}]"#))
            .unwrap();
        assert!(outcome.formatted);
        assert!(read(&dir).ends_with("// formatted\n"));
    }

    #[cfg(unix)]
    #[test]
    fn test_formatter_failure_is_not_fatal() {
        let (dir, engine, id) = setup(PAGE);
        let formatter = Formatter::new(
            vec!["sh".into(), "-c".into(), "exit 1".into()],
            dir.path().to_path_buf(),
        );
        let engine = PatchEngine::new(Arc::clone(engine.registry()), ATTR.to_string(), Some(formatter));
        let outcome = engine
            .apply(&request(&id, 2, r#"[{"op":"replace","path":["title"],"value":"People"}]"#))
            .unwrap();
        assert!(outcome.written);
        assert!(!outcome.formatted);
        assert!(read(&dir).contains(r#"title="People""#));
    }

    #[test]
    fn test_io_error_keeps_registry() {
        let (dir, engine, id) = setup(PAGE);
        let path = dir.path().join("Page.tsx");
        let before = engine.registry().get(&id).unwrap();

        // A directory where the temp file should go makes the write fail.
        let tmp = dir
            .path()
            .join(format!(".Page.tsx.pimento-{}.tmp", std::process::id()));
        fs::create_dir(&tmp).unwrap();

        let err = engine
            .apply(&request(&id, 2, r#"[{"op":"replace","path":["title"],"value":"People"}]"#))
            .unwrap_err();
        assert!(matches!(err, PatchError::Io { .. }));
        assert_eq!(err.stage(), PatchStage::Writing);
        assert_eq!(fs::read_to_string(&path).unwrap(), PAGE);
        assert!(Arc::ptr_eq(&before, &engine.registry().get(&id).unwrap()));
    }
}
