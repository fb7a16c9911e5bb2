//! `pimento patch <FILE> <NODE_ID> [PATCH]`: apply one patch from the shell.

use crate::{
    cli::PatchArgs,
    config::PimentoConfig,
    log,
    patch::{Patch, PatchEngine, PatchOutcome, PatchRequest},
    pipeline::analyze,
    registry::{ModuleEntry, ModuleRegistry, module_id},
    syntax::NodeId,
    utils::path::resolve_path,
};
use anyhow::{Context, Result};
use std::{
    fs,
    io::{self, Read},
    sync::Arc,
};

pub fn run(config: &PimentoConfig, args: &PatchArgs) -> Result<()> {
    let json = match args.patch.as_deref() {
        Some(json) if json != "-" => json.to_string(),
        _ => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read patch from stdin")?;
            buf
        }
    };

    let outcome = apply(config, args, &json)?;
    let path = config.root_relative(&outcome.entry.path);
    if outcome.written {
        log!("patch"; "wrote {}{}", path.display(), if outcome.formatted { " (formatted)" } else { "" });
    } else {
        log!("patch"; "{} unchanged", path.display());
    }
    Ok(())
}

fn apply(config: &PimentoConfig, args: &PatchArgs, json: &str) -> Result<PatchOutcome> {
    let path = resolve_path(&args.file, &config.root);
    let node_id: NodeId = args.node_id.parse()?;
    let patch = Patch::from_json(json).context("invalid patch JSON")?;

    let text =
        fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?;
    let analysis = analyze(&path, &text, &config.transform.attribute)?;

    let registry = Arc::new(ModuleRegistry::default());
    registry.insert(ModuleEntry::new(&path, text, analysis));
    let engine = PatchEngine::from_config(config, registry);

    let request = PatchRequest {
        module_id: module_id(&path),
        node_id,
        patch,
        fingerprint: None,
    };
    engine
        .apply(&request)
        .with_context(|| format!("Failed to patch {} at {}", path.display(), node_id))
}
