//! `pimento instrument`: transform every included module into `build.output`.
//!
//! Phases:
//! - **Clean** - remove the output directory when `--clean` is given
//! - **Collect** - walk the include base directories for eligible modules
//! - **Transform** - parallel analysis + instrumentation, mirrored writes
//! - **Evict** - drop registry entries for modules that are gone

use crate::{
    config::PimentoConfig,
    core::is_shutdown,
    log,
    logger::ProgressLine,
    pipeline::{ModuleTransformer, TransformOutcome},
    registry::{ModuleRegistry, module_id},
};
use anyhow::{Context, Result, bail};
use jwalk::WalkDir;
use rayon::prelude::*;
use rustc_hash::FxHashSet;
use std::{
    fs,
    path::{Component, Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

/// Counts from one full pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct InstrumentReport {
    pub transformed: usize,
    pub reused: usize,
    pub failed: usize,
    pub evicted: usize,
}

/// Run the `instrument` command.
pub fn run(config: &PimentoConfig) -> Result<()> {
    let registry = Arc::new(ModuleRegistry::new(config.registry.capacity()));
    let transformer = ModuleTransformer::from_config(config, registry)?;

    if config.build.clean && config.build.output.exists() {
        fs::remove_dir_all(&config.build.output).with_context(|| {
            format!(
                "Failed to clear output directory: {}",
                config.build.output.display()
            )
        })?;
    }

    let report = instrument_all(config, &transformer, true)?;
    if report.failed > 0 {
        bail!("{} module(s) failed to instrument", report.failed);
    }
    log!(
        "instrument";
        "{} modules into {}",
        report.transformed + report.reused,
        config.root_relative(&config.build.output).display()
    );
    Ok(())
}

/// Transform every eligible module, writing instrumented copies to the output
/// directory. Per-module failures are logged and counted, not fatal.
pub fn instrument_all(
    config: &PimentoConfig,
    transformer: &ModuleTransformer,
    progress: bool,
) -> Result<InstrumentReport> {
    let files = collect_modules(config, transformer);
    let progress = progress.then(|| ProgressLine::new(&[("modules", files.len())]));

    let transformed = AtomicUsize::new(0);
    let reused = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);

    files.par_iter().for_each(|path| {
        if is_shutdown() {
            return;
        }
        match instrument_one(config, transformer, path) {
            Ok(true) => reused.fetch_add(1, Ordering::Relaxed),
            Ok(false) => transformed.fetch_add(1, Ordering::Relaxed),
            Err(e) => {
                log!("error"; "{}: {:#}", config.root_relative(path).display(), e);
                failed.fetch_add(1, Ordering::Relaxed)
            }
        };
        if let Some(p) = &progress {
            p.inc("modules");
        }
    });

    if let Some(p) = progress {
        p.finish();
    }

    let reachable: FxHashSet<String> = files.iter().map(|p| module_id(p)).collect();
    let evicted = transformer.registry().evict_unreachable(&reachable);
    if evicted > 0 {
        crate::debug!("instrument"; "evicted {} stale modules", evicted);
    }

    Ok(InstrumentReport {
        transformed: transformed.into_inner(),
        reused: reused.into_inner(),
        failed: failed.into_inner(),
        evicted,
    })
}

/// Transform one module and write its output. Returns whether the registry
/// entry was reused. Non-applicable paths are skipped.
pub fn instrument_one(
    config: &PimentoConfig,
    transformer: &ModuleTransformer,
    path: &Path,
) -> Result<bool> {
    let outcome = transformer.transform_file(path)?;
    let TransformOutcome::Transformed(output) = outcome else {
        return Ok(false);
    };
    write_output(config, path, &output.code)?;
    Ok(output.reused)
}

/// Eligible modules under the include base directories, sorted.
pub fn collect_modules(config: &PimentoConfig, transformer: &ModuleTransformer) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = transformer
        .matcher()
        .base_dirs()
        .iter()
        .filter(|base| base.exists())
        .flat_map(|base| {
            WalkDir::new(base)
                .skip_hidden(false)
                .into_iter()
                .filter_map(Result::ok)
                .filter(|e| e.file_type().is_file())
                .map(|e| e.path())
                .collect::<Vec<_>>()
        })
        .filter(|p| !p.starts_with(&config.build.output))
        .filter(|p| transformer.is_applicable(p))
        .collect();
    files.sort();
    files.dedup();
    files
}

/// Where the instrumented copy of `path` goes: its root-relative path under
/// the output directory. Paths outside root keep their normal components.
pub fn output_path(config: &PimentoConfig, path: &Path) -> PathBuf {
    let relative = config.root_relative(path);
    let relative: PathBuf = relative
        .components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .collect();
    config.build.output.join(relative)
}

pub fn write_output(config: &PimentoConfig, path: &Path, code: &str) -> Result<PathBuf> {
    let out = output_path(config, path);
    if let Some(parent) = out.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(&out, code).with_context(|| format!("Failed to write {}", out.display()))?;
    Ok(out)
}

/// Delete the instrumented copy of a removed module, if any.
pub fn remove_output(config: &PimentoConfig, path: &Path) {
    let out = output_path(config, path);
    if out.exists()
        && let Err(e) = fs::remove_file(&out)
    {
        crate::debug!("instrument"; "failed to remove {}: {}", out.display(), e);
    }
}
