//! `pimento transform <FILE>`: print one instrumented module.

use crate::{
    config::PimentoConfig,
    pipeline::{ModuleTransformer, TransformOutcome},
    registry::ModuleRegistry,
    utils::path::resolve_path,
};
use anyhow::{Context, Result};
use std::{
    fs,
    io::{Write, stdout},
    path::Path,
    sync::Arc,
};

pub fn run(config: &PimentoConfig, file: &Path) -> Result<()> {
    let code = transform_to_string(config, file)?;
    let mut out = stdout().lock();
    out.write_all(code.as_bytes())?;
    out.flush()?;
    Ok(())
}

/// Instrumented text, or the original text for modules outside the include
/// patterns.
fn transform_to_string(config: &PimentoConfig, file: &Path) -> Result<String> {
    let path = resolve_path(file, &config.root);
    let text =
        fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?;

    let registry = Arc::new(ModuleRegistry::new(config.registry.capacity()));
    let transformer = ModuleTransformer::from_config(config, registry)?;

    match transformer.transform(&path, &text)? {
        TransformOutcome::Transformed(output) => Ok(output.code),
        TransformOutcome::NotApplicable => {
            crate::debug!("transform"; "{} is not included, printing as is", path.display());
            Ok(text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config_at;
    use crate::utils::path::normalize_path;
    use tempfile::TempDir;

    #[test]
    fn test_transform_included_and_excluded() {
        let dir = TempDir::new().unwrap();
        let root = normalize_path(dir.path());
        fs::create_dir_all(root.join("src")).unwrap();
        fs::create_dir_all(root.join("scripts")).unwrap();
        let text = "export const A = () => <div />;\n";
        fs::write(root.join("src/A.tsx"), text).unwrap();
        fs::write(root.join("scripts/B.tsx"), text).unwrap();

        let config = test_config_at(&root);
        let code = transform_to_string(&config, &root.join("src/A.tsx")).unwrap();
        assert!(code.contains("data-pimento-node"));
        assert!(code.contains("registerModule"));

        let plain = transform_to_string(&config, &root.join("scripts/B.tsx")).unwrap();
        assert_eq!(plain, text);
    }

    #[test]
    fn test_transform_path_relative_to_root() {
        let dir = TempDir::new().unwrap();
        let root = normalize_path(dir.path());
        fs::create_dir_all(root.join("src/pimento-fixture")).unwrap();
        fs::write(root.join("src/pimento-fixture/C.tsx"), "const c = <p />;\n").unwrap();

        let config = test_config_at(&root);
        let code = transform_to_string(&config, Path::new("src/pimento-fixture/C.tsx")).unwrap();
        assert!(code.contains("nodeId: \"node-1\""));
    }

    #[test]
    fn test_transform_parse_error() {
        let dir = TempDir::new().unwrap();
        let root = normalize_path(dir.path());
        fs::create_dir_all(root.join("src")).unwrap();
        fs::write(root.join("src/A.tsx"), "const a = <div>;\n").unwrap();

        let config = test_config_at(&root);
        assert!(transform_to_string(&config, &root.join("src/A.tsx")).is_err());
        assert!(transform_to_string(&config, &root.join("src/Missing.tsx")).is_err());
    }
}
