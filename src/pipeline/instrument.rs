//! Instrumentation pass.
//!
//! Given an analyzed module, produce its instrumented text:
//!
//! ```text
//! import { x } from "x"; import * as _pimentoRuntime from "pimento/runtime"; const _pimentoModuleId = "/app/src/App.tsx";
//! ...
//! <Grid columns={cols} data-pimento-node={{ moduleId: _pimentoModuleId, nodeId: "node-3" }} />
//! ...
//! _pimentoRuntime.registerModule(_pimentoModuleId, "3f2a…", { "node-1": { … } });
//! ```
//!
//! The prelude shares a line with the last import so every original line
//! keeps its line number.

use super::analysis::NodeMetadata;
use crate::config::TransformConfig;
use crate::registry::ModuleEntry;
use crate::syntax::{TextEdits, literal::quote};

/// The parts of `[transform]` that shape the emitted code.
#[derive(Debug, Clone)]
pub struct InstrumentOptions {
    pub runtime: String,
    pub attribute: String,
    pub inline_metadata: bool,
    pub register: bool,
}

impl From<&TransformConfig> for InstrumentOptions {
    fn from(config: &TransformConfig) -> Self {
        Self {
            runtime: config.runtime.clone(),
            attribute: config.attribute.clone(),
            inline_metadata: config.inline_metadata,
            register: config.register,
        }
    }
}

impl Default for InstrumentOptions {
    fn default() -> Self {
        Self::from(&TransformConfig::default())
    }
}

/// Instrument a registered module. Modules without markup elements come
/// back unchanged.
pub fn instrument(entry: &ModuleEntry, options: &InstrumentOptions) -> String {
    let (module_id, text, tree) = (entry.id.as_str(), entry.text.as_str(), &entry.tree);
    if tree.is_empty() {
        return text.to_string();
    }

    let runtime = unique_name(text, "_pimentoRuntime");
    let module_const = unique_name(text, "_pimentoModuleId");
    let mut edits = TextEdits::new();

    // Prelude
    let statement = format!(
        "import * as {runtime} from {}; const {module_const} = {};",
        quote(&options.runtime),
        quote(module_id)
    );
    let prelude = &tree.prelude;
    let line_start = prelude.offset == 0
        || text[..prelude.offset as usize].ends_with('\n');
    let prelude_text = if prelude.needs_newline {
        format!("\n{statement}")
    } else if line_start {
        format!("{statement} ")
    } else {
        format!(" {statement}")
    };
    edits.insert(prelude.offset, prelude_text);

    // Identification attributes
    for element in &tree.elements {
        let mut value = format!(
            "moduleId: {module_const}, nodeId: {}",
            quote(&element.node_id.to_string())
        );
        if options.inline_metadata
            && let Some(metadata) = entry.node(element.node_id)
        {
            value.push_str(&inline_fields(metadata));
        }
        edits.insert(
            element.attr_insert,
            format!(" {}={{{{ {value} }}}}", options.attribute),
        );
    }

    let mut out = edits.apply(text);

    // Registration
    if options.register {
        let nodes = serde_json::to_string(&entry.nodes).unwrap_or_else(|_| "{}".to_string());
        if !out.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(&format!(
            "{runtime}.registerModule({module_const}, {}, {nodes});\n",
            quote(&entry.fingerprint.short())
        ));
    }

    out
}

fn inline_fields(metadata: &NodeMetadata) -> String {
    let attributes =
        serde_json::to_string(&metadata.attributes).unwrap_or_else(|_| "[]".to_string());
    format!(
        ", jsxTagName: {}, attributes: {attributes}",
        quote(&metadata.tag_name)
    )
}

/// `base`, or `base2`, `base3`, … whichever does not occur in `text`.
fn unique_name(text: &str, base: &str) -> String {
    if !text.contains(base) {
        return base.to_string();
    }
    (2u32..)
        .map(|n| format!("{base}{n}"))
        .find(|candidate| !text.contains(candidate.as_str()))
        .unwrap_or_else(|| base.to_string())
}
