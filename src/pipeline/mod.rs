//! Module transform pipeline.
//!
//! ```text
//! path, text ─► matcher ─► parse + analyze ─► registry ─► instrument ─► code
//!                 │                              ▲
//!                 └─ not applicable              └─ fingerprint hit skips parse
//! ```
//!
//! | Module       | Purpose                                          |
//! |--------------|--------------------------------------------------|
//! | `analysis`   | Node ids and attribute descriptors               |
//! | `instrument` | Runtime import, identification attrs, register   |
//! | `transform`  | `ModuleTransformer`, the pipeline entry point    |

mod analysis;
mod instrument;
mod transform;

pub use analysis::{AttributeDescriptor, ModuleAnalysis, NodeMetadata, analyze};
pub use instrument::{InstrumentOptions, instrument};
pub use transform::{
    ModuleTransformer, TransformError, TransformOutcome, TransformOutput,
};
