//! Patch application.
//!
//! | Module   | Purpose                                            |
//! |----------|----------------------------------------------------|
//! | `model`  | Patch operations and requests (just-diff JSON)     |
//! | `apply`  | One operation → span edits on one element          |
//! | `format` | External formatter                                 |
//! | `engine` | Resolve, apply, validate, format, write, re-register |
//! | `error`  | Errors and the stage they end                      |
//!
//! A patch either commits completely (file written, registry updated) or
//! leaves both untouched.

mod apply;
mod engine;
mod error;
mod format;
mod model;

pub use engine::{PatchEngine, PatchOutcome};
pub use error::{PatchError, PatchStage};
pub use format::Formatter;
pub use model::{Patch, PatchOperation, PatchRequest, PathSegment, display_path};
