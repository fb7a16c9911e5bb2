//! Command-line interface module.
//!
//! | Command      | File            |
//! |--------------|-----------------|
//! | `transform`  | `transform.rs`  |
//! | `instrument` | `instrument.rs` |
//! | `patch`      | `patch.rs`      |
//! | `serve`      | `serve.rs`      |

mod args;
pub mod instrument;
pub mod patch;
pub mod serve;
pub mod transform;

pub use args::{Cli, Commands, PatchArgs};
