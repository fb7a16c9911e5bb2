//! Configuration section definitions.
//!
//! Each module corresponds to a section in `pimento.toml`:
//!
//! | Module      | TOML Section   | Purpose                                |
//! |-------------|----------------|----------------------------------------|
//! | `build`     | `[build]`      | Output directory for `instrument`      |
//! | `format`    | `[format]`     | Formatter run on patched modules       |
//! | `registry`  | `[registry]`   | Module registry bounds                 |
//! | `serve`     | `[serve]`      | Hot channel (interface, port, watch)   |
//! | `transform` | `[transform]`  | Include patterns and injected code     |

mod build;
mod format;
mod registry;
mod serve;
mod transform;

pub use build::BuildConfig;
pub use format::FormatConfig;
pub use registry::RegistryConfig;
pub use serve::ServeConfig;
pub use transform::TransformConfig;
