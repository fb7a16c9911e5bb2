//! Freshness detection: content-hash (blake3) fingerprints for module sources.

mod hash;

pub use hash::ContentHash;
