//! Actor System for Serve Mode
//!
//! Message-passing concurrency between the watcher, the transform pipeline,
//! the editor clients and the patch engine:
//!
//! ```text
//! FsActor --> TransformActor --> WsActor <--> PatchActor
//! (watch)      (instrument)     (clients)     (FIFO saves)
//! ```
//!
//! # Module Structure
//!
//! - `messages` - Message types for inter-actor communication
//! - `fs` - File system watcher with debouncing
//! - `transform` - Re-instrumentation and eviction
//! - `patch` - Serialized patch application
//! - `ws` - WebSocket clients, replies and broadcasts
//! - `coordinator` - Wires up and runs actors

mod coordinator;
mod fs;
pub mod messages;
mod patch;
mod transform;
mod ws;

pub use coordinator::Coordinator;
