// Dirigent Core - Job Engine
// Turns an acyclic unit dependency graph plus a stream of client intents
// into a correctly sequenced set of unit state transitions. Unit state
// machines, transaction building and IPC encoding live behind ports.

pub mod application;
pub mod domain;
pub mod error;
pub mod port;

pub use error::{EngineError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
