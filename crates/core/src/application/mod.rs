// Application Layer - the engine and its event-loop driver

pub mod driver;
pub mod engine;

// Re-exports
pub use driver::{DriverShutdown, EngineCommand, EngineDriver, EngineHandle};
pub use engine::{EngineConfig, JobEngine, JobStats};
