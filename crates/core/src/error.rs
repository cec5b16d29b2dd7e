// Central Error Type for the engine's operation surface

use thiserror::Error;

use crate::domain::{DomainError, JobId, JobType, UnitName};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),

    #[error("no such job: {0}")]
    NoSuchJob(JobId),

    #[error("no such unit: {0}")]
    NoSuchUnit(UnitName),

    #[error("unit {unit} has an irreversible {incumbent} job that conflicts")]
    IrreversibleConflict { unit: UnitName, incumbent: JobType },

    #[error("unit {0} already has an installed job")]
    SlotOccupied(UnitName),

    #[error("malformed serialized job: {0}")]
    Deserialize(String),

    #[error("engine is shutting down")]
    ShuttingDown,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using EngineError
pub type Result<T> = std::result::Result<T, EngineError>;
