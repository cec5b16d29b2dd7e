// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("unknown job type: {0}")]
    UnknownJobType(String),

    #[error("unknown job state: {0}")]
    UnknownJobState(String),

    #[error("unknown job result: {0}")]
    UnknownJobResult(String),

    #[error("unknown job mode: {0}")]
    UnknownJobMode(String),

    #[error("unknown active state: {0}")]
    UnknownActiveState(String),

    #[error("unknown emergency action: {0}")]
    UnknownEmergencyAction(String),

    #[error("job types {0} and {1} cannot be merged")]
    UnmergeableTypes(crate::domain::JobType, crate::domain::JobType),
}

pub type Result<T> = std::result::Result<T, DomainError>;
