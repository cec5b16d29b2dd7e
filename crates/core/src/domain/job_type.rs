// Job type and mode enumerations

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::error::DomainError;

/// What a job is supposed to do to its unit.
///
/// The first four are the mergeable primitives; `reload-or-start`,
/// `try-restart` and `try-reload` are compound types that collapse to a
/// primitive once the unit's activation state is known. `restart` is a real
/// installable type with two-phase (stop, then start) semantics. `nop`
/// occupies its own per-unit slot and never merges with the others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobType {
    Start,
    VerifyActive,
    Stop,
    Reload,
    ReloadOrStart,
    Restart,
    TryRestart,
    TryReload,
    Nop,
}

impl JobType {
    pub fn as_str(self) -> &'static str {
        match self {
            JobType::Start => "start",
            JobType::VerifyActive => "verify-active",
            JobType::Stop => "stop",
            JobType::Reload => "reload",
            JobType::ReloadOrStart => "reload-or-start",
            JobType::Restart => "restart",
            JobType::TryRestart => "try-restart",
            JobType::TryReload => "try-reload",
            JobType::Nop => "nop",
        }
    }

    pub const ALL: [JobType; 9] = [
        JobType::Start,
        JobType::VerifyActive,
        JobType::Stop,
        JobType::Reload,
        JobType::ReloadOrStart,
        JobType::Restart,
        JobType::TryRestart,
        JobType::TryReload,
        JobType::Nop,
    ];
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(JobType::Start),
            "verify-active" => Ok(JobType::VerifyActive),
            "stop" => Ok(JobType::Stop),
            "reload" => Ok(JobType::Reload),
            "reload-or-start" => Ok(JobType::ReloadOrStart),
            "restart" => Ok(JobType::Restart),
            "try-restart" => Ok(JobType::TryRestart),
            "try-reload" => Ok(JobType::TryReload),
            "nop" => Ok(JobType::Nop),
            _ => Err(DomainError::UnknownJobType(s.to_string())),
        }
    }
}

/// How a client request is folded into the existing job set.
///
/// Modes are resolved by the transaction builder before jobs reach the
/// engine; the engine only carries the name table for the operation surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobMode {
    Fail,
    Replace,
    ReplaceIrreversibly,
    Isolate,
    Flush,
    IgnoreDependencies,
    IgnoreRequirements,
}

impl JobMode {
    pub fn as_str(self) -> &'static str {
        match self {
            JobMode::Fail => "fail",
            JobMode::Replace => "replace",
            JobMode::ReplaceIrreversibly => "replace-irreversibly",
            JobMode::Isolate => "isolate",
            JobMode::Flush => "flush",
            JobMode::IgnoreDependencies => "ignore-dependencies",
            JobMode::IgnoreRequirements => "ignore-requirements",
        }
    }

    pub const ALL: [JobMode; 7] = [
        JobMode::Fail,
        JobMode::Replace,
        JobMode::ReplaceIrreversibly,
        JobMode::Isolate,
        JobMode::Flush,
        JobMode::IgnoreDependencies,
        JobMode::IgnoreRequirements,
    ];
}

impl fmt::Display for JobMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobMode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fail" => Ok(JobMode::Fail),
            "replace" => Ok(JobMode::Replace),
            "replace-irreversibly" => Ok(JobMode::ReplaceIrreversibly),
            "isolate" => Ok(JobMode::Isolate),
            "flush" => Ok(JobMode::Flush),
            "ignore-dependencies" => Ok(JobMode::IgnoreDependencies),
            "ignore-requirements" => Ok(JobMode::IgnoreRequirements),
            _ => Err(DomainError::UnknownJobMode(s.to_string())),
        }
    }
}
