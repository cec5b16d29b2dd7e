// Job Domain Model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::error::DomainError;
use crate::domain::job_type::JobType;
use crate::domain::unit::UnitName;

/// Job ID, manager-wide monotonically increasing, stable for a job's
/// lifetime. Merging never reassigns it; restart patching keeps it.
pub type JobId = u32;

/// Where a job is in its lifecycle. `Waiting` means installed but not yet
/// dispatched (or sent back by a transient refusal); `Running` means the
/// unit primitive has been invoked and the engine awaits its completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobState {
    Waiting,
    Running,
}

impl JobState {
    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Waiting => "waiting",
            JobState::Running => "running",
        }
    }

    pub const ALL: [JobState; 2] = [JobState::Waiting, JobState::Running];
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(JobState::Waiting),
            "running" => Ok(JobState::Running),
            _ => Err(DomainError::UnknownJobState(s.to_string())),
        }
    }
}

/// Terminal classification of a finished job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobResult {
    /// The operation succeeded (or already held).
    Done,
    /// Superseded by a conflicting job or an explicit cancel request.
    Canceled,
    /// The unit-declared job timeout elapsed.
    Timeout,
    /// The unit primitive reported a hard failure.
    Failed,
    /// A job this one required failed first.
    Dependency,
    /// The unit could not (yet) execute the operation.
    Skipped,
    /// Condition checks rejected the operation.
    Invalid,
    /// An assertion on the unit failed.
    Assert,
    /// The unit kind does not support the operation.
    Unsupported,
}

impl JobResult {
    pub fn as_str(self) -> &'static str {
        match self {
            JobResult::Done => "done",
            JobResult::Canceled => "canceled",
            JobResult::Timeout => "timeout",
            JobResult::Failed => "failed",
            JobResult::Dependency => "dependency",
            JobResult::Skipped => "skipped",
            JobResult::Invalid => "invalid",
            JobResult::Assert => "assert",
            JobResult::Unsupported => "unsupported",
        }
    }

    pub const ALL: [JobResult; 9] = [
        JobResult::Done,
        JobResult::Canceled,
        JobResult::Timeout,
        JobResult::Failed,
        JobResult::Dependency,
        JobResult::Skipped,
        JobResult::Invalid,
        JobResult::Assert,
        JobResult::Unsupported,
    ];
}

impl fmt::Display for JobResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobResult {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "done" => Ok(JobResult::Done),
            "canceled" => Ok(JobResult::Canceled),
            "timeout" => Ok(JobResult::Timeout),
            "failed" => Ok(JobResult::Failed),
            "dependency" => Ok(JobResult::Dependency),
            "skipped" => Ok(JobResult::Skipped),
            "invalid" => Ok(JobResult::Invalid),
            "assert" => Ok(JobResult::Assert),
            "unsupported" => Ok(JobResult::Unsupported),
            _ => Err(DomainError::UnknownJobResult(s.to_string())),
        }
    }
}

/// Client-requested properties of a job, OR-ed together when jobs merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFlags {
    /// The client explicitly asked for this; it prevails over non-override
    /// peers during requirement propagation.
    pub overriding: bool,
    /// Refuses to be canceled by a later conflicting job.
    pub irreversible: bool,
    /// Bypass the before/after runnability predicate.
    pub ignore_order: bool,
}

/// A pending or running piece of work against exactly one unit.
///
/// Jobs live in the manager's id index and in their unit's slot; dependency
/// edges stay unit-to-unit, so a job holds only its unit's name.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub unit: UnitName,
    pub job_type: JobType,
    pub state: JobState,
    pub result: Option<JobResult>,

    pub overriding: bool,
    pub irreversible: bool,
    pub ignore_order: bool,
    /// Reconstructed from serialization during live-reload.
    pub reloaded: bool,
    /// Occupies its unit's job slot.
    pub installed: bool,
    pub in_run_queue: bool,
    pub in_dbus_queue: bool,
    pub sent_dbus_new_signal: bool,

    /// Monotonic timestamp taken when the job was installed.
    pub begin_usec: u64,
    /// Armed timer deadline; present iff installed with a positive timeout.
    pub timer_deadline: Option<u64>,

    /// Client names to notify about this job's fate.
    pub subscribers: Vec<String>,
}

impl Job {
    pub fn new(id: JobId, unit: UnitName, job_type: JobType, flags: JobFlags) -> Self {
        Self {
            id,
            unit,
            job_type,
            state: JobState::Waiting,
            result: None,
            overriding: flags.overriding,
            irreversible: flags.irreversible,
            ignore_order: flags.ignore_order,
            reloaded: false,
            installed: false,
            in_run_queue: false,
            in_dbus_queue: false,
            sent_dbus_new_signal: false,
            begin_usec: 0,
            timer_deadline: None,
            subscribers: Vec::new(),
        }
    }

    /// IPC object path; existing clients depend on exactly this encoding.
    pub fn object_path(&self) -> String {
        object_path(self.id)
    }

    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            id: self.id,
            unit: self.unit.clone(),
            job_type: self.job_type,
            state: self.state,
            result: self.result,
            overriding: self.overriding,
            irreversible: self.irreversible,
            ignore_order: self.ignore_order,
            object_path: self.object_path(),
        }
    }
}

/// IPC object path for a job id.
pub fn object_path(id: JobId) -> String {
    format!("/org/freedesktop/systemd1/job/{}", id)
}

/// Read-only view of a job, the shape an IPC adapter would encode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: JobId,
    pub unit: UnitName,
    pub job_type: JobType,
    pub state: JobState,
    pub result: Option<JobResult>,
    pub overriding: bool,
    pub irreversible: bool,
    pub ignore_order: bool,
    pub object_path: String,
}

/// Directed, annotated link recording that `subject`'s success logically
/// depends on `object`. Maintained for the transaction builder; the engine
/// never traverses these for scheduling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobLink {
    pub subject: JobId,
    pub object: JobId,
    pub matters: bool,
    pub conflicts: bool,
}
