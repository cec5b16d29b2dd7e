// Human-readable status banners
//
// Units may override the text per (job type, result); these are the generic
// fallbacks. `verify-active` and `nop` jobs finish silently, and redundant
// completions (already flag) never reach this path.

use tracing::{info, warn};

use crate::domain::{JobResult, JobType};
use crate::port::UnitHandle;

use super::JobEngine;

fn generic_message(job_type: JobType, result: JobResult, description: &str) -> Option<String> {
    let template = match job_type {
        JobType::Start => match result {
            JobResult::Done => "Started {}.",
            JobResult::Timeout => "Timed out starting {}.",
            JobResult::Failed => "Failed to start {}.",
            JobResult::Dependency => "Dependency failed for {}.",
            JobResult::Assert => "Assertion failed for {}.",
            JobResult::Unsupported => "Starting of {} not supported.",
            _ => return None,
        },
        // A restart that ends mid-flight ended in its stop half.
        JobType::Stop | JobType::Restart => match result {
            JobResult::Done => "Stopped {}.",
            JobResult::Failed => "Stopped (with error) {}.",
            JobResult::Timeout => "Timed out stopping {}.",
            _ => return None,
        },
        JobType::Reload => match result {
            JobResult::Done => "Reloaded {}.",
            JobResult::Failed => "Reload failed for {}.",
            JobResult::Timeout => "Timed out reloading {}.",
            _ => return None,
        },
        _ => return None,
    };
    Some(template.replace("{}", description))
}

impl JobEngine {
    pub(crate) fn emit_status(&self, unit: &dyn UnitHandle, job_type: JobType, result: JobResult) {
        if !self.config.status_messages {
            return;
        }
        let message = unit
            .status_message(job_type, result)
            .or_else(|| generic_message(job_type, result, &unit.description()));
        let Some(message) = message else {
            return;
        };
        if result == JobResult::Done {
            info!(unit = %unit.name(), "{}", message);
        } else {
            warn!(unit = %unit.name(), result = %result, "{}", message);
        }
    }
}
