// Job completion and propagation
//
// Everything that terminates a job funnels through `finish_and_invalidate`:
// unit completion callbacks, timeouts, cancellation, conflict supersession
// and immediate primitive outcomes.

use tracing::{debug, info, warn};

use crate::domain::{EdgeKind, EmergencyAction, JobId, JobResult, JobState, JobType, UnitName};

use super::JobEngine;

impl JobEngine {
    /// Public completion entry point; normally invoked by unit code when a
    /// running job's operation reaches a terminal activation state.
    pub fn finish(&mut self, id: JobId, result: JobResult, recursive: bool, already: bool) {
        self.finish_and_invalidate(id, result, recursive, already);
    }

    pub(crate) fn finish_and_invalidate(
        &mut self,
        id: JobId,
        result: JobResult,
        recursive: bool,
        already: bool,
    ) {
        let Some((unit_name, job_type)) = self.jobs.get(&id).map(|j| (j.unit.clone(), j.job_type))
        else {
            debug!(job_id = id, "Job vanished before finish");
            return;
        };
        let handle = self.unit_handle(&unit_name);

        if let Some(j) = self.jobs.get_mut(&id) {
            j.result = Some(result);
        }
        debug!(
            job_id = id,
            unit = %unit_name,
            job_type = %job_type,
            result = %result,
            "Job finished"
        );
        if !already {
            if let Some(h) = &handle {
                self.emit_status(h.as_ref(), job_type, result);
            }
        }
        self.queue_dbus(id);

        if result == JobResult::Done && job_type == JobType::Restart {
            // The stop half of a restart is complete; the same job now turns
            // into a start and goes around again under its original id.
            if let Some(j) = self.jobs.get_mut(&id) {
                j.job_type = JobType::Start;
            }
            self.set_state(id, JobState::Waiting);
            self.add_to_run_queue(id);
        } else {
            if matches!(
                result,
                JobResult::Failed | JobResult::Invalid | JobResult::Timeout
            ) {
                self.stats.n_failed_jobs += 1;
            }

            if let Some(removed) = self.uninstall(id) {
                if self.n_reloading > 0 && removed.reloaded {
                    self.pending_finished_jobs.push(removed);
                }
            }

            // Cascade the failure along requirement edges.
            if recursive && result != JobResult::Done {
                if let Some(h) = &handle {
                    match job_type {
                        JobType::Start | JobType::VerifyActive => {
                            let mut peers = h.edges(EdgeKind::RequiredBy);
                            peers.extend(h.edges(EdgeKind::BoundBy));
                            for peer in peers {
                                self.fail_dependent_start(&peer, false);
                            }
                            for peer in h.edges(EdgeKind::RequiredByOverridable) {
                                self.fail_dependent_start(&peer, true);
                            }
                        }
                        JobType::Stop => {
                            for peer in h.edges(EdgeKind::ConflictedBy) {
                                self.fail_dependent_start(&peer, false);
                            }
                        }
                        _ => {}
                    }
                }
            }

            // Deliberately not fired for `failed` (the unit handles that
            // itself) or `canceled` (a user action).
            if matches!(result, JobResult::Timeout | JobResult::Dependency) {
                info!(
                    unit = %unit_name,
                    job_type = %job_type,
                    result = %result,
                    "Job failed; triggering on-failure units"
                );
                if let Some(h) = &handle {
                    h.start_on_failure();
                }
            }
        }

        // This completion may be exactly what an ordering neighbor was
        // waiting for; give each of their jobs another look.
        if let Some(h) = &handle {
            for peer in h
                .edges(EdgeKind::After)
                .into_iter()
                .chain(h.edges(EdgeKind::Before))
            {
                if let Some(pid) = self.unit_job(&peer) {
                    self.add_to_run_queue(pid);
                }
            }
        }
    }

    fn fail_dependent_start(&mut self, peer: &UnitName, skip_override: bool) {
        let Some(pid) = self.unit_job(peer) else {
            return;
        };
        let Some(pj) = self.jobs.get(&pid) else {
            return;
        };
        if !matches!(pj.job_type, JobType::Start | JobType::VerifyActive) {
            return;
        }
        if skip_override && pj.overriding {
            return;
        }
        self.finish_and_invalidate(pid, JobResult::Dependency, true, false);
    }

    /// Timer-service callback for an expired job timeout.
    pub fn on_job_timeout(&mut self, id: JobId) {
        let Some((unit_name, job_type)) = self.jobs.get(&id).map(|j| (j.unit.clone(), j.job_type))
        else {
            return;
        };
        warn!(job_id = id, unit = %unit_name, job_type = %job_type, "Job timed out");

        let action = self
            .unit_handle(&unit_name)
            .map(|h| (h.job_timeout_action(), h.job_timeout_reboot_arg()));

        self.finish_and_invalidate(id, JobResult::Timeout, true, false);

        if let Some((action, reboot_arg)) = action {
            if action != EmergencyAction::None {
                self.actions.execute(action, reboot_arg.as_deref());
            }
        }
    }
}
