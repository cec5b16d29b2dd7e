// Run queue dispatch and the runnability predicate

use tracing::{debug, warn};

use crate::domain::{ActiveState, EdgeKind, JobId, JobResult, JobState, JobType};
use crate::port::UnitOpOutcome;

use super::JobEngine;

impl JobEngine {
    /// Mark an installed waiting job as possibly runnable. Idempotent.
    pub(crate) fn add_to_run_queue(&mut self, id: JobId) {
        let Some(j) = self.jobs.get_mut(&id) else {
            return;
        };
        debug_assert!(j.installed, "only installed jobs may be queued");
        if j.in_run_queue {
            return;
        }
        j.in_run_queue = true;
        self.run_queue.push_front(id);
    }

    /// Dispatch one round: try to run every queued job. Jobs that are not
    /// runnable yet stay installed and get requeued when a peer finishes.
    pub fn run_queue_tick(&mut self) {
        while let Some(id) = self.run_queue.pop_front() {
            if let Some(j) = self.jobs.get_mut(&id) {
                j.in_run_queue = false;
            }
            self.run_and_invalidate(id);
        }
    }

    /// Whether a waiting job may transition to running, given its peers.
    fn is_runnable(&self, id: JobId) -> bool {
        let Some(j) = self.jobs.get(&id) else {
            return false;
        };
        if !j.installed {
            return false;
        }
        if j.ignore_order {
            return true;
        }
        if j.job_type == JobType::Nop {
            return true;
        }
        let Some(handle) = self.unit_handle(&j.unit) else {
            return true;
        };

        // Anything that starts or might start waits for every ordering
        // predecessor, no matter what their jobs are doing.
        if matches!(
            j.job_type,
            JobType::Start | JobType::VerifyActive | JobType::Reload
        ) {
            for peer in handle.edges(EdgeKind::After) {
                if self.unit_job(&peer).is_some() {
                    return false;
                }
            }
        }

        // If something ordered after us is being stopped, it goes first;
        // stops run in reverse order.
        for peer in handle.edges(EdgeKind::Before) {
            if let Some(pid) = self.unit_job(&peer) {
                if let Some(pj) = self.jobs.get(&pid) {
                    if matches!(pj.job_type, JobType::Stop | JobType::Restart) {
                        return false;
                    }
                }
            }
        }

        true
    }

    /// Try to run one job: check runnability, invoke the unit primitive and
    /// classify its outcome. The primitive may destroy the job under us, so
    /// it is re-looked-up by id before any post-processing.
    pub(crate) fn run_and_invalidate(&mut self, id: JobId) {
        // Detach from the queue first; a job is only dispatched from the
        // pass that dequeued it.
        let Some(in_queue) = self.jobs.get(&id).map(|j| j.in_run_queue) else {
            return;
        };
        if in_queue {
            self.run_queue.retain(|&q| q != id);
            if let Some(j) = self.jobs.get_mut(&id) {
                j.in_run_queue = false;
            }
        }

        let Some((state, job_type, unit_name)) = self
            .jobs
            .get(&id)
            .map(|j| (j.state, j.job_type, j.unit.clone()))
        else {
            return;
        };
        if state != JobState::Waiting {
            return; // a prior pass already handled it
        }
        if !self.is_runnable(id) {
            debug!(job_id = id, unit = %unit_name, "Job blocked on ordering peers");
            return;
        }

        self.set_state(id, JobState::Running);
        self.queue_dbus(id);

        let Some(handle) = self.unit_handle(&unit_name) else {
            return;
        };
        let outcome = match job_type {
            JobType::Start => handle.start(),
            // Restart is two-phase: the stop half runs now, the finish path
            // patches the job to a start.
            JobType::Stop | JobType::Restart => handle.stop(),
            JobType::Reload => handle.reload(),
            JobType::VerifyActive => {
                let s = handle.active_state();
                if s.is_active_or_reloading() {
                    UnitOpOutcome::Already
                } else if s == ActiveState::Activating {
                    UnitOpOutcome::Retry
                } else {
                    UnitOpOutcome::Skip
                }
            }
            JobType::Nop => UnitOpOutcome::Already,
            JobType::ReloadOrStart | JobType::TryRestart | JobType::TryReload => {
                unreachable!("compound job type {job_type} installed")
            }
        };

        // The primitive can trigger callbacks that cancel or replace this
        // very job; trust only the id from here on.
        if !self.jobs.contains_key(&id) {
            return;
        }

        match outcome {
            UnitOpOutcome::InProgress => {} // awaiting async completion
            UnitOpOutcome::Already => self.finish_and_invalidate(id, JobResult::Done, true, true),
            UnitOpOutcome::Skip => self.finish_and_invalidate(id, JobResult::Skipped, true, false),
            UnitOpOutcome::Invalid => {
                self.finish_and_invalidate(id, JobResult::Invalid, true, false)
            }
            UnitOpOutcome::AssertFailed => {
                self.finish_and_invalidate(id, JobResult::Assert, true, false)
            }
            UnitOpOutcome::Unsupported => {
                self.finish_and_invalidate(id, JobResult::Unsupported, true, false)
            }
            UnitOpOutcome::Retry => {
                // The primitive wants to be retried; park the job until a
                // peer completion requeues it.
                self.set_state(id, JobState::Waiting);
            }
            UnitOpOutcome::Error(msg) => {
                warn!(job_id = id, unit = %unit_name, job_type = %job_type, error = %msg, "Unit primitive failed");
                self.finish_and_invalidate(id, JobResult::Failed, true, false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::super::{EngineConfig, JobEngine};
    use crate::domain::{ActiveState, EdgeKind, JobFlags, JobResult, JobState, JobType, UnitName};
    use crate::port::actions::mocks::RecordingActionRunner;
    use crate::port::bus::mocks::RecordingBus;
    use crate::port::clock::mocks::MockClock;
    use crate::port::timer::mocks::RecordingTimerService;
    use crate::port::unit::mocks::MockUnit;
    use crate::port::UnitOpOutcome;

    fn engine() -> JobEngine {
        JobEngine::new(
            EngineConfig::default(),
            Arc::new(MockClock::new(0)),
            Arc::new(RecordingTimerService::new()),
            Arc::new(RecordingBus::new()),
            Arc::new(RecordingActionRunner::new()),
        )
    }

    #[test]
    fn test_after_peer_blocks_positive_job() {
        let mut e = engine();
        let a = Arc::new(MockUnit::new("a.service").with_edge(EdgeKind::Before, &["b.service"]));
        let b = Arc::new(MockUnit::new("b.service").with_edge(EdgeKind::After, &["a.service"]));

        let ja = e.install(a.clone(), JobType::Start, JobFlags::default()).unwrap();
        let jb = e.install(b.clone(), JobType::Start, JobFlags::default()).unwrap();

        e.run_queue_tick();
        assert_eq!(e.job(ja).unwrap().state, JobState::Running);
        assert_eq!(e.job(jb).unwrap().state, JobState::Waiting);
        assert_eq!(b.start_calls(), 0);

        // Peer completion unblocks the successor.
        e.finish(ja, JobResult::Done, true, false);
        assert!(e.job(jb).unwrap().in_run_queue);
        e.run_queue_tick();
        assert_eq!(e.job(jb).unwrap().state, JobState::Running);
        assert_eq!(b.start_calls(), 1);
    }

    #[test]
    fn test_stop_of_later_unit_blocks_any_job() {
        // b is ordered after a; stopping b must come before anything on a.
        let mut e = engine();
        let a = Arc::new(MockUnit::new("a.service").with_edge(EdgeKind::Before, &["b.service"]));
        let b = Arc::new(
            MockUnit::new("b.service")
                .with_active_state(ActiveState::Active)
                .with_edge(EdgeKind::After, &["a.service"]),
        );

        let ja = e.install(a, JobType::Start, JobFlags::default()).unwrap();
        let jb = e.install(b, JobType::Stop, JobFlags::default()).unwrap();

        e.run_queue_tick();
        assert_eq!(e.job(jb).unwrap().state, JobState::Running);
        assert_eq!(e.job(ja).unwrap().state, JobState::Waiting);

        e.finish(jb, JobResult::Done, true, false);
        e.run_queue_tick();
        assert_eq!(e.job(ja).unwrap().state, JobState::Running);
    }

    #[test]
    fn test_ignore_order_bypasses_peers() {
        let mut e = engine();
        let a = Arc::new(MockUnit::new("a.service").with_edge(EdgeKind::Before, &["b.service"]));
        let b = Arc::new(MockUnit::new("b.service").with_edge(EdgeKind::After, &["a.service"]));

        e.install(a, JobType::Start, JobFlags::default()).unwrap();
        let jb = e
            .install(
                b,
                JobType::Start,
                JobFlags {
                    ignore_order: true,
                    ..Default::default()
                },
            )
            .unwrap();

        e.run_queue_tick();
        assert_eq!(e.job(jb).unwrap().state, JobState::Running);
    }

    #[test]
    fn test_nop_job_finishes_immediately_as_done() {
        let mut e = engine();
        let unit = Arc::new(MockUnit::new("a.service"));
        let id = e.install(unit, JobType::TryRestart, JobFlags::default()).unwrap();
        assert_eq!(e.job(id).unwrap().job_type, JobType::Nop);

        e.run_queue_tick();
        assert!(e.job(id).is_none());
        assert_eq!(e.stats().n_failed_jobs, 0);
    }

    #[test]
    fn test_primitive_retry_reverts_to_waiting() {
        let mut e = engine();
        let unit = Arc::new(MockUnit::new("a.service"));
        unit.queue_start_outcome(UnitOpOutcome::Retry);
        let id = e.install(unit, JobType::Start, JobFlags::default()).unwrap();

        e.run_queue_tick();
        let j = e.job(id).unwrap();
        assert_eq!(j.state, JobState::Waiting);
        assert!(!j.in_run_queue);
        assert_eq!(e.stats().n_running_jobs, 0);
    }

    #[test]
    fn test_verify_active_synthesis() {
        let mut e = engine();

        // Activating: transient refusal, stays waiting.
        let activating =
            Arc::new(MockUnit::new("a.service").with_active_state(ActiveState::Activating));
        let ja = e
            .install(activating, JobType::VerifyActive, JobFlags::default())
            .unwrap();
        e.run_queue_tick();
        assert_eq!(e.job(ja).unwrap().state, JobState::Waiting);

        // Inactive: cannot verify, skipped.
        let inactive = Arc::new(MockUnit::new("b.service"));
        let jb = e
            .install(inactive, JobType::VerifyActive, JobFlags::default())
            .unwrap();
        e.run_queue_tick();
        assert!(e.job(jb).is_none());
        // ja survived the tick untouched.
        assert!(e.job(ja).is_some());
    }

    #[test]
    fn test_primitive_outcome_classification() {
        let cases = [
            (UnitOpOutcome::Skip, JobResult::Skipped),
            (UnitOpOutcome::Invalid, JobResult::Invalid),
            (UnitOpOutcome::AssertFailed, JobResult::Assert),
            (UnitOpOutcome::Unsupported, JobResult::Unsupported),
            (UnitOpOutcome::Error("boom".into()), JobResult::Failed),
        ];
        for (outcome, expected) in cases {
            let bus = Arc::new(RecordingBus::new());
            let mut e = JobEngine::new(
                EngineConfig::default(),
                Arc::new(MockClock::new(0)),
                Arc::new(RecordingTimerService::new()),
                bus.clone(),
                Arc::new(RecordingActionRunner::new()),
            );
            let unit = Arc::new(MockUnit::new("a.service"));
            unit.queue_start_outcome(outcome);
            let id = e.install(unit, JobType::Start, JobFlags::default()).unwrap();
            e.run_queue_tick();
            assert!(e.job(id).is_none());
            let removed = bus
                .events()
                .into_iter()
                .find(|ev| ev.kind == crate::port::JobEventKind::Removed)
                .unwrap();
            assert_eq!(removed.result, Some(expected));
        }
    }

    #[test]
    fn test_unrelated_units_run_independently() {
        let mut e = engine();
        let a = Arc::new(MockUnit::new("a.service"));
        let b = Arc::new(MockUnit::new("b.service").with_active_state(ActiveState::Active));

        let ja = e.install(a, JobType::Start, JobFlags::default()).unwrap();
        let jb = e.install(b, JobType::Stop, JobFlags::default()).unwrap();
        e.run_queue_tick();

        assert_eq!(e.job(ja).unwrap().state, JobState::Running);
        assert_eq!(e.job(jb).unwrap().state, JobState::Running);
    }

    #[test]
    fn test_unit_job_lookup_by_name() {
        let mut e = engine();
        let a = Arc::new(MockUnit::new("a.service"));
        let id = e.install(a, JobType::Start, JobFlags::default()).unwrap();
        assert_eq!(e.unit_job(&UnitName::from("a.service")), Some(id));
        assert_eq!(e.unit_job(&UnitName::from("zz.service")), None);
    }
}
