// Timer Service Port
// The surrounding event loop owns the actual timers; the engine only asks
// for one-shot wakeups and handles the callback.

use crate::domain::JobId;

pub trait JobTimerService: Send + Sync {
    /// Arm (or re-arm) a one-shot timer for `job` at an absolute monotonic
    /// deadline. Firing must invoke the engine's `on_job_timeout`.
    fn arm(&self, job: JobId, deadline_usec: u64);

    /// Drop any armed timer for `job`.
    fn disarm(&self, job: JobId);
}

pub mod mocks {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    /// Records arm/disarm calls; tests fire deadlines by hand.
    #[derive(Default)]
    pub struct RecordingTimerService {
        armed: Mutex<BTreeMap<JobId, u64>>,
    }

    impl RecordingTimerService {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn deadline(&self, job: JobId) -> Option<u64> {
            self.armed.lock().unwrap().get(&job).copied()
        }

        pub fn is_armed(&self, job: JobId) -> bool {
            self.armed.lock().unwrap().contains_key(&job)
        }

        pub fn armed_count(&self) -> usize {
            self.armed.lock().unwrap().len()
        }
    }

    impl JobTimerService for RecordingTimerService {
        fn arm(&self, job: JobId, deadline_usec: u64) {
            self.armed.lock().unwrap().insert(job, deadline_usec);
        }

        fn disarm(&self, job: JobId) {
            self.armed.lock().unwrap().remove(&job);
        }
    }
}
