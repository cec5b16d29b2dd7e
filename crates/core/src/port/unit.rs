// Unit Vtable Port
// The engine drives units exclusively through this trait; service, mount,
// socket and friends live on the other side of it.

use std::sync::Arc;

use crate::domain::{ActiveState, EdgeKind, EmergencyAction, JobResult, JobType, UnitName};

/// Outcome of a unit primitive (`start`/`stop`/`reload`).
///
/// These are the sentinel return codes of the unit boundary; the engine maps
/// them to terminal job results, so they stay named variants rather than raw
/// integers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitOpOutcome {
    /// The operation was kicked off asynchronously; the unit will report
    /// completion through `finish` later.
    InProgress,
    /// The desired state already holds.
    Already,
    /// The unit cannot (yet) execute this operation.
    Skip,
    /// Condition checks rejected the operation.
    Invalid,
    /// An assertion on the unit failed.
    AssertFailed,
    /// The unit kind does not support the operation.
    Unsupported,
    /// Transient refusal; retry once peer jobs make progress.
    Retry,
    /// Hard failure with diagnostic.
    Error(String),
}

/// What the engine needs from a unit.
///
/// Edge sets are maintained symmetrically by the unit model: if `b` is
/// `after` `a`, then `a` is `before` `b`. The engine relies on that to find
/// ordering neighbors from the side that just finished.
pub trait UnitHandle: Send + Sync {
    fn name(&self) -> UnitName;

    fn description(&self) -> String {
        self.name().to_string()
    }

    fn active_state(&self) -> ActiveState;

    fn sub_state(&self) -> String {
        String::new()
    }

    fn start(&self) -> UnitOpOutcome;
    fn stop(&self) -> UnitOpOutcome;
    fn reload(&self) -> UnitOpOutcome;

    fn edges(&self, kind: EdgeKind) -> Vec<UnitName>;

    /// Per-unit job timeout in monotonic microseconds; `None` defers to the
    /// engine-wide default.
    fn job_timeout(&self) -> Option<u64> {
        None
    }

    fn job_timeout_action(&self) -> EmergencyAction {
        EmergencyAction::None
    }

    fn job_timeout_reboot_arg(&self) -> Option<String> {
        None
    }

    /// Unit-specific deadline for idle computation, if any.
    fn deadline(&self) -> Option<u64> {
        None
    }

    /// Status banner override for a (job type, result) pair; `None` falls
    /// back to the generic templates.
    fn status_message(&self, job_type: JobType, result: JobResult) -> Option<String> {
        let _ = (job_type, result);
        None
    }

    /// Fired by the engine on `timeout`/`dependency` results.
    fn start_on_failure(&self) {}
}

/// Resolves unit names back to handles; needed when reinstating serialized
/// jobs after a live-reload.
pub trait UnitRegistry {
    fn get(&self, name: &UnitName) -> Option<Arc<dyn UnitHandle>>;
}

impl UnitRegistry for std::collections::HashMap<UnitName, Arc<dyn UnitHandle>> {
    fn get(&self, name: &UnitName) -> Option<Arc<dyn UnitHandle>> {
        std::collections::HashMap::get(self, name).cloned()
    }
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    /// Scriptable unit for engine tests.
    ///
    /// Primitive outcomes are popped from per-operation queues, falling back
    /// to a default outcome (`InProgress` unless overridden). Activation
    /// state and edges can be changed mid-test; every call is counted.
    pub struct MockUnit {
        name: UnitName,
        description: String,
        state: Mutex<ActiveState>,
        edges: Mutex<HashMap<EdgeKind, Vec<UnitName>>>,
        default_outcome: Mutex<UnitOpOutcome>,
        start_outcomes: Mutex<VecDeque<UnitOpOutcome>>,
        stop_outcomes: Mutex<VecDeque<UnitOpOutcome>>,
        reload_outcomes: Mutex<VecDeque<UnitOpOutcome>>,
        job_timeout: Mutex<Option<u64>>,
        timeout_action: Mutex<EmergencyAction>,
        reboot_arg: Mutex<Option<String>>,
        deadline: Mutex<Option<u64>>,
        start_calls: Mutex<usize>,
        stop_calls: Mutex<usize>,
        reload_calls: Mutex<usize>,
        on_failure_calls: Mutex<usize>,
    }

    impl MockUnit {
        pub fn new(name: &str) -> Self {
            Self {
                name: UnitName::from(name),
                description: name.to_string(),
                state: Mutex::new(ActiveState::Inactive),
                edges: Mutex::new(HashMap::new()),
                default_outcome: Mutex::new(UnitOpOutcome::InProgress),
                start_outcomes: Mutex::new(VecDeque::new()),
                stop_outcomes: Mutex::new(VecDeque::new()),
                reload_outcomes: Mutex::new(VecDeque::new()),
                job_timeout: Mutex::new(None),
                timeout_action: Mutex::new(EmergencyAction::None),
                reboot_arg: Mutex::new(None),
                deadline: Mutex::new(None),
                start_calls: Mutex::new(0),
                stop_calls: Mutex::new(0),
                reload_calls: Mutex::new(0),
                on_failure_calls: Mutex::new(0),
            }
        }

        pub fn with_active_state(self, state: ActiveState) -> Self {
            *self.state.lock().unwrap() = state;
            self
        }

        pub fn with_edge(self, kind: EdgeKind, peers: &[&str]) -> Self {
            self.edges
                .lock()
                .unwrap()
                .insert(kind, peers.iter().map(|p| UnitName::from(*p)).collect());
            self
        }

        pub fn with_default_outcome(self, outcome: UnitOpOutcome) -> Self {
            *self.default_outcome.lock().unwrap() = outcome;
            self
        }

        pub fn with_job_timeout(self, usec: u64) -> Self {
            *self.job_timeout.lock().unwrap() = Some(usec);
            self
        }

        pub fn with_timeout_action(self, action: EmergencyAction, reboot_arg: Option<&str>) -> Self {
            *self.timeout_action.lock().unwrap() = action;
            *self.reboot_arg.lock().unwrap() = reboot_arg.map(str::to_string);
            self
        }

        pub fn with_deadline(self, usec: u64) -> Self {
            *self.deadline.lock().unwrap() = Some(usec);
            self
        }

        pub fn set_active_state(&self, state: ActiveState) {
            *self.state.lock().unwrap() = state;
        }

        pub fn queue_start_outcome(&self, outcome: UnitOpOutcome) {
            self.start_outcomes.lock().unwrap().push_back(outcome);
        }

        pub fn queue_stop_outcome(&self, outcome: UnitOpOutcome) {
            self.stop_outcomes.lock().unwrap().push_back(outcome);
        }

        pub fn queue_reload_outcome(&self, outcome: UnitOpOutcome) {
            self.reload_outcomes.lock().unwrap().push_back(outcome);
        }

        pub fn start_calls(&self) -> usize {
            *self.start_calls.lock().unwrap()
        }

        pub fn stop_calls(&self) -> usize {
            *self.stop_calls.lock().unwrap()
        }

        pub fn reload_calls(&self) -> usize {
            *self.reload_calls.lock().unwrap()
        }

        pub fn on_failure_calls(&self) -> usize {
            *self.on_failure_calls.lock().unwrap()
        }

        fn next_outcome(&self, queue: &Mutex<VecDeque<UnitOpOutcome>>) -> UnitOpOutcome {
            queue
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| self.default_outcome.lock().unwrap().clone())
        }
    }

    impl UnitHandle for MockUnit {
        fn name(&self) -> UnitName {
            self.name.clone()
        }

        fn description(&self) -> String {
            self.description.clone()
        }

        fn active_state(&self) -> ActiveState {
            *self.state.lock().unwrap()
        }

        fn start(&self) -> UnitOpOutcome {
            *self.start_calls.lock().unwrap() += 1;
            self.next_outcome(&self.start_outcomes)
        }

        fn stop(&self) -> UnitOpOutcome {
            *self.stop_calls.lock().unwrap() += 1;
            self.next_outcome(&self.stop_outcomes)
        }

        fn reload(&self) -> UnitOpOutcome {
            *self.reload_calls.lock().unwrap() += 1;
            self.next_outcome(&self.reload_outcomes)
        }

        fn edges(&self, kind: EdgeKind) -> Vec<UnitName> {
            self.edges.lock().unwrap().get(&kind).cloned().unwrap_or_default()
        }

        fn job_timeout(&self) -> Option<u64> {
            *self.job_timeout.lock().unwrap()
        }

        fn job_timeout_action(&self) -> EmergencyAction {
            *self.timeout_action.lock().unwrap()
        }

        fn job_timeout_reboot_arg(&self) -> Option<String> {
            self.reboot_arg.lock().unwrap().clone()
        }

        fn deadline(&self) -> Option<u64> {
            *self.deadline.lock().unwrap()
        }

        fn start_on_failure(&self) {
            *self.on_failure_calls.lock().unwrap() += 1;
        }
    }
}
