// Emergency Action Port
// The engine only signals; rebooting and powering off are the manager's
// problem.

use tracing::warn;

use crate::domain::EmergencyAction;

pub trait EmergencyActionRunner: Send + Sync {
    fn execute(&self, action: EmergencyAction, reboot_arg: Option<&str>);
}

/// Default runner that only logs the request. Suitable for embedders that
/// have no system-level reaction wired up.
pub struct LoggingActionRunner;

impl EmergencyActionRunner for LoggingActionRunner {
    fn execute(&self, action: EmergencyAction, reboot_arg: Option<&str>) {
        warn!(action = %action, reboot_arg = ?reboot_arg, "Emergency action requested");
    }
}

pub mod mocks {
    use super::*;
    use std::sync::Mutex;

    /// Records requested actions for assertions.
    #[derive(Default)]
    pub struct RecordingActionRunner {
        actions: Mutex<Vec<(EmergencyAction, Option<String>)>>,
    }

    impl RecordingActionRunner {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn actions(&self) -> Vec<(EmergencyAction, Option<String>)> {
            self.actions.lock().unwrap().clone()
        }
    }

    impl EmergencyActionRunner for RecordingActionRunner {
        fn execute(&self, action: EmergencyAction, reboot_arg: Option<&str>) {
            self.actions
                .lock()
                .unwrap()
                .push((action, reboot_arg.map(str::to_string)));
        }
    }
}
