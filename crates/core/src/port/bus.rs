// Subscription Bus Port
// The engine queues job lifecycle events; an IPC adapter fans them out to
// subscribed clients.

use serde::{Deserialize, Serialize};

use crate::domain::{JobId, JobResult, UnitName};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobEventKind {
    New,
    Changed,
    Removed,
}

/// One queued notification about a job's lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobEvent {
    pub kind: JobEventKind,
    pub id: JobId,
    pub unit: UnitName,
    pub object_path: String,
    /// Terminal result; only present on `Removed`.
    pub result: Option<JobResult>,
}

pub trait JobEventBus: Send + Sync {
    fn publish(&self, event: JobEvent);
}

pub mod mocks {
    use super::*;
    use std::sync::Mutex;

    /// Captures published events for assertions.
    #[derive(Default)]
    pub struct RecordingBus {
        events: Mutex<Vec<JobEvent>>,
    }

    impl RecordingBus {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn events(&self) -> Vec<JobEvent> {
            self.events.lock().unwrap().clone()
        }

        pub fn clear(&self) {
            self.events.lock().unwrap().clear();
        }

        pub fn kinds_for(&self, id: JobId) -> Vec<JobEventKind> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter(|e| e.id == id)
                .map(|e| e.kind)
                .collect()
        }
    }

    impl JobEventBus for RecordingBus {
        fn publish(&self, event: JobEvent) {
            self.events.lock().unwrap().push(event);
        }
    }
}
