// Monotonic Clock Port (for testability)

use std::time::Instant;

/// Monotonic time source in microseconds. Job timing must survive wall-clock
/// jumps, so this is deliberately not wall-clock time.
pub trait MonotonicClock: Send + Sync {
    fn now_usec(&self) -> u64;
}

/// Production clock backed by `Instant`, anchored at construction.
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock for SystemClock {
    fn now_usec(&self) -> u64 {
        self.origin.elapsed().as_micros() as u64
    }
}

pub mod mocks {
    use super::*;
    use std::sync::Mutex;

    /// Manually advanced clock for deterministic tests.
    pub struct MockClock {
        now: Mutex<u64>,
    }

    impl MockClock {
        pub fn new(start_usec: u64) -> Self {
            Self {
                now: Mutex::new(start_usec),
            }
        }

        pub fn advance(&self, usec: u64) {
            *self.now.lock().unwrap() += usec;
        }

        pub fn set(&self, usec: u64) {
            *self.now.lock().unwrap() = usec;
        }
    }

    impl MonotonicClock for MockClock {
        fn now_usec(&self) -> u64 {
            *self.now.lock().unwrap()
        }
    }
}
