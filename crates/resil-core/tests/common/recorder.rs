//! Observer that keeps every event so tests can assert on the transition log.

use resil_core::retry::{Phase, RetryEvent, RetryObserver};
use resil_core::FailureKind;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct Seen {
    pub phase: Phase,
    pub attempt: u32,
    pub delay: Option<Duration>,
    pub kind: Option<FailureKind>,
}

#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<Seen>>,
}

impl Recorder {
    pub fn events(&self) -> Vec<Seen> {
        self.events.lock().unwrap().clone()
    }

    /// Delays scheduled between attempts, in order.
    pub fn delays(&self) -> Vec<Duration> {
        self.events()
            .into_iter()
            .filter(|e| e.phase == Phase::DelayScheduled)
            .filter_map(|e| e.delay)
            .collect()
    }

    pub fn count(&self, phase: Phase) -> usize {
        self.events().iter().filter(|e| e.phase == phase).count()
    }
}

impl RetryObserver for Recorder {
    fn on_event(&self, event: &RetryEvent<'_>) {
        self.events.lock().unwrap().push(Seen {
            phase: event.phase,
            attempt: event.attempt,
            delay: event.delay,
            kind: event.kind,
        });
    }
}
