use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of one in-flight event: the event number and the whiteboard
/// slot it occupies.
///
/// Minted by the scheduler when the event is admitted and never changed
/// afterwards. It is passed explicitly to every algorithm call; there is no
/// thread-local "current context".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventContext {
    event_number: u64,
    slot: usize,
    sub_slot: Option<usize>,
}

impl EventContext {
    pub fn new(event_number: u64, slot: usize) -> Self {
        Self {
            event_number,
            slot,
            sub_slot: None,
        }
    }

    /// Derive a context for a sub-slot of the same event.
    pub fn with_sub_slot(self, sub_slot: usize) -> Self {
        Self {
            sub_slot: Some(sub_slot),
            ..self
        }
    }

    pub fn event_number(&self) -> u64 {
        self.event_number
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn sub_slot(&self) -> Option<usize> {
        self.sub_slot
    }
}

impl fmt::Display for EventContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.sub_slot {
            Some(sub) => write!(f, "e:{} s:{}.{}", self.event_number, self.slot, sub),
            None => write!(f, "e:{} s:{}", self.event_number, self.slot),
        }
    }
}
