//! Cancelable interval driven by the host event loop.

use std::time::Duration;
use std::time::Instant;

/// Repeating deadline polled by its owner.
///
/// Missed periods do not queue up: a late poll fires once and the next
/// deadline is measured from that poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interval {
    period: Duration,
    next_due: Option<Instant>,
}

impl Interval {
    pub fn start(period: Duration, now: Instant) -> Self {
        Self {
            period,
            next_due: now.checked_add(period),
        }
    }

    pub fn is_active(&self) -> bool {
        self.next_due.is_some()
    }

    /// Returns true when the interval fired.
    pub fn poll(&mut self, now: Instant) -> bool {
        let Some(due) = self.next_due else {
            return false;
        };
        if now < due {
            return false;
        }
        self.next_due = now.checked_add(self.period);
        true
    }

    pub fn cancel(&mut self) {
        self.next_due = None;
    }
}
