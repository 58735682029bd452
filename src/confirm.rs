use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::debug;

pub const DEFAULT_CONFIRM_WINDOW: Duration = Duration::from_millis(3000);

/// Something a destructive action applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ConfirmTarget {
    Session(i64),
    Step(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Confirmation {
    /// First request: the action is armed and waits for a second one.
    Armed,
    /// Second request for the same target inside the window: go ahead.
    Confirmed,
}

/// Two-step confirmation for deletes. The first call for a target arms the
/// guard; a second call for the same target within the window confirms it.
/// An armed guard disarms itself once the window has passed.
#[derive(Debug, Clone)]
pub struct ConfirmGuard {
    window: Duration,
    armed: Option<(ConfirmTarget, Instant)>,
}

impl ConfirmGuard {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            armed: None,
        }
    }

    pub fn confirm(&mut self, target: ConfirmTarget) -> Confirmation {
        self.confirm_at(target, Instant::now())
    }

    pub fn confirm_at(&mut self, target: ConfirmTarget, now: Instant) -> Confirmation {
        match self.armed_at(now) {
            Some(armed) if armed == target => {
                self.armed = None;
                debug!("Confirmed {:?}", target);
                Confirmation::Confirmed
            }
            _ => {
                self.armed = Some((target, now));
                debug!("Armed {:?} for {:?}", target, self.window);
                Confirmation::Armed
            }
        }
    }

    /// The armed target, if the window is still open at `now`.
    pub fn armed_at(&self, now: Instant) -> Option<ConfirmTarget> {
        self.armed
            .filter(|(_, since)| now.saturating_duration_since(*since) <= self.window)
            .map(|(target, _)| target)
    }

    pub fn armed(&self) -> Option<ConfirmTarget> {
        self.armed_at(Instant::now())
    }

    pub fn disarm(&mut self) {
        self.armed = None;
    }
}

impl Default for ConfirmGuard {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIRM_WINDOW)
    }
}
