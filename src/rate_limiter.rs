use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionClass {
    Join,
    Message,
}

impl ActionClass {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Join => "join",
            Self::Message => "message",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Denied { wait: std::time::Duration },
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        matches!(self, Self::Allowed)
    }
}

#[derive(Debug)]
struct SlidingWindow {
    ceiling: usize,
    timestamps: VecDeque<DateTime<Utc>>,
}

impl SlidingWindow {
    fn new(ceiling: usize) -> Self {
        Self {
            ceiling,
            timestamps: VecDeque::new(),
        }
    }

    fn prune(&mut self, now: DateTime<Utc>) {
        let cutoff = now - Duration::hours(1);
        while self
            .timestamps
            .front()
            .map(|first| *first <= cutoff)
            .unwrap_or(false)
        {
            self.timestamps.pop_front();
        }
    }

    fn check(&mut self, now: DateTime<Utc>) -> Decision {
        self.prune(now);
        if self.timestamps.len() < self.ceiling {
            return Decision::Allowed;
        }
        // Denied: wait until the oldest retained entry exits the window.
        let wait = match self.timestamps.front() {
            Some(oldest) => (*oldest + Duration::hours(1) - now).to_std().unwrap_or_default(),
            None => Duration::hours(1).to_std().unwrap_or_default(),
        };
        Decision::Denied { wait }
    }

    fn record(&mut self, now: DateTime<Utc>) {
        self.timestamps.push_back(now);
    }

    fn remaining(&mut self, now: DateTime<Utc>) -> usize {
        self.prune(now);
        self.ceiling.saturating_sub(self.timestamps.len())
    }
}

/// Trailing-hour admission control, tracked independently per action class.
/// Only successful actions consume budget; callers record after the external
/// call succeeds, never before.
#[derive(Debug)]
pub struct RateLimiter {
    join: SlidingWindow,
    message: SlidingWindow,
}

impl RateLimiter {
    pub fn new(max_joins_per_hour: usize, max_messages_per_hour: usize) -> Self {
        Self {
            join: SlidingWindow::new(max_joins_per_hour),
            message: SlidingWindow::new(max_messages_per_hour),
        }
    }

    pub fn check(&mut self, class: ActionClass, now: DateTime<Utc>) -> Decision {
        self.window_mut(class).check(now)
    }

    pub fn record(&mut self, class: ActionClass, now: DateTime<Utc>) {
        self.window_mut(class).record(now);
    }

    pub fn remaining(&mut self, class: ActionClass, now: DateTime<Utc>) -> usize {
        self.window_mut(class).remaining(now)
    }

    fn window_mut(&mut self, class: ActionClass) -> &mut SlidingWindow {
        match class {
            ActionClass::Join => &mut self.join,
            ActionClass::Message => &mut self.message,
        }
    }
}
