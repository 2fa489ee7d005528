use std::time::{Duration, Instant};

/// Wall-clock budget for one move selection. Started once, never extended.
#[derive(Debug, Clone, Copy)]
pub struct SearchTimer {
    start: Instant,
    budget: Duration,
}

impl SearchTimer {
    pub fn start(budget: Duration) -> Self { SearchTimer { start: Instant::now(), budget } }

    #[inline]
    pub fn budget(&self) -> Duration { self.budget }

    #[inline]
    pub fn deadline(&self) -> Instant { self.start + self.budget }

    #[inline]
    pub fn elapsed(&self) -> Duration { self.start.elapsed() }

    #[inline]
    pub fn time_left(&self) -> Duration { self.budget.saturating_sub(self.elapsed()) }

    #[inline]
    pub fn expired(&self) -> bool { self.elapsed() >= self.budget }
}
