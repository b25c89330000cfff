//! Cancel-and-reschedule timer for coalescing saves.
use std::ops::Add;
use std::time::Duration;

/// Two-state debounce machine. Every change re-arms the deadline; the write
/// happens once the deadline passes without another change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceState<I> {
    Idle,
    Pending { deadline: I },
}

#[derive(Debug, Clone)]
pub struct SaveDebouncer<I> {
    window: Duration,
    state: DebounceState<I>,
}

impl<I> SaveDebouncer<I>
where
    I: Copy + Ord + Add<Duration, Output = I>,
{
    #[must_use]
    pub const fn new(window: Duration) -> Self {
        Self {
            window,
            state: DebounceState::Idle,
        }
    }

    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }

    #[must_use]
    pub const fn state(&self) -> DebounceState<I> {
        self.state
    }

    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self.state, DebounceState::Pending { .. })
    }

    #[must_use]
    pub const fn deadline(&self) -> Option<I> {
        match self.state {
            DebounceState::Idle => None,
            DebounceState::Pending { deadline } => Some(deadline),
        }
    }

    /// Arm the timer, discarding any earlier deadline.
    pub fn notify_change(&mut self, now: I) {
        self.state = DebounceState::Pending {
            deadline: now + self.window,
        };
    }

    /// Returns true exactly once per armed period, when `now` reaches the
    /// deadline. The caller performs the write.
    pub fn poll(&mut self, now: I) -> bool {
        match self.state {
            DebounceState::Pending { deadline } if deadline <= now => {
                self.state = DebounceState::Idle;
                true
            }
            _ => false,
        }
    }

    /// Disarm and report whether a save was outstanding. Used for flushing.
    pub fn take_pending(&mut self) -> bool {
        let pending = self.is_pending();
        self.state = DebounceState::Idle;
        pending
    }

    pub fn cancel(&mut self) {
        self.state = DebounceState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(5);

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn idle_until_first_change() {
        let mut debouncer = SaveDebouncer::<Duration>::new(WINDOW);
        assert_eq!(debouncer.state(), DebounceState::Idle);
        assert!(!debouncer.poll(secs(100)));
    }

    #[test]
    fn fires_once_after_quiet_window() {
        let mut debouncer = SaveDebouncer::new(WINDOW);
        debouncer.notify_change(secs(0));
        assert!(!debouncer.poll(secs(4)));
        assert!(debouncer.poll(secs(5)));
        assert!(!debouncer.poll(secs(6)));
        assert_eq!(debouncer.state(), DebounceState::Idle);
    }

    #[test]
    fn rapid_changes_rearm_instead_of_queueing() {
        let mut debouncer = SaveDebouncer::new(WINDOW);
        let mut fired = 0;
        for t in 0..20 {
            debouncer.notify_change(secs(t));
            if debouncer.poll(secs(t)) {
                fired += 1;
            }
        }
        assert_eq!(debouncer.deadline(), Some(secs(24)));
        assert!(!debouncer.poll(secs(23)));
        if debouncer.poll(secs(24)) {
            fired += 1;
        }
        assert_eq!(fired, 1);
    }

    #[test]
    fn take_pending_and_cancel_disarm() {
        let mut debouncer = SaveDebouncer::new(WINDOW);
        assert!(!debouncer.take_pending());
        debouncer.notify_change(secs(1));
        assert!(debouncer.take_pending());
        assert!(!debouncer.is_pending());

        debouncer.notify_change(secs(2));
        debouncer.cancel();
        assert!(!debouncer.poll(secs(60)));
    }
}
