//! Single-shot deadlines polled from the sampling loop.
//!
//! Nothing here spawns a thread or sleeps. A `OneShot` is armed with a
//! deadline on the session clock and fires at most once, the first time it
//! is polled at or after that deadline. Re-arming or cancelling invalidates
//! the previous token, so a superseded deadline can never fire late.

use log::trace;

/// Identifies one arming of a `OneShot`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken(u64);

#[derive(Debug, Clone)]
pub struct OneShot {
    label: &'static str,
    pending: Option<(TimerToken, u64)>,
    generation: u64,
}

impl OneShot {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            pending: None,
            generation: 0,
        }
    }

    /// Schedule a deadline `after_ms` from `now_ms`, replacing any pending one.
    pub fn arm(&mut self, now_ms: u64, after_ms: u64) -> TimerToken {
        self.generation += 1;
        let token = TimerToken(self.generation);
        let deadline = now_ms.saturating_add(after_ms);
        self.pending = Some((token, deadline));
        trace!("timer {}: armed for t={}ms", self.label, deadline);
        token
    }

    /// Cancel whatever is pending. Returns true if something was cancelled.
    pub fn cancel(&mut self) -> bool {
        match self.pending.take() {
            Some(_) => {
                trace!("timer {}: cancelled", self.label);
                true
            }
            None => false,
        }
    }

    /// Cancel only if `token` is still the pending arming.
    pub fn cancel_token(&mut self, token: TimerToken) -> bool {
        match self.pending {
            Some((t, _)) if t == token => self.cancel(),
            _ => false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.pending.is_some()
    }

    pub fn deadline(&self) -> Option<u64> {
        self.pending.map(|(_, d)| d)
    }

    /// Fire if due. A fired timer is disarmed.
    pub fn poll(&mut self, now_ms: u64) -> Option<TimerToken> {
        match self.pending {
            Some((token, deadline)) if now_ms >= deadline => {
                self.pending = None;
                trace!("timer {}: fired at t={}ms", self.label, now_ms);
                Some(token)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fires_once_at_deadline() {
        let mut t = OneShot::new("test");
        t.arm(100, 50);
        assert_eq!(t.deadline(), Some(150));
        assert!(t.poll(149).is_none());
        assert!(t.poll(150).is_some());
        assert!(t.poll(151).is_none(), "single-shot");
        assert!(!t.is_armed());
    }

    #[test]
    fn test_cancel_prevents_fire() {
        let mut t = OneShot::new("test");
        t.arm(0, 10);
        assert!(t.cancel());
        assert!(!t.cancel());
        assert!(t.poll(1_000).is_none());
    }

    #[test]
    fn test_rearm_invalidates_old_token() {
        let mut t = OneShot::new("test");
        let first = t.arm(0, 10);
        let second = t.arm(5, 10);
        assert_ne!(first, second);
        assert!(!t.cancel_token(first), "stale token must not cancel");
        assert!(t.poll(10).is_none(), "old deadline superseded");
        assert_eq!(t.poll(15), Some(second));
    }

    #[test]
    fn test_zero_delay_fires_on_same_tick() {
        let mut t = OneShot::new("test");
        t.arm(42, 0);
        assert!(t.poll(42).is_some());
    }
}
