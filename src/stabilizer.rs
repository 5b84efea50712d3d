use crate::timer::OneShot;
use crate::types::Note;
use log::debug;
use serde::{Deserialize, Serialize};

/// Tuning for the display stabilizer. All durations are milliseconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilizerConfig {
    /// Fraction of the remaining distance covered per tick (0.0–1.0]
    pub smoothing_factor: f64,
    /// Residual below which smoothing snaps to the target
    pub snap_epsilon_cents: f64,
    /// How long a note stays on screen after the signal disappears
    pub decay_ms: u64,
    /// "In tune" highlight margin
    pub in_tune_margin_cents: f64,
    /// Margin that must hold continuously for lock-in
    pub lock_in_margin_cents: f64,
    /// How long the lock-in margin must hold
    pub lock_in_hold_ms: u64,
}

impl Default for StabilizerConfig {
    fn default() -> Self {
        Self {
            smoothing_factor: 0.05,
            snap_epsilon_cents: 0.01,
            decay_ms: 750,
            in_tune_margin_cents: 5.0,
            lock_in_margin_cents: 5.0,
            lock_in_hold_ms: 1000,
        }
    }
}

/// Cross-tick state for one tuning session.
#[derive(Debug, Clone)]
pub struct StabilizedDisplayState {
    pub smoothed_cents: f64,
    pub last_note: Option<Note>,
    pub locked_in: bool,
    decay: OneShot,
    lock_in: OneShot,
}

impl StabilizedDisplayState {
    fn new() -> Self {
        Self {
            smoothed_cents: 0.0,
            last_note: None,
            locked_in: false,
            decay: OneShot::new("decay"),
            lock_in: OneShot::new("lock-in"),
        }
    }

    pub fn decay_deadline(&self) -> Option<u64> {
        self.decay.deadline()
    }

    pub fn lock_in_deadline(&self) -> Option<u64> {
        self.lock_in.deadline()
    }
}

/// What the display should show after one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayFrame {
    pub smoothed_cents: f64,
    pub note: Option<Note>,
    pub locked_in: bool,
    /// Displayed note within the visual in-tune margin
    pub in_tune: bool,
    /// True only on the tick where lock-in was reached
    pub just_locked: bool,
}

/// Turns a jittery per-tick reading into a steady display signal.
///
/// Three independent mechanisms:
///   - cents smoothing toward the displayed note (exponential, snaps at epsilon)
///   - decay: silence keeps the last note visible for `decay_ms`
///   - lock-in: `lock_in_hold_ms` continuously inside `lock_in_margin_cents`
///
/// Lock-in is reset by going out of the margin, by the raw signal dropping
/// out, or by the reading switching to a different note.
pub struct SignalStabilizer {
    config: StabilizerConfig,
    state: StabilizedDisplayState,
}

impl SignalStabilizer {
    pub fn new(config: StabilizerConfig) -> Self {
        Self {
            config,
            state: StabilizedDisplayState::new(),
        }
    }

    pub fn config(&self) -> &StabilizerConfig {
        &self.config
    }

    pub fn state(&self) -> &StabilizedDisplayState {
        &self.state
    }

    /// Advance one tick with this tick's reading (`None` = no note).
    pub fn step(&mut self, now_ms: u64, reading: Option<&Note>) -> DisplayFrame {
        let cfg = self.config;
        let st = &mut self.state;

        match reading {
            Some(note) => {
                st.decay.cancel();
                let same_note = st
                    .last_note
                    .as_ref()
                    .is_some_and(|prev| prev.name == note.name);
                if !same_note || !note.is_in_tune(cfg.lock_in_margin_cents) {
                    Self::reset_lock(st);
                }
                if note.is_in_tune(cfg.lock_in_margin_cents)
                    && !st.locked_in
                    && !st.lock_in.is_armed()
                {
                    st.lock_in.arm(now_ms, cfg.lock_in_hold_ms);
                }
                st.last_note = Some(note.clone());
            }
            None => {
                Self::reset_lock(st);
                if st.last_note.is_some() && !st.decay.is_armed() {
                    st.decay.arm(now_ms, cfg.decay_ms);
                }
            }
        }

        if st.decay.poll(now_ms).is_some() {
            if let Some(prev) = st.last_note.take() {
                debug!("stabilizer: {} decayed at t={}ms", prev.name, now_ms);
            }
        }

        let mut just_locked = false;
        if st.lock_in.poll(now_ms).is_some() {
            st.locked_in = true;
            just_locked = true;
            if let Some(n) = &st.last_note {
                debug!("stabilizer: locked in on {} at t={}ms", n.name, now_ms);
            }
        }

        let target = st.last_note.as_ref().map_or(0.0, |n| n.cents);
        st.smoothed_cents += (target - st.smoothed_cents) * cfg.smoothing_factor;
        if (target - st.smoothed_cents).abs() < cfg.snap_epsilon_cents {
            st.smoothed_cents = target;
        }

        DisplayFrame {
            smoothed_cents: st.smoothed_cents,
            in_tune: st
                .last_note
                .as_ref()
                .is_some_and(|n| n.is_in_tune(cfg.in_tune_margin_cents)),
            note: st.last_note.clone(),
            locked_in: st.locked_in,
            just_locked,
        }
    }

    fn reset_lock(st: &mut StabilizedDisplayState) {
        st.lock_in.cancel();
        st.locked_in = false;
    }

    /// Number of deadlines still scheduled.
    pub fn pending_timers(&self) -> usize {
        self.state.decay.is_armed() as usize + self.state.lock_in.is_armed() as usize
    }

    /// Cancel every pending deadline. Called when the session stops.
    pub fn teardown(&mut self) {
        self.state.decay.cancel();
        self.state.lock_in.cancel();
    }
}

impl Default for SignalStabilizer {
    fn default() -> Self {
        Self::new(StabilizerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TICK: u64 = 10;

    fn note(name: &str, cents: f64) -> Note {
        Note {
            name: name.into(),
            cents,
            frequency: 82.41,
            confidence: 0.95,
        }
    }

    /// Feed `reading` every TICK from `from` (inclusive) to `to` (exclusive).
    fn feed(
        stab: &mut SignalStabilizer,
        from: u64,
        to: u64,
        reading: Option<&Note>,
    ) -> Vec<(u64, DisplayFrame)> {
        (from..to)
            .step_by(TICK as usize)
            .map(|t| (t, stab.step(t, reading)))
            .collect()
    }

    #[test]
    fn test_smoothing_converges_without_overshoot() {
        let mut stab = SignalStabilizer::default();
        let n = note("E2", 20.0);
        let mut prev = 0.0;
        let mut ticks = 0;
        loop {
            let f = stab.step(ticks * TICK, Some(&n));
            assert!(f.smoothed_cents >= prev, "monotonic");
            assert!(f.smoothed_cents <= 20.0, "no overshoot: {}", f.smoothed_cents);
            prev = f.smoothed_cents;
            ticks += 1;
            if f.smoothed_cents == 20.0 {
                break;
            }
            assert!(ticks < 250, "did not converge");
        }
        // ln(0.01/20) / ln(0.95) ≈ 148
        assert!(ticks > 100, "converged suspiciously fast: {}", ticks);
    }

    #[test]
    fn test_smoothing_only_touches_cents() {
        let mut stab = SignalStabilizer::default();
        let f = stab.step(0, Some(&note("A2", -30.0)));
        let shown = f.note.unwrap();
        assert_eq!(shown.name, "A2");
        assert_eq!(shown.cents, -30.0);
        assert!(f.smoothed_cents > -30.0 && f.smoothed_cents < 0.0);
    }

    #[test]
    fn test_note_persists_until_decay_elapses() {
        let mut stab = SignalStabilizer::default();
        let n = note("E2", 3.0);
        feed(&mut stab, 0, 500, Some(&n));
        // Signal lost at T=500, decay 750ms
        for (t, f) in feed(&mut stab, 500, 1250, None) {
            assert_eq!(f.note.as_ref().map(|x| x.name.as_str()), Some("E2"), "t={}", t);
        }
        let f = stab.step(1250, None);
        assert!(f.note.is_none(), "cleared at T + decay");
        assert_eq!(stab.pending_timers(), 0);
    }

    #[test]
    fn test_new_note_cancels_decay() {
        let mut stab = SignalStabilizer::default();
        feed(&mut stab, 0, 300, Some(&note("E2", 0.0)));
        feed(&mut stab, 300, 600, None);
        let f = stab.step(600, Some(&note("A2", 10.0)));
        assert_eq!(f.note.unwrap().name, "A2", "replaced immediately");
        assert!(stab.state().decay_deadline().is_none());
        // Old decay deadline (1050) passes without clearing
        let frames = feed(&mut stab, 610, 1200, Some(&note("A2", 10.0)));
        assert!(frames.iter().all(|(_, f)| f.note.is_some()));
    }

    #[test]
    fn test_repeated_absence_is_a_steady_state() {
        let mut stab = SignalStabilizer::default();
        let frames = feed(&mut stab, 0, 2000, None);
        assert!(frames.iter().all(|(_, f)| f.note.is_none() && !f.locked_in));
        assert_eq!(stab.pending_timers(), 0);
    }

    #[test]
    fn test_lock_in_after_hold() {
        let mut stab = SignalStabilizer::default();
        let n = note("E2", 2.0);
        let frames = feed(&mut stab, 0, 1500, Some(&n));
        let locks: Vec<u64> = frames
            .iter()
            .filter(|(_, f)| f.just_locked)
            .map(|(t, _)| *t)
            .collect();
        assert_eq!(locks, vec![1000], "exactly once at T0 + hold");
        for (t, f) in &frames {
            assert_eq!(f.locked_in, *t >= 1000, "t={}", t);
        }
    }

    #[test]
    fn test_excursion_restarts_lock_timer() {
        let mut stab = SignalStabilizer::default();
        feed(&mut stab, 0, 900, Some(&note("E2", 1.0)));
        let f = stab.step(900, Some(&note("E2", 12.0)));
        assert!(!f.locked_in);
        assert!(stab.state().lock_in_deadline().is_none());
        let frames = feed(&mut stab, 910, 2000, Some(&note("E2", -1.0)));
        let first_lock = frames.iter().find(|(_, f)| f.locked_in).map(|(t, _)| *t);
        assert_eq!(first_lock, Some(1910));
    }

    #[test]
    fn test_lock_is_sticky_until_streak_breaks() {
        let mut stab = SignalStabilizer::default();
        feed(&mut stab, 0, 1100, Some(&note("E2", 0.5)));
        assert!(stab.state().locked_in);
        let frames = feed(&mut stab, 1100, 5000, Some(&note("E2", 0.5)));
        assert!(frames.iter().all(|(_, f)| f.locked_in && !f.just_locked));
        let f = stab.step(5000, Some(&note("E2", 7.0)));
        assert!(!f.locked_in);
    }

    #[test]
    fn test_signal_loss_resets_lock() {
        let mut stab = SignalStabilizer::default();
        feed(&mut stab, 0, 1100, Some(&note("E2", 0.0)));
        assert!(stab.state().locked_in);
        let f = stab.step(1100, None);
        assert!(!f.locked_in, "reset on signal loss");
        assert!(f.note.is_some(), "note still displayed while decaying");
    }

    #[test]
    fn test_note_change_restarts_lock() {
        let mut stab = SignalStabilizer::default();
        feed(&mut stab, 0, 800, Some(&note("E2", 0.0)));
        let frames = feed(&mut stab, 800, 1500, Some(&note("A2", 0.0)));
        assert!(frames.iter().all(|(_, f)| !f.locked_in));
        let f = stab.step(1800, Some(&note("A2", 0.0)));
        assert!(f.locked_in);
    }

    #[test]
    fn test_lock_and_in_tune_margins_are_independent() {
        let mut stab = SignalStabilizer::new(StabilizerConfig {
            lock_in_margin_cents: 8.0,
            ..StabilizerConfig::default()
        });
        let n = note("D3", 6.5);
        let frames = feed(&mut stab, 0, 1100, Some(&n));
        let last = &frames.last().unwrap().1;
        assert!(last.locked_in, "inside the 8¢ lock margin");
        assert!(!last.in_tune, "outside the 5¢ visual margin");
    }

    #[test]
    fn test_teardown_cancels_everything() {
        let mut stab = SignalStabilizer::default();
        feed(&mut stab, 0, 500, Some(&note("E2", 0.0)));
        assert_eq!(stab.pending_timers(), 1, "lock-in pending");
        stab.step(500, None);
        assert_eq!(stab.pending_timers(), 1, "decay pending");
        stab.teardown();
        assert_eq!(stab.pending_timers(), 0);
    }
}
