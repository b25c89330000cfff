//! Passive income: the live per-second tick and the offline catch-up grant.
use serde::{Deserialize, Serialize};

use crate::constants::MILLIS_PER_SECOND;
use crate::numbers::i64_to_f64;
use crate::state::GameState;

/// Result of crediting the time spent away from the game.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OfflineProgress {
    pub elapsed_seconds: f64,
    pub gain: f64,
}

/// Labour earned per second at the current rate and multiplier.
#[must_use]
pub fn passive_rate(state: &GameState) -> f64 {
    state.effective_passive_yield()
}

/// Whether a live ticker has anything to do.
#[must_use]
pub fn ticking(state: &GameState) -> bool {
    state.passive_income_per_second > 0.0
}

/// Credit `seconds` worth of passive income, returning the amount added.
pub fn accrue(state: &mut GameState, seconds: f64) -> f64 {
    let gain = passive_rate(state) * seconds;
    state.credit(gain);
    gain
}

/// Apply one live tick. Returns `None` when there is no passive income.
pub fn live_tick(state: &mut GameState) -> Option<f64> {
    if !ticking(state) {
        return None;
    }
    let gain = accrue(state, 1.0);
    log::debug!("Passive income tick: +{gain:.2} Labour Units");
    Some(gain)
}

/// Grant income for the gap between the last save and `now_ms`, then move
/// the offline clock to `now_ms`.
///
/// The gap is clamped at zero, so a clock that runs backwards yields nothing.
/// There is no upper bound.
pub fn apply_offline_progress(state: &mut GameState, now_ms: i64) -> OfflineProgress {
    let elapsed_ms = now_ms.saturating_sub(state.last_save_time).max(0);
    let elapsed_seconds = i64_to_f64(elapsed_ms) / MILLIS_PER_SECOND;
    let gain = accrue(state, elapsed_seconds);
    state.last_save_time = now_ms;
    if gain > 0.0 {
        log::info!("Offline progress: +{gain:.2} Labour Units ({elapsed_seconds:.0}s)");
    }
    OfflineProgress {
        elapsed_seconds,
        gain,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn earning_state(rate: f64, multiplier: f64, last_save: i64) -> GameState {
        let mut state = GameState::initial(last_save);
        state.passive_income_per_second = rate;
        state.global_multiplier = multiplier;
        state
    }

    #[test]
    fn offline_catch_up_grants_rate_times_elapsed() {
        let t0 = 1_700_000_000_000;
        let mut state = earning_state(5.0, 2.0, t0);
        let progress = apply_offline_progress(&mut state, t0 + 10_000);
        assert!((progress.gain - 100.0).abs() < 1e-9);
        assert!((progress.elapsed_seconds - 10.0).abs() < 1e-9);
        assert!((state.labour_units - 100.0).abs() < 1e-9);
        assert!((state.total_labour_earned - 100.0).abs() < 1e-9);
        assert_eq!(state.last_save_time, t0 + 10_000);
    }

    #[test]
    fn offline_catch_up_clamps_negative_gaps() {
        let mut state = earning_state(5.0, 1.0, 10_000);
        let progress = apply_offline_progress(&mut state, 4_000);
        assert!(progress.gain.abs() < f64::EPSILON);
        assert!(progress.elapsed_seconds.abs() < f64::EPSILON);
        assert!(state.labour_units.abs() < f64::EPSILON);
        assert_eq!(state.last_save_time, 4_000);
    }

    #[test]
    fn offline_catch_up_is_proportional_for_tiny_gaps() {
        let mut state = earning_state(1.0, 1.0, 0);
        let progress = apply_offline_progress(&mut state, 1);
        assert!((progress.gain - 0.001).abs() < 1e-12);
    }

    #[test]
    fn offline_catch_up_is_uncapped() {
        let mut state = earning_state(1.0, 1.0, 0);
        let thirty_days_ms = 30 * 24 * 3_600 * 1_000;
        let progress = apply_offline_progress(&mut state, thirty_days_ms);
        assert!((progress.gain - 2_592_000.0).abs() < 1e-6);
    }

    #[test]
    fn live_tick_skips_when_rate_is_zero() {
        let mut state = earning_state(0.0, 3.0, 0);
        assert_eq!(live_tick(&mut state), None);
        assert!(state.labour_units.abs() < f64::EPSILON);
    }

    #[test]
    fn live_tick_uses_current_multiplier() {
        let mut state = earning_state(0.5, 1.25, 0);
        let gain = live_tick(&mut state).unwrap();
        assert!((gain - 0.625).abs() < 1e-12);
        assert!((state.total_labour_earned - 0.625).abs() < 1e-12);
    }
}
