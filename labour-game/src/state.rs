//! Authoritative game state and its persisted snapshot shape.
use serde::{Deserialize, Serialize};

use crate::constants::{
    INITIAL_CLICK_POWER, INITIAL_GLOBAL_MULTIPLIER, INITIAL_LABOUR_UNITS, INITIAL_PASSIVE_INCOME,
};

/// Everything the player has earned and unlocked.
///
/// Field names serialize in camelCase so that the snapshot matches the
/// established save format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    /// Spendable balance.
    pub labour_units: f64,
    /// Running sum of every gain; spending never reduces it.
    pub total_labour_earned: f64,
    /// Base yield of one manual action, before the multiplier.
    pub click_power: f64,
    /// Base yield per second, before the multiplier.
    pub passive_income_per_second: f64,
    pub global_multiplier: f64,
    /// Unlocked node ids in purchase order.
    #[serde(default)]
    pub unlocked_nodes: Vec<String>,
    /// Epoch milliseconds of the last persisted snapshot.
    pub last_save_time: i64,
}

impl GameState {
    /// Fresh state for a new player.
    #[must_use]
    pub fn initial(now_ms: i64) -> Self {
        Self {
            labour_units: INITIAL_LABOUR_UNITS,
            total_labour_earned: INITIAL_LABOUR_UNITS,
            click_power: INITIAL_CLICK_POWER,
            passive_income_per_second: INITIAL_PASSIVE_INCOME,
            global_multiplier: INITIAL_GLOBAL_MULTIPLIER,
            unlocked_nodes: Vec::new(),
            last_save_time: now_ms,
        }
    }

    #[must_use]
    pub fn effective_click_yield(&self) -> f64 {
        self.click_power * self.global_multiplier
    }

    #[must_use]
    pub fn effective_passive_yield(&self) -> f64 {
        self.passive_income_per_second * self.global_multiplier
    }

    #[must_use]
    pub fn has_unlocked(&self, id: &str) -> bool {
        self.unlocked_nodes.iter().any(|unlocked| unlocked == id)
    }

    #[must_use]
    pub fn unlocked_count(&self) -> usize {
        self.unlocked_nodes.len()
    }

    /// Compare every field except `last_save_time`.
    #[must_use]
    pub fn same_progress(&self, other: &Self) -> bool {
        self.labour_units.to_bits() == other.labour_units.to_bits()
            && self.total_labour_earned.to_bits() == other.total_labour_earned.to_bits()
            && self.click_power.to_bits() == other.click_power.to_bits()
            && self.passive_income_per_second.to_bits()
                == other.passive_income_per_second.to_bits()
            && self.global_multiplier.to_bits() == other.global_multiplier.to_bits()
            && self.unlocked_nodes == other.unlocked_nodes
    }

    /// Add a gain to both the balance and the lifetime counter.
    pub(crate) fn credit(&mut self, amount: f64) {
        self.labour_units += amount;
        self.total_labour_earned += amount;
    }

    /// Drop repeated ids from a loaded snapshot, keeping first occurrences.
    pub(crate) fn dedupe_unlocked(&mut self) {
        let mut seen = std::collections::HashSet::with_capacity(self.unlocked_nodes.len());
        self.unlocked_nodes.retain(|id| seen.insert(id.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_values_match_new_player() {
        let state = GameState::initial(42);
        assert!(state.labour_units.abs() < f64::EPSILON);
        assert!((state.click_power - 1.0).abs() < f64::EPSILON);
        assert!(state.passive_income_per_second.abs() < f64::EPSILON);
        assert!((state.global_multiplier - 1.0).abs() < f64::EPSILON);
        assert!(state.unlocked_nodes.is_empty());
        assert_eq!(state.last_save_time, 42);
    }

    #[test]
    fn derived_yields_apply_multiplier() {
        let mut state = GameState::initial(0);
        state.click_power = 3.0;
        state.passive_income_per_second = 2.5;
        state.global_multiplier = 2.0;
        assert!((state.effective_click_yield() - 6.0).abs() < f64::EPSILON);
        assert!((state.effective_passive_yield() - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn serializes_with_camel_case_keys() {
        let mut state = GameState::initial(1_700_000_000_000);
        state.unlocked_nodes.push("basic-thinking".to_string());
        let json = serde_json::to_value(&state).unwrap();
        for key in [
            "labourUnits",
            "totalLabourEarned",
            "clickPower",
            "passiveIncomePerSecond",
            "globalMultiplier",
            "unlockedNodes",
            "lastSaveTime",
        ] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
    }

    #[test]
    fn dedupe_keeps_first_occurrence() {
        let mut state = GameState::initial(0);
        state.unlocked_nodes = vec!["a".into(), "b".into(), "a".into(), "c".into(), "b".into()];
        state.dedupe_unlocked();
        assert_eq!(state.unlocked_nodes, vec!["a", "b", "c"]);
    }

    #[test]
    fn same_progress_ignores_save_time() {
        let a = GameState::initial(1);
        let mut b = GameState::initial(2);
        assert!(a.same_progress(&b));
        b.credit(0.1);
        assert!(!a.same_progress(&b));
    }
}
