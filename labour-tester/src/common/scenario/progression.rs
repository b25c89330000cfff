use anyhow::{Context, Result, ensure};

use crate::common::scenario::SimulationScenario;
use crate::logic::game_tester::SimulationSummary;
use crate::logic::{GameTester, GameplayStrategy, SimulationPlan};

const REPLAY_STEPS: usize = 3_000;
const FULL_CLICK_POWER: f64 = 7.0;
const FULL_PASSIVE_INCOME: f64 = 27.5;
const FULL_MULTIPLIER: f64 = 562.5;

pub fn progression_scenarios() -> Vec<SimulationScenario> {
    vec![
        SimulationScenario::new(
            "full-progression",
            "Full Progression",
            "Seeded player unlocks the whole tree with invariants checked every step",
            SimulationPlan::new(GameplayStrategy::Balanced)
                .with_expectation(full_progression_expectation),
        ),
        SimulationScenario::new(
            "deterministic-replay",
            "Deterministic Replay",
            "Two runs with the same seed end on the same snapshot fingerprint",
            SimulationPlan::new(GameplayStrategy::Chaotic)
                .with_max_steps(REPLAY_STEPS)
                .with_expectation(deterministic_replay_expectation),
        ),
    ]
}

fn close_to(actual: f64, expected: f64) -> bool {
    (actual - expected).abs() <= expected.abs() * 1e-9
}

fn full_progression_expectation(summary: &SimulationSummary) -> Result<()> {
    let state = &summary.final_state;
    ensure!(
        summary.completed,
        "Tree not finished after {} steps ({} nodes unlocked)",
        summary.steps,
        state.unlocked_count()
    );
    ensure!(
        close_to(state.click_power, FULL_CLICK_POWER),
        "Final click power {} (expected {FULL_CLICK_POWER})",
        state.click_power
    );
    ensure!(
        close_to(state.passive_income_per_second, FULL_PASSIVE_INCOME),
        "Final passive income {} (expected {FULL_PASSIVE_INCOME})",
        state.passive_income_per_second
    );
    ensure!(
        close_to(state.global_multiplier, FULL_MULTIPLIER),
        "Final multiplier {} (expected {FULL_MULTIPLIER})",
        state.global_multiplier
    );
    ensure!(
        state.total_labour_earned >= state.labour_units,
        "Lifetime earnings {} below balance {}",
        state.total_labour_earned,
        state.labour_units
    );
    ensure!(
        summary.metrics.simulated_seconds > 0.0,
        "No simulated time passed"
    );
    Ok(())
}

fn deterministic_replay_expectation(summary: &SimulationSummary) -> Result<()> {
    let tester = GameTester::try_new(false).context("building replay tester")?;
    let plan = SimulationPlan::new(summary.strategy).with_max_steps(summary.steps);
    let replay = tester.run_plan(&plan, summary.seed);

    ensure!(
        replay.steps == summary.steps,
        "Replay took {} steps, original {}",
        replay.steps,
        summary.steps
    );
    ensure!(
        replay.fingerprint == summary.fingerprint,
        "Replay fingerprint {:016x} differs from {:016x}",
        replay.fingerprint,
        summary.fingerprint
    );
    ensure!(
        replay.metrics.clicks == summary.metrics.clicks
            && replay.metrics.rejected_unlocks == summary.metrics.rejected_unlocks,
        "Replay made different choices"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario(key: &str) -> SimulationScenario {
        progression_scenarios()
            .into_iter()
            .find(|scenario| scenario.key() == key)
            .unwrap()
    }

    #[test]
    fn full_progression_passes() {
        let scenario = scenario("full-progression");
        let summary = GameTester::try_new(false)
            .unwrap()
            .run_plan(scenario.plan(), 1337);
        full_progression_expectation(&summary).unwrap();
    }

    #[test]
    fn replay_matches_and_detects_tampering() {
        let scenario = scenario("deterministic-replay");
        let mut summary = GameTester::try_new(false)
            .unwrap()
            .run_plan(scenario.plan(), 77);
        deterministic_replay_expectation(&summary).unwrap();

        summary.fingerprint ^= 1;
        let err = deterministic_replay_expectation(&summary).unwrap_err();
        assert!(err.to_string().contains("fingerprint"));
    }

    #[test]
    fn incomplete_run_fails_full_progression() {
        let summary = GameTester::try_new(false).unwrap().run_plan(
            &SimulationPlan::new(GameplayStrategy::Greedy).with_max_steps(50),
            1,
        );
        let err = full_progression_expectation(&summary).unwrap_err();
        assert!(err.to_string().contains("Tree not finished"));
    }
}
