use anyhow::{Context, Result, ensure};
use std::sync::Arc;

use super::SimulationScenario;
use crate::logic::game_tester::SimulationSummary;
use crate::logic::simulation::SIMULATION_EPOCH_MS;
use crate::logic::{GameplayStrategy, SimulationPlan};
use labour_game::constants::STORAGE_KEY;
use labour_game::{
    Benefit, EngineConfig, GameState, ManualClock, MemoryStore, NodeCatalog, PersistenceGateway,
    session_from_state,
};

const SMOKE_STEPS: usize = 200;
const OPENING_CLICKS: u32 = 10;

pub fn smoke_scenario() -> SimulationScenario {
    SimulationScenario::new(
        "smoke",
        "Smoke Test",
        "Opening moves by hand, then a short greedy run with a matching saved snapshot",
        plan(),
    )
}

fn plan() -> SimulationPlan {
    SimulationPlan::new(GameplayStrategy::Greedy)
        .with_max_steps(SMOKE_STEPS)
        .with_expectation(opening_moves_expectation)
        .with_expectation(smoke_expectation)
}

/// Ten clicks, buy the root node, click once more.
fn opening_moves_expectation(_summary: &SimulationSummary) -> Result<()> {
    let catalog = Arc::new(
        NodeCatalog::load_from_static().context("loading bundled node catalog")?,
    );
    let root = catalog
        .iter()
        .find(|node| node.prerequisite.is_none())
        .context("catalog has no root node")?
        .clone();
    ensure!(
        root.benefit == Benefit::ClickBonus(1.0),
        "Root node '{}' should grant +1 click power, grants {:?}",
        root.id,
        root.benefit
    );

    let store = MemoryStore::new();
    let clock = ManualClock::starting_at(SIMULATION_EPOCH_MS);
    let mut session = session_from_state(
        catalog,
        GameState::initial(SIMULATION_EPOCH_MS),
        PersistenceGateway::new(store.clone(), STORAGE_KEY),
        clock,
        &EngineConfig::default_config(),
    );

    for _ in 0..OPENING_CLICKS {
        session.perform_labour();
    }
    let balance = session.state().labour_units;
    ensure!(
        (balance - f64::from(OPENING_CLICKS)).abs() < 1e-9,
        "{OPENING_CLICKS} clicks gave {balance} units"
    );

    let receipt = session
        .unlock_node(&root.id)
        .with_context(|| format!("buying '{}' with {balance} units", root.id))?;
    let state = session.state();
    ensure!(
        (receipt.cost - f64::from(OPENING_CLICKS)).abs() < 1e-9,
        "Root node cost {}",
        receipt.cost
    );
    ensure!(
        state.labour_units.abs() < 1e-9,
        "Balance after purchase is {}",
        state.labour_units
    );
    ensure!(
        (state.click_power - 2.0).abs() < 1e-9,
        "Click power after purchase is {}",
        state.click_power
    );

    let gain = session.perform_labour();
    ensure!((gain - 2.0).abs() < 1e-9, "Upgraded click gave {gain}");

    let final_state = session.close();
    ensure!(
        (final_state.labour_units - 2.0).abs() < 1e-9,
        "Final balance is {}",
        final_state.labour_units
    );
    let saved = PersistenceGateway::new(store, STORAGE_KEY)
        .load()
        .context("reading opening snapshot")?
        .context("closing the session wrote no snapshot")?;
    ensure!(
        saved.same_progress(&final_state),
        "Opening snapshot differs from the closed session"
    );
    Ok(())
}

fn smoke_expectation(summary: &SimulationSummary) -> Result<()> {
    let state = &summary.final_state;

    ensure!(
        summary.metrics.clicks > 0,
        "Expected at least one click, got none"
    );
    ensure!(
        summary.metrics.unlocks >= 1,
        "Expected at least one unlock in {} steps",
        summary.steps
    );
    ensure!(
        state.labour_units >= 0.0,
        "Balance should be >= 0, got {}",
        state.labour_units
    );
    ensure!(
        state.click_power >= 1.0,
        "Click power should be >= 1, got {}",
        state.click_power
    );

    let Some(saved) = &summary.saved_snapshot else {
        anyhow::bail!("No snapshot was saved");
    };
    ensure!(
        saved.same_progress(state),
        "Saved snapshot diverges from final state: saved {} units / {} nodes, final {} units / {} nodes",
        saved.labour_units,
        saved.unlocked_count(),
        state.labour_units,
        state.unlocked_count()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::GameTester;

    #[test]
    fn smoke_plan_is_short_greedy_run() {
        let plan = plan();
        assert_eq!(plan.strategy, GameplayStrategy::Greedy);
        assert_eq!(plan.max_steps, Some(SMOKE_STEPS));
        assert_eq!(plan.expectations.len(), 2);
    }

    #[test]
    fn opening_moves_reach_two_units_and_two_click_power() {
        let tester = GameTester::try_new(false).unwrap();
        let summary = tester.run_plan(&plan(), 1);
        opening_moves_expectation(&summary).unwrap();
    }

    #[test]
    fn smoke_passes_on_a_real_run() {
        let tester = GameTester::try_new(false).unwrap();
        let summary = tester.run_plan(&plan(), 1337);
        smoke_expectation(&summary).unwrap();
    }

    #[test]
    fn smoke_rejects_missing_snapshot() {
        let tester = GameTester::try_new(false).unwrap();
        let mut summary = tester.run_plan(&plan(), 5);
        summary.saved_snapshot = None;
        let err = smoke_expectation(&summary).unwrap_err();
        assert!(err.to_string().contains("No snapshot"));
    }

    #[test]
    fn smoke_rejects_stale_snapshot() {
        let tester = GameTester::try_new(false).unwrap();
        let mut summary = tester.run_plan(&plan(), 5);
        if let Some(saved) = summary.saved_snapshot.as_mut() {
            saved.labour_units += 1.0;
        }
        let err = smoke_expectation(&summary).unwrap_err();
        assert!(err.to_string().contains("diverges"));
    }
}
