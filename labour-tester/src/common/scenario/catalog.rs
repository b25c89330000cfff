use anyhow::{Context, Result, ensure};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use std::sync::Arc;
use std::time::Duration;

use crate::common::scenario::SimulationScenario;
use crate::logic::game_tester::SimulationSummary;
use crate::logic::simulation::SIMULATION_EPOCH_MS;
use crate::logic::{GameplayStrategy, SimulationPlan};
use labour_game::constants::STORAGE_KEY;
use labour_game::numbers::i64_to_f64;
use labour_game::{
    Benefit, Clock, EngineConfig, FileStore, GameState, ManualClock, MemoryStore, NodeCatalog,
    NodeDefinition, PersistenceGateway, ProgressionStore, UnlockError, apply_offline_progress,
    session_from_state,
};

pub fn catalog_scenarios() -> Vec<SimulationScenario> {
    vec![
        SimulationScenario::new(
            "click-accrual",
            "Click Accrual",
            "Each click adds click power times multiplier and nothing else",
            base_plan().with_expectation(click_accrual_expectation),
        ),
        SimulationScenario::new(
            "unlock-gating",
            "Unlock Gating",
            "Funds, prerequisites and repeats are refused without side effects",
            base_plan().with_expectation(unlock_gating_expectation),
        ),
        SimulationScenario::new(
            "multiplier-compounding",
            "Multiplier Compounding",
            "Multiplier nodes compose multiplicatively",
            base_plan().with_expectation(multiplier_compounding_expectation),
        ),
        SimulationScenario::new(
            "offline-catch-up",
            "Offline Catch-up",
            "Loading credits passive income for the time away",
            base_plan().with_expectation(offline_catch_up_expectation),
        ),
        SimulationScenario::new(
            "save-round-trip",
            "Save Round Trip",
            "A file snapshot reloads with identical progress",
            played_plan().with_expectation(save_round_trip_expectation),
        ),
        SimulationScenario::new(
            "debounce-coalescing",
            "Debounce Coalescing",
            "A burst of changes produces exactly one save",
            base_plan().with_expectation(debounce_coalescing_expectation),
        ),
        SimulationScenario::new(
            "reset",
            "Reset",
            "Reset restores the initial state and erases the snapshot",
            played_plan().with_expectation(reset_expectation),
        ),
    ]
}

fn base_plan() -> SimulationPlan {
    SimulationPlan::new(GameplayStrategy::Greedy).with_max_steps(0)
}

/// Enough greedy play to own a few nodes and some passive income.
fn played_plan() -> SimulationPlan {
    SimulationPlan::new(GameplayStrategy::Greedy).with_max_steps(400)
}

fn rng_for(summary: &SimulationSummary) -> ChaCha20Rng {
    ChaCha20Rng::seed_from_u64(summary.seed)
}

fn bundled_catalog() -> Result<Arc<NodeCatalog>> {
    Ok(Arc::new(
        NodeCatalog::load_from_static().context("loading bundled node catalog")?,
    ))
}

/// Ids that must be owned before `id` can be bought, root first.
fn prerequisite_chain(catalog: &NodeCatalog, id: &str) -> Vec<String> {
    let mut chain = Vec::new();
    let mut cursor = catalog.get(id).and_then(|node| node.prerequisite.clone());
    while let Some(prerequisite) = cursor {
        cursor = catalog
            .get(&prerequisite)
            .and_then(|node| node.prerequisite.clone());
        chain.push(prerequisite);
    }
    chain.reverse();
    chain
}

/// A random node that costs something.
fn random_priced_node<'a>(
    catalog: &'a NodeCatalog,
    rng: &mut ChaCha20Rng,
) -> Result<&'a NodeDefinition> {
    let priced: Vec<&NodeDefinition> = catalog.iter().filter(|node| node.cost > 0.0).collect();
    ensure!(!priced.is_empty(), "catalog has no priced nodes");
    Ok(priced[rng.gen_range(0..priced.len())])
}

fn click_accrual_expectation(summary: &SimulationSummary) -> Result<()> {
    let mut rng = rng_for(summary);
    let mut state = GameState::initial(SIMULATION_EPOCH_MS);
    state.click_power = rng.gen_range(1.0..50.0);
    state.global_multiplier = rng.gen_range(1.0..10.0);
    let expected_gain = state.click_power * state.global_multiplier;
    let mut store = ProgressionStore::new(bundled_catalog()?, state);

    let clicks: u32 = rng.gen_range(1..=40);
    for click in 1..=clicks {
        let before = store.state().clone();
        let gain = store.perform_labour();
        let after = store.state();

        ensure!(
            gain.to_bits() == expected_gain.to_bits(),
            "Click {click} gained {gain}, expected {expected_gain}"
        );
        ensure!(
            after.labour_units.to_bits() == (before.labour_units + expected_gain).to_bits(),
            "Click {click} moved balance from {} to {}",
            before.labour_units,
            after.labour_units
        );
        ensure!(
            after.total_labour_earned.to_bits()
                == (before.total_labour_earned + expected_gain).to_bits(),
            "Click {click} moved lifetime earnings from {} to {}",
            before.total_labour_earned,
            after.total_labour_earned
        );
        let untouched = GameState {
            labour_units: after.labour_units,
            total_labour_earned: after.total_labour_earned,
            ..before
        };
        ensure!(
            &untouched == after,
            "Click {click} changed more than the balance"
        );
    }
    Ok(())
}

fn unlock_gating_expectation(summary: &SimulationSummary) -> Result<()> {
    let mut rng = rng_for(summary);
    let catalog = bundled_catalog()?;

    // Prerequisites owned, funds short.
    let node = random_priced_node(&catalog, &mut rng)?;
    let mut state = GameState::initial(SIMULATION_EPOCH_MS);
    state.unlocked_nodes = prerequisite_chain(&catalog, &node.id);
    state.labour_units = rng.gen_range(0.0..node.cost);
    state.total_labour_earned = state.labour_units;
    let mut store = ProgressionStore::new(Arc::clone(&catalog), state.clone());
    let err = store
        .unlock_node(&node.id)
        .err()
        .with_context(|| format!("{} unlocked with only {}", node.id, state.labour_units))?;
    ensure!(
        matches!(err, UnlockError::InsufficientFunds { .. }),
        "Expected InsufficientFunds for {}, got {err}",
        node.id
    );
    ensure!(store.state() == &state, "Refused unlock mutated state");

    // Funds plenty, prerequisite missing.
    let gated: Vec<&NodeDefinition> = catalog
        .iter()
        .filter(|node| node.prerequisite.is_some())
        .collect();
    if !gated.is_empty() {
        let node = gated[rng.gen_range(0..gated.len())];
        let mut state = GameState::initial(SIMULATION_EPOCH_MS);
        state.labour_units = node.cost * 10.0 + 1.0;
        state.total_labour_earned = state.labour_units;
        let mut store = ProgressionStore::new(Arc::clone(&catalog), state.clone());
        let err = store
            .unlock_node(&node.id)
            .err()
            .with_context(|| format!("{} unlocked without its prerequisite", node.id))?;
        ensure!(
            matches!(err, UnlockError::PrerequisiteNotMet { .. }),
            "Expected PrerequisiteNotMet for {}, got {err}",
            node.id
        );
        ensure!(store.state() == &state, "Refused unlock mutated state");
    }

    // Buying twice charges once.
    let root = catalog
        .iter()
        .find(|node| node.prerequisite.is_none())
        .context("catalog has no root node")?;
    let mut state = GameState::initial(SIMULATION_EPOCH_MS);
    state.labour_units = root.cost * 3.0 + 1.0;
    state.total_labour_earned = state.labour_units;
    let mut store = ProgressionStore::new(Arc::clone(&catalog), state.clone());
    store
        .unlock_node(&root.id)
        .with_context(|| format!("first purchase of {} failed", root.id))?;
    let after_first = store.state().clone();
    let err = store
        .unlock_node(&root.id)
        .err()
        .with_context(|| format!("{} was bought twice", root.id))?;
    ensure!(
        matches!(err, UnlockError::AlreadyUnlocked(_)),
        "Expected AlreadyUnlocked for {}, got {err}",
        root.id
    );
    ensure!(
        store.state() == &after_first,
        "Second purchase changed the state"
    );
    ensure!(
        (store.state().labour_units - (state.labour_units - root.cost)).abs() < 1e-9,
        "Balance {} after one purchase of {} from {}",
        store.state().labour_units,
        root.cost,
        state.labour_units
    );

    let err = store.unlock_node("no-such-node").err();
    ensure!(
        matches!(err, Some(UnlockError::UnknownNode(_))),
        "Unknown node was not refused"
    );
    Ok(())
}

fn multiplier_compounding_expectation(summary: &SimulationSummary) -> Result<()> {
    let mut rng = rng_for(summary);
    let factors: Vec<f64> = (0..rng.gen_range(2..=6))
        .map(|_| rng.gen_range(1.05..4.0))
        .collect();
    let nodes = factors
        .iter()
        .enumerate()
        .map(|(index, factor)| NodeDefinition {
            id: format!("factor-{index}"),
            title: format!("Factor {index}"),
            description: format!("x{factor}"),
            cost: 0.0,
            benefit: Benefit::Multiplier(*factor),
            flavor_text: None,
            prerequisite: index.checked_sub(1).map(|prev| format!("factor-{prev}")),
        })
        .collect();
    let catalog = Arc::new(NodeCatalog::from_nodes(nodes).context("building factor chain")?);
    let mut store = ProgressionStore::new(catalog, GameState::initial(SIMULATION_EPOCH_MS));

    let mut expected = 1.0;
    for (index, factor) in factors.iter().enumerate() {
        store
            .unlock_node(&format!("factor-{index}"))
            .with_context(|| format!("unlocking factor-{index}"))?;
        expected *= factor;
        let actual = store.state().global_multiplier;
        ensure!(
            (actual - expected).abs() <= expected * 1e-12,
            "After {} factors multiplier is {actual}, expected {expected}",
            index + 1
        );
    }
    Ok(())
}

fn offline_catch_up_expectation(summary: &SimulationSummary) -> Result<()> {
    let mut fixed = GameState::initial(1_000_000);
    fixed.passive_income_per_second = 5.0;
    fixed.global_multiplier = 2.0;
    let progress = apply_offline_progress(&mut fixed, 1_010_000);
    ensure!(
        (progress.gain - 100.0).abs() < 1e-9,
        "10s at 5/s x2 gave {}",
        progress.gain
    );
    ensure!(
        fixed.last_save_time == 1_010_000,
        "Offline clock not moved to load time"
    );

    let mut rng = rng_for(summary);
    let rate = rng.gen_range(0.5..50.0);
    let multiplier = rng.gen_range(1.0..20.0);
    let gap_ms: i64 = rng.gen_range(0..86_400_000);

    let mut state = GameState::initial(SIMULATION_EPOCH_MS);
    state.passive_income_per_second = rate;
    state.global_multiplier = multiplier;
    let before = state.labour_units;
    let now = SIMULATION_EPOCH_MS + gap_ms;
    let progress = apply_offline_progress(&mut state, now);
    let expected = rate * multiplier * (i64_to_f64(gap_ms) / 1_000.0);
    ensure!(
        (progress.gain - expected).abs() <= expected.abs() * 1e-12 + 1e-9,
        "{gap_ms}ms at {rate}/s x{multiplier} gave {}, expected {expected}",
        progress.gain
    );
    ensure!(
        (state.labour_units - before - expected).abs() <= expected.abs() * 1e-12 + 1e-9,
        "Balance not credited with offline gain"
    );
    ensure!(state.last_save_time == now, "Offline clock not moved to load time");

    let mut backwards = GameState::initial(SIMULATION_EPOCH_MS);
    backwards.passive_income_per_second = rate;
    let progress = apply_offline_progress(&mut backwards, SIMULATION_EPOCH_MS - gap_ms);
    ensure!(
        progress.gain.abs() < f64::EPSILON,
        "Clock moving backwards granted {}",
        progress.gain
    );
    Ok(())
}

fn save_round_trip_expectation(summary: &SimulationSummary) -> Result<()> {
    let dir = summary.workspace.join("save-round-trip");
    let outcome = save_round_trip(summary, &dir);
    if let Err(err) = std::fs::remove_dir_all(&dir) {
        log::debug!("could not remove {}: {err}", dir.display());
    }
    outcome
}

fn save_round_trip(summary: &SimulationSummary, dir: &std::path::Path) -> Result<()> {
    let gateway = PersistenceGateway::new(FileStore::new(dir), STORAGE_KEY);
    let state = &summary.final_state;
    let saved_at = state.last_save_time + 42_000;

    gateway.save(state, saved_at).context("saving snapshot")?;
    let loaded = gateway
        .load()
        .context("loading snapshot")?
        .context("snapshot missing right after save")?;
    ensure!(
        loaded.same_progress(state),
        "Reloaded snapshot differs: {} units / {} nodes vs {} units / {} nodes",
        loaded.labour_units,
        loaded.unlocked_count(),
        state.labour_units,
        state.unlocked_count()
    );
    ensure!(
        loaded.last_save_time == saved_at,
        "Snapshot stamped {} instead of {saved_at}",
        loaded.last_save_time
    );

    gateway.erase().context("erasing snapshot")?;
    ensure!(
        gateway.load().context("loading after erase")?.is_none(),
        "Snapshot survived erase"
    );
    Ok(())
}

fn debounce_coalescing_expectation(summary: &SimulationSummary) -> Result<()> {
    let mut rng = rng_for(summary);
    let config = EngineConfig::default_config();
    let window = config.save_debounce();
    let store = MemoryStore::new();
    let clock = ManualClock::starting_at(SIMULATION_EPOCH_MS);
    let mut session = session_from_state(
        bundled_catalog()?,
        GameState::initial(clock.now_millis()),
        PersistenceGateway::new(store.clone(), STORAGE_KEY),
        clock.clone(),
        &config,
    );

    let window_ms = u64::try_from(window.as_millis()).unwrap_or(u64::MAX);
    let clicks: u32 = rng.gen_range(2..=25);
    for _ in 0..clicks {
        session.perform_labour();
        let gap = Duration::from_millis(rng.gen_range(10..window_ms.max(11)));
        clock.advance(gap);
        session.advance(gap);
    }
    ensure!(
        store.write_count() == 0,
        "{} saves during a burst of {clicks} clicks",
        store.write_count()
    );

    clock.advance(window);
    session.advance(window);
    ensure!(
        store.write_count() == 1,
        "Expected exactly one save after the burst, got {}",
        store.write_count()
    );

    let saved = PersistenceGateway::new(store.clone(), STORAGE_KEY)
        .load()
        .context("loading coalesced snapshot")?
        .context("no snapshot after the burst")?;
    ensure!(
        saved.same_progress(session.state()),
        "Saved {} units, session holds {}",
        saved.labour_units,
        session.state().labour_units
    );
    ensure!(
        (saved.labour_units - f64::from(clicks)).abs() < 1e-9,
        "Saved {} units after {clicks} clicks",
        saved.labour_units
    );

    session.advance(window * 4);
    ensure!(
        store.write_count() == 1,
        "Idle session kept saving ({} writes)",
        store.write_count()
    );
    Ok(())
}

fn reset_expectation(summary: &SimulationSummary) -> Result<()> {
    let config = EngineConfig::default_config();
    let store = MemoryStore::new();
    let clock = ManualClock::starting_at(summary.final_state.last_save_time);
    let mut session = session_from_state(
        bundled_catalog()?,
        summary.final_state.clone(),
        PersistenceGateway::new(store.clone(), STORAGE_KEY),
        clock.clone(),
        &config,
    );

    session.perform_labour();
    clock.advance(config.save_debounce());
    session.advance(config.save_debounce());
    ensure!(store.write_count() == 1, "Progress was not saved before reset");

    session.perform_labour();
    session.reset_game();
    ensure!(
        session.state() == &GameState::initial(clock.now_millis()),
        "Reset left progress behind: {} units, {} nodes",
        session.state().labour_units,
        session.state().unlocked_count()
    );
    ensure!(
        store.raw(STORAGE_KEY).is_none(),
        "Snapshot still stored after reset"
    );

    let later = config.save_debounce() * 3;
    clock.advance(later);
    session.advance(later);
    ensure!(
        store.raw(STORAGE_KEY).is_none() && store.write_count() == 1,
        "Reset state was saved without any new change"
    );
    Ok(())
}
