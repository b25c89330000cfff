use anyhow::{Context, Result, ensure};
use std::time::Duration;

use crate::common::scenario::SimulationScenario;
use crate::logic::game_tester::SimulationSummary;
use crate::logic::{GameplayStrategy, SimulationPlan};
use labour_game::{
    EngineConfig, GameEngine, GameState, MemoryStore, NodeCatalog, PersistenceGateway,
    SystemClock, runtime,
};

const LIVE_DEBOUNCE_MS: u64 = 50;
const LIVE_TICK_MS: u64 = 20;

pub fn live_session_scenario() -> SimulationScenario {
    SimulationScenario::new(
        "live-session",
        "Live Session",
        "Drives the tokio session task: clicks, an unlock, a debounced save, shutdown",
        SimulationPlan::new(GameplayStrategy::Greedy)
            .with_max_steps(0)
            .with_expectation(live_session_expectation),
    )
}

/// What the live driver observed.
#[derive(Debug)]
struct LiveReport {
    final_state: GameState,
    saved: Option<GameState>,
    writes: usize,
}

fn live_config() -> EngineConfig {
    EngineConfig {
        save_debounce_ms: LIVE_DEBOUNCE_MS,
        tick_interval_ms: LIVE_TICK_MS,
        ..EngineConfig::default_config()
    }
}

fn live_session_expectation(_summary: &SimulationSummary) -> Result<()> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .context("building live session runtime")?;
    let report = rt.block_on(drive_session(live_config()))?;

    let saved = report
        .saved
        .context("live session never wrote a snapshot")?;
    ensure!(report.writes >= 1, "No writes recorded");
    ensure!(
        saved.same_progress(&report.final_state),
        "Saved snapshot ({} units, {:?}) differs from the final state ({} units, {:?})",
        saved.labour_units,
        saved.unlocked_nodes,
        report.final_state.labour_units,
        report.final_state.unlocked_nodes
    );
    Ok(())
}

async fn drive_session(config: EngineConfig) -> Result<LiveReport> {
    let store = MemoryStore::new();
    let catalog = NodeCatalog::load_from_static().context("loading bundled node catalog")?;
    let storage_key = config.storage_key.clone();
    let settle = Duration::from_millis(config.save_debounce_ms * 4);
    let engine = GameEngine::new(catalog, store.clone(), SystemClock, config)
        .context("building live engine")?;
    let (handle, task) = runtime::spawn(engine);

    for _ in 0..10 {
        handle.perform_labour().await?;
    }
    let state = handle.snapshot().await?;
    ensure!(
        (state.labour_units - 10.0).abs() < 1e-9,
        "10 clicks gave {} units",
        state.labour_units
    );

    let root = handle
        .catalog()
        .iter()
        .find(|node| node.prerequisite.is_none())
        .map(|node| node.id.clone())
        .context("catalog has no root node")?;
    let receipt = handle.unlock_node(root).await??;
    let state = handle.snapshot().await?;
    ensure!(
        (state.labour_units - (10.0 - receipt.cost)).abs() < 1e-9,
        "Unlock left {} units",
        state.labour_units
    );

    let gain = handle.perform_labour().await?;
    ensure!(
        (gain - state.effective_click_yield()).abs() < 1e-9,
        "Click after unlock gave {gain}"
    );

    tokio::time::sleep(settle).await;
    ensure!(
        !handle.flush().await?,
        "Save still pending {settle:?} after the last change"
    );

    handle.shutdown().await?;
    let final_state = task.await.context("live session task failed")?;
    let saved = PersistenceGateway::new(store.clone(), storage_key)
        .load()
        .context("reading live snapshot")?;

    Ok(LiveReport {
        final_state,
        saved,
        writes: store.write_count(),
    })
}
