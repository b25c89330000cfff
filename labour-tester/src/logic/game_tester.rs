use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;
use std::hash::Hasher;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use twox_hash::XxHash64;

use labour_game::constants::STORAGE_KEY;
use labour_game::{GameState, MemoryStore, NodeCatalog, PersistenceGateway, format_abbreviated};

use crate::logic::policy::{GameplayStrategy, PlayerAction};
use crate::logic::simulation::{SimulationConfig, SimulationSession, TurnOutcome};

pub const DEFAULT_MAX_STEPS: usize = 50_000;

/// A purchase made during a simulated run.
#[derive(Debug, Clone, Serialize)]
pub struct UnlockRecord {
    pub step: usize,
    pub node_id: String,
    pub simulated_seconds: f64,
    pub policy_name: String,
    pub rationale: Option<String>,
}

/// Counters collected while a policy plays.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProgressionMetrics {
    pub clicks: usize,
    pub unlocks: usize,
    pub rejected_unlocks: usize,
    pub waits: usize,
    pub ticks: u64,
    pub saves: u64,
    pub simulated_seconds: f64,
    pub lifetime_earned: f64,
    pub unlock_log: Vec<UnlockRecord>,
}

impl ProgressionMetrics {
    fn record_turn(&mut self, turn: &TurnOutcome) {
        match turn.action {
            PlayerAction::Labour => self.clicks += 1,
            PlayerAction::Unlock(_) => {}
            PlayerAction::Wait(_) => self.waits += 1,
        }
        if turn.rejected.is_some() {
            self.rejected_unlocks += 1;
        }
        self.ticks += u64::from(turn.ticks);
        self.saves += u64::from(turn.saves);
        self.simulated_seconds += turn.elapsed.as_secs_f64();
        if let Some(node_id) = &turn.unlocked {
            self.unlocks += 1;
            self.unlock_log.push(UnlockRecord {
                step: turn.step,
                node_id: node_id.clone(),
                simulated_seconds: self.simulated_seconds,
                policy_name: turn.policy_name.to_string(),
                rationale: turn.rationale.clone(),
            });
        }
    }
}

/// Outcome of one simulated run.
#[derive(Debug, Clone)]
pub struct SimulationSummary {
    pub seed: u64,
    pub strategy: GameplayStrategy,
    pub steps: usize,
    pub completed: bool,
    pub halted: Option<String>,
    pub final_state: GameState,
    pub saved_snapshot: Option<GameState>,
    pub fingerprint: u64,
    pub metrics: ProgressionMetrics,
    /// Scratch directory for checks that touch the filesystem.
    pub workspace: PathBuf,
}

/// Assertion hook run after a simulation completes.
type SimulationExpectationFn =
    Arc<dyn Fn(&SimulationSummary) -> Result<()> + Send + Sync + 'static>;

#[derive(Clone)]
pub struct SimulationExpectation(SimulationExpectationFn);

impl std::fmt::Debug for SimulationExpectation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationExpectation").finish()
    }
}

impl SimulationExpectation {
    /// # Errors
    ///
    /// Returns the expectation's failure.
    pub fn evaluate(&self, summary: &SimulationSummary) -> Result<()> {
        (self.0)(summary)
    }
}

impl<F> From<F> for SimulationExpectation
where
    F: Fn(&SimulationSummary) -> Result<()> + Send + Sync + 'static,
{
    fn from(f: F) -> Self {
        Self(Arc::new(f))
    }
}

#[derive(Debug, Clone)]
pub struct SimulationPlan {
    pub strategy: GameplayStrategy,
    pub max_steps: Option<usize>,
    pub expectations: Vec<SimulationExpectation>,
}

impl SimulationPlan {
    #[must_use]
    pub fn new(strategy: GameplayStrategy) -> Self {
        Self {
            strategy,
            max_steps: None,
            expectations: Vec::new(),
        }
    }

    #[must_use]
    pub const fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = Some(max_steps);
        self
    }

    #[must_use]
    pub fn with_expectation(mut self, expectation: impl Into<SimulationExpectation>) -> Self {
        self.expectations.push(expectation.into());
        self
    }
}

/// xxhash64 of the snapshot JSON, used to compare runs.
#[must_use]
pub fn snapshot_fingerprint(state: &GameState) -> u64 {
    let encoded = serde_json::to_vec(state).unwrap_or_default();
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(&encoded);
    hasher.finish()
}

#[derive(Clone)]
pub struct GameTester {
    catalog: Arc<NodeCatalog>,
    workspace_root: PathBuf,
    verbose: bool,
}

impl GameTester {
    #[must_use]
    pub fn new(catalog: Arc<NodeCatalog>, workspace_root: PathBuf, verbose: bool) -> Self {
        Self {
            catalog,
            workspace_root,
            verbose,
        }
    }

    /// Tester over the bundled catalog with scratch space under the system
    /// temp directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the bundled catalog fails validation.
    pub fn try_new(verbose: bool) -> Result<Self> {
        let catalog = NodeCatalog::load_from_static().context("loading bundled node catalog")?;
        Ok(Self::new(
            Arc::new(catalog),
            std::env::temp_dir().join("labour-tester"),
            verbose,
        ))
    }

    /// Same tester, scratch space moved under `root`.
    #[must_use]
    pub fn with_workspace_root(&self, root: PathBuf) -> Self {
        Self {
            workspace_root: root,
            ..self.clone()
        }
    }

    #[must_use]
    pub const fn verbose(&self) -> bool {
        self.verbose
    }

    pub fn run_plan(&self, plan: &SimulationPlan, seed: u64) -> SimulationSummary {
        let max_steps = plan.max_steps.unwrap_or(DEFAULT_MAX_STEPS);
        let mut session =
            SimulationSession::new(SimulationConfig::new(max_steps), Arc::clone(&self.catalog));
        let mut policy = plan.strategy.create_policy(seed);
        let mut metrics = ProgressionMetrics::default();
        let mut halted = None;

        if self.verbose {
            println!(
                "  {} seed {} strategy {} (cap {} steps)",
                "▶".cyan(),
                seed,
                plan.strategy,
                max_steps
            );
        }

        while !session.is_finished() {
            match session.advance(policy.as_mut()) {
                Ok(turn) => {
                    if let Some(node_id) = &turn.unlocked {
                        log::debug!("step {}: unlocked {node_id}", turn.step);
                    }
                    metrics.record_turn(&turn);
                }
                Err(violation) => {
                    halted = Some(violation.to_string());
                    break;
                }
            }
        }

        let steps = session.step();
        let completed = session.is_complete();
        let (final_state, store) = session.finish();
        metrics.lifetime_earned = final_state.total_labour_earned;
        let saved_snapshot = load_snapshot(&store);

        if self.verbose {
            println!(
                "  {} steps {} unlocked {}/{} earned {} in {:?}",
                if completed { "✓".green() } else { "…".yellow() },
                steps,
                final_state.unlocked_count(),
                self.catalog.len(),
                format_abbreviated(final_state.total_labour_earned),
                Duration::from_secs_f64(metrics.simulated_seconds),
            );
        }

        SimulationSummary {
            seed,
            strategy: plan.strategy,
            steps,
            completed,
            halted,
            fingerprint: snapshot_fingerprint(&final_state),
            final_state,
            saved_snapshot,
            metrics,
            workspace: self.workspace_root.join(format!("seed-{seed}")),
        }
    }
}

fn load_snapshot(store: &MemoryStore) -> Option<GameState> {
    match PersistenceGateway::new(store.clone(), STORAGE_KEY).load() {
        Ok(snapshot) => snapshot,
        Err(err) => {
            log::warn!("simulation snapshot unreadable: {err}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replays_are_identical() {
        let tester = GameTester::try_new(false).unwrap();
        let plan = SimulationPlan::new(GameplayStrategy::Chaotic).with_max_steps(2_000);
        let first = tester.run_plan(&plan, 42);
        let second = tester.run_plan(&plan, 42);
        assert_eq!(first.fingerprint, second.fingerprint);
        assert_eq!(first.metrics.clicks, second.metrics.clicks);
        assert_eq!(first.steps, 2_000);
    }

    #[test]
    fn different_seeds_diverge() {
        let tester = GameTester::try_new(false).unwrap();
        let plan = SimulationPlan::new(GameplayStrategy::Chaotic).with_max_steps(500);
        let first = tester.run_plan(&plan, 1);
        let second = tester.run_plan(&plan, 2);
        assert_ne!(first.fingerprint, second.fingerprint);
    }

    #[test]
    fn greedy_run_completes_and_is_saved() {
        let tester = GameTester::try_new(false).unwrap();
        let summary = tester.run_plan(&SimulationPlan::new(GameplayStrategy::Greedy), 3);
        assert!(summary.completed);
        assert!(summary.halted.is_none());
        assert_eq!(summary.metrics.unlocks, 12);
        assert_eq!(summary.metrics.unlock_log.len(), 12);
        let saved = summary.saved_snapshot.unwrap();
        assert_eq!(saved.unlocked_nodes, summary.final_state.unlocked_nodes);
    }

    #[test]
    fn zero_step_plan_returns_initial_state() {
        let tester = GameTester::try_new(false).unwrap();
        let summary = tester.run_plan(
            &SimulationPlan::new(GameplayStrategy::Greedy).with_max_steps(0),
            9,
        );
        assert_eq!(summary.steps, 0);
        assert!(summary.saved_snapshot.is_none());
        assert!(summary.final_state.labour_units.abs() < f64::EPSILON);
    }
}
