use std::sync::Arc;
use std::time::Duration;

use labour_game::constants::STORAGE_KEY;
use labour_game::{
    EngineConfig, GameSession, GameState, ManualClock, MemoryStore, NodeCatalog,
    PersistenceGateway, UnlockError, session_from_state,
};
use thiserror::Error;

use crate::logic::policy::{PlayerAction, PlayerPolicy};

/// Wall-clock start of every simulated run, so replays are byte-identical.
pub const SIMULATION_EPOCH_MS: i64 = 1_700_000_000_000;

/// Simulated time one click or purchase takes.
pub const ACTION_DURATION: Duration = Duration::from_millis(250);

/// Configuration for a simulation session.
#[derive(Debug, Clone, Copy)]
pub struct SimulationConfig {
    pub max_steps: usize,
}

impl SimulationConfig {
    #[must_use]
    pub const fn new(max_steps: usize) -> Self {
        Self { max_steps }
    }
}

/// A state invariant the engine must never break.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum InvariantViolation {
    #[error("step {step}: balance went negative ({balance})")]
    NegativeBalance { step: usize, balance: f64 },
    #[error("step {step}: balance {balance} exceeds lifetime earnings {earned}")]
    BalanceAboveEarnings {
        step: usize,
        balance: f64,
        earned: f64,
    },
    #[error("step {step}: multiplier fell below 1 ({multiplier})")]
    MultiplierBelowOne { step: usize, multiplier: f64 },
    #[error("step {step}: node '{node}' unlocked more than once")]
    DuplicateUnlock { step: usize, node: String },
    #[error("step {step}: node '{node}' unlocked before its prerequisite")]
    OrderViolation { step: usize, node: String },
}

/// Result of advancing the simulation by one step.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub step: usize,
    pub action: PlayerAction,
    pub policy_name: &'static str,
    pub rationale: Option<String>,
    pub unlocked: Option<String>,
    pub rejected: Option<UnlockError>,
    pub elapsed: Duration,
    pub ticks: u32,
    pub saves: u32,
}

/// Deterministic harness around a [`GameSession`] with simulated time.
pub struct SimulationSession {
    session: GameSession<MemoryStore, ManualClock>,
    store: MemoryStore,
    clock: ManualClock,
    step: usize,
    max_steps: usize,
}

impl SimulationSession {
    /// Fresh game at [`SIMULATION_EPOCH_MS`].
    #[must_use]
    pub fn new(config: SimulationConfig, catalog: Arc<NodeCatalog>) -> Self {
        Self::with_state(config, catalog, GameState::initial(SIMULATION_EPOCH_MS))
    }

    #[must_use]
    pub fn with_state(
        config: SimulationConfig,
        catalog: Arc<NodeCatalog>,
        state: GameState,
    ) -> Self {
        let store = MemoryStore::new();
        let clock = ManualClock::starting_at(SIMULATION_EPOCH_MS);
        let session = session_from_state(
            catalog,
            state,
            PersistenceGateway::new(store.clone(), STORAGE_KEY),
            clock.clone(),
            &EngineConfig::default_config(),
        );
        Self {
            session,
            store,
            clock,
            step: 0,
            max_steps: config.max_steps,
        }
    }

    #[must_use]
    pub fn state(&self) -> &GameState {
        self.session.state()
    }

    #[must_use]
    pub fn catalog(&self) -> &NodeCatalog {
        self.session.catalog()
    }

    #[must_use]
    pub const fn step(&self) -> usize {
        self.step
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.state().unlocked_count() >= self.catalog().len()
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.is_complete() || self.step >= self.max_steps
    }

    /// Run one policy decision, then let simulated time pass.
    ///
    /// # Errors
    ///
    /// Returns the first invariant the resulting state breaks.
    pub fn advance(
        &mut self,
        policy: &mut dyn PlayerPolicy,
    ) -> Result<TurnOutcome, InvariantViolation> {
        self.step += 1;
        let decision = policy.decide(self.session.catalog(), self.session.state());

        let mut unlocked = None;
        let mut rejected = None;
        let elapsed = match &decision.action {
            PlayerAction::Labour => {
                self.session.perform_labour();
                ACTION_DURATION
            }
            PlayerAction::Unlock(id) => {
                match self.session.unlock_node(id) {
                    Ok(receipt) => unlocked = Some(receipt.node_id),
                    Err(err) => rejected = Some(err),
                }
                ACTION_DURATION
            }
            PlayerAction::Wait(duration) => *duration,
        };

        self.clock.advance(elapsed);
        let report = self.session.advance(elapsed);
        self.check_invariants()?;

        Ok(TurnOutcome {
            step: self.step,
            action: decision.action,
            policy_name: policy.name(),
            rationale: decision.rationale,
            unlocked,
            rejected,
            elapsed,
            ticks: report.ticks,
            saves: report.saves,
        })
    }

    /// Close the session, flushing any pending save, and return the final
    /// state plus the store it wrote to.
    #[must_use]
    pub fn finish(self) -> (GameState, MemoryStore) {
        let state = self.session.close();
        (state, self.store)
    }

    fn check_invariants(&self) -> Result<(), InvariantViolation> {
        let step = self.step;
        let state = self.session.state();
        if state.labour_units < -1e-9 {
            return Err(InvariantViolation::NegativeBalance {
                step,
                balance: state.labour_units,
            });
        }
        if state.labour_units > state.total_labour_earned + 1e-6 {
            return Err(InvariantViolation::BalanceAboveEarnings {
                step,
                balance: state.labour_units,
                earned: state.total_labour_earned,
            });
        }
        if state.global_multiplier < 1.0 {
            return Err(InvariantViolation::MultiplierBelowOne {
                step,
                multiplier: state.global_multiplier,
            });
        }
        for (position, id) in state.unlocked_nodes.iter().enumerate() {
            let earlier = &state.unlocked_nodes[..position];
            if earlier.contains(id) {
                return Err(InvariantViolation::DuplicateUnlock {
                    step,
                    node: id.clone(),
                });
            }
            let prerequisite = self
                .session
                .catalog()
                .get(id)
                .and_then(|node| node.prerequisite.as_ref());
            if let Some(prerequisite) = prerequisite
                && !earlier.contains(prerequisite)
            {
                return Err(InvariantViolation::OrderViolation {
                    step,
                    node: id.clone(),
                });
            }
        }
        Ok(())
    }
}
