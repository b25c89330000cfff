//! Progression state store: clicking, unlocking, passive credit, and reset.
use std::sync::Arc;
use thiserror::Error;

use crate::accrual;
use crate::catalog::{Benefit, NodeCatalog};
use crate::state::GameState;

/// Why an unlock was refused. The state is untouched in every case.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum UnlockError {
    #[error("node '{0}' does not exist")]
    UnknownNode(String),
    #[error("node '{0}' is already unlocked")]
    AlreadyUnlocked(String),
    #[error("node '{node}' requires '{prerequisite}' first")]
    PrerequisiteNotMet { node: String, prerequisite: String },
    #[error("node '{node}' costs {cost} but only {available} is available")]
    InsufficientFunds {
        node: String,
        cost: f64,
        available: f64,
    },
}

/// What a successful unlock did.
#[derive(Debug, Clone, PartialEq)]
pub struct UnlockReceipt {
    pub node_id: String,
    pub cost: f64,
    pub benefit: Benefit,
    pub flavor_text: Option<String>,
}

/// Single owner of the mutable [`GameState`].
#[derive(Debug, Clone)]
pub struct ProgressionStore {
    catalog: Arc<NodeCatalog>,
    state: GameState,
    revision: u64,
}

impl ProgressionStore {
    #[must_use]
    pub const fn new(catalog: Arc<NodeCatalog>, state: GameState) -> Self {
        Self {
            catalog,
            state,
            revision: 0,
        }
    }

    #[must_use]
    pub const fn state(&self) -> &GameState {
        &self.state
    }

    #[must_use]
    pub fn catalog(&self) -> &NodeCatalog {
        &self.catalog
    }

    /// Monotonic counter bumped by every mutation.
    #[must_use]
    pub const fn revision(&self) -> u64 {
        self.revision
    }

    /// Perform one manual action and return the labour gained.
    pub fn perform_labour(&mut self) -> f64 {
        let gain = self.state.effective_click_yield();
        self.state.credit(gain);
        self.revision += 1;
        log::debug!("Performed labour: +{gain} Labour Units");
        gain
    }

    /// Purchase a node.
    ///
    /// # Errors
    ///
    /// Checks run in order (unknown node, already unlocked, prerequisite,
    /// funds) and the first failure is returned without mutating state.
    pub fn unlock_node(&mut self, node_id: &str) -> Result<UnlockReceipt, UnlockError> {
        let Some(node) = self.catalog.get(node_id) else {
            log::error!("Node not found: {node_id}");
            return Err(UnlockError::UnknownNode(node_id.to_string()));
        };

        if self.state.has_unlocked(node_id) {
            log::debug!("Node already unlocked: {node_id}");
            return Err(UnlockError::AlreadyUnlocked(node_id.to_string()));
        }

        if let Some(prerequisite) = node.prerequisite.as_deref()
            && !self.state.has_unlocked(prerequisite)
        {
            log::debug!("Prerequisite not met for: {node_id}");
            return Err(UnlockError::PrerequisiteNotMet {
                node: node_id.to_string(),
                prerequisite: prerequisite.to_string(),
            });
        }

        if self.state.labour_units < node.cost {
            log::debug!("Not enough Labour Units to unlock: {node_id}");
            return Err(UnlockError::InsufficientFunds {
                node: node_id.to_string(),
                cost: node.cost,
                available: self.state.labour_units,
            });
        }

        log::info!("Unlocking node: {} for {} Labour Units", node.title, node.cost);
        self.state.labour_units -= node.cost;
        self.state.unlocked_nodes.push(node.id.clone());
        apply_benefit(&mut self.state, node.benefit);
        self.revision += 1;

        Ok(UnlockReceipt {
            node_id: node.id.clone(),
            cost: node.cost,
            benefit: node.benefit,
            flavor_text: node.flavor_text.clone(),
        })
    }

    /// Credit `seconds` of passive income.
    pub fn apply_passive(&mut self, seconds: f64) -> f64 {
        let gain = accrual::accrue(&mut self.state, seconds);
        if gain != 0.0 {
            self.revision += 1;
        }
        gain
    }

    /// One live tick; `None` when there is no passive income.
    pub fn tick(&mut self) -> Option<f64> {
        let gain = accrual::live_tick(&mut self.state)?;
        self.revision += 1;
        Some(gain)
    }

    /// Restore the fixed initial state.
    pub fn reset(&mut self, now_ms: i64) {
        log::info!("Resetting game state");
        self.state = GameState::initial(now_ms);
        self.revision += 1;
    }

    #[must_use]
    pub fn into_state(self) -> GameState {
        self.state
    }
}

fn apply_benefit(state: &mut GameState, benefit: Benefit) {
    match benefit {
        Benefit::ClickBonus(v) => {
            state.click_power += v;
            log::info!("Click power increased by {v} to {}", state.click_power);
        }
        Benefit::PassiveIncome(v) => {
            state.passive_income_per_second += v;
            log::info!(
                "Passive income increased by {v}/s to {}/s",
                state.passive_income_per_second
            );
        }
        Benefit::Multiplier(v) => {
            state.global_multiplier *= v;
            log::info!(
                "Global multiplier increased by {v}x to {:.2}x",
                state.global_multiplier
            );
        }
    }
}
