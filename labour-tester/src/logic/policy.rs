use std::fmt;
use std::time::Duration;

use labour_game::{GameState, NodeCatalog, NodeDefinition};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Serialize, Serializer};

/// One thing a simulated player can do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerAction {
    Labour,
    Unlock(String),
    Wait(Duration),
}

/// Decision returned by a [`PlayerPolicy`]
#[derive(Debug, Clone)]
pub struct PolicyDecision {
    pub action: PlayerAction,
    pub rationale: Option<String>,
}

impl PolicyDecision {
    #[must_use]
    pub fn new(action: PlayerAction, rationale: Option<String>) -> Self {
        Self { action, rationale }
    }

    fn labour() -> Self {
        Self::new(PlayerAction::Labour, None)
    }
}

/// Policy interface for automated play strategies.
pub trait PlayerPolicy {
    /// Name used for logging/debug output.
    fn name(&self) -> &'static str;

    /// Choose the next action for the current state.
    fn decide(&mut self, catalog: &NodeCatalog, state: &GameState) -> PolicyDecision;
}

/// Built-in gameplay strategies for automated runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GameplayStrategy {
    Greedy,
    Balanced,
    Idler,
    Chaotic,
}

impl GameplayStrategy {
    pub const ALL: [Self; 4] = [Self::Greedy, Self::Balanced, Self::Idler, Self::Chaotic];

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            GameplayStrategy::Greedy => "Greedy",
            GameplayStrategy::Balanced => "Balanced",
            GameplayStrategy::Idler => "Idler",
            GameplayStrategy::Chaotic => "Chaotic",
        }
    }

    /// Whether every run of this strategy is expected to finish the tree.
    #[must_use]
    pub const fn expects_completion(self) -> bool {
        !matches!(self, GameplayStrategy::Chaotic)
    }

    #[must_use]
    pub fn create_policy(self, seed: u64) -> Box<dyn PlayerPolicy + Send> {
        match self {
            GameplayStrategy::Greedy => Box::new(GreedyPolicy),
            GameplayStrategy::Balanced => Box::new(BalancedPolicy::new(seed)),
            GameplayStrategy::Idler => Box::new(IdlerPolicy),
            GameplayStrategy::Chaotic => Box::new(ChaoticPolicy::new(seed)),
        }
    }
}

impl Serialize for GameplayStrategy {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.label())
    }
}

impl fmt::Display for GameplayStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

struct GreedyPolicy;
struct IdlerPolicy;

struct BalancedPolicy {
    rng: ChaCha20Rng,
}

impl BalancedPolicy {
    fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha20Rng::seed_from_u64(seed),
        }
    }
}

struct ChaoticPolicy {
    rng: ChaCha20Rng,
}

impl ChaoticPolicy {
    fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha20Rng::seed_from_u64(seed),
        }
    }
}

/// Cheapest node that can be bought right now.
fn cheapest_affordable<'a>(catalog: &'a NodeCatalog, state: &'a GameState) -> Option<&'a NodeDefinition> {
    catalog
        .next_available(state)
        .filter(|node| state.labour_units >= node.cost)
        .min_by(|a, b| a.cost.total_cmp(&b.cost))
}

fn buy(node: &NodeDefinition) -> PolicyDecision {
    PolicyDecision::new(
        PlayerAction::Unlock(node.id.clone()),
        Some(format!("cost {}", node.cost)),
    )
}

impl PlayerPolicy for GreedyPolicy {
    fn name(&self) -> &'static str {
        "Greedy"
    }

    fn decide(&mut self, catalog: &NodeCatalog, state: &GameState) -> PolicyDecision {
        cheapest_affordable(catalog, state).map_or_else(PolicyDecision::labour, buy)
    }
}

impl PlayerPolicy for BalancedPolicy {
    fn name(&self) -> &'static str {
        "Balanced"
    }

    fn decide(&mut self, catalog: &NodeCatalog, state: &GameState) -> PolicyDecision {
        if let Some(node) = cheapest_affordable(catalog, state) {
            return buy(node);
        }
        if self.rng.gen_bool(0.8) {
            PolicyDecision::labour()
        } else {
            let pause = Duration::from_millis(self.rng.gen_range(1_000..=3_000));
            PolicyDecision::new(PlayerAction::Wait(pause), Some("short break".to_string()))
        }
    }
}

impl PlayerPolicy for IdlerPolicy {
    fn name(&self) -> &'static str {
        "Idler"
    }

    fn decide(&mut self, catalog: &NodeCatalog, state: &GameState) -> PolicyDecision {
        if let Some(node) = cheapest_affordable(catalog, state) {
            return buy(node);
        }
        if state.passive_income_per_second > 0.0 {
            PolicyDecision::new(
                PlayerAction::Wait(Duration::from_secs(5)),
                Some(format!("idling at {}/s", state.effective_passive_yield())),
            )
        } else {
            PolicyDecision::labour()
        }
    }
}

impl PlayerPolicy for ChaoticPolicy {
    fn name(&self) -> &'static str {
        "Chaotic"
    }

    fn decide(&mut self, catalog: &NodeCatalog, _state: &GameState) -> PolicyDecision {
        let roll: f64 = self.rng.r#gen();
        if roll < 0.6 {
            return PolicyDecision::labour();
        }
        if roll < 0.8 && !catalog.is_empty() {
            // Any node at all, so rejected unlocks get exercised too.
            let index = self.rng.gen_range(0..catalog.len());
            if let Some(node) = catalog.iter().nth(index) {
                return PolicyDecision::new(
                    PlayerAction::Unlock(node.id.clone()),
                    Some("random pick".to_string()),
                );
            }
        }
        let pause = Duration::from_millis(self.rng.gen_range(500..=2_000));
        PolicyDecision::new(PlayerAction::Wait(pause), None)
    }
}
