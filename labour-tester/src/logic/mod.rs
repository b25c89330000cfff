pub mod game_tester;
pub mod policy;
pub mod progression;
pub mod reports;
pub mod seeds;
pub mod simulation;
pub mod tester;

pub use game_tester::{GameTester, SimulationPlan};
pub use policy::GameplayStrategy;
pub use progression::{
    ProgressionAggregate, ProgressionRecord, aggregate_progression, run_progression_analysis,
    validate_progression_targets,
};
pub use seeds::{SeedInfo, resolve_seed_inputs};
pub use tester::*;
