//! Centralized tuning constants for Planetary Labour progression logic.
//!
//! Starting values and timer windows live here so that balance changes go
//! through code review instead of being scattered across modules.

// Persistence ---------------------------------------------------------------
/// Key existing saves are stored under; `FileStore` maps it to
/// `_planetary_labour_game_state.json`.
pub const STORAGE_KEY: &str = "@planetary_labour_game_state";
pub const SAVE_DEBOUNCE_MS: u64 = 5_000;

// Accrual -------------------------------------------------------------------
pub const TICK_INTERVAL_MS: u64 = 1_000;
pub(crate) const MILLIS_PER_SECOND: f64 = 1_000.0;

// Initial state -------------------------------------------------------------
pub(crate) const INITIAL_LABOUR_UNITS: f64 = 0.0;
pub(crate) const INITIAL_CLICK_POWER: f64 = 1.0;
pub(crate) const INITIAL_PASSIVE_INCOME: f64 = 0.0;
pub(crate) const INITIAL_GLOBAL_MULTIPLIER: f64 = 1.0;

// Runtime -------------------------------------------------------------------
pub(crate) const COMMAND_CHANNEL_CAPACITY: usize = 64;

// Display -------------------------------------------------------------------
pub(crate) const THOUSAND: f64 = 1_000.0;
pub(crate) const MILLION: f64 = 1_000_000.0;
pub(crate) const BILLION: f64 = 1_000_000_000.0;
pub(crate) const TRILLION: f64 = 1_000_000_000_000.0;
