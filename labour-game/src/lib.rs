//! Planetary Labour Game Engine
//!
//! Platform-agnostic core logic for the Planetary Labour idle game: the
//! upgrade catalog, the progression store, passive accrual, and debounced
//! snapshot persistence. Hosts supply a [`SnapshotStore`] and a [`Clock`].

pub mod accrual;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod constants;
pub mod debounce;
pub mod format;
pub mod numbers;
pub mod persistence;
pub mod progression;
#[cfg(feature = "runtime")]
pub mod runtime;
pub mod session;
pub mod state;

use anyhow::Context;
use std::sync::Arc;

// Re-export commonly used types
pub use accrual::{OfflineProgress, apply_offline_progress};
pub use catalog::{Benefit, CatalogError, NodeCatalog, NodeDefinition, NodeStatus};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, EngineConfig};
pub use debounce::{DebounceState, SaveDebouncer};
pub use format::{format_abbreviated, format_multiplier, format_with_commas};
pub use persistence::{FileStore, MemoryStore, PersistenceError, PersistenceGateway, SnapshotStore};
pub use progression::{ProgressionStore, UnlockError, UnlockReceipt};
#[cfg(feature = "runtime")]
pub use runtime::{SessionError, SessionHandle};
pub use session::{AdvanceReport, GameSession, session_from_state};
pub use state::GameState;

/// Where a hydrated state came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HydrationSource {
    /// No snapshot existed.
    Fresh,
    /// A snapshot was loaded and caught up.
    Restored,
    /// A snapshot existed but could not be read; the initial state was used.
    Recovered,
}

/// Outcome of [`GameEngine::hydrate`].
#[derive(Debug, Clone, PartialEq)]
pub struct Hydration {
    pub state: GameState,
    pub source: HydrationSource,
    pub offline: Option<OfflineProgress>,
}

/// Main game engine: owns the catalog, the snapshot gateway, and the clock
pub struct GameEngine<S, C>
where
    S: SnapshotStore,
    C: Clock,
{
    catalog: Arc<NodeCatalog>,
    gateway: PersistenceGateway<S>,
    clock: C,
    config: EngineConfig,
}

impl<S, C> GameEngine<S, C>
where
    S: SnapshotStore,
    C: Clock,
{
    /// Create an engine over an explicit catalog and config.
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid.
    pub fn new(
        catalog: NodeCatalog,
        storage: S,
        clock: C,
        config: EngineConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let gateway = PersistenceGateway::new(storage, config.storage_key.clone());
        Ok(Self {
            catalog: Arc::new(catalog),
            gateway,
            clock,
            config,
        })
    }

    /// Create an engine with the bundled catalog and default timings.
    ///
    /// # Errors
    ///
    /// Returns an error if the bundled catalog fails validation.
    pub fn with_defaults(storage: S, clock: C) -> anyhow::Result<Self> {
        let catalog = NodeCatalog::load_from_static().context("loading bundled node catalog")?;
        Self::new(catalog, storage, clock, EngineConfig::default_config())
            .context("building engine with default config")
    }

    #[must_use]
    pub const fn catalog(&self) -> &Arc<NodeCatalog> {
        &self.catalog
    }

    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub const fn gateway(&self) -> &PersistenceGateway<S> {
        &self.gateway
    }

    #[must_use]
    pub const fn clock(&self) -> &C {
        &self.clock
    }

    /// Load the stored snapshot and credit offline income.
    ///
    /// A snapshot that cannot be read is logged and replaced by the initial
    /// state; hydration itself never fails.
    #[must_use]
    pub fn hydrate(&self) -> Hydration {
        let now = self.clock.now_millis();
        match self.gateway.load() {
            Ok(Some(mut state)) => {
                let offline = apply_offline_progress(&mut state, now);
                log::info!(
                    "Restored game state with {} unlocked nodes",
                    state.unlocked_count()
                );
                Hydration {
                    state,
                    source: HydrationSource::Restored,
                    offline: Some(offline),
                }
            }
            Ok(None) => Hydration {
                state: GameState::initial(now),
                source: HydrationSource::Fresh,
                offline: None,
            },
            Err(err) => {
                log::error!("Failed to load game state: {err}");
                Hydration {
                    state: GameState::initial(now),
                    source: HydrationSource::Recovered,
                    offline: None,
                }
            }
        }
    }

    /// Hydrate and hand ownership of everything to a host-driven session.
    #[must_use]
    pub fn open_session(self) -> GameSession<S, C> {
        let hydration = self.hydrate();
        GameSession::new(
            ProgressionStore::new(self.catalog, hydration.state),
            self.gateway,
            self.clock,
            &self.config,
            hydration.source,
        )
    }
}
