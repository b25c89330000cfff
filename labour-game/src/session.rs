//! Host-driven game session binding the store to persistence and timers.
//!
//! The host calls [`GameSession::advance`] with elapsed time; the session
//! replays passive ticks and due saves in chronological order. This keeps the
//! whole lifecycle deterministic, which the tester and simulations rely on.
use std::sync::Arc;
use std::time::Duration;

use crate::accrual;
use crate::catalog::{NodeCatalog, NodeStatus};
use crate::clock::Clock;
use crate::debounce::SaveDebouncer;
use crate::persistence::{PersistenceGateway, SnapshotStore};
use crate::progression::{ProgressionStore, UnlockError, UnlockReceipt};
use crate::state::GameState;
use crate::{EngineConfig, HydrationSource};

/// What happened during one [`GameSession::advance`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AdvanceReport {
    pub ticks: u32,
    pub passive_gain: f64,
    pub saves: u32,
}

pub struct GameSession<S, C> {
    store: ProgressionStore,
    gateway: PersistenceGateway<S>,
    clock: C,
    debouncer: SaveDebouncer<Duration>,
    tick_interval: Duration,
    elapsed: Duration,
    last_tick: Option<Duration>,
    source: HydrationSource,
}

impl<S, C> GameSession<S, C>
where
    S: SnapshotStore,
    C: Clock,
{
    pub(crate) fn new(
        store: ProgressionStore,
        gateway: PersistenceGateway<S>,
        clock: C,
        config: &EngineConfig,
        source: HydrationSource,
    ) -> Self {
        let mut session = Self {
            store,
            gateway,
            clock,
            debouncer: SaveDebouncer::new(config.save_debounce()),
            tick_interval: config.tick_interval(),
            elapsed: Duration::ZERO,
            last_tick: None,
            source,
        };
        session.sync_ticker();
        session
    }

    #[must_use]
    pub const fn state(&self) -> &GameState {
        self.store.state()
    }

    #[must_use]
    pub fn catalog(&self) -> &NodeCatalog {
        self.store.catalog()
    }

    #[must_use]
    pub const fn source(&self) -> HydrationSource {
        self.source
    }

    /// Session time consumed so far through [`Self::advance`].
    #[must_use]
    pub const fn elapsed(&self) -> Duration {
        self.elapsed
    }

    #[must_use]
    pub const fn is_save_pending(&self) -> bool {
        self.debouncer.is_pending()
    }

    #[must_use]
    pub fn node_status(&self, node_id: &str) -> Option<NodeStatus> {
        self.store.catalog().status(node_id, self.store.state())
    }

    pub fn perform_labour(&mut self) -> f64 {
        let gain = self.store.perform_labour();
        self.mark_changed();
        gain
    }

    /// # Errors
    ///
    /// Propagates the store's validation failure; nothing is scheduled then.
    pub fn unlock_node(&mut self, node_id: &str) -> Result<UnlockReceipt, UnlockError> {
        let receipt = self.store.unlock_node(node_id)?;
        self.mark_changed();
        Ok(receipt)
    }

    /// Restore the initial state and erase the stored snapshot. Erase
    /// failures are logged, never surfaced.
    pub fn reset_game(&mut self) {
        self.store.reset(self.clock.now_millis());
        self.debouncer.cancel();
        if let Err(err) = self.gateway.erase() {
            log::warn!("Failed to erase saved game state: {err}");
        }
        self.sync_ticker();
    }

    /// Move session time forward by `dt`, applying ticks and due saves.
    pub fn advance(&mut self, dt: Duration) -> AdvanceReport {
        let target = self.elapsed + dt;
        let mut report = AdvanceReport::default();

        loop {
            let next_tick = self.last_tick.map(|at| at + self.tick_interval);
            let next_save = self.debouncer.deadline();
            let tick_due = next_tick.filter(|at| *at <= target);
            let save_due = next_save.filter(|at| *at <= target);

            match (tick_due, save_due) {
                (Some(tick_at), Some(save_at)) if save_at <= tick_at => {
                    self.fire_save(save_at, &mut report);
                }
                (Some(tick_at), _) => self.fire_tick(tick_at, &mut report),
                (None, Some(save_at)) => self.fire_save(save_at, &mut report),
                (None, None) => break,
            }
        }

        self.elapsed = target;
        report
    }

    /// Advance to an absolute session time. Earlier times are a no-op.
    pub fn advance_to(&mut self, at: Duration) -> AdvanceReport {
        self.advance(at.saturating_sub(self.elapsed))
    }

    /// Session time of the next tick or save, whichever comes first.
    #[must_use]
    pub fn next_event(&self) -> Option<Duration> {
        let next_tick = self.last_tick.map(|at| at + self.tick_interval);
        match (next_tick, self.debouncer.deadline()) {
            (Some(tick), Some(save)) => Some(tick.min(save)),
            (tick, save) => tick.or(save),
        }
    }

    /// Write any pending save immediately. Returns whether a write happened.
    pub fn flush(&mut self) -> bool {
        if self.debouncer.take_pending() {
            self.persist();
            true
        } else {
            false
        }
    }

    /// Flush and hand back the final state.
    #[must_use]
    pub fn close(mut self) -> GameState {
        self.flush();
        self.store.into_state()
    }

    fn fire_tick(&mut self, at: Duration, report: &mut AdvanceReport) {
        self.elapsed = at;
        self.last_tick = Some(at);
        if let Some(gain) = self.store.tick() {
            report.ticks += 1;
            report.passive_gain += gain;
        }
    }

    fn fire_save(&mut self, at: Duration, report: &mut AdvanceReport) {
        self.elapsed = at;
        if self.debouncer.poll(at) {
            self.persist();
            report.saves += 1;
        }
    }

    fn mark_changed(&mut self) {
        self.debouncer.notify_change(self.elapsed);
        self.sync_ticker();
    }

    /// Start the ticker when passive income appears, stop it when it is gone.
    fn sync_ticker(&mut self) {
        let ticking = accrual::ticking(self.store.state());
        match (ticking, self.last_tick) {
            (true, None) => self.last_tick = Some(self.elapsed),
            (false, Some(_)) => self.last_tick = None,
            _ => {}
        }
    }

    fn persist(&self) {
        if let Err(err) = self.gateway.save(self.store.state(), self.clock.now_millis()) {
            log::error!("Failed to save game state: {err}");
        }
    }
}

/// Construct a session around an existing catalog and state, bypassing
/// hydration. Used by simulations that start from a crafted state.
pub fn session_from_state<S, C>(
    catalog: Arc<NodeCatalog>,
    state: GameState,
    gateway: PersistenceGateway<S>,
    clock: C,
    config: &EngineConfig,
) -> GameSession<S, C>
where
    S: SnapshotStore,
    C: Clock,
{
    GameSession::new(
        ProgressionStore::new(catalog, state),
        gateway,
        clock,
        config,
        HydrationSource::Fresh,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Benefit;
    use crate::catalog::tests::node;
    use crate::clock::ManualClock;
    use crate::persistence::MemoryStore;

    const KEY: &str = "test.save";

    fn session_with(
        nodes: Vec<crate::catalog::NodeDefinition>,
    ) -> (GameSession<MemoryStore, ManualClock>, MemoryStore, ManualClock) {
        let store = MemoryStore::new();
        let clock = ManualClock::starting_at(1_000_000);
        let catalog = Arc::new(NodeCatalog::from_nodes(nodes).unwrap());
        let session = session_from_state(
            catalog,
            GameState::initial(clock.now_millis()),
            PersistenceGateway::new(store.clone(), KEY),
            clock.clone(),
            &EngineConfig::default_config(),
        );
        (session, store, clock)
    }

    fn reference_session() -> (GameSession<MemoryStore, ManualClock>, MemoryStore, ManualClock) {
        let nodes = NodeCatalog::load_from_static()
            .unwrap()
            .iter()
            .cloned()
            .collect();
        session_with(nodes)
    }

    #[test]
    fn rapid_clicks_coalesce_into_one_save_with_final_state() {
        let (mut session, store, _clock) = reference_session();
        for _ in 0..8 {
            session.perform_labour();
            session.advance(Duration::from_millis(600));
        }
        assert_eq!(store.write_count(), 0);
        assert!(session.is_save_pending());

        let report = session.advance(Duration::from_secs(5));
        assert_eq!(report.saves, 1);
        assert_eq!(store.write_count(), 1);

        let gateway = PersistenceGateway::new(store.clone(), KEY);
        let saved = gateway.load().unwrap().unwrap();
        assert!((saved.labour_units - 8.0).abs() < f64::EPSILON);
    }

    #[test]
    fn quiet_window_elapses_exactly_at_deadline() {
        let (mut session, store, _clock) = reference_session();
        session.perform_labour();
        session.advance(Duration::from_millis(4_999));
        assert_eq!(store.write_count(), 0);
        session.advance(Duration::from_millis(1));
        assert_eq!(store.write_count(), 1);
        assert!(!session.is_save_pending());
    }

    #[test]
    fn failed_unlock_schedules_nothing() {
        let (mut session, store, _clock) = reference_session();
        assert!(session.unlock_node("basic-thinking").is_err());
        assert!(!session.is_save_pending());
        session.advance(Duration::from_secs(30));
        assert_eq!(store.write_count(), 0);
    }

    #[test]
    fn ticks_start_one_interval_after_passive_income_appears() {
        let (mut session, _store, _clock) =
            session_with(vec![node("p", 0.0, Benefit::PassiveIncome(2.0), None)]);
        let idle = session.advance(Duration::from_secs(10));
        assert_eq!(idle.ticks, 0);

        session.unlock_node("p").unwrap();
        let report = session.advance(Duration::from_millis(3_500));
        assert_eq!(report.ticks, 3);
        assert!((report.passive_gain - 6.0).abs() < 1e-12);
        assert!((session.state().labour_units - 6.0).abs() < 1e-12);

        let more = session.advance(Duration::from_millis(500));
        assert_eq!(more.ticks, 1);
    }

    #[test]
    fn ticks_do_not_rearm_the_save_timer() {
        let (mut session, store, _clock) =
            session_with(vec![node("p", 0.0, Benefit::PassiveIncome(1.0), None)]);
        session.unlock_node("p").unwrap();
        let report = session.advance(Duration::from_secs(12));
        assert_eq!(report.saves, 1);
        assert_eq!(report.ticks, 12);
        assert_eq!(store.write_count(), 1);
    }

    #[test]
    fn save_stamps_wall_clock() {
        let (mut session, store, clock) = reference_session();
        session.perform_labour();
        clock.advance(Duration::from_secs(5));
        session.advance(Duration::from_secs(5));
        let saved = PersistenceGateway::new(store, KEY).load().unwrap().unwrap();
        assert_eq!(saved.last_save_time, 1_005_000);
        assert_eq!(session.state().last_save_time, 1_000_000);
    }

    #[test]
    fn reset_cancels_pending_save_and_erases_snapshot() {
        let (mut session, store, _clock) = reference_session();
        session.perform_labour();
        session.advance(Duration::from_secs(6));
        assert!(store.raw(KEY).is_some());

        session.perform_labour();
        session.reset_game();
        session.advance(Duration::from_secs(60));
        assert!(store.raw(KEY).is_none());
        assert!(session.state().same_progress(&GameState::initial(0)));
    }

    #[test]
    fn next_event_tracks_earliest_timer() {
        let (mut session, _store, _clock) =
            session_with(vec![node("p", 0.0, Benefit::PassiveIncome(1.0), None)]);
        assert_eq!(session.next_event(), None);

        session.advance(Duration::from_secs(2));
        session.unlock_node("p").unwrap();
        assert_eq!(session.next_event(), Some(Duration::from_secs(3)));

        session.advance_to(Duration::from_millis(6_500));
        assert_eq!(session.next_event(), Some(Duration::from_secs(7)));
        session.advance_to(Duration::from_secs(1));
        assert_eq!(session.elapsed(), Duration::from_millis(6_500));
    }

    #[test]
    fn close_flushes_pending_state() {
        let (mut session, store, _clock) = reference_session();
        session.perform_labour();
        session.perform_labour();
        let final_state = session.close();
        assert_eq!(store.write_count(), 1);
        let saved = PersistenceGateway::new(store, KEY).load().unwrap().unwrap();
        assert!(saved.same_progress(&final_state));
    }
}
