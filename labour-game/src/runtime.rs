//! Tokio host for a [`GameSession`].
//!
//! One task owns the session. Commands arrive over a bounded channel and are
//! answered through oneshot replies; between commands the task sleeps until
//! the session's next tick or save deadline. Everything the session does is
//! therefore serialized, and a save always captures the latest state.
use std::ops::ControlFlow;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::catalog::NodeCatalog;
use crate::clock::Clock;
use crate::constants::COMMAND_CHANNEL_CAPACITY;
use crate::persistence::SnapshotStore;
use crate::progression::{UnlockError, UnlockReceipt};
use crate::session::GameSession;
use crate::state::GameState;
use crate::GameEngine;

/// Messages served by the session task.
#[derive(Debug)]
enum Command {
    PerformLabour {
        reply: oneshot::Sender<f64>,
    },
    UnlockNode {
        node_id: String,
        reply: oneshot::Sender<Result<UnlockReceipt, UnlockError>>,
    },
    Reset {
        reply: oneshot::Sender<()>,
    },
    Snapshot {
        reply: oneshot::Sender<GameState>,
    },
    Flush {
        reply: oneshot::Sender<bool>,
    },
    Shutdown,
}

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("game session has stopped")]
    Closed,
}

/// Cloneable front end to a running session task.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<Command>,
    catalog: Arc<NodeCatalog>,
}

impl SessionHandle {
    #[must_use]
    pub fn catalog(&self) -> &NodeCatalog {
        &self.catalog
    }

    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] once the session task has stopped.
    pub async fn perform_labour(&self) -> Result<f64, SessionError> {
        self.request(|reply| Command::PerformLabour { reply }).await
    }

    /// The outer result reports transport failure; the inner one is the
    /// unlock outcome.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] once the session task has stopped.
    pub async fn unlock_node(
        &self,
        node_id: impl Into<String>,
    ) -> Result<Result<UnlockReceipt, UnlockError>, SessionError> {
        let node_id = node_id.into();
        self.request(|reply| Command::UnlockNode { node_id, reply })
            .await
    }

    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] once the session task has stopped.
    pub async fn reset_game(&self) -> Result<(), SessionError> {
        self.request(|reply| Command::Reset { reply }).await
    }

    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] once the session task has stopped.
    pub async fn snapshot(&self) -> Result<GameState, SessionError> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    /// Write a pending save now. Returns whether anything was written.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] once the session task has stopped.
    pub async fn flush(&self) -> Result<bool, SessionError> {
        self.request(|reply| Command::Flush { reply }).await
    }

    /// Ask the task to flush and stop. Await its `JoinHandle` for the final
    /// state.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the task has already stopped.
    pub async fn shutdown(&self) -> Result<(), SessionError> {
        self.tx
            .send(Command::Shutdown)
            .await
            .map_err(|_| SessionError::Closed)
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, SessionError> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| SessionError::Closed)?;
        response.await.map_err(|_| SessionError::Closed)
    }
}

/// Hydrate the engine and run its session on the current tokio runtime.
///
/// The task ends when [`SessionHandle::shutdown`] is called or every handle
/// is dropped; either way a pending save is flushed first.
pub fn spawn<S, C>(engine: GameEngine<S, C>) -> (SessionHandle, JoinHandle<GameState>)
where
    S: SnapshotStore + Send + 'static,
    C: Clock + 'static,
{
    let catalog = Arc::clone(engine.catalog());
    let session = engine.open_session();
    let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
    let task = tokio::spawn(run(session, rx));
    (SessionHandle { tx, catalog }, task)
}

async fn run<S, C>(mut session: GameSession<S, C>, mut commands: mpsc::Receiver<Command>) -> GameState
where
    S: SnapshotStore,
    C: Clock,
{
    let origin = Instant::now();
    log::info!("Game session started ({:?})", session.source());

    loop {
        let wake = session.next_event().map(|at| origin + at);
        tokio::select! {
            biased;
            () = time::sleep_until(wake.unwrap_or(origin)), if wake.is_some() => {
                session.advance_to(origin.elapsed());
            }
            command = commands.recv() => {
                session.advance_to(origin.elapsed());
                let Some(command) = command else {
                    log::debug!("All session handles dropped");
                    break;
                };
                if handle_command(&mut session, command).is_break() {
                    break;
                }
            }
        }
    }

    log::info!("Game session stopping");
    session.close()
}

fn handle_command<S, C>(session: &mut GameSession<S, C>, command: Command) -> ControlFlow<()>
where
    S: SnapshotStore,
    C: Clock,
{
    // A dropped reply receiver means the caller stopped waiting.
    match command {
        Command::PerformLabour { reply } => {
            let _ = reply.send(session.perform_labour());
        }
        Command::UnlockNode { node_id, reply } => {
            let _ = reply.send(session.unlock_node(&node_id));
        }
        Command::Reset { reply } => {
            session.reset_game();
            let _ = reply.send(());
        }
        Command::Snapshot { reply } => {
            let _ = reply.send(session.state().clone());
        }
        Command::Flush { reply } => {
            let _ = reply.send(session.flush());
        }
        Command::Shutdown => return ControlFlow::Break(()),
    }
    ControlFlow::Continue(())
}
