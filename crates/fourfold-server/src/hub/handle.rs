use fourfold_game::{SessionId, SessionView};
use fourfold_net::ConnectionEvent;
use tokio::sync::{mpsc, oneshot};

use super::{Command, HubStats};

/// Cloneable access to a running coordinator.
///
/// Queries come in async and blocking flavours; the blocking ones are for
/// threads outside the runtime such as the HTTP API.
#[derive(Debug, Clone)]
pub struct HubHandle {
    commands: mpsc::Sender<Command>,
    events: mpsc::Sender<ConnectionEvent>,
}

impl HubHandle {
    pub(super) fn new(
        commands: mpsc::Sender<Command>,
        events: mpsc::Sender<ConnectionEvent>,
    ) -> Self {
        Self { commands, events }
    }

    /// Sender the transport feeds connection events into.
    pub fn events(&self) -> mpsc::Sender<ConnectionEvent> {
        self.events.clone()
    }

    /// Snapshot of a session, `None` if the coordinator does not know it or
    /// has stopped.
    pub async fn session(&self, id: SessionId) -> Option<SessionView> {
        let (reply, rx) = oneshot::channel();
        self.commands.send(Command::Session { id, reply }).await.ok()?;
        rx.await.ok().flatten()
    }

    pub async fn stats(&self) -> Option<HubStats> {
        let (reply, rx) = oneshot::channel();
        self.commands.send(Command::Stats { reply }).await.ok()?;
        rx.await.ok()
    }

    /// Blocking [`HubHandle::session`]. Panics if called on a runtime thread.
    pub fn blocking_session(&self, id: SessionId) -> Option<SessionView> {
        let (reply, rx) = oneshot::channel();
        self.commands.blocking_send(Command::Session { id, reply }).ok()?;
        rx.blocking_recv().ok().flatten()
    }

    /// Blocking [`HubHandle::stats`]. Panics if called on a runtime thread.
    pub fn blocking_stats(&self) -> Option<HubStats> {
        let (reply, rx) = oneshot::channel();
        self.commands.blocking_send(Command::Stats { reply }).ok()?;
        rx.blocking_recv().ok()
    }

    /// Ask the coordinator to notify every connection and stop.
    pub async fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown).await;
    }
}
