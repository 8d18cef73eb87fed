//! Background task that persists finished sessions and publishes events.
//!
//! The coordinator hands work over after the in-memory transition and moves
//! on; nothing here can fail a move or delay a broadcast.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::analytics::{EventPublisher, GameEvent};
use crate::persistence::{SessionRecord, SessionStore};

/// Work for the recorder.
#[derive(Debug, Clone)]
pub enum RecorderJob {
    /// Store the session, then publish `session_completed`.
    Completed(SessionRecord),
    /// Publish a `move_made` event.
    Move(GameEvent),
}

/// Sending side of the recorder queue.
#[derive(Debug, Clone)]
pub struct RecorderHandle {
    tx: mpsc::UnboundedSender<RecorderJob>,
}

impl RecorderHandle {
    /// Queue a job. Dropped with a warning if the recorder has stopped.
    pub fn submit(&self, job: RecorderJob) {
        if self.tx.send(job).is_err() {
            tracing::warn!("Recorder stopped; dropping job");
        }
    }

    /// A handle whose jobs go straight to `tx`, for observing the
    /// coordinator without a store.
    pub fn from_sender(tx: mpsc::UnboundedSender<RecorderJob>) -> Self {
        Self { tx }
    }
}

pub struct Recorder {
    store: Arc<dyn SessionStore>,
    publisher: Arc<dyn EventPublisher>,
}

impl Recorder {
    pub fn new(store: Arc<dyn SessionStore>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self { store, publisher }
    }

    /// Start the recorder task. It exits once every handle is dropped.
    pub fn spawn(self) -> (RecorderHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(self.run(rx));
        (RecorderHandle { tx }, task)
    }

    async fn run(self, mut jobs: mpsc::UnboundedReceiver<RecorderJob>) {
        while let Some(job) = jobs.recv().await {
            self.process(job);
        }
        tracing::debug!("Recorder finished");
    }

    fn process(&self, job: RecorderJob) {
        match job {
            RecorderJob::Completed(record) => {
                match self.store.record_completed_session(&record) {
                    Ok(true) => tracing::debug!("Stored session {}", record.id),
                    Ok(false) => {
                        tracing::debug!("Session {} already stored", record.id);
                        return;
                    }
                    Err(e) => tracing::error!("Failed to store session {}: {e}", record.id),
                }
                self.publish(&GameEvent::session_completed(&record, Utc::now()));
            }
            RecorderJob::Move(event) => self.publish(&event),
        }
    }

    fn publish(&self, event: &GameEvent) {
        if let Err(e) = self.publisher.publish(event) {
            tracing::warn!(
                "Failed to publish {} for session {}: {e}",
                event.kind(),
                event.game_id()
            );
        }
    }
}
