//! Game events and where they go.
//!
//! The coordinator emits a [`GameEvent`] for every accepted move and every
//! completed session. Publishing is fire-and-forget: errors come back as
//! [`PublishError`] so the recorder can log them, and nothing downstream of
//! a publisher can affect a game.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use fourfold_game::{Move, Session, SessionId};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::persistence::SessionRecord;

/// Event published to the analytics stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "eventType", rename_all = "snake_case")]
pub enum GameEvent {
    SessionCompleted(SessionCompleted),
    MoveMade(MoveMade),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCompleted {
    pub game_id: SessionId,
    pub player: String,
    pub opponent: String,
    pub is_bot: bool,
    /// Winner username, `"Bot"`, or `"draw"`.
    pub result: String,
    pub duration_seconds: i64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveMade {
    pub game_id: SessionId,
    /// Who moved.
    pub player: String,
    pub opponent: String,
    pub column: usize,
    pub row: usize,
    pub is_bot: bool,
    pub timestamp: DateTime<Utc>,
}

impl GameEvent {
    pub fn session_completed(record: &SessionRecord, timestamp: DateTime<Utc>) -> Self {
        GameEvent::SessionCompleted(SessionCompleted {
            game_id: record.id.clone(),
            player: record.player1.clone(),
            opponent: record.player2.clone(),
            is_bot: record.is_bot,
            result: record.winner.clone(),
            duration_seconds: record.duration_seconds,
            timestamp,
        })
    }

    pub fn move_made(session: &Session, mv: Move, timestamp: DateTime<Utc>) -> Self {
        GameEvent::MoveMade(MoveMade {
            game_id: session.id().clone(),
            player: session.player(mv.slot).to_string(),
            opponent: session.player(mv.slot.other()).to_string(),
            column: mv.column,
            row: mv.row,
            is_bot: session.is_bot(),
            timestamp,
        })
    }

    pub fn game_id(&self) -> &SessionId {
        match self {
            GameEvent::SessionCompleted(e) => &e.game_id,
            GameEvent::MoveMade(e) => &e.game_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            GameEvent::SessionCompleted(_) => "session_completed",
            GameEvent::MoveMade(_) => "move_made",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("event log write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("event encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("event consumer has gone away")]
    Closed,

    #[error("publisher lock poisoned")]
    Poisoned,
}

/// Sink for game events.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: &GameEvent) -> Result<(), PublishError>;
}

/// Publisher used when analytics are disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPublisher;

impl EventPublisher for NullPublisher {
    fn publish(&self, _event: &GameEvent) -> Result<(), PublishError> {
        Ok(())
    }
}

/// Emits each event as a structured `tracing` record, and optionally
/// appends it to a JSON-lines file.
#[derive(Debug, Default)]
pub struct LogPublisher {
    file: Option<Mutex<BufWriter<File>>>,
}

impl LogPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also append events to `path`, creating it if needed.
    pub fn with_event_log(path: &Path) -> Result<Self, PublishError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Some(Mutex::new(BufWriter::new(file))),
        })
    }
}

impl EventPublisher for LogPublisher {
    fn publish(&self, event: &GameEvent) -> Result<(), PublishError> {
        match event {
            GameEvent::SessionCompleted(e) => tracing::info!(
                target: "fourfold::analytics",
                game_id = %e.game_id,
                player = %e.player,
                opponent = %e.opponent,
                result = %e.result,
                duration_seconds = e.duration_seconds,
                is_bot = e.is_bot,
                "session_completed"
            ),
            GameEvent::MoveMade(e) => tracing::debug!(
                target: "fourfold::analytics",
                game_id = %e.game_id,
                player = %e.player,
                column = e.column,
                row = e.row,
                "move_made"
            ),
        }

        if let Some(file) = &self.file {
            let line = serde_json::to_string(event)?;
            let mut writer = file.lock().map_err(|_| PublishError::Poisoned)?;
            writeln!(writer, "{line}")?;
            writer.flush()?;
        }
        Ok(())
    }
}

/// Forwards events into a tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelPublisher {
    tx: mpsc::UnboundedSender<GameEvent>,
}

impl ChannelPublisher {
    pub fn new(tx: mpsc::UnboundedSender<GameEvent>) -> Self {
        Self { tx }
    }

    /// Publisher plus the receiving end.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<GameEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventPublisher for ChannelPublisher {
    fn publish(&self, event: &GameEvent) -> Result<(), PublishError> {
        self.tx.send(event.clone()).map_err(|_| PublishError::Closed)
    }
}

/// Hands every event to each inner publisher. The first failure is
/// returned after all of them have been tried.
#[derive(Default)]
pub struct FanoutPublisher {
    sinks: Vec<Box<dyn EventPublisher>>,
}

impl FanoutPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: impl EventPublisher + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl EventPublisher for FanoutPublisher {
    fn publish(&self, event: &GameEvent) -> Result<(), PublishError> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.publish(event) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

// ---------------------------------------------------------------------------
// Consumer
// ---------------------------------------------------------------------------

/// Running totals over the event stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    pub sessions_completed: u64,
    pub bot_sessions: u64,
    pub draws: u64,
    pub moves: u64,
    pub total_duration_seconds: i64,
}

impl Metrics {
    /// Mean session length in seconds; zero before the first completion.
    pub fn mean_duration_seconds(&self) -> f64 {
        if self.sessions_completed == 0 {
            0.0
        } else {
            self.total_duration_seconds as f64 / self.sessions_completed as f64
        }
    }
}

/// In-process analytics consumer.
#[derive(Debug, Default)]
pub struct MetricsAggregator {
    metrics: Metrics,
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn metrics(&self) -> Metrics {
        self.metrics
    }

    pub fn record(&mut self, event: &GameEvent) {
        match event {
            GameEvent::MoveMade(_) => self.metrics.moves += 1,
            GameEvent::SessionCompleted(e) => {
                let m = &mut self.metrics;
                m.sessions_completed += 1;
                m.total_duration_seconds += e.duration_seconds;
                if e.is_bot {
                    m.bot_sessions += 1;
                }
                if e.result == fourfold_game::DRAW_LABEL {
                    m.draws += 1;
                }
                tracing::info!(
                    target: "fourfold::analytics",
                    game_id = %e.game_id,
                    completed = m.sessions_completed,
                    bot_sessions = m.bot_sessions,
                    draws = m.draws,
                    mean_duration_seconds = m.mean_duration_seconds(),
                    "Session metrics updated"
                );
            }
        }
    }

    /// Consume events until every sender is dropped; returns the final totals.
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<GameEvent>) -> Metrics {
        while let Some(event) = events.recv().await {
            self.record(&event);
        }
        self.metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fourfold_game::Slot;

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn bot_loss() -> SessionRecord {
        let mut session = Session::against_bot(SessionId::from("g1"), "alice".into(), t0());
        session.apply_move(Slot::A, 3, t0()).unwrap();
        session.forfeit(Slot::A, t0() + chrono::Duration::seconds(40));
        SessionRecord::from_session(&session).unwrap()
    }

    #[test]
    fn test_event_wire_shape() {
        let event = GameEvent::session_completed(&bot_loss(), t0());
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["eventType"], "session_completed");
        assert_eq!(value["gameId"], "g1");
        assert_eq!(value["player"], "alice");
        assert_eq!(value["opponent"], "Bot");
        assert_eq!(value["result"], "Bot");
        assert_eq!(value["isBot"], true);
        assert_eq!(value["durationSeconds"], 40);
    }

    #[test]
    fn test_move_event_names_mover() {
        let mut session = Session::new(SessionId::from("g2"), "a".into(), "b".into(), t0());
        session.apply_move(Slot::A, 0, t0()).unwrap();
        let outcome = session.apply_move(Slot::B, 4, t0()).unwrap();
        let event = GameEvent::move_made(&session, outcome.mv, t0());
        match &event {
            GameEvent::MoveMade(m) => {
                assert_eq!(m.player, "b");
                assert_eq!(m.opponent, "a");
                assert_eq!((m.column, m.row), (4, 5));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(event.kind(), "move_made");
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["eventType"], "move_made");
    }

    #[test]
    fn test_channel_publisher_reports_closed_consumer() {
        let (publisher, rx) = ChannelPublisher::channel();
        let event = GameEvent::session_completed(&bot_loss(), t0());
        publisher.publish(&event).unwrap();
        drop(rx);
        assert!(matches!(publisher.publish(&event), Err(PublishError::Closed)));
    }

    #[test]
    fn test_log_publisher_appends_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("events.jsonl");
        let publisher = LogPublisher::with_event_log(&path).unwrap();
        let event = GameEvent::session_completed(&bot_loss(), t0());
        publisher.publish(&event).unwrap();
        publisher.publish(&event).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let decoded: GameEvent = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn test_fanout_tries_every_sink() {
        let (closed, rx_closed) = ChannelPublisher::channel();
        drop(rx_closed);
        let (open, mut rx_open) = ChannelPublisher::channel();
        let fanout = FanoutPublisher::new().with(closed).with(open).with(NullPublisher);
        assert_eq!(fanout.len(), 3);

        let event = GameEvent::session_completed(&bot_loss(), t0());
        assert!(matches!(fanout.publish(&event), Err(PublishError::Closed)));
        assert_eq!(rx_open.try_recv().unwrap(), event);
    }

    #[tokio::test]
    async fn test_aggregator_totals() {
        let (publisher, rx) = ChannelPublisher::channel();
        let record = bot_loss();
        let mut session = Session::new(SessionId::from("g3"), "a".into(), "b".into(), t0());
        let outcome = session.apply_move(Slot::A, 0, t0()).unwrap();

        publisher.publish(&GameEvent::move_made(&session, outcome.mv, t0())).unwrap();
        publisher.publish(&GameEvent::session_completed(&record, t0())).unwrap();
        drop(publisher);

        let metrics = MetricsAggregator::new().run(rx).await;
        assert_eq!(metrics.moves, 1);
        assert_eq!(metrics.sessions_completed, 1);
        assert_eq!(metrics.bot_sessions, 1);
        assert_eq!(metrics.draws, 0);
        assert_eq!(metrics.mean_duration_seconds(), 40.0);
    }
}
