//! The session coordinator.
//!
//! A single [`Coordinator`] owns every live connection, every session and
//! the matchmaking queue. It runs as one tokio task (see [`Coordinator::run`])
//! so each connection event, timer expiry and query is applied to a
//! consistent state before the next one is looked at. Outbound
//! notifications use each connection's bounded queue and never wait; side
//! effects that touch the outside world go to the recorder.

mod handle;

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use fourfold_config::Config;
use fourfold_game::{
    BOT_NAME, FinishReason, MoveOutcome, Progress, Session, SessionId, SessionView, Slot,
    select_move,
};
use fourfold_net::{
    ClientMessage, ConnectionEvent, ConnectionId, GameMoveEvent, GameResultEvent, GameStart,
    Outbound, SendFailure, ServerMessage,
};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::AbortHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::analytics::GameEvent;
use crate::error::ValidationError;
use crate::matchmaking::{MatchQueue, MatchRequest};
use crate::persistence::SessionRecord;
use crate::recorder::{RecorderHandle, RecorderJob};

pub use handle::HubHandle;

/// Capacity of the coordinator's inbound channels.
const CHANNEL_CAPACITY: usize = 1024;

/// Message sent to connections when the coordinator stops.
const SHUTDOWN_NOTICE: &str = "Server is shutting down";

/// Timing knobs for the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubConfig {
    pub sweep_interval: Duration,
    pub bot_timeout: Duration,
    pub disconnect_grace: Duration,
    /// How long a finished session is kept for queries and rejoins.
    pub finished_retention: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(1),
            bot_timeout: Duration::from_secs(10),
            disconnect_grace: Duration::from_secs(30),
            finished_retention: Duration::from_secs(30),
        }
    }
}

impl From<&Config> for HubConfig {
    fn from(config: &Config) -> Self {
        Self {
            sweep_interval: config.matchmaking.sweep_interval(),
            bot_timeout: config.matchmaking.bot_timeout(),
            disconnect_grace: config.session.disconnect_grace(),
            finished_retention: config.session.finished_retention(),
        }
    }
}

/// Work for the coordinator other than connection events.
#[derive(Debug)]
pub enum Command {
    /// A disconnect grace period ran out. Only the timer with the same
    /// generation may resolve it.
    ForfeitExpired {
        session: SessionId,
        username: String,
        generation: u64,
    },
    /// Snapshot of one session.
    Session {
        id: SessionId,
        reply: oneshot::Sender<Option<SessionView>>,
    },
    Stats {
        reply: oneshot::Sender<HubStats>,
    },
    /// Notify every connection and stop.
    Shutdown,
}

/// Counters describing the coordinator's registries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HubStats {
    pub connections: usize,
    pub waiting: usize,
    pub active_sessions: usize,
    pub finished_sessions: usize,
    pub pending_forfeits: usize,
}

/// A live client as the coordinator sees it.
#[derive(Debug)]
struct Connection {
    username: Option<String>,
    outbound: Outbound,
    session: Option<SessionId>,
}

#[derive(Debug)]
struct ForfeitTimer {
    handle: AbortHandle,
    generation: u64,
    disconnected_at: DateTime<Utc>,
}

type ForfeitKey = (SessionId, String);

/// Owner of connections, sessions and the matchmaking queue.
pub struct Coordinator {
    config: HubConfig,
    connections: HashMap<ConnectionId, Connection>,
    sessions: HashMap<SessionId, Session>,
    queue: MatchQueue,
    forfeits: HashMap<ForfeitKey, ForfeitTimer>,
    next_generation: u64,
    /// When each finished session ended; evicted after the retention period.
    finished_at: HashMap<SessionId, Instant>,
    recorder: RecorderHandle,
    /// Lets forfeit timers report back without keeping the channel open.
    commands: mpsc::WeakSender<Command>,
}

impl Coordinator {
    /// Start the coordinator task.
    pub fn spawn(
        config: HubConfig,
        recorder: RecorderHandle,
    ) -> (HubHandle, tokio::task::JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let coordinator = Coordinator::new(config, recorder, command_tx.downgrade());
        let task = tokio::spawn(coordinator.run(event_rx, command_rx));
        (HubHandle::new(command_tx, event_tx), task)
    }

    fn new(
        config: HubConfig,
        recorder: RecorderHandle,
        commands: mpsc::WeakSender<Command>,
    ) -> Self {
        Self {
            config,
            connections: HashMap::new(),
            sessions: HashMap::new(),
            queue: MatchQueue::new(),
            forfeits: HashMap::new(),
            next_generation: 0,
            finished_at: HashMap::new(),
            recorder,
            commands,
        }
    }

    /// Process events, commands and sweeps until shut down or every
    /// [`HubHandle`] is dropped.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<ConnectionEvent>,
        mut commands: mpsc::Receiver<Command>,
    ) {
        let mut sweep = tokio::time::interval(self.config.sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut events_open = true;

        tracing::info!(
            "Coordinator running (sweep {:?}, bot after {:?}, grace {:?})",
            self.config.sweep_interval,
            self.config.bot_timeout,
            self.config.disconnect_grace
        );

        loop {
            tokio::select! {
                event = events.recv(), if events_open => match event {
                    Some(event) => self.handle_event(event),
                    None => events_open = false,
                },
                command = commands.recv() => match command {
                    Some(Command::Shutdown) => {
                        self.shutdown();
                        break;
                    }
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                _ = sweep.tick() => self.sweep(Instant::now()),
            }
        }

        for (_, timer) in self.forfeits.drain() {
            timer.handle.abort();
        }
        tracing::info!("Coordinator stopped");
    }

    fn handle_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Opened { id, peer, outbound } => {
                tracing::debug!("Connection {id:?} opened from {peer}");
                self.register(id, outbound);
            }
            ConnectionEvent::Message { id, message } => self.handle_message(id, message),
            ConnectionEvent::Closed { id } => self.unregister(id),
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::ForfeitExpired {
                session,
                username,
                generation,
            } => self.forfeit_expired(&session, &username, generation),
            Command::Session { id, reply } => {
                let _ = reply.send(self.session_view(&id));
            }
            Command::Stats { reply } => {
                let _ = reply.send(self.stats());
            }
            Command::Shutdown => self.shutdown(),
        }
    }

    fn handle_message(&mut self, id: ConnectionId, message: ClientMessage) {
        let result = match message {
            ClientMessage::Register(r) => self.request_match(id, &r.username, Instant::now()),
            ClientMessage::GameMove(m) => self.submit_move(id, m.column),
            ClientMessage::Rejoin(r) => self.rejoin(id, &r.game_id, r.username.as_deref()),
        };
        if let Err(e) = result {
            tracing::debug!("Rejected request from {id:?}: {e}");
            self.send_to(id, ServerMessage::error(e.to_string()));
        }
    }

    // -----------------------------------------------------------------------
    // Connection registry
    // -----------------------------------------------------------------------

    /// Add a live connection.
    pub fn register(&mut self, id: ConnectionId, outbound: Outbound) {
        self.connections.insert(
            id,
            Connection {
                username: None,
                outbound,
                session: None,
            },
        );
    }

    /// Remove a connection. A player leaving an active session starts the
    /// forfeit timer. Unknown ids are ignored.
    pub fn unregister(&mut self, id: ConnectionId) {
        let Some(conn) = self.connections.remove(&id) else {
            return;
        };
        if self.queue.remove_connection(id) {
            tracing::debug!("Dropped pending match request of {id:?}");
        }

        let (Some(session_id), Some(username)) = (conn.session, conn.username) else {
            return;
        };
        let active = self.sessions.get(&session_id).is_some_and(Session::is_active);
        if !active || self.is_present(&session_id, &username) {
            return;
        }

        tracing::info!(
            "Player {username} disconnected from session {session_id}; forfeit in {:?}",
            self.config.disconnect_grace
        );
        self.start_forfeit_timer(session_id, username);
    }

    /// Whether a live connection for `username` is bound to `session`.
    fn is_present(&self, session: &SessionId, username: &str) -> bool {
        self.connections
            .values()
            .any(|c| c.session.as_ref() == Some(session) && c.username.as_deref() == Some(username))
    }

    fn validate_username(username: &str) -> Result<&str, ValidationError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(ValidationError::UsernameMissing);
        }
        if username == BOT_NAME {
            return Err(ValidationError::UsernameReserved);
        }
        Ok(username)
    }

    /// True if `id` is bound to a session that is still being played.
    fn bound_to_active(&self, id: ConnectionId) -> Option<&SessionId> {
        let session = self.connections.get(&id)?.session.as_ref()?;
        self.sessions
            .get(session)
            .filter(|s| s.is_active())
            .map(Session::id)
    }

    // -----------------------------------------------------------------------
    // Matchmaking
    // -----------------------------------------------------------------------

    /// Set the connection's username and queue it for a match.
    pub fn request_match(
        &mut self,
        id: ConnectionId,
        username: &str,
        now: Instant,
    ) -> Result<(), ValidationError> {
        let username = Self::validate_username(username)?.to_string();
        if self.bound_to_active(id).is_some() {
            return Err(ValidationError::AlreadyInGame);
        }
        let Some(conn) = self.connections.get_mut(&id) else {
            return Ok(());
        };
        conn.session = None;
        conn.username = Some(username.clone());

        self.queue.remove_connection(id);
        if self.queue.enqueue(&username, id, now) {
            tracing::debug!("Replaced earlier match request for {username}");
        }
        tracing::info!("Player {username} registered and waiting for a match");
        Ok(())
    }

    /// Evict expired finished sessions, then pair waiting players and
    /// start sessions.
    pub fn sweep(&mut self, now: Instant) {
        self.evict_finished(now);
        if self.queue.is_empty() {
            return;
        }
        let connections = &self.connections;
        let pairings = self
            .queue
            .sweep(now, self.config.bot_timeout, |id| connections.contains_key(&id));

        if pairings.discarded > 0 {
            tracing::debug!("Discarded {} stale match requests", pairings.discarded);
        }
        for request in pairings.bot {
            self.start_bot_session(request);
        }
        for (first, second) in pairings.pairs {
            self.start_session(first, second);
        }
    }

    /// Drop finished sessions older than the retention period and unbind
    /// their connections. The store keeps the durable record.
    fn evict_finished(&mut self, now: Instant) {
        let retention = self.config.finished_retention;
        let expired: Vec<SessionId> = self
            .finished_at
            .iter()
            .filter(|(_, ended)| now.saturating_duration_since(**ended) >= retention)
            .map(|(id, _)| id.clone())
            .collect();
        for id in expired {
            self.finished_at.remove(&id);
            self.sessions.remove(&id);
            for conn in self.connections.values_mut() {
                if conn.session.as_ref() == Some(&id) {
                    conn.session = None;
                }
            }
            tracing::debug!("Evicted finished session {id}");
        }
    }

    fn start_session(&mut self, a: MatchRequest, b: MatchRequest) {
        let session = Session::new(
            SessionId::generate(),
            a.username.clone(),
            b.username.clone(),
            Utc::now(),
        );
        let id = session.id().clone();
        tracing::info!("Session {id} created: {} vs {}", a.username, b.username);
        self.sessions.insert(id.clone(), session);
        self.bind(a.connection, &id);
        self.bind(b.connection, &id);
        self.send_game_start(a.connection, &id, Slot::A);
        self.send_game_start(b.connection, &id, Slot::B);
    }

    fn start_bot_session(&mut self, request: MatchRequest) {
        let session =
            Session::against_bot(SessionId::generate(), request.username.clone(), Utc::now());
        let id = session.id().clone();
        tracing::info!("Session {id} created: {} vs {BOT_NAME}", request.username);
        self.sessions.insert(id.clone(), session);
        self.bind(request.connection, &id);
        self.send_game_start(request.connection, &id, Slot::A);
    }

    fn bind(&mut self, connection: ConnectionId, session: &SessionId) {
        if let Some(conn) = self.connections.get_mut(&connection) {
            conn.session = Some(session.clone());
        }
    }

    fn send_game_start(&self, connection: ConnectionId, session: &SessionId, slot: Slot) {
        let Some(s) = self.sessions.get(session) else {
            return;
        };
        let msg = ServerMessage::GameStart(GameStart {
            game_id: session.clone(),
            player1: s.player(Slot::A).to_string(),
            player2: s.player(Slot::B).to_string(),
            is_bot: s.is_bot(),
            your_turn: s.is_active() && s.turn() == slot,
        });
        self.send_to(connection, msg);
    }

    // -----------------------------------------------------------------------
    // Moves
    // -----------------------------------------------------------------------

    /// Play `column` for the player on connection `id`.
    pub fn submit_move(&mut self, id: ConnectionId, column: i64) -> Result<(), ValidationError> {
        let conn = self.connections.get(&id).ok_or(ValidationError::NotInGame)?;
        let session_id = conn.session.clone().ok_or(ValidationError::NotInGame)?;
        let username = conn.username.clone().ok_or(ValidationError::NotInGame)?;

        let session = self
            .sessions
            .get_mut(&session_id)
            .ok_or(ValidationError::UnknownSession)?;
        if !session.is_active() {
            return Err(ValidationError::Finished);
        }
        let slot = session
            .slot_of(&username)
            .ok_or(ValidationError::NotParticipant)?;
        // Negative or oversized input is out of range rather than a parse error.
        let column = usize::try_from(column).unwrap_or(usize::MAX);
        let outcome = session.apply_move(slot, column, Utc::now())?;

        self.after_move(&session_id, outcome);
        self.play_bot_turns(&session_id);
        Ok(())
    }

    /// Let the bot move for as long as it holds the turn.
    fn play_bot_turns(&mut self, session_id: &SessionId) {
        loop {
            let Some(session) = self.sessions.get_mut(session_id) else {
                return;
            };
            if !session.is_active() || !session.is_bot_slot(session.turn()) {
                return;
            }
            let me = session.turn();
            let Some(column) = select_move(session.board(), me, me.other()) else {
                return;
            };
            match session.apply_move(me, column, Utc::now()) {
                Ok(outcome) => self.after_move(session_id, outcome),
                Err(e) => {
                    tracing::error!("Bot move in column {column} rejected in {session_id}: {e}");
                    return;
                }
            }
        }
    }

    /// Broadcast an accepted move and, if it ended the game, the result.
    fn after_move(&mut self, session_id: &SessionId, outcome: MoveOutcome) {
        let Some(session) = self.sessions.get(session_id) else {
            return;
        };
        let mv = outcome.mv;
        self.recorder
            .submit(RecorderJob::Move(GameEvent::move_made(session, mv, Utc::now())));
        self.broadcast_session(
            session_id,
            ServerMessage::GameMove(GameMoveEvent {
                game_id: session_id.clone(),
                column: mv.column,
                row: mv.row,
                player: mv.slot.code(),
                board: session.board().grid(),
            }),
        );

        let win_cell = match outcome.progress {
            Progress::Continue { .. } => return,
            Progress::Won => Some((mv.row, mv.column)),
            Progress::Draw => None,
        };
        self.finish_session(session_id, win_cell);
    }

    /// Announce the result of a session that just finished and hand it to
    /// the recorder.
    fn finish_session(&mut self, session_id: &SessionId, win_cell: Option<(usize, usize)>) {
        let Some(session) = self.sessions.get(session_id) else {
            return;
        };
        let Some(record) = SessionRecord::from_session(session) else {
            return;
        };
        tracing::info!(
            "Session {session_id} finished: {} ({:?})",
            record.winner,
            record.finish_reason
        );

        self.broadcast_session(
            session_id,
            ServerMessage::GameResult(GameResultEvent {
                game_id: session_id.clone(),
                winner: record.winner.clone(),
                win_row: win_cell.map(|(row, _)| row),
                win_col: win_cell.map(|(_, col)| col),
            }),
        );

        self.forfeits.retain(|(sid, _), timer| {
            if sid == session_id {
                timer.handle.abort();
                false
            } else {
                true
            }
        });
        self.finished_at.insert(session_id.clone(), Instant::now());
        self.recorder.submit(RecorderJob::Completed(record));
    }

    // -----------------------------------------------------------------------
    // Disconnects
    // -----------------------------------------------------------------------

    /// Bind connection `id` to an existing session it is a player of.
    pub fn rejoin(
        &mut self,
        id: ConnectionId,
        session_id: &SessionId,
        username: Option<&str>,
    ) -> Result<(), ValidationError> {
        let asserted = username.map(Self::validate_username).transpose()?;
        let conn = self.connections.get(&id).ok_or(ValidationError::NotInGame)?;
        if self
            .bound_to_active(id)
            .is_some_and(|bound| bound != session_id)
        {
            return Err(ValidationError::AlreadyInGame);
        }
        let username = asserted
            .or(conn.username.as_deref())
            .ok_or(ValidationError::UsernameMissing)?
            .to_string();

        let session = self
            .sessions
            .get(session_id)
            .ok_or(ValidationError::UnknownSession)?;
        let slot = session
            .slot_of(&username)
            .ok_or(ValidationError::NotParticipant)?;

        if let Some(conn) = self.connections.get_mut(&id) {
            conn.username = Some(username.clone());
            conn.session = Some(session_id.clone());
        }
        self.queue.remove_connection(id);

        match self.forfeits.remove(&(session_id.clone(), username.clone())) {
            Some(timer) => {
                timer.handle.abort();
                let away = (Utc::now() - timer.disconnected_at).num_seconds();
                tracing::info!("Player {username} rejoined session {session_id} after {away}s");
            }
            None => tracing::info!("Player {username} rejoined session {session_id}"),
        }

        self.send_game_start(id, session_id, slot);
        self.resend_position(id, session_id);
        Ok(())
    }

    /// Bring a rejoining connection up to date: the latest board, and the
    /// result if the session already ended.
    fn resend_position(&self, id: ConnectionId, session_id: &SessionId) {
        let Some(session) = self.sessions.get(session_id) else {
            return;
        };
        if let Some(mv) = session.last_move() {
            self.send_to(
                id,
                ServerMessage::GameMove(GameMoveEvent {
                    game_id: session_id.clone(),
                    column: mv.column,
                    row: mv.row,
                    player: mv.slot.code(),
                    board: session.board().grid(),
                }),
            );
        }
        if let Some(winner) = session.result_label() {
            let won_on_board = session.finish_reason() == Some(FinishReason::FourInARow);
            let cell = session.last_move().filter(|_| won_on_board);
            self.send_to(
                id,
                ServerMessage::GameResult(GameResultEvent {
                    game_id: session_id.clone(),
                    winner: winner.to_string(),
                    win_row: cell.map(|m| m.row),
                    win_col: cell.map(|m| m.column),
                }),
            );
        }
    }

    fn start_forfeit_timer(&mut self, session: SessionId, username: String) {
        let grace = self.config.disconnect_grace;
        let commands = self.commands.clone();
        self.next_generation += 1;
        let generation = self.next_generation;
        let expired = Command::ForfeitExpired {
            session: session.clone(),
            username: username.clone(),
            generation,
        };
        let task = tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            if let Some(tx) = commands.upgrade() {
                let _ = tx.send(expired).await;
            }
        });

        let timer = ForfeitTimer {
            handle: task.abort_handle(),
            generation,
            disconnected_at: Utc::now(),
        };
        if let Some(previous) = self.forfeits.insert((session, username), timer) {
            previous.handle.abort();
        }
    }

    /// Resolve a forfeit if `generation` is still the pending timer and the
    /// player is still gone. Otherwise a no-op.
    pub fn forfeit_expired(&mut self, session_id: &SessionId, username: &str, generation: u64) {
        let key = (session_id.clone(), username.to_string());
        match self.forfeits.get(&key) {
            Some(timer) if timer.generation == generation => {
                self.forfeits.remove(&key);
            }
            _ => {
                tracing::debug!("Stale forfeit timer for {username} in {session_id} ignored");
                return;
            }
        }

        if self.is_present(session_id, username) {
            tracing::debug!("Forfeit for {username} in {session_id} skipped: player is back");
            return;
        }
        let Some(session) = self.sessions.get_mut(session_id) else {
            return;
        };
        let Some(slot) = session.slot_of(username) else {
            return;
        };
        if !session.forfeit(slot, Utc::now()) {
            return;
        }
        tracing::info!("Player {username} forfeited session {session_id}");
        self.finish_session(session_id, None);
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn session_view(&self, id: &SessionId) -> Option<SessionView> {
        self.sessions.get(id).map(Session::view)
    }

    pub fn stats(&self) -> HubStats {
        let active = self.sessions.values().filter(|s| s.is_active()).count();
        HubStats {
            connections: self.connections.len(),
            waiting: self.queue.len(),
            active_sessions: active,
            finished_sessions: self.sessions.len() - active,
            pending_forfeits: self.forfeits.len(),
        }
    }

    // -----------------------------------------------------------------------
    // Broadcast
    // -----------------------------------------------------------------------

    fn send_to(&self, id: ConnectionId, msg: ServerMessage) {
        if let Some(conn) = self.connections.get(&id) {
            Self::deliver(id, conn, msg);
        }
    }

    /// Send to every connection bound to `session`.
    fn broadcast_session(&self, session: &SessionId, msg: ServerMessage) {
        for (id, conn) in &self.connections {
            if conn.session.as_ref() == Some(session) {
                Self::deliver(*id, conn, msg.clone());
            }
        }
    }

    /// Send to every live connection.
    fn broadcast_all(&self, msg: ServerMessage) {
        for (id, conn) in &self.connections {
            Self::deliver(*id, conn, msg.clone());
        }
    }

    fn deliver(id: ConnectionId, conn: &Connection, msg: ServerMessage) {
        let kind = msg.kind();
        match conn.outbound.try_send(msg) {
            Ok(()) => {}
            Err(SendFailure::Full) => {
                tracing::warn!("Outbound queue of {id:?} full; dropped {kind}");
            }
            Err(SendFailure::Closed) => {
                tracing::debug!("Connection {id:?} closed; dropped {kind}");
            }
        }
    }

    fn shutdown(&mut self) {
        tracing::info!(
            "Coordinator shutting down with {} connections",
            self.connections.len()
        );
        self.broadcast_all(ServerMessage::error(SHUTDOWN_NOTICE));
    }
}
