//! Storage of completed sessions and per-player win/loss/draw tallies.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use fourfold_game::{FinishReason, GameResult, Grid, Session, SessionId, Slot, Status};
use serde::{Deserialize, Serialize};

/// Failure inside a [`SessionStore`]. Logged by the caller, never shown to
/// players.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("store lock poisoned")]
    Poisoned,

    #[error("session {0} is not finished")]
    NotFinished(SessionId),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Final state of a finished session, as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: SessionId,
    pub player1: String,
    pub player2: String,
    /// Winner username, `"Bot"`, or `"draw"`.
    pub winner: String,
    pub result: GameResult,
    pub finish_reason: FinishReason,
    pub is_bot: bool,
    pub status: Status,
    pub board: Grid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub duration_seconds: i64,
}

impl SessionRecord {
    /// Capture a finished session. `None` while it is still active.
    pub fn from_session(session: &Session) -> Option<Self> {
        let result = session.result()?;
        let finish_reason = session.finish_reason()?;
        Some(Self {
            id: session.id().clone(),
            player1: session.player(Slot::A).to_string(),
            player2: session.player(Slot::B).to_string(),
            winner: session.result_label()?.to_string(),
            result,
            finish_reason,
            is_bot: session.is_bot(),
            status: session.status(),
            board: session.board().grid(),
            created_at: session.created_at(),
            updated_at: session.updated_at(),
            duration_seconds: session.duration_secs(),
        })
    }

    fn player(&self, slot: Slot) -> &str {
        match slot {
            Slot::A => &self.player1,
            Slot::B => &self.player2,
        }
    }
}

/// Aggregate results for one player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStats {
    pub username: String,
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
    /// `wins / (wins + losses + draws)` as a percentage, e.g. `"66.67%"`.
    pub win_rate: String,
    /// First time the player appeared in a completed session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl PlayerStats {
    /// Zeroed stats for a player with no recorded sessions.
    pub fn empty(username: &str) -> Self {
        Self {
            username: username.to_string(),
            wins: 0,
            losses: 0,
            draws: 0,
            win_rate: format_win_rate(0, 0),
            created_at: None,
        }
    }
}

/// Percentage with two decimals and a `%` sign. Zero games is `"0.00%"`.
pub fn format_win_rate(wins: u32, total: u32) -> String {
    let rate = if total == 0 {
        0.0
    } else {
        f64::from(wins) / f64::from(total) * 100.0
    };
    format!("{rate:.2}%")
}

/// Durable home of completed sessions and player aggregates.
pub trait SessionStore: Send + Sync {
    /// Store a completed session and update player stats.
    ///
    /// Idempotent per session id: returns `Ok(false)` and changes nothing if
    /// the id was already recorded.
    fn record_completed_session(&self, record: &SessionRecord) -> Result<bool, PersistenceError>;

    /// Players with at least one game, most wins first, ties by username.
    fn leaderboard(&self, limit: usize) -> Result<Vec<PlayerStats>, PersistenceError>;

    /// Stats for `username`; zeroed for unknown players.
    fn player_stats(&self, username: &str) -> Result<PlayerStats, PersistenceError>;

    /// A previously recorded session.
    fn session(&self, id: &SessionId) -> Result<Option<SessionRecord>, PersistenceError>;
}

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    wins: u32,
    losses: u32,
    draws: u32,
}

impl Tally {
    fn total(&self) -> u32 {
        self.wins + self.losses + self.draws
    }
}

#[derive(Debug, Default)]
struct StoreState {
    sessions: HashMap<SessionId, SessionRecord>,
    players: HashMap<String, (Tally, DateTime<Utc>)>,
}

impl StoreState {
    fn tally(&mut self, username: &str, at: DateTime<Utc>) -> &mut Tally {
        &mut self
            .players
            .entry(username.to_string())
            .or_insert_with(|| (Tally::default(), at))
            .0
    }

    fn stats(&self, username: &str) -> Option<PlayerStats> {
        self.players.get(username).map(|(tally, first_seen)| PlayerStats {
            username: username.to_string(),
            wins: tally.wins,
            losses: tally.losses,
            draws: tally.draws,
            win_rate: format_win_rate(tally.wins, tally.total()),
            created_at: Some(*first_seen),
        })
    }
}

/// In-process [`SessionStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_count(&self) -> usize {
        self.state.lock().map(|s| s.sessions.len()).unwrap_or(0)
    }
}

impl SessionStore for MemoryStore {
    fn record_completed_session(&self, record: &SessionRecord) -> Result<bool, PersistenceError> {
        if record.status != Status::Finished {
            return Err(PersistenceError::NotFinished(record.id.clone()));
        }
        let mut state = self.state.lock().map_err(|_| PersistenceError::Poisoned)?;
        if state.sessions.contains_key(&record.id) {
            return Ok(false);
        }

        let at = record.updated_at;
        match record.result.winner() {
            Some(slot) if record.is_bot && slot == Slot::B => {
                state.tally(&record.player1, at).losses += 1;
            }
            Some(slot) => {
                state.tally(record.player(slot), at).wins += 1;
                if !record.is_bot {
                    state.tally(record.player(slot.other()), at).losses += 1;
                }
            }
            None => {
                state.tally(&record.player1, at).draws += 1;
                if !record.is_bot {
                    state.tally(&record.player2, at).draws += 1;
                }
            }
        }

        state.sessions.insert(record.id.clone(), record.clone());
        Ok(true)
    }

    fn leaderboard(&self, limit: usize) -> Result<Vec<PlayerStats>, PersistenceError> {
        let state = self.state.lock().map_err(|_| PersistenceError::Poisoned)?;
        let mut rows: Vec<PlayerStats> = state
            .players
            .iter()
            .filter(|(_, (tally, _))| tally.total() > 0)
            .filter_map(|(name, _)| state.stats(name))
            .collect();
        rows.sort_by(|a, b| b.wins.cmp(&a.wins).then_with(|| a.username.cmp(&b.username)));
        rows.truncate(limit);
        Ok(rows)
    }

    fn player_stats(&self, username: &str) -> Result<PlayerStats, PersistenceError> {
        let state = self.state.lock().map_err(|_| PersistenceError::Poisoned)?;
        Ok(state
            .stats(username)
            .unwrap_or_else(|| PlayerStats::empty(username)))
    }

    fn session(&self, id: &SessionId) -> Result<Option<SessionRecord>, PersistenceError> {
        let state = self.state.lock().map_err(|_| PersistenceError::Poisoned)?;
        Ok(state.sessions.get(id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fourfold_game::BOT_NAME;

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    /// Play columns alternately from slot A until the session finishes.
    fn finished(mut session: Session, columns: &[usize]) -> SessionRecord {
        for &column in columns {
            let slot = session.turn();
            session.apply_move(slot, column, t0()).unwrap();
        }
        SessionRecord::from_session(&session).unwrap()
    }

    fn a_wins(a: &str, b: &str, id: &str) -> SessionRecord {
        let session = Session::new(SessionId::from(id), a.into(), b.into(), t0());
        finished(session, &[0, 1, 0, 1, 0, 1, 0])
    }

    fn b_wins(a: &str, b: &str, id: &str) -> SessionRecord {
        let session = Session::new(SessionId::from(id), a.into(), b.into(), t0());
        finished(session, &[0, 1, 0, 1, 0, 1, 6, 1])
    }

    fn forfeited_to_bot(player: &str, id: &str) -> SessionRecord {
        let mut session = Session::against_bot(SessionId::from(id), player.into(), t0());
        assert!(session.forfeit(Slot::A, t0()));
        SessionRecord::from_session(&session).unwrap()
    }

    fn draw(a: &str, b: &str, id: &str) -> SessionRecord {
        let session = Session::new(SessionId::from(id), a.into(), b.into(), t0());
        finished(
            session,
            &[
                0, 1, 0, 1, 1, 0, 1, 0, 0, 1, 0, 1, //
                2, 3, 2, 3, 3, 2, 3, 2, 2, 3, 2, 3, //
                4, 5, 4, 5, 5, 4, 5, 4, 4, 5, 4, 5, //
                6, 6, 6, 6, 6, 6,
            ],
        )
    }

    #[test]
    fn test_record_is_built_only_for_finished_sessions() {
        let session = Session::new(SessionId::from("g"), "a".into(), "b".into(), t0());
        assert!(SessionRecord::from_session(&session).is_none());
        let record = a_wins("alice", "bob", "g1");
        assert_eq!(record.winner, "alice");
        assert_eq!(record.finish_reason, FinishReason::FourInARow);
        assert_eq!(record.status, Status::Finished);
    }

    #[test]
    fn test_human_win_updates_both_players() {
        let store = MemoryStore::new();
        assert!(store.record_completed_session(&a_wins("alice", "bob", "g1")).unwrap());
        assert!(store.record_completed_session(&b_wins("alice", "bob", "g2")).unwrap());
        assert!(store.record_completed_session(&a_wins("alice", "bob", "g3")).unwrap());

        let alice = store.player_stats("alice").unwrap();
        assert_eq!((alice.wins, alice.losses, alice.draws), (2, 1, 0));
        assert_eq!(alice.win_rate, "66.67%");
        let bob = store.player_stats("bob").unwrap();
        assert_eq!((bob.wins, bob.losses), (1, 2));
        assert_eq!(bob.win_rate, "33.33%");
    }

    #[test]
    fn test_recording_twice_is_a_no_op() {
        let store = MemoryStore::new();
        let record = a_wins("alice", "bob", "g1");
        assert!(store.record_completed_session(&record).unwrap());
        assert!(!store.record_completed_session(&record).unwrap());
        assert_eq!(store.player_stats("alice").unwrap().wins, 1);
        assert_eq!(store.session_count(), 1);
    }

    #[test]
    fn test_bot_win_counts_as_human_loss_and_bot_untracked() {
        let store = MemoryStore::new();
        let record = forfeited_to_bot("carol", "g1");
        assert_eq!(record.winner, BOT_NAME);
        store.record_completed_session(&record).unwrap();

        let carol = store.player_stats("carol").unwrap();
        assert_eq!((carol.wins, carol.losses), (0, 1));
        assert_eq!(carol.win_rate, "0.00%");
        assert!(store.player_stats(BOT_NAME).unwrap().created_at.is_none());
        assert!(
            store
                .leaderboard(10)
                .unwrap()
                .iter()
                .all(|p| p.username != BOT_NAME)
        );
    }

    #[test]
    fn test_draw_counts_for_each_human() {
        let store = MemoryStore::new();
        let record = draw("alice", "bob", "g1");
        assert_eq!(record.winner, "draw");
        store.record_completed_session(&record).unwrap();
        assert_eq!(store.player_stats("alice").unwrap().draws, 1);
        assert_eq!(store.player_stats("bob").unwrap().draws, 1);
    }

    #[test]
    fn test_unknown_player_has_zero_stats() {
        let store = MemoryStore::new();
        assert_eq!(store.player_stats("nobody").unwrap(), PlayerStats::empty("nobody"));
        assert_eq!(PlayerStats::empty("x").win_rate, "0.00%");
    }

    #[test]
    fn test_leaderboard_order_and_limit() {
        let store = MemoryStore::new();
        store.record_completed_session(&a_wins("zed", "amy", "g1")).unwrap();
        store.record_completed_session(&a_wins("zed", "amy", "g2")).unwrap();
        store.record_completed_session(&a_wins("bea", "amy", "g3")).unwrap();
        store.record_completed_session(&a_wins("abe", "amy", "g4")).unwrap();

        let board = store.leaderboard(10).unwrap();
        let names: Vec<&str> = board.iter().map(|p| p.username.as_str()).collect();
        assert_eq!(names, ["zed", "abe", "bea", "amy"]);

        assert_eq!(store.leaderboard(2).unwrap().len(), 2);
    }

    #[test]
    fn test_stored_session_is_retrievable() {
        let store = MemoryStore::new();
        let record = a_wins("alice", "bob", "g1");
        store.record_completed_session(&record).unwrap();
        assert_eq!(store.session(&SessionId::from("g1")).unwrap(), Some(record));
        assert_eq!(store.session(&SessionId::from("g2")).unwrap(), None);
    }

    #[test]
    fn test_win_rate_format() {
        assert_eq!(format_win_rate(2, 3), "66.67%");
        assert_eq!(format_win_rate(1, 1), "100.00%");
        assert_eq!(format_win_rate(0, 0), "0.00%");
    }
}
