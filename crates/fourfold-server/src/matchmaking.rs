//! Waiting players, in arrival order.

use std::time::Duration;

use fourfold_net::ConnectionId;
use tokio::time::Instant;

/// One player waiting for an opponent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchRequest {
    pub username: String,
    pub connection: ConnectionId,
    pub enqueued_at: Instant,
}

/// What one sweep decided.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Pairings {
    /// Waited past the timeout; each gets a bot game.
    pub bot: Vec<MatchRequest>,
    /// Human pairs, earliest arrivals first. The first of each pair moves first.
    pub pairs: Vec<(MatchRequest, MatchRequest)>,
    /// Requests dropped because their connection is gone.
    pub discarded: usize,
}

#[derive(Debug, Default)]
pub struct MatchQueue {
    requests: Vec<MatchRequest>,
}

impl MatchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `username`. An earlier request for the same username is
    /// replaced and the new one goes to the back with a fresh timestamp.
    /// Returns `true` when something was replaced.
    pub fn enqueue(&mut self, username: &str, connection: ConnectionId, now: Instant) -> bool {
        let before = self.requests.len();
        self.requests.retain(|r| r.username != username);
        let replaced = self.requests.len() != before;
        self.requests.push(MatchRequest {
            username: username.to_string(),
            connection,
            enqueued_at: now,
        });
        replaced
    }

    /// Drop any request owned by `connection`.
    pub fn remove_connection(&mut self, connection: ConnectionId) -> bool {
        let before = self.requests.len();
        self.requests.retain(|r| r.connection != connection);
        self.requests.len() != before
    }

    pub fn contains(&self, username: &str) -> bool {
        self.requests.iter().any(|r| r.username == username)
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MatchRequest> {
        self.requests.iter()
    }

    /// Decide matches at `now`.
    ///
    /// Requests whose connection fails `is_live` are discarded. Requests
    /// at least `bot_timeout` old leave the queue for a bot game. The rest
    /// pair off two at a time in arrival order; an odd one out stays queued.
    pub fn sweep(
        &mut self,
        now: Instant,
        bot_timeout: Duration,
        is_live: impl Fn(ConnectionId) -> bool,
    ) -> Pairings {
        let mut pairings = Pairings::default();
        let mut waiting = Vec::with_capacity(self.requests.len());

        for request in self.requests.drain(..) {
            if !is_live(request.connection) {
                pairings.discarded += 1;
            } else if now.saturating_duration_since(request.enqueued_at) >= bot_timeout {
                pairings.bot.push(request);
            } else {
                waiting.push(request);
            }
        }

        let mut candidates = waiting.into_iter();
        while let Some(first) = candidates.next() {
            match candidates.next() {
                Some(second) => pairings.pairs.push((first, second)),
                None => self.requests.push(first),
            }
        }
        pairings
    }
}
