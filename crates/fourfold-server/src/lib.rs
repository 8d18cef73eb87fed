//! Fourfold session server: matchmaking, the session coordinator,
//! persistence, analytics and the HTTP query API.

pub mod analytics;
pub mod api;
pub mod app;
pub mod error;
pub mod hub;
pub mod matchmaking;
pub mod persistence;
pub mod recorder;

pub use analytics::{
    ChannelPublisher, EventPublisher, FanoutPublisher, GameEvent, LogPublisher, Metrics,
    MetricsAggregator, NullPublisher, PublishError,
};
pub use api::{ApiError, ApiServer, ApiState};
pub use app::{App, StartupError};
pub use error::ValidationError;
pub use hub::{Command, Coordinator, HubConfig, HubHandle, HubStats};
pub use matchmaking::{MatchQueue, MatchRequest, Pairings};
pub use persistence::{MemoryStore, PersistenceError, PlayerStats, SessionRecord, SessionStore};
pub use recorder::{Recorder, RecorderHandle, RecorderJob};
