//! Wiring of the whole server from a [`Config`].

use std::net::SocketAddr;
use std::sync::Arc;

use fourfold_config::{AnalyticsConfig, Config};
use fourfold_net::{FrameConfig, GameServer, ServerConfig};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::analytics::{
    ChannelPublisher, EventPublisher, FanoutPublisher, LogPublisher, Metrics, MetricsAggregator,
    NullPublisher, PublishError,
};
use crate::api::{ApiError, ApiServer, ApiState};
use crate::hub::{Coordinator, HubConfig, HubHandle};
use crate::persistence::{MemoryStore, SessionStore};
use crate::recorder::Recorder;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("Failed to bind game server to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Failed to open event log: {0}")]
    EventLog(#[from] PublishError),
}

/// A running server: game socket, coordinator, recorder and query API.
pub struct App {
    hub: HubHandle,
    server: Arc<GameServer>,
    game_addr: SocketAddr,
    api: Option<ApiServer>,
    store: Arc<MemoryStore>,
    coordinator: JoinHandle<()>,
    recorder: JoinHandle<()>,
    accept_loop: JoinHandle<std::io::Result<()>>,
    metrics: Option<JoinHandle<Metrics>>,
}

impl App {
    /// Bind the sockets and start every task.
    pub async fn start(config: &Config) -> Result<Self, StartupError> {
        let (publisher, metrics) = build_publisher(&config.analytics)?;
        let store = Arc::new(MemoryStore::new());
        let (recorder_handle, recorder) = Recorder::new(store.clone(), publisher).spawn();
        let (hub, coordinator) = Coordinator::spawn(HubConfig::from(config), recorder_handle);

        let bind_addr = config.server.socket_addr();
        let listener = TcpListener::bind(bind_addr)
            .await
            .map_err(|source| StartupError::Bind {
                addr: bind_addr,
                source,
            })?;
        let game_addr = listener.local_addr().map_err(|source| StartupError::Bind {
            addr: bind_addr,
            source,
        })?;

        let server = Arc::new(GameServer::new(
            ServerConfig {
                bind_addr: game_addr,
                max_connections: config.server.max_connections,
                outbound_queue: config.server.outbound_queue,
                frame: FrameConfig {
                    max_payload_size: config.server.max_frame_bytes,
                },
            },
            hub.events(),
        ));
        let accept_loop = {
            let server = server.clone();
            tokio::spawn(async move { server.run_with_listener(listener).await })
        };
        tracing::info!("Game server listening on {game_addr}");

        let api = if config.api.enabled {
            let mut api = ApiServer::new(config.api_addr());
            api.start(ApiState {
                hub: hub.clone(),
                store: store.clone() as Arc<dyn SessionStore>,
                leaderboard_limit: config.api.leaderboard_limit,
            })?;
            Some(api)
        } else {
            tracing::info!("Query API disabled");
            None
        };

        Ok(Self {
            hub,
            server,
            game_addr,
            api,
            store,
            coordinator,
            recorder,
            accept_loop,
            metrics,
        })
    }

    pub fn game_addr(&self) -> SocketAddr {
        self.game_addr
    }

    /// Port of the query API, if it is running.
    pub fn api_port(&self) -> Option<u16> {
        self.api.as_ref().map(ApiServer::actual_port)
    }

    pub fn hub(&self) -> &HubHandle {
        &self.hub
    }

    pub fn store(&self) -> Arc<MemoryStore> {
        self.store.clone()
    }

    /// Notify players, stop accepting, and let the recorder drain.
    /// Returns the analytics totals when analytics were enabled.
    pub async fn shutdown(self) -> Option<Metrics> {
        let App {
            hub,
            server,
            api,
            coordinator,
            recorder,
            accept_loop,
            metrics,
            ..
        } = self;

        if let Some(mut api) = api
            && tokio::task::spawn_blocking(move || api.stop()).await.is_err()
        {
            tracing::error!("Query API shutdown panicked");
        }

        hub.shutdown().await;
        drop(hub);
        if let Err(e) = coordinator.await {
            tracing::error!("Coordinator task failed: {e}");
        }

        server.shutdown();
        match accept_loop.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!("Accept loop failed: {e}"),
            Err(e) => tracing::error!("Accept loop task failed: {e}"),
        }

        if let Err(e) = recorder.await {
            tracing::error!("Recorder task failed: {e}");
        }

        let totals = match metrics {
            Some(task) => task.await.ok(),
            None => None,
        };
        if let Some(m) = totals {
            tracing::info!(
                "Served {} sessions ({} against the bot, {} draws, {} moves)",
                m.sessions_completed,
                m.bot_sessions,
                m.draws,
                m.moves
            );
        }
        totals
    }
}

/// The event sink chosen by the analytics settings, plus the in-process
/// consumer task when analytics are on.
fn build_publisher(
    config: &AnalyticsConfig,
) -> Result<(Arc<dyn EventPublisher>, Option<JoinHandle<Metrics>>), PublishError> {
    if !config.enabled {
        return Ok((Arc::new(NullPublisher), None));
    }
    let log = match &config.event_log {
        Some(path) => LogPublisher::with_event_log(path)?,
        None => LogPublisher::new(),
    };
    let (channel, events) = ChannelPublisher::channel();
    let metrics = tokio::spawn(MetricsAggregator::new().run(events));
    let publisher = FanoutPublisher::new().with(log).with(channel);
    Ok((Arc::new(publisher), Some(metrics)))
}
