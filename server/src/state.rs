use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::config::Config;
use crate::db::{ChatStore, DbPool};
use crate::ws::SessionRegistry;

/// Per-session tunables, taken from [`Config`].
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Messages replayed to a connection on join
    pub history_limit: u32,
    /// Capacity of each connection's outbound queue
    pub outbound_buffer: usize,
    /// Upper bound on a single socket write
    pub send_timeout: Duration,
    /// Time between liveness pings
    pub ping_interval: Duration,
    /// Time a client has to answer a ping
    pub pong_timeout: Duration,
}

/// Frames a joining connection receives besides its backlog: the join
/// notice and the roster.
const JOIN_FRAMES: usize = 2;

impl SessionSettings {
    /// Outbound queue size for a new connection. Never smaller than the
    /// join burst, so backlog replay cannot evict the joiner itself.
    pub fn queue_capacity(&self) -> usize {
        let join_burst = usize::try_from(self.history_limit)
            .unwrap_or(usize::MAX)
            .saturating_add(JOIN_FRAMES);
        self.outbound_buffer.max(join_burst)
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            history_limit: 20,
            outbound_buffer: 256,
            send_timeout: Duration::from_secs(10),
            ping_interval: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(10),
        }
    }
}

impl From<&Config> for SessionSettings {
    fn from(config: &Config) -> Self {
        Self {
            history_limit: config.history_limit,
            outbound_buffer: config.outbound_buffer,
            send_timeout: Duration::from_secs(config.send_timeout_secs),
            ping_interval: Duration::from_secs(config.ping_interval_secs),
            pong_timeout: Duration::from_secs(config.pong_timeout_secs),
        }
    }
}

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// Message log and presence table
    pub store: ChatStore,
    /// Live connections
    pub registry: Arc<SessionRegistry>,
    /// Serializes every persist-then-broadcast and presence transition so
    /// that all clients observe one global order.
    pub sequencer: Arc<Mutex<()>>,
    pub settings: SessionSettings,
}

impl AppState {
    pub fn new(db: DbPool, settings: SessionSettings) -> Self {
        Self {
            store: ChatStore::new(db),
            registry: Arc::new(SessionRegistry::new()),
            sequencer: Arc::new(Mutex::new(())),
            settings,
        }
    }
}
