use axum::extract::ws::Message;
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use uuid::Uuid;

/// Why a frame could not be queued for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendFailure {
    /// Outbound queue is at capacity (slow consumer).
    Full,
    /// Writer task is gone.
    Closed,
}

/// Handle to one live duplex channel.
///
/// Cloning is cheap; all clones refer to the same outbound queue and the
/// same eviction signal. The receiving half of the queue is owned by the
/// connection's writer task.
#[derive(Debug, Clone)]
pub struct Connection {
    id: Uuid,
    outbound: mpsc::Sender<Message>,
    evicted: Arc<Notify>,
}

impl Connection {
    /// Create a handle with a bounded outbound queue of `buffer` frames.
    pub fn open(buffer: usize) -> (Self, mpsc::Receiver<Message>) {
        let (outbound, rx) = mpsc::channel(buffer.max(1));
        let connection = Self {
            id: Uuid::new_v4(),
            outbound,
            evicted: Arc::new(Notify::new()),
        };
        (connection, rx)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Queue a frame without waiting.
    pub fn send(&self, message: Message) -> Result<(), SendFailure> {
        self.outbound.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendFailure::Full,
            mpsc::error::TrySendError::Closed(_) => SendFailure::Closed,
        })
    }

    /// Flag this connection for removal. The owning session observes it
    /// through [`Connection::evicted`] and tears itself down.
    pub fn evict(&self) {
        self.evicted.notify_one();
    }

    /// Resolves once [`Connection::evict`] has been called.
    pub async fn evicted(&self) {
        self.evicted.notified().await;
    }
}
