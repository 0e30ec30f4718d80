use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, Stream, StreamExt};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, timeout};

use crate::chat::session::ChatSession;
use crate::state::AppState;
use crate::ws::Connection;

/// Run the actor-per-connection pattern for one chat WebSocket.
///
/// Splits the WebSocket into reader and writer halves:
/// - Writer task: owns the sink, drains the connection's bounded queue
/// - Ping task: sends periodic pings and evicts on a missed pong
/// - Reader loop: feeds text frames to the [`ChatSession`]
///
/// The loop ends on remote close, socket error, store failure, or when the
/// connection is evicted by a failed delivery; the session then leaves.
pub async fn run_connection(socket: WebSocket, state: AppState, requested_name: Option<String>) {
    let (ws_sender, ws_receiver) = socket.split();
    let settings = state.settings.clone();
    let (connection, rx) = Connection::open(settings.queue_capacity());

    let writer_handle = tokio::spawn(writer_task(
        ws_sender,
        rx,
        connection.clone(),
        settings.send_timeout,
    ));

    let mut session = ChatSession::new(state, connection.clone());

    if let Err(e) = session.join(requested_name.as_deref()).await {
        tracing::warn!(
            connection_id = %connection.id(),
            error = %e,
            "Join failed, closing connection"
        );
        session.leave().await;
        writer_handle.abort();
        return;
    }

    // Latest-value slot: only a pong seen after the current ping counts
    let (pong_tx, pong_rx) = watch::channel(());
    let ping_handle = tokio::spawn(ping_task(
        connection.clone(),
        pong_rx,
        settings.ping_interval,
        settings.pong_timeout,
    ));

    drive_session(session, &connection, ws_receiver, &pong_tx).await;

    // Cleanup: abort writer and ping tasks
    ping_handle.abort();
    writer_handle.abort();
}

/// Reader loop for an active session, followed by its leave.
async fn drive_session<S>(
    mut session: ChatSession,
    connection: &Connection,
    mut frames: S,
    pong_tx: &watch::Sender<()>,
) where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    loop {
        let frame = tokio::select! {
            _ = connection.evicted() => {
                tracing::info!(connection_id = %connection.id(), name = %session.name(), "Connection evicted");
                break;
            }
            frame = frames.next() => frame,
        };

        let text = match frame {
            Some(Ok(Message::Text(text))) => text.as_str().to_string(),
            Some(Ok(Message::Binary(data))) => match String::from_utf8(data.to_vec()) {
                Ok(text) => text,
                Err(_) => {
                    tracing::warn!(
                        connection_id = %connection.id(),
                        "Binary frame is not valid UTF-8, closing"
                    );
                    break;
                }
            },
            Some(Ok(Message::Pong(_))) => {
                pong_tx.send_replace(());
                continue;
            }
            Some(Ok(Message::Ping(data))) => {
                let _ = connection.send(Message::Pong(data));
                continue;
            }
            Some(Ok(Message::Close(frame))) => {
                tracing::debug!(
                    connection_id = %connection.id(),
                    reason = ?frame,
                    "Client initiated close"
                );
                break;
            }
            Some(Err(e)) => {
                tracing::warn!(
                    connection_id = %connection.id(),
                    error = %e,
                    "WebSocket receive error"
                );
                break;
            }
            None => {
                tracing::debug!(connection_id = %connection.id(), "WebSocket stream ended");
                break;
            }
        };

        if let Err(e) = session.handle_frame(&text).await {
            tracing::warn!(
                connection_id = %connection.id(),
                name = %session.name(),
                error = %e,
                "Failed to handle message, leaving"
            );
            break;
        }
    }

    session.leave().await;
}

/// Ping task: sends a ping every `ping_interval` and evicts the connection
/// when no pong arrives within `pong_timeout` of it.
async fn ping_task(
    connection: Connection,
    mut pong_rx: watch::Receiver<()>,
    ping_interval: Duration,
    pong_timeout: Duration,
) {
    let mut ping_timer = interval(ping_interval);
    // Skip the first immediate tick
    ping_timer.tick().await;

    loop {
        ping_timer.tick().await;

        // Pongs received before this ping do not answer it
        let _ = pong_rx.borrow_and_update();
        if connection.send(Message::Ping(vec![1, 2, 3, 4].into())).is_err() {
            // Queue full or writer gone; the reader loop handles it
            break;
        }

        match timeout(pong_timeout, pong_rx.changed()).await {
            Ok(Ok(())) => {}
            _ => {
                tracing::warn!(connection_id = %connection.id(), "Pong timeout, closing connection");
                let _ = connection.send(Message::Close(Some(CloseFrame {
                    code: 1001,
                    reason: "Pong timeout".into(),
                })));
                connection.evict();
                break;
            }
        }
    }
}

/// Writer task: drains the connection's queue into the WebSocket sink.
/// A failed or timed-out write evicts the connection.
async fn writer_task(
    mut ws_sender: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Message>,
    connection: Connection,
    send_timeout: Duration,
) {
    while let Some(msg) = rx.recv().await {
        match timeout(send_timeout, ws_sender.send(msg)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::debug!(connection_id = %connection.id(), error = %e, "WebSocket send failed");
                break;
            }
            Err(_) => {
                tracing::warn!(connection_id = %connection.id(), "WebSocket send timed out");
                break;
            }
        }
    }
    connection.evict();
}
