//! Connection handling logic for WebSocket clients.
//!
//! This module contains the core connection handling logic that manages
//! the lifecycle of individual client connections, including WebSocket
//! handshaking, message processing, and cleanup.

use crate::{
    connection::ConnectionId,
    error::{ErrorCode, ServerError},
    messaging::{ErrorBody, EventDispatcher},
    security::FrameValidator,
};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_tungstenite::{
    accept_async,
    tungstenite::{Error as WsError, Message},
};
use tracing::{debug, error, warn};

/// Handles a single client connection from establishment to cleanup.
///
/// # Connection Flow
///
/// 1. Perform WebSocket handshake
/// 2. Register connection and its outbound queue with the connection manager
/// 3. Read frames until the client goes away or the writer fails
/// 4. Run the dispatcher's disconnect sequence
///
/// # Arguments
///
/// * `stream` - The TCP stream for the client connection
/// * `addr` - The remote address of the client
/// * `dispatcher` - Executes parsed requests and owns the connection manager
/// * `validator` - Frame limits applied before parsing
///
/// # Message Handling
///
/// * **Reader**: Validates text frames and hands them to the dispatcher,
///   one at a time, so a connection's requests are applied in arrival order
/// * **Writer Task**: Drains the connection's outbound queue into the socket
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    dispatcher: Arc<EventDispatcher>,
    validator: Arc<FrameValidator>,
) -> Result<(), ServerError> {
    let ws_stream = accept_async(stream)
        .await
        .map_err(|e| ServerError::Network(format!("WebSocket handshake failed: {e}")))?;

    let (ws_sender, ws_receiver) = ws_stream.split();
    let ws_sender = Arc::new(Mutex::new(ws_sender));
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
    let connection_id = dispatcher
        .connections()
        .add_connection(addr, outbound_tx)
        .await;

    let (writer_done_tx, writer_done_rx) = oneshot::channel::<()>();
    {
        let ws_sender = ws_sender.clone();
        tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                let mut ws_sender = ws_sender.lock().await;
                if let Err(e) = ws_sender.send(Message::Text(frame.into())).await {
                    error!("Failed to send message to connection {}: {}", connection_id, e);
                    break;
                }
            }
            let _ = writer_done_tx.send(());
        });
    }

    read_frames(
        connection_id,
        ws_receiver,
        ws_sender,
        writer_done_rx,
        &dispatcher,
        &validator,
    )
    .await;

    // Removing the connection drops its outbound sender, which lets the
    // writer drain what is queued and exit.
    dispatcher.handle_disconnect(connection_id).await;
    Ok(())
}

/// Reads and dispatches frames until the stream ends or `writer_done` fires.
///
/// The writer signal is only observed between frames: a request that has
/// started dispatching always runs to completion.
pub(crate) async fn read_frames<St, Si>(
    connection_id: ConnectionId,
    mut frames: St,
    ws_sender: Arc<Mutex<Si>>,
    mut writer_done: oneshot::Receiver<()>,
    dispatcher: &EventDispatcher,
    validator: &FrameValidator,
) where
    St: Stream<Item = Result<Message, WsError>> + Unpin,
    Si: Sink<Message> + Unpin,
{
    loop {
        let next = tokio::select! {
            biased;
            next = frames.next() => next,
            _ = &mut writer_done => {
                debug!("✏️ Writer for connection {} stopped", connection_id);
                break;
            }
        };
        let Some(msg) = next else {
            break;
        };

        match msg {
            Ok(Message::Text(text)) => match validator.validate(text.as_bytes()) {
                Ok(value) => dispatcher.dispatch_value(connection_id, value).await,
                Err(e) => {
                    warn!("🛡️ Frame from connection {} rejected: {}", connection_id, e);
                    dispatcher.reject(connection_id, ErrorBody::from(e)).await;
                }
            },
            Ok(Message::Binary(_)) => {
                dispatcher
                    .reject(
                        connection_id,
                        ErrorBody::new(ErrorCode::ValidationError, "Binary frames are not supported"),
                    )
                    .await;
            }
            Ok(Message::Close(_)) => {
                debug!("🔌 Client {} requested close", connection_id);
                break;
            }
            Ok(Message::Ping(data)) => {
                let mut ws_sender = ws_sender.lock().await;
                let _ = ws_sender.send(Message::Pong(data)).await;
            }
            Err(e) => {
                error!("WebSocket error for connection {}: {}", connection_id, e);
                break;
            }
            _ => {}
        }
    }
}
