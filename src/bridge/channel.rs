//! Outbound data channel to the game client.
//!
//! After a handshake the relay dials back to the announced port and keeps
//! the connection for as long as the game client does. Frames go through
//! the codec and the dispatcher; replies are funnelled through a single
//! writer task so two sends never interleave. After each completed
//! analysis the read loop pauses for the settle delay before reading on.

use std::fmt::Display;
use std::time::Duration;

use anyhow::{Context, Result};
use futures_util::{Sink, SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async_with_config;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, trace, warn};

use super::SharedContext;
use super::codec;
use super::dispatch::PayloadDispatcher;
use super::gate::AdmissionGate;
use super::helpers;
use crate::config::DataChannelConfig;

/// Replies waiting for the writer. One analysis is in flight at a time, so
/// this never fills in practice.
const OUTBOUND_QUEUE: usize = 16;

/// How long a closing channel waits for its Close frame to be written.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Transport settings for the data channel.
///
/// Messages and frames may be as large as a full screenshot plus scene data.
/// No extensions are requested, so frames are never compressed, and the
/// client sends no keep-alive pings of its own: an analysis can outlast any
/// idle timeout.
pub fn websocket_config(config: &DataChannelConfig) -> WebSocketConfig {
    WebSocketConfig::default()
        .max_message_size(Some(config.max_frame_bytes))
        .max_frame_size(Some(config.max_frame_bytes))
}

/// Spawn the data channel for `port` as an independent task.
///
/// Connection failures are logged; the task never reconnects.
pub fn spawn_data_channel(
    ctx: SharedContext,
    port: u16,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(err) = run_data_channel(ctx, port, cancel).await {
            error!("Data channel on port {} failed: {:#}", port, err);
        }
    })
}

/// Connect to the game client on `port` and process frames until the
/// connection closes or `cancel` fires.
pub async fn run_data_channel(
    ctx: SharedContext,
    port: u16,
    cancel: CancellationToken,
) -> Result<()> {
    let dc = &ctx.config.data_channel;
    let url = helpers::data_channel_url(&dc.host, port, &dc.path)?;

    let (ws_stream, _) = connect_async_with_config(url.as_str(), Some(websocket_config(dc)), true)
        .await
        .with_context(|| format!("Failed to connect to game client at {}", url))?;
    info!("Connected to game client data channel on port {}", port);

    let (writer, mut reader) = ws_stream.split();
    let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE);
    let writer_task = tokio::spawn(write_loop(writer, rx));

    let dispatcher = PayloadDispatcher::new(ctx.clone(), AdmissionGate::new(), tx.clone());
    let (done_tx, mut done_rx) = mpsc::unbounded_channel();
    let settle = ctx.config.settle_delay();

    let result = loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Closing data channel on port {}", port);
                close_writer(&tx, writer_task).await;
                return Ok(());
            }
            Some(()) = done_rx.recv() => {
                // Frames sent during the pause wait in the socket.
                if !settle.is_zero() {
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = tokio::time::sleep(settle) => {}
                    }
                }
            }
            frame = reader.next() => {
                match frame {
                    Some(Ok(Message::Close(reason))) => {
                        info!("Game client closed data channel on port {}: {:?}", port, reason);
                        break Ok(());
                    }
                    Some(Ok(msg)) => handle_frame(&dispatcher, &done_tx, &msg),
                    Some(Err(err)) => {
                        break Err(err).context("Data channel read failed");
                    }
                    None => {
                        info!("Data channel on port {} ended", port);
                        break Ok(());
                    }
                }
            }
        }
    };

    writer_task.abort();
    result
}

/// Route one inbound frame: codec, then admission, then a detached analysis.
///
/// The analysis task signals `done` once the gate is open again, before the
/// reply is queued, so the read loop pauses ahead of any frame sent in
/// answer to that reply.
fn handle_frame(
    dispatcher: &PayloadDispatcher,
    done: &mpsc::UnboundedSender<()>,
    frame: &Message,
) {
    let Some(candidate) = codec::decode_frame(frame) else {
        trace!("Ignoring non-payload frame");
        return;
    };
    if let Some(admitted) = dispatcher.admit(&candidate) {
        let dispatcher = dispatcher.clone();
        let done = done.clone();
        tokio::spawn(async move {
            if let Some(result) = dispatcher.analyze(admitted).await {
                let _ = done.send(());
                dispatcher.reply(&result).await;
            }
        });
    }
}

/// Queue a Close frame behind any pending replies and give the writer a
/// moment to flush it.
async fn close_writer(tx: &mpsc::Sender<Message>, writer_task: JoinHandle<()>) {
    let abort = writer_task.abort_handle();
    if tx.send(Message::Close(None)).await.is_ok()
        && tokio::time::timeout(CLOSE_GRACE, writer_task).await.is_ok()
    {
        return;
    }
    abort.abort();
}

async fn write_loop<S>(mut sink: S, mut rx: mpsc::Receiver<Message>)
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    while let Some(msg) = rx.recv().await {
        let closing = matches!(msg, Message::Close(_));
        if let Err(err) = sink.send(msg).await {
            warn!("Failed to write to game client: {}", err);
            break;
        }
        if closing {
            break;
        }
    }
}
