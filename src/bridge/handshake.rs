//! Inbound handshake server.
//!
//! The game client connects here first and announces the port of its own
//! WebSocket server with `{"type": "mpe_init", "port": <int>}`. The relay
//! starts a data channel to that port, acknowledges with `{"status": "ok"}`,
//! and is done with the connection. Malformed JSON before the handshake
//! closes the connection.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use futures_util::{SinkExt, Stream, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::SharedContext;
use super::channel;
use super::helpers;
use super::types::{HandshakeAck, HandshakeMessage};
use crate::error::HandshakeError;

/// Listener for handshake connections, bound but not yet serving.
pub struct HandshakeServer {
    listener: TcpListener,
    ctx: SharedContext,
}

impl HandshakeServer {
    /// Bind the configured handshake address.
    pub async fn bind(ctx: SharedContext) -> Result<Self> {
        let addr = helpers::resolve_listen_addr(&ctx.config.handshake.listen)?;
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind handshake server to {}", addr))?;
        Ok(Self { listener, ctx })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("Handshake listener has no local address")
    }

    /// Accept connections until `cancel` fires. Each connection is handled
    /// in its own task; errors there are logged and never stop the server.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        info!("Handshake server listening on {}", self.local_addr()?);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Handshake server shutting down");
                    break;
                }
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(conn) => conn,
                        Err(err) => {
                            warn!("Failed to accept handshake connection: {}", err);
                            continue;
                        }
                    };
                    let ctx = self.ctx.clone();
                    let cancel = cancel.clone();
                    tokio::spawn(async move {
                        if let Err(err) = handle_connection(stream, peer, ctx, cancel).await {
                            error!("Handshake connection from {} failed: {:#}", peer, err);
                        }
                    });
                }
            }
        }

        Ok(())
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    ctx: SharedContext,
    cancel: CancellationToken,
) -> Result<()> {
    let ws_stream = tokio_tungstenite::accept_async(stream)
        .await
        .context("WebSocket handshake failed")?;
    let (mut writer, mut reader) = ws_stream.split();
    debug!("Handshake connection from {}", peer);

    let port = tokio::select! {
        _ = cancel.cancelled() => return Ok(()),
        waited = wait_for_init(&mut reader) => match waited {
            Ok(Some(port)) => port,
            Ok(None) => {
                debug!("{} disconnected before completing the handshake", peer);
                return Ok(());
            }
            Err(HandshakeError::MalformedJson(err)) => {
                error!("Handshake error from {}: {}", peer, err);
                let _ = writer.send(Message::Close(None)).await;
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        },
    };

    info!("Received game client data-channel port: {}", port);

    // The data channel outlives this connection; it only stops on shutdown.
    channel::spawn_data_channel(ctx, port, cancel.child_token());

    let ack = serde_json::to_string(&HandshakeAck::ok())?;
    writer
        .send(Message::Text(ack.into()))
        .await
        .context("Failed to send handshake acknowledgement")?;
    let _ = writer.send(Message::Close(None)).await;

    Ok(())
}

/// Read frames until a valid `mpe_init` arrives.
///
/// Returns the announced port, or `None` if the peer goes away first.
/// Well-formed messages of other types, and `mpe_init` with an unusable
/// port, are skipped.
pub async fn wait_for_init<S>(reader: &mut S) -> Result<Option<u16>, HandshakeError>
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    while let Some(frame) = reader.next().await {
        let msg: HandshakeMessage = match frame? {
            Message::Text(text) => serde_json::from_str(text.as_str())?,
            Message::Binary(bytes) => serde_json::from_slice(&bytes)?,
            Message::Close(_) => return Ok(None),
            _ => continue,
        };

        if !msg.is_init() {
            debug!("Ignoring message received before handshake");
            continue;
        }
        match msg.callback_port() {
            Some(port) => return Ok(Some(port)),
            None => warn!("Ignoring mpe_init with unusable port {:?}", msg.port),
        }
    }
    Ok(None)
}
