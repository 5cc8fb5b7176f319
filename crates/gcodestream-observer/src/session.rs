//! Observer sessions
//!
//! One task per connected observer. The session registers with the
//! registry, spawns a writer that drains the observer's outbound queue into
//! the WebSocket, and dispatches incoming control messages to the engine.

use crate::error::{ObserverError, ObserverResult};
use crate::protocol::{ControlMessage, ObserverMessage};
use crate::registry::{ObserverId, ObserverRegistry};
use futures_util::{SinkExt, StreamExt};
use gcodestream_communication::StreamingEngine;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

/// Shared handles every session needs
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub engine: Arc<StreamingEngine>,
    pub registry: Arc<ObserverRegistry>,
}

impl SessionContext {
    pub fn new(engine: Arc<StreamingEngine>, registry: Arc<ObserverRegistry>) -> Self {
        Self { engine, registry }
    }

    /// Act on one control message from observer `id`.
    ///
    /// Rejections are reported back to the requesting observer as a `log`
    /// message; nothing here fails the session.
    pub async fn dispatch(&self, id: ObserverId, message: ControlMessage) {
        tracing::debug!("Observer {} sent {}", id, message.kind());

        match message {
            ControlMessage::Start { filename } => {
                let name = filename.clone();
                if let Some(Err(e)) = self.on_engine(move |engine| engine.start(&name)).await {
                    tracing::warn!("Start of {} rejected: {}", filename, e);
                    self.reply(id, format!("Start rejected: {}", e));
                }
            }
            ControlMessage::Stop => {
                if let Err(e) = self.engine.stop() {
                    tracing::warn!("Stop rejected: {}", e);
                    self.reply(id, format!("Stop rejected: {}", e));
                }
            }
            ControlMessage::Jog {
                axis,
                dir,
                distance,
            } => {
                // Pass-through commands wait for an acknowledgment; keep the
                // read loop free for stop and queryStatus meanwhile
                let ctx = self.clone();
                tokio::spawn(async move {
                    if let Err(e) = ctx.engine.jog(&axis, dir, distance).await {
                        tracing::warn!("Jog {}{}{} rejected: {}", axis, dir, distance, e);
                        ctx.reply(id, format!("Jog rejected: {}", e));
                    }
                });
            }
            ControlMessage::Laser { state } => {
                let ctx = self.clone();
                tokio::spawn(async move {
                    if let Err(e) = ctx.engine.laser(state).await {
                        tracing::warn!("Laser {} rejected: {}", state, e);
                        ctx.reply(id, format!("Laser rejected: {}", e));
                    }
                });
            }
            ControlMessage::Uploaded { filename } => {
                let name = filename.clone();
                if let Some(Err(e)) = self
                    .on_engine(move |engine| engine.inspect_upload(&name))
                    .await
                {
                    tracing::warn!("Upload check for {} failed: {}", filename, e);
                    self.reply(id, format!("Upload check failed: {}", e));
                }
            }
            ControlMessage::QueryStatus => {
                self.registry.resync(id);
            }
        }
    }

    /// Run an engine call that touches the job store off the async workers
    async fn on_engine<T, F>(&self, call: F) -> Option<T>
    where
        F: FnOnce(&StreamingEngine) -> T + Send + 'static,
        T: Send + 'static,
    {
        let engine = self.engine.clone();
        match tokio::task::spawn_blocking(move || call(&engine)).await {
            Ok(result) => Some(result),
            Err(e) => {
                tracing::error!("Engine call failed: {}", e);
                None
            }
        }
    }

    fn reply(&self, id: ObserverId, text: String) {
        self.registry.send_to(id, &ObserverMessage::log(text));
    }

    /// Run the WebSocket session for an accepted connection until either
    /// side closes it
    pub async fn serve(self, stream: TcpStream, peer: SocketAddr) -> ObserverResult<()> {
        let socket = accept_async(stream)
            .await
            .map_err(|e| ObserverError::Handshake(e.to_string()))?;
        let (mut sink, mut source) = socket.split();

        let (id, mut outbox) = self.registry.register();
        tracing::debug!("Observer {} is {}", id, peer);

        let mut writer = tokio::spawn(async move {
            while let Some(text) = outbox.recv().await {
                if let Err(e) = sink.send(Message::Text(text.into())).await {
                    tracing::debug!("Observer {} write failed: {}", id, e);
                    break;
                }
            }
            if let Err(e) = sink.close().await {
                tracing::debug!("Observer {} close failed: {}", id, e);
            }
        });

        loop {
            tokio::select! {
                frame = source.next() => match frame {
                    Some(Ok(msg)) if msg.is_text() || msg.is_binary() => {
                        let text = match msg.to_text() {
                            Ok(text) => text,
                            Err(e) => {
                                tracing::warn!("Observer {} sent undecodable frame: {}", id, e);
                                continue;
                            }
                        };
                        match ControlMessage::parse(text) {
                            Ok(message) => self.dispatch(id, message).await,
                            Err(e) => tracing::warn!(
                                "Ignoring malformed message from observer {}: {}",
                                id,
                                e
                            ),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!("Observer {} read failed: {}", id, e);
                        break;
                    }
                },
                _ = &mut writer => {
                    tracing::debug!("Observer {} writer finished", id);
                    break;
                }
            }
        }

        self.registry.unregister(id);
        writer.abort();
        Ok(())
    }
}
