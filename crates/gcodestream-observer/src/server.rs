//! Observer server
//!
//! Accepts WebSocket connections and pumps engine events into the registry.

use crate::error::{ObserverError, ObserverResult};
use crate::registry::ObserverRegistry;
use crate::session::SessionContext;
use gcodestream_core::EventReceiver;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Forward every engine event to the registry until the channel closes
pub async fn pump_events(mut events: EventReceiver, registry: Arc<ObserverRegistry>) {
    while let Some(event) = events.recv().await {
        tracing::trace!("Broadcasting {}", event);
        registry.publish(&event);
    }
    tracing::debug!("Engine event channel closed");
}

/// Listening observer endpoint
pub struct ObserverServer {
    listener: TcpListener,
    context: SessionContext,
}

impl ObserverServer {
    /// Bind the listener
    pub async fn bind(addr: SocketAddr, context: SessionContext) -> ObserverResult<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ObserverError::Bind {
                addr: addr.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self { listener, context })
    }

    pub fn local_addr(&self) -> ObserverResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept observers until `shutdown` fires
    pub async fn run(self, shutdown: CancellationToken) -> ObserverResult<()> {
        tracing::info!("Observer server listening on {}", self.local_addr()?);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Observer server shutting down");
                    return Ok(());
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let context = self.context.clone();
                        tokio::spawn(async move {
                            if let Err(e) = context.serve(stream, peer).await {
                                tracing::warn!("Session with {} ended: {}", peer, e);
                            }
                        });
                    }
                    Err(e) => tracing::warn!("Accept failed: {}", e),
                },
            }
        }
    }
}
