//! Process wiring
//!
//! Builds the long-lived services from a validated [`Config`] and runs them
//! until shutdown: one serial link, one streaming engine, one observer
//! registry fed by the engine's event channel, and the WebSocket listener.

use anyhow::Context;
use gcodestream_communication::{SerialLink, SerialParams, StreamerConfig, StreamingEngine};
use gcodestream_core::{event_channel, DirectoryJobStore};
use gcodestream_observer::{pump_events, ObserverRegistry, ObserverServer, SessionContext};
use gcodestream_settings::Config;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Engine tuning from the `streaming` and `machine` sections
pub fn streamer_config(config: &Config) -> StreamerConfig {
    StreamerConfig {
        pacing_delay: config.streaming.pacing_delay(),
        ack_token: config.streaming.ack_token.clone(),
        ack_timeout: config.streaming.ack_timeout(),
        jog_feed_rate: config.machine.jog_feed_rate,
        laser_on_command: config.machine.laser_on_command.clone(),
        laser_off_command: config.machine.laser_off_command.clone(),
    }
}

/// Serial parameters from the `serial` section
pub fn serial_params(config: &Config) -> SerialParams {
    SerialParams {
        port: config.serial.port.clone(),
        baud_rate: config.serial.baud_rate,
        read_timeout: config.serial.read_timeout(),
    }
}

/// The running streamer
pub struct Service {
    engine: Arc<StreamingEngine>,
    registry: Arc<ObserverRegistry>,
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    server: JoinHandle<()>,
    pump: JoinHandle<()>,
}

impl Service {
    /// Open the serial port named in `config` and start serving
    pub async fn open(config: &Config) -> anyhow::Result<Self> {
        let params = serial_params(config);
        let link = SerialLink::open(&params)
            .with_context(|| format!("Cannot open controller on {}", params.port))?;
        Self::start(config, link).await
    }

    /// Start serving on an already open link
    pub async fn start(config: &Config, link: SerialLink) -> anyhow::Result<Self> {
        let upload_dir = &config.jobs.upload_dir;
        std::fs::create_dir_all(upload_dir)
            .with_context(|| format!("Cannot create upload dir {}", upload_dir.display()))?;
        let store = Arc::new(DirectoryJobStore::new(upload_dir));

        let (events, rx) = event_channel();
        let engine = Arc::new(StreamingEngine::new(
            store,
            link,
            streamer_config(config),
            events,
        ));
        let registry = Arc::new(ObserverRegistry::new(
            config.observer.queue_capacity,
            config.observer.recent_log_lines,
        ));
        let pump = tokio::spawn(pump_events(rx, registry.clone()));

        let addr = config.observer.socket_addr()?;
        let server =
            ObserverServer::bind(addr, SessionContext::new(engine.clone(), registry.clone()))
                .await?;
        let local_addr = server.local_addr()?;

        let shutdown = CancellationToken::new();
        let server = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                if let Err(e) = server.run(shutdown).await {
                    tracing::error!("Observer server failed: {}", e);
                }
            })
        };

        tracing::info!(
            "Serving jobs from {} on ws://{}",
            upload_dir.display(),
            local_addr
        );

        Ok(Self {
            engine,
            registry,
            local_addr,
            shutdown,
            server,
            pump,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn engine(&self) -> &Arc<StreamingEngine> {
        &self.engine
    }

    pub fn registry(&self) -> &Arc<ObserverRegistry> {
        &self.registry
    }

    /// Stop accepting observers, wind down any running job and flush the
    /// last events to connected observers
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(e) = self.server.await {
            tracing::warn!("Observer server task ended abnormally: {}", e);
        }
        self.engine.shutdown().await;

        // The pump ends once every event sender is gone; sessions still hold
        // the engine, so give it a moment and then stop it.
        let pump = self.pump;
        drop(self.engine);
        if tokio::time::timeout(std::time::Duration::from_millis(200), pump)
            .await
            .is_err()
        {
            tracing::debug!("Event pump still attached to live sessions");
        }
        tracing::info!("Shutdown complete");
    }
}
