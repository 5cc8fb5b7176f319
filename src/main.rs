use anyhow::Context;
use clap::Parser;
use gcodestream::{init_logging, list_ports, Cli, Config, Service, BUILD_DATE, VERSION};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_json)?;

    tracing::info!("gcodestream {} (built {})", VERSION, BUILD_DATE);

    if cli.list_ports {
        let ports = list_ports()?;
        if ports.is_empty() {
            println!("No controller ports found");
        }
        for port in ports {
            println!("{}", port);
        }
        return Ok(());
    }

    let mut config = Config::load_or_default(cli.config.as_deref()).context("Loading config")?;
    cli.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    let service = Service::open(&config).await?;

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Cannot listen for Ctrl-C: {}", e);
                return;
            }
            tracing::info!("Interrupt received, shutting down");
            shutdown.cancel();
        }
    });

    shutdown.cancelled().await;
    service.shutdown().await;
    Ok(())
}
