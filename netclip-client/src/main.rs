use std::sync::Arc;

use clap::Parser;
use netclip_client::{frontend_for, run_console};
use netclip_sync::{MulticastTransport, SyncArgs, SyncEngine, SyncService, SystemClipboard};
use tokio::io::BufReader;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let args = SyncArgs::parse();
    let config = match args.validate() {
        Ok(config) => config,
        Err(err) => {
            error!("invalid configuration: {}", err);
            std::process::exit(1);
        }
    };

    let transport = match MulticastTransport::bind(
        config.group,
        config.port,
        config.multicast_ttl,
    )
    .await
    {
        Ok(transport) => transport,
        Err(err) => {
            error!("failed to open multicast socket: {}", err);
            std::process::exit(1);
        }
    };

    let clipboard = match SystemClipboard::spawn(config.selection) {
        Ok(clipboard) => clipboard,
        Err(err) => {
            error!("failed to start clipboard access: {}", err);
            std::process::exit(1);
        }
    };

    info!(
        group = %config.group_addr(),
        selection = ?config.selection,
        autosend = config.modes.autosend,
        autoreceive = config.modes.autoreceive,
        "netclip starting"
    );

    let engine = SyncEngine::new(
        config.engine_settings(),
        Arc::new(clipboard),
        Arc::new(transport),
    );
    let service = SyncService::start(engine, config.service_options());
    let frontend = frontend_for(config.legacy_presentation_mode);

    let stdin = BufReader::new(tokio::io::stdin());
    if let Err(err) = run_console(service.handle(), frontend.as_ref(), stdin, tokio::io::stdout())
        .await
    {
        warn!("console stopped: {}", err);
    }

    service.shutdown().await;
    info!("netclip stopped");
}
