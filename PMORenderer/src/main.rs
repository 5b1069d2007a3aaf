mod logs;

use std::sync::Arc;

use anyhow::Context;
use pmoconfig::Config;
use pmomediarenderer::{ChannelTransport, MediaRendererDevice, RendererConfigExt};
use tracing::{debug, error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ========== PHASE 1 : Configuration ==========
    // Un répertoire de configuration peut être passé en premier argument.
    let config_dir = std::env::args().nth(1).unwrap_or_default();
    let config = Config::load_config(&config_dir).context("Failed to load configuration")?;

    logs::init_logging(&config);

    if let Some(dir) = config.config_dir() {
        info!("📁 Configuration loaded from {}", dir.display());
    }

    // Les erreurs de configuration sont fatales avant toute annonce du device
    let settings = config
        .get_renderer_settings()
        .context("Invalid renderer configuration")?;

    // ========== PHASE 2 : Device ==========
    info!(engine = %settings.engine.kind, "📡 Building MediaRenderer...");
    let mut device = MediaRendererDevice::new(settings);

    // Les LastChange sont remis à la pile UPnP par ce canal
    let (transport, mut events) = ChannelTransport::new(64);
    let forwarder = tokio::spawn(async move {
        while let Some(batch) = events.recv().await {
            match batch.to_xml() {
                Ok(xml) => debug!(service = %batch.service, "LastChange {}", xml),
                Err(err) => error!(service = %batch.service, "Cannot serialize LastChange: {}", err),
            }
        }
    });

    device.start(Arc::new(transport));

    // ========== PHASE 3 : Attente ==========
    info!("✅ PMORenderer is ready!");
    info!("Press Ctrl+C to stop...");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;

    info!("🛑 Shutting down...");
    device.shutdown().await;
    drop(device);
    if let Err(err) = forwarder.await {
        error!("LastChange forwarder ended abnormally: {}", err);
    }

    Ok(())
}
