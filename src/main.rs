use anyhow::Context;
use std::path::PathBuf;
use tinyg_link::{init_logging, ConfigSet, LinkConfig, TinyGLink, BUILD_DATE, VERSION};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging()?;
    tracing::info!("tinyg-link {} (built {})", VERSION, BUILD_DATE);

    // Usage: tinyg-link [CONFIG_SET_FILE]
    let config_set = std::env::args().nth(1).map(PathBuf::from);

    let config_path = LinkConfig::default_path();
    let config = LinkConfig::load_or_default(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    let config_set = match config_set {
        Some(path) => Some((ConfigSet::load(&path)?, path)),
        None => None,
    };

    let link = TinyGLink::connect(config).await?;

    let synced = match &config_set {
        Some((set, path)) => {
            tracing::info!("Synchronizing {} setting(s) from {}", set.len(), path.display());
            link.synchronize_config(set).await.map(|report| {
                if report.was_in_sync() {
                    tracing::info!("Controller already matches {}", path.display());
                } else {
                    tracing::info!("Corrected: {}", report.corrected.join(", "));
                }
            })
        }
        None => Ok(()),
    };

    let closed = link.close().await;
    synced?;
    closed?;
    Ok(())
}
