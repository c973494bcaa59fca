//! Binary entry point. Three phases, same shape as a daemon bootstrap:
//! load configuration, wire up the collaborators (cache, scheduler, CMS
//! transport, renderer), then hand everything to [`sig_player::PlayerCore`]
//! and run until Ctrl+C.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use sig_cache::CacheManager;
use sig_cms::{CmsClient, RestClient, WebSocketXmrTransport, XmdsClient, XmrTransport};
use sig_player::{CacheResolver, PlayerCore, PlayerCoreConfig};
use sig_renderer::MediaResolver;
use sig_scheduler::Scheduler;
use tracing::{info, warn};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Transport {
    Xmds,
    Rest,
}

#[derive(Parser, Debug)]
#[command(name = "sigplayer", about = "Digital signage playback engine")]
struct Cli {
    /// CMS base URL, e.g. https://cms.example.com/xmds.php
    #[arg(long, env = "SIG_CMS_URL")]
    cms_url: Option<String>,

    /// Shared secret the CMS issued for this display's CMS key.
    #[arg(long, env = "SIG_CMS_KEY")]
    cms_key: Option<String>,

    /// Friendly name shown in the CMS display list.
    #[arg(long, env = "SIG_DISPLAY_NAME")]
    display_name: Option<String>,

    /// Directory for the local cache, SQLite manifest and downloaded blobs.
    #[arg(long, env = "SIG_DATA_DIR")]
    data_dir: Option<String>,

    /// Directory the layered YAML config lives in (auto-resolved if unset).
    #[arg(long, env = "SIG_CONFIG_DIR", default_value = "")]
    config_dir: String,

    /// Wire protocol to speak to the CMS.
    #[arg(long, value_enum, env = "SIG_TRANSPORT", default_value = "xmds")]
    transport: Transport,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    // ---- phase 1: configuration ----------------------------------------
    let config = sig_config::init(&cli.config_dir)?;

    if let Some(url) = &cli.cms_url {
        config.set_cms_url(url.clone())?;
    }
    if let Some(key) = &cli.cms_key {
        config.set_cms_key(key.clone())?;
    }
    if let Some(name) = &cli.display_name {
        config.set_display_name(name.clone())?;
    }

    let cms_url = config.get_cms_url().ok_or_else(|| anyhow::anyhow!("no CMS url configured (--cms-url or config.yaml)"))?;
    let cms_key = config.get_cms_key().ok_or_else(|| anyhow::anyhow!("no CMS key configured (--cms-key or config.yaml)"))?;
    let hardware_key = config.get_hardware_key()?;
    let display_name = config.get_display_name();

    let data_dir = match &cli.data_dir {
        Some(dir) => dir.clone(),
        None => config.get_data_dir()?,
    };

    info!(%cms_url, %display_name, %data_dir, "starting player");

    // ---- phase 2: collaborators -----------------------------------------
    let cms: Arc<dyn CmsClient> = match cli.transport {
        Transport::Xmds => Arc::new(XmdsClient::new(cms_url.clone(), cms_key, hardware_key.clone(), display_name.clone())),
        Transport::Rest => Arc::new(RestClient::new(cms_url.clone(), cms_key, hardware_key.clone(), display_name.clone())),
    };

    let cache = Arc::new(CacheManager::new(PathBuf::from(&data_dir), config.get_download_concurrency())?);
    let scheduler = Arc::new(Scheduler::new());

    let proxy_port = config.get_proxy_port();
    let proxy_base_url = format!("http://127.0.0.1:{proxy_port}");
    let resolver: Arc<dyn MediaResolver> =
        Arc::new(CacheResolver::new(cache.clone(), cms.clone(), proxy_base_url));

    tokio::spawn(serve_cache_proxy(cache.clone(), proxy_port));

    let xmr: Option<Box<dyn XmrTransport>> = if config.get_xmr_enabled() {
        connect_xmr(cms.as_ref()).await
    } else {
        None
    };

    let player_config = PlayerCoreConfig {
        collection_interval: Duration::from_secs(config.get_collection_interval_seconds()),
        stats_flush_interval: Duration::from_secs(config.get_stats_flush_interval_seconds()),
    };
    let core = PlayerCore::new(cms, cache, scheduler, resolver, xmr, player_config);

    // ---- phase 3: run until Ctrl+C ----------------------------------------
    info!("entering collection-cycle loop, press Ctrl+C to stop");
    if let Err(e) = core.run().await {
        warn!(error = %e, "player loop exited with an error");
    }
    info!("sigplayer stopped");
    Ok(())
}

/// Registers once up front purely to learn the XMR push-channel address;
/// `PlayerCore`'s own collection cycle re-registers on its normal schedule.
async fn connect_xmr(cms: &dyn CmsClient) -> Option<Box<dyn XmrTransport>> {
    let registration = match cms.register_display().await {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, "initial registration failed, starting without an XMR channel");
            return None;
        }
    };

    let address = registration.xmr_address?;
    match WebSocketXmrTransport::connect(&address).await {
        Ok(transport) => {
            info!(%address, "XMR channel connected");
            Some(Box::new(transport))
        }
        Err(e) => {
            warn!(%address, error = %e, "XMR channel connect failed, continuing on the poll schedule alone");
            None
        }
    }
}

async fn serve_cache_proxy(cache: Arc<CacheManager>, port: u16) {
    let app = sig_cache::proxy::router(cache);
    let addr = std::net::SocketAddr::from(([127, 0, 0, 1], port));
    match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => {
            info!(%addr, "cache proxy listening");
            if let Err(e) = axum::serve(listener, app).await {
                warn!(error = %e, "cache proxy server exited");
            }
        }
        Err(e) => warn!(%addr, error = %e, "failed to bind cache proxy"),
    }
}
