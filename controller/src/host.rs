use anyhow::Context;
use embedded_graphics::prelude::Size;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use epaper_dnd_common::{
    DisplayBackend, ServiceConfig, StatusRenderer, DISPLAY_HEIGHT, DISPLAY_WIDTH,
};

use crate::{
    display::{Display, SimulatedDisplay},
    hub::HomeAssistantHub,
    service::RefreshService,
};

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServiceConfig::from_env()
        .inspect_err(|err| error!("configuration error: {err}"))
        .context("loading configuration from environment")?;

    info!("e-paper DND display starting");
    info!("home assistant: {}", config.hub.base_url);
    info!("entity: {}", config.refresh.entity_id);
    info!(
        "min refresh interval: {}s",
        config.refresh.min_refresh_ms / 1000
    );

    let hub = HomeAssistantHub::new(&config.hub).context("preparing hub client")?;
    let display = open_display(&config)?;
    let renderer = StatusRenderer::new(config.render_style);

    let cancel = CancellationToken::new();
    spawn_shutdown_listener(cancel.clone());

    let mut service = RefreshService::new(
        hub,
        display,
        renderer,
        config.refresh.clone(),
        config.reconnect.clone(),
    );
    let stats = service.run(cancel).await;

    info!(
        "service {} after {} renders ({} failed), {} sessions, {} connection losses",
        service.phase(),
        stats.renders,
        stats.render_failures,
        stats.sessions,
        stats.connection_losses
    );
    Ok(())
}

fn open_display(config: &ServiceConfig) -> anyhow::Result<Box<dyn Display>> {
    let simulated = || -> Box<dyn Display> {
        Box::new(SimulatedDisplay::new(
            &config.output_dir,
            Size::new(DISPLAY_WIDTH, DISPLAY_HEIGHT),
        ))
    };

    match config.display {
        DisplayBackend::Simulated => {
            info!("running in simulation mode");
            Ok(simulated())
        }
        DisplayBackend::Waveshare => open_hardware().context("opening e-paper panel"),
        DisplayBackend::Auto => match open_hardware() {
            Ok(display) => Ok(display),
            Err(err) => {
                warn!("e-paper hardware unavailable, running in simulation mode: {err:#}");
                Ok(simulated())
            }
        },
    }
}

#[cfg(feature = "waveshare")]
fn open_hardware() -> anyhow::Result<Box<dyn Display>> {
    Ok(Box::new(crate::waveshare::WaveshareDisplay::open()?))
}

#[cfg(not(feature = "waveshare"))]
fn open_hardware() -> anyhow::Result<Box<dyn Display>> {
    anyhow::bail!("built without the `waveshare` feature")
}

fn spawn_shutdown_listener(cancel: CancellationToken) {
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("shutdown requested");
        cancel.cancel();
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        Err(err) => {
            warn!("failed to install SIGTERM handler: {err}");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
