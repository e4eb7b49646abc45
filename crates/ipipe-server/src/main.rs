//! Input Pipe server entry point.
//!
//! Loads the configuration, initialises logging, and runs the TCP listener
//! until Ctrl-C.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load_config()             -- argv[1] or ~/.config/inputpipe/server.toml
//!  └─ InputPipeServer::bind()   -- TCP :7192
//!  └─ InputPipeServer::run()    -- accept loop
//!       └─ serve_connection()   -- one task + one Session per client
//! ```
//!
//! # Device provider
//!
//! `device_backend = "uinput"` (the default) creates real kernel devices
//! through `/dev/uinput` on Linux.  `"logging"` reports every device and
//! event through `tracing` instead, which needs no privileges.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ipipe_server::application::device_registry::VirtualDeviceProvider;
use ipipe_server::infrastructure::{
    network::{InputPipeServer, ListenerConfig},
    storage::config::{load_config, DeviceBackend},
    virtual_device::logging::LoggingDeviceProvider,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = load_config(config_path.as_deref()).context("loading server configuration")?;

    // RUST_LOG wins over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level)),
        )
        .init();

    info!("Input Pipe server starting");

    let listener_cfg = ListenerConfig {
        bind_addr: config.server.listen_addr()?,
        max_payload_len: config.server.max_payload_len,
    };
    let provider = device_provider(config.server.device_backend)?;
    info!(backend = ?config.server.device_backend, "device provider ready");
    let server = InputPipeServer::bind(&listener_cfg, provider).await?;

    // ── Ctrl-C handler ────────────────────────────────────────────────────────
    let shutdown = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("shutdown signal received"),
            Err(e) => {
                warn!("cannot listen for Ctrl-C ({e}); running until killed");
                std::future::pending::<()>().await;
            }
        }
    };

    server.run(shutdown).await?;

    info!("Input Pipe server stopped");
    Ok(())
}

fn device_provider(backend: DeviceBackend) -> anyhow::Result<Arc<dyn VirtualDeviceProvider>> {
    match backend {
        DeviceBackend::Logging => Ok(Arc::new(LoggingDeviceProvider::new())),
        DeviceBackend::Uinput => uinput_provider(),
    }
}

#[cfg(target_os = "linux")]
fn uinput_provider() -> anyhow::Result<Arc<dyn VirtualDeviceProvider>> {
    use ipipe_server::infrastructure::virtual_device::uinput::UinputDeviceProvider;

    Ok(Arc::new(UinputDeviceProvider::new()))
}

#[cfg(not(target_os = "linux"))]
fn uinput_provider() -> anyhow::Result<Arc<dyn VirtualDeviceProvider>> {
    anyhow::bail!("the uinput backend needs Linux; set device_backend = \"logging\"");
}
