//! Input Pipe client entry point.
//!
//! Loads the configuration, opens the configured input device, and streams
//! it to the server until the device goes away or Ctrl-C is pressed.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load_config()              -- argv[1] or ~/.config/inputpipe/client.toml
//!  └─ EvdevSource::open()        -- query the device, apply [device] overrides
//!  └─ EvdevSource::start()       -- capture thread → event channel
//!  └─ DeviceStreamer::new()      -- pre-encodes the announcement
//!  └─ ClientConnection::run()    -- connect / announce / forward / reconnect
//! ```
//!
//! `ipipe-client --write-config <path>` writes the default configuration to
//! `<path>` and exits.

use std::ffi::OsStr;
use std::path::PathBuf;

use anyhow::{bail, Context};
use tracing::info;
use tracing_subscriber::EnvFilter;

use ipipe_client::application::stream_device::DeviceStreamer;
use ipipe_client::infrastructure::{
    input_capture::InputSource,
    network::{ClientConnection, ClientConnectionConfig},
    storage::config::{load_config, save_config_to, AppConfig},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut args = std::env::args_os().skip(1);
    let first = args.next();
    if first.as_deref() == Some(OsStr::new("--write-config")) {
        let Some(path) = args.next().map(PathBuf::from) else {
            bail!("usage: ipipe-client --write-config <path>");
        };
        save_config_to(&AppConfig::default(), &path)
            .with_context(|| format!("writing {}", path.display()))?;
        println!("wrote {}", path.display());
        return Ok(());
    }

    let config_path = first.map(PathBuf::from);
    let config = load_config(config_path.as_deref()).context("loading client configuration")?;

    // RUST_LOG wins over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.client.log_level)),
        )
        .init();

    info!("Input Pipe client starting");

    let source = open_source(&config)?;
    let mut streamer = DeviceStreamer::new(source.descriptor())
        .context("device description does not fit the wire format")?;
    let events = source.start()?;

    let connection = ClientConnection::new(ClientConnectionConfig {
        server_addr: config.client.server_address.clone(),
        reconnect: config.client.reconnect,
        reconnect_interval: config.client.reconnect_interval(),
    });

    // ── Main loop ─────────────────────────────────────────────────────────────
    tokio::select! {
        result = connection.run(&mut streamer, events) => result?,
        _ = tokio::signal::ctrl_c() => info!("shutdown signal received"),
    }

    source.stop();
    info!(forwarded = streamer.forwarded(), "Input Pipe client stopped");
    Ok(())
}

#[cfg(target_os = "linux")]
fn open_source(config: &AppConfig) -> anyhow::Result<Box<dyn InputSource>> {
    use ipipe_client::infrastructure::input_capture::evdev::EvdevSource;

    let Some(path) = config.source.evdev_path.clone() else {
        bail!("no input device configured; set [source] evdev_path");
    };
    let source = EvdevSource::open(path)?;
    let descriptor = config.device.apply_to(source.descriptor());
    Ok(Box::new(source.with_descriptor(descriptor)))
}

#[cfg(not(target_os = "linux"))]
fn open_source(_config: &AppConfig) -> anyhow::Result<Box<dyn InputSource>> {
    bail!("input capture is only implemented for Linux evdev devices");
}
