use clap::Parser;
use serial_tcp_bridge::{Bridge, ConfigLoader, NopDecoder};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Exit code signaling an operational serial-device failure to the
/// supervising process: the device could not be opened, or it failed while
/// being serviced.
const EXIT_DEVICE_FAILURE: i32 = 3;

/// Generic fatal error (configuration, listener socket, ...).
const EXIT_FAILURE: i32 = 1;

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Bridges a single serial device to any number of concurrent TCP clients.",
    long_about = "Raw byte passthrough between one serial device and a TCP broadcast \
group. Bytes read from the device go to every connected client; bytes from any \
client go to the device. Serial parameters are fixed at startup (no RFC2217)."
)]
struct Args {
    /// Path to the bridge configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial device path, overriding the configuration.
    #[arg(short, long)]
    device: Option<String>,

    /// Listen address (host:port), overriding the configuration.
    #[arg(short, long)]
    listen: Option<SocketAddr>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let loader = match args.config {
        Some(ref path) => ConfigLoader::load_from(path),
        None => ConfigLoader::load(),
    };
    let mut config = match loader {
        Ok(loader) => loader.into_config(),
        Err(e) => {
            eprintln!("configuration error: {e}");
            std::process::exit(EXIT_FAILURE);
        }
    };

    if let Some(device) = args.device {
        config.bridge.device = device;
    }
    if let Some(listen) = args.listen {
        config.bridge.host = listen.ip().to_string();
        config.bridge.port = listen.port();
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .init();

    let bridge_config = match config.bridge.resolve() {
        Ok(resolved) => resolved,
        Err(e) => {
            error!(error = %e, "invalid bridge configuration");
            std::process::exit(EXIT_FAILURE);
        }
    };

    let mut bridge = match Bridge::open(bridge_config, Arc::new(NopDecoder)) {
        Ok(bridge) => bridge,
        Err(e) => {
            error!(error = %e, "could not start bridge");
            std::process::exit(EXIT_DEVICE_FAILURE);
        }
    };

    let stop = bridge.stop_handle();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("signal received, stopping bridge");
        stop.stop();
    });

    match bridge.run().await {
        Ok(()) => {}
        Err(e) if e.is_device_failure() => {
            error!(error = %e, "bridge terminated: serial device failure");
            std::process::exit(EXIT_DEVICE_FAILURE);
        }
        Err(e) => {
            error!(error = %e, "bridge terminated");
            std::process::exit(EXIT_FAILURE);
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if signal::ctrl_c().await.is_err() {
            // No signal handler means no clean stop; park forever instead of
            // failing the bridge.
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
