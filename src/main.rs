use clap::Parser;
use std::sync::Arc;
use tokio::signal;

use puffsync::config::Config;
use puffsync::device::sim::SimulatedDevice;
use puffsync::device::telemetry::{PollIntervals, TelemetryAggregator};
use puffsync::gateway::codec::{Compression, Encoding};
use puffsync::gateway::events::{EventName, GatewayEvent};
use puffsync::gateway::{ConnectOptions, GatewayClient};

/// Group session client: keeps a gateway connection alive and optionally
/// streams device telemetry into it.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Gateway base url (overrides PUFF_GATEWAY_URL)
    #[arg(long)]
    url: Option<String>,

    /// Wire encoding (overrides PUFF_GATEWAY_ENCODING)
    #[arg(long)]
    encoding: Option<Encoding>,

    /// zlib or none (overrides PUFF_GATEWAY_COMPRESSION)
    #[arg(long)]
    compression: Option<Compression>,

    /// Display name announced after every HELLO
    #[arg(long)]
    name: Option<String>,

    /// Group to join once the session is ready
    #[arg(long)]
    group: Option<String>,

    /// Poll an in-process simulated device and forward its state
    #[arg(long)]
    simulate_device: bool,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "puffsync=debug".into()),
        )
        .init();

    let args = Args::parse();
    let mut config = Config::from_env();
    if let Some(url) = args.url {
        config.gateway_url = url;
    }
    if let Some(encoding) = args.encoding {
        config.encoding = encoding;
    }
    if let Some(compression) = args.compression {
        config.compression = compression;
    }
    if args.name.is_some() {
        config.display_name = args.name;
    }
    print_banner(&config, args.simulate_device);

    let client = GatewayClient::new();
    register_listeners(&client, args.group);

    let mut options = ConnectOptions::new(config.gateway_url.clone())
        .with_encoding(config.encoding)
        .with_compression(config.compression);
    if let Some(name) = &config.display_name {
        options = options.with_display_name(name.clone());
    }
    client.connect(options);

    let mut telemetry = None;
    if args.simulate_device {
        let mut aggregator = simulated_aggregator(config.handshake_secret);
        match start_bridge(&mut aggregator, &client, &config).await {
            Ok(()) => telemetry = Some(aggregator),
            Err(e) => tracing::error!("device bridge not started: {e}"),
        }
    }

    shutdown_signal().await;
    tracing::info!("shutting down");

    if let Some(mut aggregator) = telemetry {
        aggregator.disconnect().await;
        client.disconnect_device();
    }
    client.shutdown();
}

fn print_banner(config: &Config, simulate_device: bool) {
    let version = env!("CARGO_PKG_VERSION");
    let sha = env!("GIT_SHA");

    eprintln!();
    eprintln!("  \x1b[1;36mpuffsync\x1b[0m \x1b[2mv{version} ({sha})\x1b[0m");
    eprintln!();
    eprintln!("  \x1b[2mgateway\x1b[0m      {}", config.gateway_url);
    eprintln!(
        "  \x1b[2mwire\x1b[0m         {} / {}",
        config.encoding, config.compression
    );
    if let Some(name) = &config.display_name {
        eprintln!("  \x1b[2mname\x1b[0m         {name}");
    }
    eprintln!("  \x1b[2mpoll\x1b[0m         {:?}", config.poll_interval);

    if simulate_device {
        eprintln!();
        eprintln!("  \x1b[33m! simulated device\x1b[0m");
    }

    eprintln!();
}

fn register_listeners(client: &GatewayClient, group: Option<String>) {
    let joiner = client.clone();
    client.on(EventName::Init, move |_| {
        if let Some(group) = &group {
            joiner.join_group(group);
        }
    });

    client.on(EventName::Connected, |_| tracing::info!("gateway connected"));
    client.on(EventName::JoinedGroup, |event| {
        if let GatewayEvent::JoinedGroup(group) = event {
            tracing::info!("joined group {} ({})", group.name, group.group_id);
        }
    });
    client.on(EventName::GroupUserJoin, |event| {
        if let GatewayEvent::GroupUserJoin(join) = event {
            tracing::info!("{} joined the group", join.session_id);
        }
    });
    client.on(EventName::GroupUserLeft, |event| {
        if let GatewayEvent::GroupUserLeft(left) = event {
            tracing::info!("{} left the group", left.session_id);
        }
    });
    client.on(EventName::GroupHeatBegin, |_| tracing::info!("group heat cycle starting"));
    client.on(EventName::GroupMessage, |event| {
        if let GatewayEvent::GroupMessage(message) = event {
            tracing::info!("<{}> {}", message.author_session_id, message.content);
        }
    });
    for error in [
        EventName::GroupJoinError,
        EventName::GroupActionError,
        EventName::GroupCreateError,
        EventName::UserUpdateError,
    ] {
        client.on(error, |event| tracing::warn!("gateway rejected request: {event:?}"));
    }
}

/// The simulated device checks keys against the same secret the client
/// derives them from.
fn simulated_aggregator(secret: [u8; 16]) -> TelemetryAggregator<SimulatedDevice> {
    let device = SimulatedDevice::new().with_defaults().with_secret(secret);
    TelemetryAggregator::new(Arc::new(device)).with_secret(secret)
}

async fn start_bridge(
    aggregator: &mut TelemetryAggregator<SimulatedDevice>,
    client: &GatewayClient,
    config: &Config,
) -> Result<(), puffsync::error::DeviceError> {
    aggregator.handshake().await?;
    let mut deltas = aggregator.start_polling(&PollIntervals::with_default(config.poll_interval))?;

    let client = client.clone();
    tokio::spawn(async move {
        while let Some(delta) = deltas.recv().await {
            tracing::debug!("device delta {delta:?}");
            client.send_device_state(&delta);
        }
    });
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
