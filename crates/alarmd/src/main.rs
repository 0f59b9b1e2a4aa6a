use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::Mutex;
use tracing::error;
use tracing::info;
use tracing_subscriber::filter::LevelFilter;

use alarmd::alarm::AlarmPolicy;
use alarmd::api;
use alarmd::api::AppState;
use alarmd::bus;
use alarmd::bus::DeviceBus;
use alarmd::bus::MockBus;
use alarmd::config;
use alarmd::config::Config;
use alarmd::engine::Engine;
use alarmd::notify::EmailChannel;
use alarmd::notify::Notifier;
use alarmd::notify::PushChannel;

/// Home-automation alarm notification daemon
#[derive(Parser)]
#[command(name = "alarmd", version)]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(long, default_value = config::DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Number of synthetic devices on the mock bus
    #[arg(long, default_value_t = 3)]
    mock_devices: u32,

    /// Override the configured HTTP listen port
    #[arg(long)]
    port: Option<u16>,

    /// Address to bind the HTTP API to
    #[arg(long, default_value = "0.0.0.0")]
    listen: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::load(&cli.config)?;

    tracing_subscriber::fmt()
        .with_max_level(LevelFilter::from(config.log_level))
        .init();

    info!("alarmd starting");
    info!("loaded config from: {}", cli.config.display());

    let port = cli.port.unwrap_or(config.port);

    // Notification channels, shared between the policy (delivery) and the
    // API (configuration).
    let push = Arc::new(PushChannel::new(config.push.clone()));
    let email = Arc::new(EmailChannel::new(config.email.clone()));
    let notifiers: Vec<Arc<dyn Notifier>> = vec![
        Arc::clone(&push) as Arc<dyn Notifier>,
        Arc::clone(&email) as Arc<dyn Notifier>,
    ];

    let policy = Arc::new(Mutex::new(AlarmPolicy::new(&config.alarm, notifiers)));

    // The only shipped bus binding is the mock; a native binding would be
    // constructed here instead.
    let (events_tx, events_rx) = bus::device_event_channel();
    let bus: Arc<dyn DeviceBus> = Arc::new(MockBus::new(cli.mock_devices, events_tx));
    info!("mock device bus with {} devices", cli.mock_devices);

    let engine = Engine::new(Arc::clone(&bus), Arc::clone(&policy), events_rx);
    let engine_handle = tokio::spawn(engine.run());

    let state = AppState {
        policy,
        push,
        email,
        bus,
        config_path: Arc::new(cli.config.clone()),
        port,
        log_level: config.log_level,
    };

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let api_handle = tokio::spawn(api::serve(state, cli.listen.clone(), port, shutdown_rx));

    tokio::signal::ctrl_c().await?;
    info!("received shutdown signal");

    let _ = shutdown_tx.send(());
    match api_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("HTTP API server failed: {e}"),
        Err(e) => error!("HTTP API task panicked: {e}"),
    }
    engine_handle.abort();

    info!("alarmd shutdown complete");
    Ok(())
}
