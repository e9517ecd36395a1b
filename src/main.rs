use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vision_relay::config::{AppConfig, ConfigStore, SourceMode};
use vision_relay::logs::LogSink;
use vision_relay::pipeline::{FramePipeline, LatestFrameSlot};
use vision_relay::plugin::PluginRegistry;
use vision_relay::state::AppState;
use vision_relay::stream::MjpegBroadcaster;
use vision_relay::video::{
    Backoff, CaptureDevice, RemoteMjpegDevice, ThreadSleeper, V4l2Device, VideoSourceManager,
};
use vision_relay::web;

const LOG_SOURCE: &str = "App";

/// Log level for the application
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Verbose,
    Debug,
    Trace,
}

/// Vision Relay command line arguments
#[derive(Parser, Debug)]
#[command(name = "vision-relay")]
#[command(version, about = "Live video relay with hot-swappable inference plugins", long_about = None)]
struct CliArgs {
    /// JSON configuration file
    #[arg(short = 'c', long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Capture from the local video device instead of the remote stream
    #[arg(long)]
    standalone: bool,

    /// Remote MJPEG stream URL (overrides config)
    #[arg(long, value_name = "URL")]
    source_url: Option<String>,

    /// Local video device (overrides config)
    #[arg(long, value_name = "PATH")]
    device: Option<String>,

    /// Load this model on startup
    #[arg(short = 'm', long, value_name = "ID")]
    model: Option<String>,

    /// Plugin directory (overrides config)
    #[arg(long, value_name = "DIR")]
    plugins_dir: Option<String>,

    /// Listen address (overrides config)
    #[arg(short = 'a', long, value_name = "ADDRESS")]
    address: Option<String>,

    /// HTTP port (overrides config)
    #[arg(short = 'p', long, value_name = "PORT")]
    port: Option<u16>,

    /// Log level (error, warn, info, verbose, debug, trace)
    #[arg(short = 'l', long, value_name = "LEVEL", default_value = "info")]
    log_level: LogLevel,

    /// Increase verbosity (-v for verbose, -vv for debug, -vvv for trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    init_logging(args.log_level, args.verbose, args.log_json);

    tracing::info!(
        "Starting Vision Relay v{} on {} {}",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    );

    let config_store = match &args.config {
        Some(path) => ConfigStore::load(path).await?,
        None => ConfigStore::with_defaults(),
    };
    config_store.update(|config| apply_cli_overrides(config, &args))?;
    let config = config_store.get();
    tracing::debug!("Effective configuration: {:?}", config);

    let shutdown = CancellationToken::new();
    let logs = Arc::new(LogSink::new());

    // Plugins
    let registry = Arc::new(PluginRegistry::new(&config.plugins.dir, logs.clone()));
    tracing::info!(
        "Plugin directory: {} ({} available)",
        registry.plugins_dir().display(),
        registry.list_available().len()
    );
    match &config.plugins.startup {
        Some(id) => {
            if let Err(e) = registry.load(id) {
                tracing::warn!("Startup plugin failed: {}", e);
                logs.error(LOG_SOURCE, format!("Could not load model: {}", id));
            }
        }
        None => logs.info(LOG_SOURCE, "No model specified. Running in video only mode."),
    }

    // Video source
    let device = create_device(&config)?;
    let source = VideoSourceManager::new(
        device,
        Backoff::new(config.source.backoff_base(), config.source.backoff_max()),
        Box::new(ThreadSleeper::new(shutdown.clone())),
        logs.clone(),
    )
    .with_read_failure_pause(config.source.read_failure_pause());
    let source_name = source.source_name();
    let source_state = source.subscribe();
    let source_counters = source.counters();
    logs.info(LOG_SOURCE, format!("Video source: {}", source_name));

    // Producer
    let slot = Arc::new(LatestFrameSlot::new());
    let pipeline = FramePipeline::new(
        source,
        registry.clone(),
        slot.clone(),
        logs.clone(),
        shutdown.clone(),
    )
    .with_yield_pause(config.pipeline.yield_pause());
    let pipeline_counters = pipeline.counters();
    let mut pipeline_handle = pipeline.spawn()?;

    // Consumers
    let broadcaster = Arc::new(MjpegBroadcaster::new(
        slot.clone(),
        source_state,
        config.stream.broadcaster_config(),
        shutdown.clone(),
    ));

    let state = AppState::new(
        config_store.clone(),
        logs.clone(),
        registry,
        slot,
        broadcaster,
        source_counters,
        pipeline_counters,
        source_name,
    );

    let app = web::create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.web.bind_address, config.web.port)
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid bind address: {}", config.web.bind_address))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Starting HTTP server on {}", listener.local_addr()?);
    logs.success(LOG_SOURCE, format!("Server listening on {}", addr));

    // Setup graceful shutdown
    let signal_token = shutdown.clone();
    let shutdown_signal = async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    tracing::error!("Failed to listen for CTRL+C: {}", e);
                }
                tracing::info!("Shutdown signal received");
            }
            _ = signal_token.cancelled() => {}
        }
        signal_token.cancel();
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
    {
        tracing::error!("HTTP server error: {}", e);
    }

    // The producer may be blocked on a read; join it off the async workers
    shutdown.cancel();
    tokio::task::spawn_blocking(move || pipeline_handle.stop()).await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Command-line flags win over the configuration file
fn apply_cli_overrides(config: &mut AppConfig, args: &CliArgs) {
    if args.standalone {
        config.source.mode = SourceMode::Local;
    }
    if let Some(url) = &args.source_url {
        config.source.remote_url = url.clone();
    }
    if let Some(device) = &args.device {
        config.source.device = device.clone();
    }
    if let Some(model) = &args.model {
        config.plugins.startup = Some(model.clone());
    }
    if let Some(dir) = &args.plugins_dir {
        config.plugins.dir = dir.clone();
    }
    if let Some(address) = &args.address {
        config.web.bind_address = address.clone();
    }
    if let Some(port) = args.port {
        config.web.port = port;
    }
}

fn create_device(config: &AppConfig) -> anyhow::Result<Box<dyn CaptureDevice>> {
    let source = &config.source;
    let device: Box<dyn CaptureDevice> = match source.mode {
        SourceMode::Local => {
            tracing::info!("Standalone mode: capturing from {}", source.device);
            Box::new(V4l2Device::new(
                &source.device,
                source.width,
                source.height,
                source.read_timeout(),
            ))
        }
        SourceMode::Remote => {
            tracing::info!("Remote mode: reading {}", source.remote_url);
            Box::new(RemoteMjpegDevice::new(
                source.remote_url.clone(),
                tokio::runtime::Handle::current(),
                source.connect_timeout(),
                source.read_timeout(),
            )?)
        }
    };
    Ok(device)
}

/// Initialize logging with tracing
fn init_logging(level: LogLevel, verbose_count: u8, json: bool) {
    // Verbose count overrides log level
    let effective_level = match verbose_count {
        0 => level,
        1 => LogLevel::Verbose,
        2 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };

    let filter = match effective_level {
        LogLevel::Error => "vision_relay=error,tower_http=error",
        LogLevel::Warn => "vision_relay=warn,tower_http=warn",
        LogLevel::Info => "vision_relay=info,tower_http=info",
        LogLevel::Verbose => "vision_relay=debug,tower_http=info",
        LogLevel::Debug => "vision_relay=debug,tower_http=debug",
        LogLevel::Trace => "vision_relay=trace,tower_http=debug",
    };

    // Environment variable takes highest priority
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

    if let Err(err) = tracing_subscriber::registry()
        .with(env_filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .try_init()
    {
        eprintln!("failed to initialize tracing: {}", err);
    }
}
