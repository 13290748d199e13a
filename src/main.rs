//! camstream: camera stream relay daemon
//!
//! Accepts producers on the ingest port and serves viewers over HTTP.
//!
//! Run with: `camstream --ingest-addr 0.0.0.0:12345 --http-addr 0.0.0.0:8080`

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use camstream_rs::broadcast::{BroadcastConfig, Broadcaster};
use camstream_rs::delivery::{ControllerConfig, DeliveryConfig};
use camstream_rs::http::{HttpConfig, HttpServer};
use camstream_rs::registry::{RegistryConfig, StreamRegistry, StreamSource};
use camstream_rs::server::{Ingestor, ServerConfig};

/// Camera stream relay
#[derive(Parser, Debug)]
#[command(name = "camstream", about = "Relay camera streams to HTTP and WebSocket viewers")]
struct Cli {
    /// Producer ingest listen address
    #[arg(long, env = "CAMSTREAM_INGEST_ADDR", default_value = "0.0.0.0:12345")]
    ingest_addr: SocketAddr,

    /// Viewer HTTP listen address
    #[arg(long, env = "CAMSTREAM_HTTP_ADDR", default_value = "0.0.0.0:8080")]
    http_addr: SocketAddr,

    /// Maximum concurrently connected producers (0 = unlimited)
    #[arg(long, env = "CAMSTREAM_MAX_PRODUCERS", default_value_t = 8)]
    max_producers: usize,

    /// Stream ID prefix, streams are served at /<prefix><N>
    #[arg(long, env = "CAMSTREAM_STREAM_PREFIX", default_value = "stream")]
    stream_prefix: String,

    /// Number of stream routes exposed over HTTP
    #[arg(long, env = "CAMSTREAM_STREAM_ROUTES", default_value_t = 8)]
    stream_routes: u32,

    /// Directory with static files (index.html etc.)
    #[arg(long, env = "CAMSTREAM_STATIC_DIR")]
    static_dir: Option<PathBuf>,

    /// Frames buffered per stream quality between producer and fan-out
    #[arg(long, env = "CAMSTREAM_INGEST_BUFFER", default_value_t = 32)]
    ingest_buffer: usize,

    /// Frames buffered per viewer
    #[arg(long, env = "CAMSTREAM_VIEWER_BUFFER", default_value_t = 4)]
    viewer_buffer: usize,

    /// Seconds without a delivered frame before a viewer is dropped
    #[arg(long, env = "CAMSTREAM_IDLE_TIMEOUT", default_value_t = 5)]
    idle_timeout: u64,

    /// Disable adaptive viewer quality
    #[arg(long, env = "CAMSTREAM_NO_QUALITY_CONTROL")]
    no_quality_control: bool,

    /// Seconds of delivery averaged per quality decision
    #[arg(long, env = "CAMSTREAM_QUALITY_WINDOW", default_value_t = 30)]
    quality_window: u64,

    /// Delivered frame rate under which a viewer's quality is lowered
    #[arg(long, env = "CAMSTREAM_MIN_FPS", default_value_t = 8.0)]
    min_fps: f64,

    /// Delivered frame rate over which a viewer's quality may be raised
    #[arg(long, env = "CAMSTREAM_MAX_FPS", default_value_t = 29.0)]
    max_fps: f64,

    /// Consecutive windows over the max rate needed for one raise
    #[arg(long, env = "CAMSTREAM_RAISE_AFTER", default_value_t = 5)]
    raise_after: u32,

    /// Seconds a producer has to complete its handshake
    #[arg(long, env = "CAMSTREAM_HANDSHAKE_TIMEOUT", default_value_t = 10)]
    handshake_timeout: u64,

    /// Largest frame accepted from a producer, in bytes
    #[arg(long, env = "CAMSTREAM_MAX_FRAME_SIZE", default_value_t = 16 * 1024 * 1024)]
    max_frame_size: usize,
}

impl Cli {
    fn server_config(&self) -> ServerConfig {
        ServerConfig::with_addr(self.ingest_addr)
            .max_producers(self.max_producers)
            .stream_prefix(self.stream_prefix.clone())
            .handshake_timeout(Duration::from_secs(self.handshake_timeout))
            .max_frame_size(self.max_frame_size)
    }

    fn delivery_config(&self) -> DeliveryConfig {
        let controller = ControllerConfig::default()
            .window(Duration::from_secs(self.quality_window))
            .min_fps(self.min_fps)
            .max_fps(self.max_fps)
            .raise_after(self.raise_after);

        DeliveryConfig::default()
            .idle_timeout(Duration::from_secs(self.idle_timeout))
            .quality_control(!self.no_quality_control)
            .controller(controller)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("camstream_rs=info,camstream=info")),
        )
        .init();

    let cli = Cli::parse();

    let registry = Arc::new(StreamRegistry::with_config(
        RegistryConfig::default().frame_channel_capacity(cli.ingest_buffer),
    ));

    let ingestor = Ingestor::with_registry(cli.server_config(), Arc::clone(&registry));

    let broadcaster = Arc::new(Broadcaster::with_config(
        registry as Arc<dyn StreamSource>,
        BroadcastConfig::default().viewer_channel_capacity(cli.viewer_buffer),
    ));

    let mut http_config = HttpConfig::with_addr(cli.http_addr)
        .stream_prefix(cli.stream_prefix.clone())
        .stream_routes(cli.stream_routes);
    if let Some(ref dir) = cli.static_dir {
        http_config = http_config.static_dir(dir.clone());
    }
    let delivery = cli.delivery_config();
    let http = HttpServer::with_delivery(http_config, broadcaster, delivery);

    let ingest_listener = ingestor
        .bind()
        .await
        .with_context(|| format!("failed to bind ingest listener on {}", cli.ingest_addr))?;
    let http_listener = http
        .bind()
        .await
        .with_context(|| format!("failed to bind HTTP listener on {}", cli.http_addr))?;

    tokio::select! {
        result = ingestor.serve(ingest_listener) => result.context("ingest server failed")?,
        result = http.serve(http_listener) => result.context("HTTP server failed")?,
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for Ctrl-C")?;
            tracing::info!("Shutting down");
        }
    }

    Ok(())
}
