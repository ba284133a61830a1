//! beam-server entry point.
//!
//! ```text
//! beam-server                   Serve with beam.toml (or defaults)
//! beam-server --config <path>   Load a custom config TOML
//! beam-server --listen <addr>   Override the listen address
//! beam-server --gen-config      Write default config to stdout
//! ```

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use beam_server::config::{LoggingConfig, ServerConfig};
use beam_server::server::StreamServer;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "beam-server", about = "Stream the local screen and audio to a WebSocket viewer")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "beam.toml")]
    config: PathBuf,

    /// Address to listen on, overriding the config file.
    #[arg(short, long)]
    listen: Option<String>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&ServerConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = ServerConfig::load(&cli.config);
    if let Some(listen) = cli.listen {
        config.network.listen = listen;
    }

    init_tracing(&config.logging)?;

    info!("beam-server v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "capture: {} {}x{}+{}+{} @ {} fps",
        config.capture.backend,
        config.capture.width,
        config.capture.height,
        config.capture.x,
        config.capture.y,
        config.capture.fps
    );
    info!("video: {}, audio: {}", config.video.backend, config.audio.backend);

    let server = StreamServer::new(&config)?;
    let listener = TcpListener::bind(&config.network.listen).await?;

    // Ctrl-C handler.
    let stop = server.stop_handle();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, shutting down");
        stop.cancel();
    });

    server.run(listener).await?;

    Ok(())
}

/// `RUST_LOG` overrides the configured level.
fn init_tracing(logging: &LoggingConfig) -> std::io::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    if logging.file.is_empty() {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    } else {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&logging.file)?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .init();
    }
    Ok(())
}
