//! Remote-console client entry point.
//!
//! # Usage
//!
//! ```text
//! console-client [--config <PATH>] <COMMAND>
//!
//! Commands:
//!   decode <FILE> [--count N]   Decode an Elias-gamma coded update frame
//!   demo [--message TEXT]       Run configured listeners/channels over loopback
//!   init-config                 Write the current (or default) configuration
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable                | Description                                 |
//! |-------------------------|---------------------------------------------|
//! | `CONSOLE_CLIENT_CONFIG` | Config file path (same as `--config`)       |
//! | `RUST_LOG`              | Log filter; overrides `client.log_level`    |

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use console_client::application::channel_setup::{ChannelSetupUseCase, ListenerHooks, ListenerSpec};
use console_client::application::update_stream::UpdateStreamDecoder;
use console_client::infrastructure::storage::config::{
    load_config, load_config_from, save_config, save_config_to, AppConfig,
};
use console_client::infrastructure::transport::LoopbackTransport;
use console_core::mux::{ChannelOptions, Dispatcher, ListenerCallbacks};

/// First channel id used for simulated peer-opened channels in the demo.
const DEMO_PEER_CHANNEL_BASE: u32 = 0x8000_0000;

// ── CLI argument definitions ──────────────────────────────────────────────────

#[derive(Debug, Parser)]
#[command(
    name = "console-client",
    about = "Remote-console client: update decoding and virtual channels",
    version
)]
struct Cli {
    /// Path to the TOML configuration file.
    ///
    /// Defaults to the platform config directory.
    #[arg(long, env = "CONSOLE_CLIENT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Decode an Elias-gamma coded update frame read from a file.
    Decode {
        file: PathBuf,
        /// Number of values the frame announces.  Without it every complete
        /// codeword in the file is printed.
        #[arg(long)]
        count: Option<usize>,
    },
    /// Register the configured listeners, open the configured channels over a
    /// loopback transport, exchange one message on each and shut down.
    Demo {
        /// Payload sent on every opened channel.
        #[arg(long, default_value = "hello")]
        message: String,
    },
    /// Write the loaded configuration (defaults if the file is missing) back
    /// to the config path.
    InitConfig,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config_from(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => load_config().context("failed to load config")?,
    };

    // RUST_LOG wins over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.client.log_level)),
        )
        .init();

    info!(client = %config.client.name, "console-client starting");

    match cli.command {
        Command::Decode { file, count } => run_decode(&file, count),
        Command::Demo { message } => run_demo(&config, &message).await,
        Command::InitConfig => {
            match &cli.config {
                Some(path) => save_config_to(path, &config)
                    .with_context(|| format!("failed to write config to {}", path.display()))?,
                None => save_config(&config).context("failed to write config")?,
            }
            info!("configuration written");
            Ok(())
        }
    }
}

// ── Commands ──────────────────────────────────────────────────────────────────

fn run_decode(file: &Path, count: Option<usize>) -> anyhow::Result<()> {
    let bytes =
        std::fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;

    let mut decoder = UpdateStreamDecoder::new();
    let values = match count {
        Some(count) => decoder
            .decode_frame(&bytes, count)
            .with_context(|| format!("failed to decode {}", file.display()))?,
        None => decoder.decode_all(&bytes),
    };

    let line: Vec<String> = values.iter().map(u32::to_string).collect();
    println!("{}", line.join(" "));
    info!(values = values.len(), bytes = bytes.len(), "frame decoded");
    Ok(())
}

async fn run_demo(config: &AppConfig, message: &str) -> anyhow::Result<()> {
    let mut dispatcher = Dispatcher::new();
    let transport = Arc::new(LoopbackTransport::new(dispatcher.handle()));
    let session = dispatcher.attach_session(&config.client.session_name, transport.clone());
    transport.bind(session);

    let setup = ChannelSetupUseCase::new(
        config.channels.clone(),
        config.listeners.clone(),
        Arc::new(LoggingHooks),
    );
    let listeners = setup
        .register_listeners(&mut dispatcher)
        .context("failed to register listeners")?;

    transport.connect();
    dispatcher.run_pending();

    // Pretend the peer opens one channel per listener name.
    for (offset, spec) in (0u32..).zip(&config.listeners) {
        let name = spec.name.replace('*', "");
        transport.peer_open(DEMO_PEER_CHANNEL_BASE + offset, ChannelOptions::named(name));
    }

    let report = setup
        .open_channels(&mut dispatcher, session)
        .context("failed to open channels")?;
    dispatcher.run_pending();

    for &id in &report.requested {
        let Some(channel) = dispatcher.channel_mut(session, id) else {
            continue;
        };
        let name = channel.name().to_string();
        channel.on_message(move |data| {
            info!(channel = %name, "echo: {}", String::from_utf8_lossy(data));
        });
        if !channel.send(message.as_bytes()) {
            warn!(channel = id, "demo message refused by transport");
        }
        if !channel.close() {
            warn!(channel = id, "channel close refused");
        }
    }

    transport.disconnect();
    for id in listeners {
        if let Some(listener) = dispatcher.listener(id) {
            if !listener.close() {
                warn!(listener = id, "listener close refused");
            }
        }
    }
    dispatcher.handle().shutdown();
    dispatcher.run().await;

    info!(
        opened = report.requested.len(),
        rejected = report.rejected.len(),
        "demo finished"
    );
    Ok(())
}

/// Listener callbacks that only log what they see.
struct LoggingHooks;

impl ListenerHooks for LoggingHooks {
    fn callbacks_for(&self, spec: &ListenerSpec) -> ListenerCallbacks {
        let (on_connect, on_peer_open, on_close) =
            (spec.name.clone(), spec.name.clone(), spec.name.clone());
        ListenerCallbacks::new()
            .on_connect(move |session| {
                info!(listener = %on_connect, %session, "session connected");
            })
            .on_peer_open(move |session, channel| {
                info!(listener = %on_peer_open, %session, channel = %channel.name(), "peer opened channel");
                let name = channel.name().to_string();
                channel.on_close(move |close| {
                    info!(channel = %name, code = close.code, by_peer = close.by_peer, "peer channel closed");
                });
            })
            .on_close(move || {
                info!(listener = %on_close, "listener closed");
            })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
