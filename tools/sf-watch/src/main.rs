//! sf-watch: secure-finality operator CLI.
//!
//! Three modes against one chain endpoint:
//!
//! - `track`   submit a signed payload and follow it to secure finality
//! - `wait`    watch-only: wait for the watermark to reach a fixed block
//! - `advance` run the watermark advancement loop until interrupted
//!
//! Exits 0 on success; 1 on any unrecoverable setup failure or on an
//! observed dispatch failure of a submitted transaction.

mod rpc;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use chain_client::SignedPayload;
use secure_finality::{
    LifecycleEvent, SecureTracker, WatcherConfig, WatermarkAdvancer, WatermarkWait,
};

use rpc::HttpChainClient;

/// sf-watch: secure-finality operator CLI
#[derive(Parser, Debug)]
#[command(name = "sf-watch")]
#[command(about = "Track transactions to secure finality and keep the watermark advancing")]
struct Args {
    /// JSON-RPC endpoint of the chain node
    #[arg(short, long, default_value = "http://127.0.0.1:9933")]
    endpoint: String,

    /// Pallet exposing the watermark storage and advancement call
    #[arg(short, long, default_value = "secureFinality")]
    pallet: String,

    /// Signing credential (SURI), consumed opaquely by the node-side signer
    #[arg(short, long, default_value = "//Alice")]
    suri: String,

    /// Poll interval in seconds
    #[arg(long, default_value = "6")]
    interval: u64,

    /// Cooldown after a failed tick, in seconds
    #[arg(long, default_value = "30")]
    cooldown: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit a signed payload and follow it to secure finality
    Track {
        /// Hex-encoded signed transaction payload
        #[arg(long)]
        payload: String,
    },
    /// Watch-only: wait for the watermark to reach a fixed block and exit
    Wait {
        /// Target block number
        #[arg(long)]
        target: u64,
        /// Optional deadline in seconds
        #[arg(long)]
        deadline: Option<u64>,
    },
    /// Run the watermark advancement loop until interrupted
    Advance {
        /// Log intended calls instead of submitting them
        #[arg(long)]
        dry_run: bool,
    },
}

impl Args {
    fn watcher_config(&self) -> WatcherConfig {
        WatcherConfig {
            endpoint: self.endpoint.clone(),
            signer_suri: self.suri.clone(),
            pallet: self.pallet.clone(),
            poll_interval_secs: self.interval,
            failure_cooldown_secs: self.cooldown,
            dry_run: matches!(self.command, Command::Advance { dry_run: true }),
            watch_target: match self.command {
                Command::Wait { target, .. } => Some(target),
                _ => None,
            },
            ..WatcherConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = args.watcher_config();
    config.validate().context("configuration rejected")?;

    let client = HttpChainClient::connect(
        &config.endpoint,
        &config.pallet,
        config.poll_interval(),
    )
    .await
    .context("chain connection failed")?;
    let client = Arc::new(client);
    info!(endpoint = %config.endpoint, pallet = %config.pallet, "connected");

    match args.command {
        Command::Track { payload } => run_track(client, &payload).await,
        Command::Wait { target, deadline } => run_wait(client, target, deadline).await,
        Command::Advance { .. } => run_advance(client, config).await,
    }
}

async fn run_track(client: Arc<HttpChainClient>, payload_hex: &str) -> Result<()> {
    let bytes = hex::decode(payload_hex.trim_start_matches("0x"))
        .context("payload is not valid hex")?;

    let tracker = SecureTracker::new(client);
    let handle = tracker
        .submit_and_watch(SignedPayload::from_bytes(bytes), render_event)
        .await
        .context("submission failed")?;

    match handle.secure_finalized().await {
        Ok(number) => {
            info!(inclusion = number, "transaction secure-finalized");
            Ok(())
        }
        Err(error) if error.is_dispatch() => {
            error!(%error, "transaction failed on-chain");
            Err(anyhow!(error))
        }
        Err(error) => {
            error!(%error, "tracking aborted");
            Err(anyhow!(error))
        }
    }
}

fn render_event(event: LifecycleEvent) {
    match event {
        LifecycleEvent::Ready => info!("transaction ready"),
        LifecycleEvent::Broadcast => info!("transaction broadcast to peers"),
        LifecycleEvent::InBlock(block) => info!(%block, "transaction included in block"),
        LifecycleEvent::Finalized { block, number } => info!(%block, number, "block finalized"),
        LifecycleEvent::Failed(error) => {
            warn!(%error, docs = %error.description(), "dispatch failed")
        }
        LifecycleEvent::SecureFinalized(number) => {
            info!(inclusion = number, "secure finalized")
        }
    }
}

async fn run_wait(client: Arc<HttpChainClient>, target: u64, deadline: Option<u64>) -> Result<()> {
    info!(target, "waiting for watermark to reach target");
    let wait = WatermarkWait::spawn(client, target);
    let result = match deadline {
        Some(secs) => wait.wait_with_deadline(Duration::from_secs(secs)).await,
        None => wait.wait().await,
    };
    let watermark = result.context("watermark wait failed")?;
    info!(%watermark, target, "watermark reached target");
    Ok(())
}

async fn run_advance(client: Arc<HttpChainClient>, config: WatcherConfig) -> Result<()> {
    let handle = WatermarkAdvancer::spawn(client, config);
    info!("advancement loop running, press Ctrl+C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("signal listener failed")?;

    let stats = handle.stats();
    handle.shutdown().await;
    info!(
        ticks = stats.ticks,
        attempts = stats.attempts,
        succeeded = stats.succeeded,
        failed = stats.failed,
        dry_runs = stats.dry_runs,
        "advancement loop summary"
    );
    Ok(())
}
