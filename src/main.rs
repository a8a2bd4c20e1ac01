//! Provestor node
//!
//! One binary, four roles:
//!
//! ```text
//! ┌──────────────────────────── provestor ────────────────────────────┐
//! │  --mode ledger  serve the in-process ledger over HTTP             │
//! │  --mode peer    store slices, heartbeat, answer challenges        │
//! │  --mode owner   issue challenges, migrate replicas                │
//! │  --mode all     every role in one process                         │
//! └───────────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use provestor::config::{Config, LedgerBackend};
use provestor::copier::HttpCopier;
use provestor::crypto::pdp::pairing::PairingParams;
use provestor::crypto::Identity;
use provestor::encryptor::AesEncryptor;
use provestor::server::{self, ServerState};
use provestor::storage::{LocalStorage, SliceStorage};
use provestor::{Engine, LedgerGateway, MemoryLedger, RemoteLedger};

// =============================================================================
// CLI Arguments
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    Ledger,
    Peer,
    Owner,
    All,
}

impl Mode {
    fn is_peer(self) -> bool {
        matches!(self, Mode::Peer | Mode::All)
    }

    fn is_owner(self) -> bool {
        matches!(self, Mode::Owner | Mode::All)
    }
}

/// Provestor - verifiable decentralized file storage node
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML config file
    #[arg(long, env = "PROVESTOR_CONFIG")]
    config: Option<PathBuf>,

    /// Roles this process runs
    #[arg(long, env = "PROVESTOR_MODE", value_enum, default_value = "all")]
    mode: Mode,

    /// Listen address, overrides node.listen
    #[arg(long, env = "PROVESTOR_LISTEN")]
    listen: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args);

    let mut config = match &args.config {
        Some(path) => Config::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(listen) = &args.listen {
        config.node.listen = listen.clone();
    }

    info!("Starting Provestor node");
    info!("  Mode: {:?}", args.mode);
    info!("  Listen: {}", config.node.listen);
    info!("  Ledger: {:?}", config.ledger.backend);

    // Bind first; a taken port is fatal.
    let listener = server::bind(&config.node.listen)
        .await
        .with_context(|| format!("binding {}", config.node.listen))?;

    let shutdown = CancellationToken::new();
    let params = Arc::new(PairingParams::new());
    let ledger: Arc<dyn LedgerGateway> = match config.ledger.backend {
        LedgerBackend::Memory => {
            Arc::new(MemoryLedger::new(params.clone()).with_retention(config.retention_ns()))
        }
        LedgerBackend::Remote => {
            let endpoint = config
                .ledger
                .endpoint
                .as_deref()
                .context("ledger.endpoint is required for the remote backend")?;
            Arc::new(RemoteLedger::new(endpoint, config.http_timeout())?)
        }
    };

    let mut state = ServerState {
        max_push_size: server::push_limit(config.pipeline.block_size),
        ..Default::default()
    };
    if config.ledger.backend == LedgerBackend::Memory {
        state.ledger = Some(ledger.clone());
    }

    let mut tasks = Vec::new();
    if args.mode != Mode::Ledger {
        let identity = Identity::new(config.private_key()?)?;
        info!("  Node ID: {}", identity.id());

        // Peer-only nodes never encrypt; their key seeds an unused encryptor.
        let secret = match config.password() {
            Ok(p) => p.as_bytes().to_vec(),
            Err(e) if args.mode.is_owner() => return Err(e.into()),
            Err(_) => identity.signer.to_bytes(),
        };

        let storage: Arc<dyn SliceStorage> = Arc::new(
            LocalStorage::open(&config.storage.root)
                .await
                .context("opening slice storage")?,
        );
        let mut engine = Engine::new(
            identity,
            ledger.clone(),
            storage,
            Arc::new(HttpCopier::new(config.http_timeout())?),
            Arc::new(AesEncryptor::new(secret)?),
            params.clone(),
            config.engine_config()?,
        );
        if let Some(dir) = &config.challenge.material_dir {
            let material = LocalStorage::open(dir)
                .await
                .context("opening material storage")?;
            engine = engine.with_material_storage(Arc::new(material));
        }

        if args.mode.is_peer() {
            state.peer = Some(engine.peer().clone());
            tasks.extend(
                engine
                    .start_peer(&config.node.name, &config.public_address(), &shutdown)
                    .await?,
            );
        }
        if args.mode.is_owner() {
            tasks.extend(engine.start_owner(&shutdown));
        }
    }

    let mut server = tokio::spawn(server::serve_listener(listener, state, shutdown.clone()));

    let outcome: anyhow::Result<()> = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            Ok(())
        }
        result = &mut server => match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                error!("Server failed: {}", e);
                Err(e.into())
            }
            Err(e) => {
                error!("Server task panicked: {}", e);
                Err(e.into())
            }
        },
    };
    shutdown.cancel();
    for task in tasks {
        let _ = task.await;
    }
    outcome?;

    info!("Provestor shutdown complete");
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "reqwest=warn"] {
        if let Ok(d) = directive.parse() {
            filter = filter.add_directive(d);
        }
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}
