use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing_subscriber::EnvFilter;

use bgloc_core::{now_ms, LocationId, LocationRecord, SyncFields};
use bgloc_engine::{AppConfig, ChannelListener, SyncQueueEngine, SyncSignal, DEFAULT_SHUTDOWN_WAIT};
use bgloc_storage::LocationStore;
use bgloc_storage_sqlite::SqliteLocationStore;
use bgloc_transport::HttpTransport;

#[derive(Parser)]
#[command(name = "bgloc", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Initialize bgloc in the current directory (creates .bgloc/, config, db)
    Init,

    /// Record one location fix and try to deliver it
    Record {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
        #[arg(long)]
        speed: Option<f32>,
        #[arg(long)]
        bearing: Option<f32>,
        #[arg(long)]
        accuracy: Option<f32>,
        /// Treat the network as unreachable; the fix goes straight to the sync queue
        #[arg(long, default_value_t = false)]
        offline: bool,
    },

    /// Show undelivered locations
    Status,

    /// Attach enrichment fields to a stored location and queue it for batch sync
    Enrich {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        position: Option<String>,
        #[arg(long)]
        direction: Option<String>,
        #[arg(long)]
        miles: Option<f64>,
        #[arg(long)]
        speed: Option<f32>,
    },

    /// Deliver every location awaiting sync in one batch
    Sync,

    /// Delete every undelivered location
    Clear,
}

struct App {
    root: PathBuf,
    cfg: AppConfig,
    store: Arc<SqliteLocationStore>,
}

impl App {
    fn init(root: &Path) -> anyhow::Result<Self> {
        let cfg_path = AppConfig::config_path(root);
        let cfg = if cfg_path.exists() {
            AppConfig::load_from(&cfg_path)?
        } else {
            let cfg = AppConfig::default_for_dir();
            cfg.save_to(&cfg_path)?;
            cfg
        };
        Self::with_config(root, cfg)
    }

    fn open(root: PathBuf) -> anyhow::Result<Self> {
        let cfg_path = AppConfig::config_path(&root);
        let cfg = AppConfig::load_from(&cfg_path).with_context(|| "bgloc is not initialized here; run `bgloc init`")?;
        Self::with_config(&root, cfg)
    }

    fn with_config(root: &Path, cfg: AppConfig) -> anyhow::Result<Self> {
        let store = SqliteLocationStore::open(&cfg.db_path(root))?;
        Ok(Self {
            root: root.to_path_buf(),
            cfg,
            store: Arc::new(store),
        })
    }

    fn start_engine(&self) -> anyhow::Result<(SyncQueueEngine, UnboundedReceiver<SyncSignal>)> {
        let transport = HttpTransport::new(self.cfg.transport_config())?;
        let (listener, signals) = ChannelListener::new();
        let engine = SyncQueueEngine::start(self.store.clone(), Arc::new(transport), Arc::new(listener));
        engine.set_config(self.cfg.sync_config()?);
        Ok((engine, signals))
    }
}

/// Wait for queued work, answer batch requests, then stop the engine.
async fn settle(engine: SyncQueueEngine, mut signals: UnboundedReceiver<SyncSignal>) {
    loop {
        engine.flush().await;
        let mut requested = false;
        while let Ok(signal) = signals.try_recv() {
            match signal {
                SyncSignal::SyncRequested => requested = true,
                SyncSignal::AbortUpdatesRequested => println!("Server asked to stop location updates"),
                SyncSignal::ReauthRequired => println!("Server requires re-authentication"),
            }
        }
        if !requested {
            break;
        }
        println!("Sync threshold reached; syncing");
        engine.sync_batch();
    }

    let report = engine.shutdown(DEFAULT_SHUTDOWN_WAIT).await;
    if !report.completed {
        println!("Shutdown timed out; discarded {} undelivered location(s)", report.discarded);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let root = std::env::current_dir()?;

    match cli.cmd {
        Command::Init => {
            let app = App::init(&root)?;
            println!("Initialized bgloc in {}", app.root.display());
        }
        Command::Record {
            lat,
            lon,
            speed,
            bearing,
            accuracy,
            offline,
        } => {
            let app = App::open(root)?;
            let mut location = LocationRecord::new(now_ms(), lat, lon);
            location.speed = speed;
            location.bearing = bearing;
            location.accuracy = accuracy;

            let (engine, signals) = app.start_engine()?;
            engine.set_connectivity(!offline);
            let stored = engine.enqueue(location)?;
            if let Some(id) = stored.id {
                println!("Recorded location {id}");
            }
            settle(engine, signals).await;
        }
        Command::Status => {
            let app = App::open(root)?;
            let unposted = app.store.list_unposted()?;
            println!("Undelivered locations: {}", app.store.count_unposted()?);
            println!("Awaiting sync: {}", app.store.count_pending_sync(now_ms())?);
            for l in unposted {
                let id = l.id.map(|i| i.to_string()).unwrap_or_default();
                println!("- {} [{}] {} {},{}", id, l.disposition.as_str(), l.recorded_at_ms, l.latitude, l.longitude);
            }
        }
        Command::Enrich {
            id,
            position,
            direction,
            miles,
            speed,
        } => {
            let app = App::open(root)?;
            let id = LocationId::from(id);
            if app.store.get_by_id(id)?.is_none() {
                anyhow::bail!("no stored location with id {id}");
            }
            let (engine, signals) = app.start_engine()?;
            engine.update_for_sync(
                id,
                SyncFields {
                    position,
                    direction,
                    estimate_miles: miles,
                    speed,
                },
            );
            settle(engine, signals).await;
            println!("Queued location {id} for sync");
        }
        Command::Sync => {
            let app = App::open(root)?;
            let before = app.store.count_pending_sync(now_ms())?;
            let (engine, signals) = app.start_engine()?;
            engine.sync_batch();
            settle(engine, signals).await;
            let after = app.store.count_pending_sync(now_ms())?;
            println!("Synced {} location(s); {} still awaiting sync", before.saturating_sub(after), after);
        }
        Command::Clear => {
            let app = App::open(root)?;
            let (engine, signals) = app.start_engine()?;
            engine.clear_queue();
            settle(engine, signals).await;
            println!("Cleared location queue");
        }
    }

    Ok(())
}
