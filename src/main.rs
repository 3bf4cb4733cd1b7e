use cafeteria_flow::aggregate::DailyAggregator;
use cafeteria_flow::api::{self, ApiContext};
use cafeteria_flow::clock::{Clock, SystemClock};
use cafeteria_flow::config::{self, Config, Transport};
use cafeteria_flow::counter::OccupancyCounter;
use cafeteria_flow::cycle::scheduler::DEFAULT_CHECK_INTERVAL;
use cafeteria_flow::cycle::{
    IngestionWorker, RolloverSignal, spawn_ingestion_thread, spawn_scheduler_thread,
};
use cafeteria_flow::estimation::create_estimator;
use cafeteria_flow::source::serial::open_serial;
use cafeteria_flow::source::{DEFAULT_CHANNEL_CAPACITY, SourceMessage, spawn_reader_thread};
use cafeteria_flow::state::AppState;
use cafeteria_flow::store::{FileStateStore, StateStore};
use std::io::BufReader;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, SyncSender};
use std::sync::{Arc, RwLock};
use tracing_subscriber::EnvFilter;

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(filter)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = config::load_default()?;
    init_tracing(&config.logging.level);
    tracing::info!(
        config_path = config::DEFAULT_CONFIG_PATH,
        app = %config.app.name,
        "cafeteria-flow starting"
    );

    // The local offset lookup only works while the process is single-threaded.
    let clock = SystemClock::detect();
    tracing::info!(offset = %clock.offset(), "Local clock detected");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run(config, Arc::new(clock)))
}

async fn run(config: Config, clock: Arc<dyn Clock>) -> Result<(), Box<dyn std::error::Error>> {
    let limits = config.counter_limits()?;
    let settings = config.estimation_settings()?;
    let window = config.operating_window()?;
    let trigger = config.day_trigger()?;

    let file_store = FileStateStore::open(config.storage_dir(), window.bucket_count())?;
    tracing::info!(
        dir = %file_store.dir().display(),
        buckets = window.bucket_count(),
        "State store ready"
    );
    let store: Arc<dyn StateStore> = Arc::new(file_store);

    let state = Arc::new(RwLock::new(AppState::new()));
    let signal = RolloverSignal::new();
    let stop_flag = Arc::new(AtomicBool::new(false));
    let (tx, rx) = mpsc::sync_channel::<SourceMessage>(DEFAULT_CHANNEL_CAPACITY);

    let worker = IngestionWorker::new(
        OccupancyCounter::new(limits, create_estimator(&settings)),
        DailyAggregator::new(window),
        Arc::clone(&store),
        Arc::clone(&state),
        signal.clone(),
        Arc::clone(&clock),
    )
    .with_idle_poll(config.idle_poll());
    tracing::info!(
        policy = ?worker.counter().estimator().policy(),
        max_occupancy = limits.max_occupancy,
        "Occupancy counter ready"
    );

    start_source(&config, tx, Arc::clone(&clock), Arc::clone(&stop_flag));
    let worker_handle = spawn_ingestion_thread(worker, rx, Arc::clone(&stop_flag));
    let scheduler_handle = spawn_scheduler_thread(
        trigger,
        signal,
        Arc::clone(&clock),
        Arc::clone(&stop_flag),
        DEFAULT_CHECK_INTERVAL,
    );

    let app = api::router(ApiContext {
        state,
        store,
        window,
        clock,
    });
    let port = config.server_port();
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "API server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Signal worker threads to stop
    stop_flag.store(true, Ordering::Relaxed);
    for (name, handle) in [("ingestion", worker_handle), ("scheduler", scheduler_handle)] {
        if handle.join().is_err() {
            tracing::error!(thread = name, "Thread panicked during shutdown");
        }
    }
    tracing::info!("cafeteria-flow stopped");

    Ok(())
}

/// Starts the reader thread for the configured transport. An unavailable serial
/// port is logged and leaves the worker running on day boundaries only.
fn start_source(
    config: &Config,
    tx: SyncSender<SourceMessage>,
    clock: Arc<dyn Clock>,
    stop: Arc<AtomicBool>,
) {
    match config.transport() {
        Transport::Serial => match open_serial(config.serial_port(), config.baud_rate()) {
            Ok(reader) => {
                spawn_reader_thread(reader, tx, clock, stop);
            }
            Err(err) => {
                tracing::error!(error = %err, "Event source unavailable, no events will be counted");
            }
        },
        Transport::Stdin => {
            tracing::info!("Reading event tokens from stdin");
            spawn_reader_thread(BufReader::new(std::io::stdin()), tx, clock, stop);
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
