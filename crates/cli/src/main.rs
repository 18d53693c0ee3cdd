use crate::{
    commands::{Commands, WindowArgs},
    env::EnvManager,
    error::CliError,
    shutdown::{SHUTDOWN_EXIT_CODE, ShutdownCoordinator},
};
use clap::Parser;
use connectors::{
    auth::OAuthTokenProvider,
    source::http::HttpEventSource,
    store::{
        CheckpointStore, PeriodTotalStore, postgres::PgStore, sled_store::SledStore,
    },
};
use engine_config::settings::{AppConfig, StoreSettings};
use engine_core::{harvest::Harvester, window::clamp_window};
use model::checkpoint::CheckpointKey;
use std::{path::PathBuf, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod commands;
mod env;
mod error;
mod output;
mod shutdown;

#[derive(Parser)]
#[command(
    name = "harvester",
    version = "0.1.0",
    about = "Resumable refund-event harvester"
)]
struct Cli {
    #[arg(long, global = true, help = "Optional .env file with HARVEST_* settings")]
    env_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

type Stores = (Arc<dyn CheckpointStore>, Arc<dyn PeriodTotalStore>);

#[tokio::main]
async fn main() -> Result<(), CliError> {
    // Logs go to stderr so stdout carries only the report.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let shutdown = ShutdownCoordinator::new(CancellationToken::new());
    shutdown.register_handlers();
    let cancel = shutdown.cancel_token();

    let result = tokio::select! {
        result = run(cli) => result,
        _ = cancel.cancelled() => Err(CliError::ShutdownRequested),
    };

    match result {
        Err(CliError::ShutdownRequested) => {
            info!("Harvest interrupted, progress is kept at the last checkpoint");
            std::process::exit(SHUTDOWN_EXIT_CODE);
        }
        Err(err) => {
            error!(error = %err, "Harvester failed");
            Err(err)
        }
        Ok(()) => Ok(()),
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = load_config(cli.env_file.as_ref())?;

    match cli.command {
        Commands::Harvest { window, max_pages } => {
            let harvester = build_harvester(&config).await?;
            let report = harvester.harvest(&window.request(max_pages)).await?;
            log_metrics(&harvester);
            output::print_report(&report)?;
        }
        Commands::Range { window, max_pages } => {
            let harvester = build_harvester(&config).await?;
            let report = harvester.harvest_range(&window.request(max_pages)).await?;
            log_metrics(&harvester);
            output::print_report(&report)?;
        }
        Commands::Progress { window, json } => {
            show_progress(&config, &window, json).await?;
        }
    }

    Ok(())
}

fn load_config(env_file: Option<&PathBuf>) -> Result<AppConfig, CliError> {
    let mut env = EnvManager::new();
    if let Some(path) = env_file {
        env.load_from_file(path)?;
    }
    env.log_loaded();
    Ok(AppConfig::from_vars(env.all())?)
}

async fn open_stores(settings: &StoreSettings) -> Result<Stores, CliError> {
    match settings {
        StoreSettings::Sled { path } => {
            let store = Arc::new(SledStore::open(path)?);
            info!(path = %path.display(), "Opened checkpoint store");
            let checkpoints: Arc<dyn CheckpointStore> = store.clone();
            let period_totals: Arc<dyn PeriodTotalStore> = store;
            Ok((checkpoints, period_totals))
        }
        StoreSettings::Postgres { url } => {
            let store = PgStore::connect(url).await?;
            store.ensure_schema().await?;
            let store = Arc::new(store);
            info!("Connected to PostgreSQL checkpoint store");
            let checkpoints: Arc<dyn CheckpointStore> = store.clone();
            let period_totals: Arc<dyn PeriodTotalStore> = store;
            Ok((checkpoints, period_totals))
        }
    }
}

async fn build_harvester(config: &AppConfig) -> Result<Harvester, CliError> {
    let provider = &config.provider;
    let client = reqwest::Client::builder()
        .timeout(provider.request_timeout)
        .build()?;

    let tokens = OAuthTokenProvider::new(
        client.clone(),
        provider.token_url.clone(),
        provider.credentials.clone(),
    )
    .with_timeout(provider.request_timeout);
    let source = HttpEventSource::new(client, provider.api_base_url.clone())
        .with_events_path(provider.events_path.clone())
        .with_page_size(provider.page_size);
    let (checkpoints, period_totals) = open_stores(&config.store).await?;

    Ok(Harvester::new(
        Arc::new(tokens),
        Arc::new(source),
        checkpoints,
        config.harvest.clone(),
    )
    .with_period_totals(period_totals))
}

fn log_metrics(harvester: &Harvester) {
    let snapshot = harvester.metrics().snapshot();
    info!(
        pages = snapshot.pages_fetched,
        amounts = snapshot.amounts_extracted,
        retries = snapshot.retry_count,
        checkpoint_writes = snapshot.checkpoint_writes,
        checkpoint_failures = snapshot.checkpoint_failures,
        "Harvest metrics"
    );
}

/// Checkpoints are keyed by the effective window, so the same clamp applies here.
async fn show_progress(config: &AppConfig, args: &WindowArgs, as_json: bool) -> Result<(), CliError> {
    let window = args.request(None).window()?;
    let effective = clamp_window(&window, chrono::Utc::now(), config.harvest.clamp_margin)?;
    let key = CheckpointKey::from(&effective.window);

    let (checkpoints, _) = open_stores(&config.store).await?;
    let record = checkpoints.load(&key).await?;

    if as_json {
        output::print_progress_json(record.as_ref())?;
    } else {
        output::print_progress_table(&key, record.as_ref());
    }

    Ok(())
}
