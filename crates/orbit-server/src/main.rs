use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use orbit_core::OrbitConfig;
use orbit_filters::FilterCriteria;
use orbit_scheduler::{Materializer, MaterializerSettings, SchedulerService};
use orbit_store::{Store, StoreSettings};
use tracing::info;

#[derive(Parser)]
#[command(name = "orbitd", about = "Flow run scheduling daemon")]
struct Cli {
    /// Path to orbit.toml (falls back to ORBIT_CONFIG, then ~/.orbit/orbit.toml).
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler loop until Ctrl-C.
    Run,
    /// Run a single scheduling pass and print what it did.
    Once,
    /// List deployments matching a JSON filter.
    Deployments {
        #[arg(long, default_value = "{}")]
        filter: String,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// List flow runs matching a JSON filter.
    FlowRuns {
        #[arg(long, default_value = "{}")]
        filter: String,
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "orbitd=info,orbit_scheduler=info,orbit_store=info".into()),
        )
        .init();

    let cli = Cli::parse();

    // explicit path > ORBIT_CONFIG env > ~/.orbit/orbit.toml
    let config_path = cli.config.or_else(|| std::env::var("ORBIT_CONFIG").ok());
    let config = OrbitConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        OrbitConfig::default()
    });

    info!(path = %config.database.path, "opening SQLite database");
    let conn = orbit_store::db::open(&config.database.path)?;
    let store = Arc::new(Store::new(conn, StoreSettings::from_config(&config)));

    match cli.command {
        Command::Run => run(store, &config).await,
        Command::Once => {
            let materializer =
                Materializer::new(MaterializerSettings::from_config(&config.scheduler));
            let report = {
                let mut conn = store.lock()?;
                materializer.run_once(&mut conn, &AtomicBool::new(false))?
            };
            println!(
                "{}",
                serde_json::json!({
                    "pages": report.pages,
                    "deployments": report.deployments,
                    "inserted": report.inserted,
                })
            );
            Ok(())
        }
        Command::Deployments { filter, limit } => {
            let criteria = FilterCriteria::from_json(&filter)?;
            let deployments = store.read_deployments(&criteria, 0, limit)?;
            println!("{}", serde_json::to_string_pretty(&deployments)?);
            Ok(())
        }
        Command::FlowRuns { filter, limit } => {
            let criteria = FilterCriteria::from_json(&filter)?;
            let runs = store.read_flow_runs(&criteria, 0, limit)?;
            println!("{}", serde_json::to_string_pretty(&runs)?);
            Ok(())
        }
    }
}

async fn run(store: Arc<Store>, config: &OrbitConfig) -> anyhow::Result<()> {
    let service = SchedulerService::new(store, &config.scheduler);
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let handle = tokio::spawn(service.run(shutdown_rx));

    tokio::signal::ctrl_c().await?;
    info!("Ctrl-C received, stopping scheduler");
    let _ = shutdown_tx.send(true);
    handle.await?;
    Ok(())
}
