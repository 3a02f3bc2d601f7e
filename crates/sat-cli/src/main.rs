use anyhow::{Context, Result};
use chrono::Duration as ChronoDuration;
use clap::{Parser, Subcommand};
use sat_core::{Broker, Store, SubmissionService};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "sat")]
#[command(about = "Manual submission, inspection, and recovery tool for the SAT job pipeline")]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a formula and print the assigned run_id.
    Submit {
        /// RPN formula, e.g. "P Q &&"
        formula: String,
        #[arg(long, default_value = "RPN")]
        notation: String,
        #[arg(long, default_value = "RPN")]
        mode: String,
    },
    /// Print the status of a run.
    Status { run_id: i64 },
    /// Print the result of a completed run.
    Result { run_id: i64 },
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },
    /// Recovery sweep for stuck runs
    Reaper {
        #[command(subcommand)]
        cmd: ReaperCmd,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Migrate,
}

#[derive(Subcommand)]
enum ReaperCmd {
    /// Sweep runs stuck in PROCESSING for longer than --max-age-minutes.
    Sweep {
        #[arg(long, default_value_t = 15)]
        max_age_minutes: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();

    let cli = Cli::parse();
    let cfg = sat_config::Config::from_env().context("failed to load configuration")?;

    match cli.cmd {
        Commands::Db { cmd } => match cmd {
            DbCmd::Migrate => {
                let pool = sat_store::connect(&cfg.postgres.connection_url(), cfg.postgres.pool_max).await?;
                sat_store::migrate(&pool).await?;
                println!("migrations_applied=true");
            }
        },

        Commands::Submit { formula, notation, mode } => {
            let service = build_submission_service(&cfg).await?;
            let resp = service.submit(&formula, &notation, &mode).await.map_err(|e| anyhow::anyhow!(e))?;
            println!(
                "run_id={} formula_id={} status={} msg=\"{}\"",
                resp.run_id, resp.formula_id, resp.status, resp.msg
            );
        }

        Commands::Status { run_id } => {
            let service = build_submission_service(&cfg).await?;
            let resp = service.get_status(run_id).await.map_err(|e| anyhow::anyhow!(e))?;
            println!("run_id={} status={}", resp.run_id, resp.status);
        }

        Commands::Result { run_id } => {
            let service = build_submission_service(&cfg).await?;
            let resp = service.get_result(run_id).await.map_err(|e| anyhow::anyhow!(e))?;
            println!(
                "run_id={} status={} result={} runtime={:.3}s",
                resp.run_id, resp.status, resp.result, resp.runtime
            );
            if let Some(assignment) = resp.assignment {
                println!("assignment={}", serde_json::to_string(&assignment)?);
            }
        }

        Commands::Reaper { cmd } => match cmd {
            ReaperCmd::Sweep { max_age_minutes } => {
                let (store, broker) = build_store_and_broker(&cfg).await?;
                let report = sat_worker::reaper::sweep_stale_processing(
                    &store,
                    &broker,
                    ChronoDuration::minutes(max_age_minutes),
                )
                .await?;
                println!("swept={}", report.swept.len());
                for run_id in report.swept {
                    println!("  run_id={run_id}");
                }
            }
        },
    }

    Ok(())
}

async fn build_store_and_broker(
    cfg: &sat_config::Config,
) -> Result<(Arc<dyn Store>, Arc<dyn Broker>)> {
    let pool = sat_store::connect(&cfg.postgres.connection_url(), cfg.postgres.pool_max).await?;
    let store: Arc<dyn Store> = Arc::new(sat_store::PgStore::new(pool));

    let broker_pool = sat_broker::BrokerPool::connect(&cfg.redis.connection_url(), cfg.redis.pool_max).await?;
    let broker: Arc<dyn Broker> = Arc::new(sat_broker::RedisBroker::new(broker_pool, cfg.job_ttl_s));

    Ok((store, broker))
}

async fn build_submission_service(cfg: &sat_config::Config) -> Result<SubmissionService> {
    let (store, broker) = build_store_and_broker(cfg).await?;
    Ok(SubmissionService::new(store, broker))
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}
