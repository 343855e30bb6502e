//! The `pixl` command-line tool (§6): seeds the work queues from a cohort,
//! pauses and resumes a run, adjusts rate limits, and triggers the
//! per-project parquet export.
//!
//! Each command talks to either the durable queues directly (`populate`,
//! `stop`) or the Control API (`start`, `update`, `export-patient-data`,
//! `status`) — never both, mirroring the original CLI's separation between
//! "things only the CLI can do" (queue seeding, checkpointing) and "things
//! the running services own" (rate limits, export triggering).

mod cohort;
mod control_api;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use pixl_queue::{load_checkpoint, Producer, WorkConsumer};
use pixl_registry::Registry;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use control_api::ControlApiClient;

const DEFAULT_QUEUES: &str = "imaging,export";
const CHECKPOINT_IDLE_TIMEOUT: Duration = Duration::from_secs(2);

/// The PIXL pipeline CLI.
#[derive(Parser)]
#[command(name = "pixl")]
#[command(about = "Seed, pause, resume and export a PIXL extraction run")]
struct Cli {
    /// AMQP URL for the work queues.
    #[arg(long, env = "PIXL_AMQP_URL")]
    amqp_url: String,

    /// Postgres URL for the Durable Registry.
    #[arg(long, env = "PIXL_DATABASE_URL")]
    database_url: String,

    /// Base URL of the Control API, e.g. http://localhost:8080.
    #[arg(long, env = "PIXL_CONTROL_API_URL", default_value = "http://localhost:8080")]
    control_api_url: String,

    /// Directory checkpoint files (`<queue>.state`) are read from and
    /// written to by `stop`/`start`.
    #[arg(long, env = "PIXL_CLI_STATE_DIR", default_value = ".")]
    state_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a cohort file (or directory of cohort CSVs) and publish one
    /// `StudyMessage` per not-yet-exported study to the `imaging` queue.
    Populate {
        /// Path to a cohort CSV file or a directory containing one or more.
        cohort_dir: PathBuf,
        /// The project this cohort belongs to.
        #[arg(long)]
        project: String,
    },
    /// Resume consuming, republishing any checkpointed messages first, and
    /// optionally set a new rate limit.
    Start {
        /// Comma-separated queue names to resume.
        #[arg(long, default_value = DEFAULT_QUEUES)]
        queues: String,
        /// Messages per second to allow on each queue.
        #[arg(long)]
        rate: Option<f64>,
    },
    /// Change a running queue's rate limit without pausing it.
    Update {
        #[arg(long, default_value = DEFAULT_QUEUES)]
        queues: String,
        #[arg(long)]
        rate: f64,
    },
    /// Pause consumption: drain each queue to a checkpoint file so `start`
    /// can replay it later.
    Stop {
        #[arg(long, default_value = DEFAULT_QUEUES)]
        queues: String,
    },
    /// Trigger the per-project parquet linker export (§4.8, §4.7).
    ExportPatientData {
        /// The project to export.
        project: String,
    },
    /// Report whether the Control API is reachable.
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("pixl=info".parse()?))
        .init();

    let cli = Cli::parse();
    let control_api = ControlApiClient::new(cli.control_api_url.clone());

    match cli.command {
        Commands::Populate { cohort_dir, project } => {
            populate(&cli.amqp_url, &cli.database_url, &cohort_dir, &project).await
        }
        Commands::Start { queues, rate } => {
            start(&cli.amqp_url, &cli.state_dir, &queues, rate, &control_api).await
        }
        Commands::Update { queues, rate } => update(&queues, rate, &control_api).await,
        Commands::Stop { queues } => stop(&cli.amqp_url, &cli.state_dir, &queues).await,
        Commands::ExportPatientData { project } => {
            export_patient_data(&project, &control_api).await
        }
        Commands::Status => status(&control_api).await,
    }
}

fn split_queues(queues: &str) -> Vec<String> {
    queues.split(',').map(|q| q.trim().to_string()).collect()
}

async fn populate(
    amqp_url: &str,
    database_url: &str,
    cohort_dir: &PathBuf,
    project: &str,
) -> Result<()> {
    let registry = Registry::connect(database_url).await?;
    let messages = cohort::messages_from_cohort(cohort_dir, project, Utc::now())
        .context("reading cohort")?;

    let project_slug = pixl_common::ProjectSlug::from_project_name(project).0;
    let keys: Vec<_> = messages
        .iter()
        .map(|m| (m.mrn.clone(), m.accession_number.clone(), m.study_date))
        .collect();
    let unexported = registry.filter_unexported(&project_slug, keys).await?;

    let payloads: Vec<Vec<u8>> = messages
        .into_iter()
        .filter(|m| {
            unexported
                .iter()
                .any(|(mrn, acc, date)| *mrn == m.mrn && *acc == m.accession_number && *date == m.study_date)
        })
        .map(|m| serde_json::to_vec(&m))
        .collect::<Result<_, _>>()?;

    info!(
        project,
        total = payloads.len(),
        "publishing not-yet-exported studies to the imaging queue"
    );

    let producer = Producer::connect(amqp_url, "imaging").await?;
    producer.publish(&payloads).await?;
    Ok(())
}

async fn start(
    amqp_url: &str,
    state_dir: &PathBuf,
    queues: &str,
    rate: Option<f64>,
    control_api: &ControlApiClient,
) -> Result<()> {
    for queue in split_queues(queues) {
        let checkpoint = state_dir.join(format!("{queue}.state"));
        let messages = load_checkpoint(&checkpoint)?;
        if !messages.is_empty() {
            info!(queue, count = messages.len(), "replaying checkpointed messages");
            let producer = Producer::connect(amqp_url, queue.as_str()).await?;
            producer.publish(&messages).await?;
            std::fs::remove_file(&checkpoint).ok();
        }
        if let Some(rate) = rate {
            control_api.set_rate(&queue, rate).await?;
        }
    }
    Ok(())
}

async fn update(queues: &str, rate: f64, control_api: &ControlApiClient) -> Result<()> {
    for queue in split_queues(queues) {
        control_api.set_rate(&queue, rate).await?;
        info!(queue, rate, "rate updated");
    }
    Ok(())
}

async fn stop(amqp_url: &str, state_dir: &PathBuf, queues: &str) -> Result<()> {
    for queue in split_queues(queues) {
        let checkpoint = state_dir.join(format!("{queue}.state"));
        let mut consumer = WorkConsumer::connect(amqp_url, queue.as_str()).await?;
        let count = consumer
            .drain_to_file(&checkpoint, CHECKPOINT_IDLE_TIMEOUT)
            .await?;
        info!(queue, count, path = %checkpoint.display(), "checkpointed");
    }
    Ok(())
}

async fn export_patient_data(project: &str, control_api: &ControlApiClient) -> Result<()> {
    control_api
        .export_patient_data(project, Utc::now())
        .await?;
    info!(project, "export triggered");
    Ok(())
}

async fn status(control_api: &ControlApiClient) -> Result<()> {
    if control_api.heart_beat().await? {
        println!("control API: OK");
    } else {
        warn!("control API unreachable");
        println!("control API: unreachable");
        std::process::exit(1);
    }
    Ok(())
}
