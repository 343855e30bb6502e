//! The Study Coordinator worker process (§4.5, §2): the `imaging` queue
//! consumer. One receiver task hands deliveries off to bounded worker
//! tasks; back-pressure and rate-limiting gate how fast they run.

mod coordinator;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use pixl_common::{Config, PixlOutcome, StudyMessage};
use pixl_imaging::{ImageStoreAdapter, ImageStoreConfig};
use pixl_queue::{TokenBucket, WorkConsumer};
use pixl_registry::Registry;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use coordinator::CoordinatorContext;

const TOKEN_BUCKET_CAPACITY: u32 = 5;
const MAX_CONCURRENT_WORKERS: usize = 8;
const RATE_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Poll the Registry for a rate the Control API may have written (§4.8
/// `POST /token-bucket-refresh-rate`) and apply it to the local bucket.
/// The bucket itself lives in this process; the Registry is just the
/// durable channel the Control API uses to reach it without a restart.
async fn poll_rate(registry: Registry, queue_name: String, rate_limiter: Arc<TokenBucket>) {
    loop {
        tokio::time::sleep(RATE_POLL_INTERVAL).await;
        match registry.get_queue_rate(&queue_name).await {
            Ok(Some(rate)) if rate != rate_limiter.rate() => {
                info!(queue = %queue_name, rate, "applying rate change from registry");
                rate_limiter.set_rate(rate);
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "failed to poll queue rate"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("pixl=info".parse()?))
        .init();

    let config = Arc::new(Config::coordinator_from_env());
    config.log_redacted();

    let raw_store = Arc::new(ImageStoreAdapter::new(ImageStoreConfig {
        url: config.orthanc_raw_url.clone(),
        username: config.orthanc_raw_username.clone(),
        password: config.orthanc_raw_password.clone(),
        aet: config.orthanc_raw_aet.clone(),
    }));

    let queue_name = config
        .queue_names
        .iter()
        .find(|q| q.as_str() == "imaging")
        .cloned()
        .unwrap_or_else(|| "imaging".to_string());

    let mut consumer = WorkConsumer::connect(&config.amqp_url, &queue_name).await?;
    let ack_handle = consumer.ack_handle();
    let rate_limiter = Arc::new(TokenBucket::new(TOKEN_BUCKET_CAPACITY, 2.0));
    let semaphore = Arc::new(tokio::sync::Semaphore::new(MAX_CONCURRENT_WORKERS));

    let registry = Registry::connect(&config.database_url).await?;
    tokio::spawn(poll_rate(registry, queue_name.clone(), rate_limiter.clone()));

    info!(queue = %queue_name, "pixl-coordinator started");

    loop {
        let Some(delivery) = consumer.next(Duration::from_secs(5)).await? else {
            continue;
        };

        if !rate_limiter.try_take() {
            if let Err(e) = ack_handle.requeue(&delivery).await {
                error!(error = %e, "failed to requeue rate-limited delivery");
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
            continue;
        }

        let msg: StudyMessage = match serde_json::from_slice(&delivery.data) {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "malformed study message, discarding");
                ack_handle.discard(&delivery).await?;
                continue;
            }
        };

        let permit = semaphore.clone().acquire_owned().await?;
        let raw_store = raw_store.clone();
        let ack_handle = ack_handle.clone();
        let config = config.clone();

        tokio::spawn(async move {
            let _permit = permit;
            let ctx = CoordinatorContext {
                raw_store: &raw_store,
                private_tag_group: config.private_tag_group,
                private_tag_creator: &config.private_tag_creator,
                vna_modality: &config.vna_query_modality,
                transfer_deadline: Duration::from_secs(config.transfer_deadline_secs),
            };

            let outcome = coordinator::handle_message(&ctx, &msg).await;
            let ack_result = match outcome {
                Ok(()) => ack_handle.ack(&delivery).await,
                Err(PixlOutcome::Requeue(reason)) => {
                    warn!(mrn = %msg.mrn, reason, "requeueing");
                    ack_handle.requeue(&delivery).await
                }
                Err(PixlOutcome::Discard(reason)) => {
                    warn!(mrn = %msg.mrn, reason, "discarding permanently");
                    ack_handle.discard(&delivery).await
                }
                Err(PixlOutcome::AlreadyExported) => ack_handle.ack(&delivery).await,
                Err(PixlOutcome::Configuration(reason)) => {
                    error!(mrn = %msg.mrn, reason, "configuration error, not acking");
                    return;
                }
                Err(PixlOutcome::Programmer(reason)) => {
                    error!(mrn = %msg.mrn, reason, "programmer error, not acking");
                    return;
                }
            };
            if let Err(e) = ack_result {
                error!(mrn = %msg.mrn, error = %e, "failed to ack/requeue/discard delivery");
            }
        });
    }
}
