//! The Exporter worker process (§4.7, §2): the `export` queue consumer.
//! Packages each anonymised, stable study and uploads it to the project's
//! configured destination, then records the export in the Registry.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use pixl_common::{Config, ExportMessage, PixlOutcome, ProjectConfigTable};
use pixl_export::uploader::{DicomwebConfig, FtpsConfig, XnatConfig};
use pixl_export::{export_study, StudyBundle, UploaderConfig};
use pixl_imaging::{ImageStoreAdapter, ImageStoreConfig};
use pixl_queue::WorkConsumer;
use pixl_registry::Registry;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const MAX_CONCURRENT_WORKERS: usize = 8;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("pixl=info".parse()?))
        .init();

    let config = Config::exporter_from_env();
    config.log_redacted();

    let projects = ProjectConfigTable::load(std::path::Path::new(&config.project_config_path))?;
    let registry = Registry::connect(&config.database_url).await?;
    let anon_store = Arc::new(ImageStoreAdapter::new(ImageStoreConfig {
        url: config.orthanc_anon_url.clone(),
        username: config.orthanc_anon_username.clone(),
        password: config.orthanc_anon_password.clone(),
        aet: String::new(),
    }));

    let uploader_config = UploaderConfig {
        ftps: (!config.ftp_host.is_empty()).then(|| FtpsConfig {
            host: config.ftp_host.clone(),
            port: config.ftp_port,
            username: config.ftp_username.clone(),
            password: config.ftp_password.clone(),
        }),
        dicomweb: (!config.dicomweb_server_name.is_empty()).then(|| DicomwebConfig {
            orthanc_url: config.orthanc_anon_url.clone(),
            orthanc_username: config.orthanc_anon_username.clone(),
            orthanc_password: config.orthanc_anon_password.clone(),
            server_name: config.dicomweb_server_name.clone(),
        }),
        xnat: (!config.xnat_base_url.is_empty()).then(|| XnatConfig {
            base_url: config.xnat_base_url.clone(),
            username: config.xnat_username.clone(),
            password: config.xnat_password.clone(),
        }),
    };

    let queue_name = config
        .queue_names
        .iter()
        .find(|q| q.as_str() == "export")
        .cloned()
        .unwrap_or_else(|| "export".to_string());

    let mut consumer = WorkConsumer::connect(&config.amqp_url, &queue_name).await?;
    let ack_handle = consumer.ack_handle();
    let semaphore = Arc::new(tokio::sync::Semaphore::new(MAX_CONCURRENT_WORKERS));
    let registry = Arc::new(registry);
    let projects = Arc::new(projects);
    let uploader_config = Arc::new(uploader_config);

    info!(queue = %queue_name, "pixl-exporter started");

    loop {
        let Some(delivery) = consumer.next(Duration::from_secs(5)).await? else {
            continue;
        };

        let msg: ExportMessage = match serde_json::from_slice(&delivery.data) {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "malformed export message, discarding");
                ack_handle.discard(&delivery).await?;
                continue;
            }
        };

        let permit = semaphore.clone().acquire_owned().await?;
        let anon_store = anon_store.clone();
        let registry = registry.clone();
        let projects = projects.clone();
        let uploader_config = uploader_config.clone();
        let ack_handle = ack_handle.clone();

        tokio::spawn(async move {
            let _permit = permit;
            let outcome = process(&msg, &anon_store, &registry, &projects, &uploader_config).await;
            let ack_result = match outcome {
                Ok(()) => ack_handle.ack(&delivery).await,
                Err(PixlOutcome::Requeue(reason)) => {
                    warn!(pseudo_uid = %msg.pseudo_study_uid, reason, "requeueing export");
                    ack_handle.requeue(&delivery).await
                }
                Err(PixlOutcome::Discard(reason)) => {
                    warn!(pseudo_uid = %msg.pseudo_study_uid, reason, "discarding export");
                    ack_handle.discard(&delivery).await
                }
                Err(PixlOutcome::AlreadyExported) => {
                    info!(pseudo_uid = %msg.pseudo_study_uid, "already exported, acking");
                    ack_handle.ack(&delivery).await
                }
                Err(PixlOutcome::Configuration(reason)) => {
                    error!(pseudo_uid = %msg.pseudo_study_uid, reason, "configuration error, not acking");
                    return;
                }
                Err(PixlOutcome::Programmer(reason)) => {
                    error!(pseudo_uid = %msg.pseudo_study_uid, reason, "programmer error, not acking");
                    return;
                }
            };
            if let Err(e) = ack_result {
                error!(pseudo_uid = %msg.pseudo_study_uid, error = %e, "failed to ack/requeue/discard delivery");
            }
        });
    }
}

async fn process(
    msg: &ExportMessage,
    anon_store: &ImageStoreAdapter,
    registry: &Registry,
    projects: &ProjectConfigTable,
    uploader_config: &UploaderConfig,
) -> Result<(), PixlOutcome> {
    let project_slug = msg.project_slug().0;
    let project = projects
        .get(&project_slug)
        .map_err(|e| PixlOutcome::Configuration(e.to_string()))?;

    let uploader = uploader_config
        .build(project.destination)
        .map_err(|e| PixlOutcome::Configuration(e.to_string()))?;

    let bundle = StudyBundle::fetch(anon_store, &msg.study_id, msg.patient_id.clone())
        .await
        .map_err(|e| PixlOutcome::Requeue(e.to_string()))?;

    export_study(&uploader, registry, &bundle, &project_slug, &msg.pseudo_study_uid).await
}
