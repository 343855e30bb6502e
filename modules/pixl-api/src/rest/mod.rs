//! The Control API's REST surface (§4.8): rate control and export
//! triggering. Every handler is a thin wrapper over the Durable Registry or
//! the export module; there is no business logic here beyond request
//! validation and status-code mapping.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use pixl_export::linker::ParquetExport;
use pixl_export::radiology::{build_linker_rows, DeidentifiedReport};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct QueueParam {
    pub queue: String,
}

#[derive(Debug, Deserialize)]
pub struct SetRateBody {
    pub rate: f64,
}

#[derive(Debug, Serialize)]
pub struct RateResponse {
    pub queue: String,
    pub rate: Option<f64>,
}

/// `GET /heart-beat`: plain liveness check, no dependency reached.
pub async fn heart_beat() -> &'static str {
    "OK"
}

/// `GET /token-bucket-refresh-rate?queue=<name>`.
pub async fn get_rate(
    State(state): State<Arc<AppState>>,
    Query(params): Query<QueueParam>,
) -> Result<Json<RateResponse>, StatusCode> {
    let rate = state
        .registry
        .get_queue_rate(&params.queue)
        .await
        .map_err(|e| {
            warn!(error = %e, queue = %params.queue, "failed to read queue rate");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
    Ok(Json(RateResponse {
        queue: params.queue,
        rate,
    }))
}

/// `POST /token-bucket-refresh-rate?queue=<name> {rate}`. Rejects
/// non-positive or non-finite rates with 406, matching the original
/// service's refusal to accept a rate that would stall or runaway the
/// queue (§4.8).
pub async fn set_rate(
    State(state): State<Arc<AppState>>,
    Query(params): Query<QueueParam>,
    Json(body): Json<SetRateBody>,
) -> StatusCode {
    if !body.rate.is_finite() || body.rate <= 0.0 {
        warn!(queue = %params.queue, rate = body.rate, "rejecting invalid rate");
        return StatusCode::NOT_ACCEPTABLE;
    }
    match state.registry.set_queue_rate(&params.queue, body.rate).await {
        Ok(()) => {
            info!(queue = %params.queue, rate = body.rate, "queue rate updated");
            StatusCode::OK
        }
        Err(e) => {
            warn!(error = %e, queue = %params.queue, "failed to set queue rate");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ExportPatientDataBody {
    pub project_name: String,
    pub extract_datetime: DateTime<Utc>,
}

/// `POST /export-patient-data`: writes the project's radiology linker
/// parquet for every image the Registry has marked exported, and relinks
/// `latest/omop/radiology.parquet` to it (§4.7, §4.8).
///
/// `image_identifier` is the Hashing Service's digest of the study's natural
/// key, exactly as `build_linker_rows` produces for the exporter itself.
/// Report text comes from the radiology report de-identification service
/// when one is configured (§11 SUPPLEMENT) and is left blank otherwise — the
/// Registry has no report-text column of its own, so there is nothing to
/// fabricate a fallback from.
pub async fn export_patient_data(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ExportPatientDataBody>,
) -> StatusCode {
    let project_slug = pixl_common::ProjectSlug::from_project_name(&body.project_name).0;

    let images = match state.registry.exported_images(&project_slug).await {
        Ok(images) => images,
        Err(e) => {
            warn!(error = %e, project = %body.project_name, "failed to read exported images");
            return StatusCode::INTERNAL_SERVER_ERROR;
        }
    };

    let mut reports = Vec::with_capacity(images.len());
    for image in images {
        let image_report = match &state.report_client {
            Some(client) => client
                .fetch_report(&image.mrn, &image.accession_number)
                .await
                .unwrap_or_else(|e| {
                    warn!(error = %e, mrn = %image.mrn, "report fetch failed, leaving blank");
                    None
                })
                .unwrap_or_default(),
            None => String::new(),
        };
        reports.push(DeidentifiedReport {
            mrn: image.mrn,
            accession_number: image.accession_number,
            procedure_occurrence_id: image.image_id,
            image_report,
        });
    }

    let rows = match build_linker_rows(&state.hasher, &project_slug, reports).await {
        Ok(rows) => rows,
        Err(e) => {
            warn!(error = %e, project = %body.project_name, "failed to build linker rows");
            return StatusCode::INTERNAL_SERVER_ERROR;
        }
    };

    let extract_time_slug = body.extract_datetime.format("%Y-%m-%dt%H-%M-%S").to_string();
    let export = ParquetExport::new(&state.export_root, &project_slug, &extract_time_slug);

    match export.export_radiology(&rows) {
        Ok(path) => {
            info!(project = %body.project_name, rows = rows.len(), path = %path.display(), "export written");
            StatusCode::OK
        }
        Err(e) => {
            warn!(error = %e, project = %body.project_name, "export failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
