//! Builds the radiology linker rows (§11 SUPPLEMENT, `test_radiology_parquet.py`):
//! `image_identifier` is the Hashing Service's digest of `mrn + accession_number`
//! under the project's salt, truncated to 64 chars — never the raw MRN.
//!
//! Report text itself comes from the radiology report de-identification
//! microservice, which spec.md marks an external collaborator; this module
//! only shapes its already-de-identified output into linker rows.

use pixl_anon::hasher::HasherClient;

use crate::error::Result;
use crate::linker::RadiologyRow;

/// One EHR-side record ready to be turned into a linker row: the natural
/// key plus the already de-identified report text.
#[derive(Debug, Clone)]
pub struct DeidentifiedReport {
    pub mrn: String,
    pub accession_number: String,
    pub procedure_occurrence_id: i64,
    pub image_report: String,
}

/// Client for the radiology report de-identification microservice. Like
/// `HasherClient`, it is an opaque HTTP transform this crate never
/// re-implements: given a natural key, it returns report text already
/// stripped of identifying content.
#[derive(Debug, Clone)]
pub struct ReportClient {
    http: reqwest::Client,
    base_url: String,
}

impl ReportClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Fetch the de-identified report text for a study, or `None` if the
    /// service has nothing for this natural key.
    pub async fn fetch_report(
        &self,
        mrn: &str,
        accession_number: &str,
    ) -> Result<Option<String>> {
        let resp = self
            .http
            .get(format!("{}/report", self.base_url))
            .query(&[("mrn", mrn), ("accession_number", accession_number)])
            .send()
            .await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(resp.error_for_status()?.text().await?))
    }
}

/// Length of the `image_identifier` digest, matching the Python source's
/// hashed length for this specific linker column.
const IMAGE_IDENTIFIER_LENGTH: usize = 64;

pub async fn build_linker_rows(
    hasher: &HasherClient,
    project_slug: &str,
    reports: Vec<DeidentifiedReport>,
) -> Result<Vec<RadiologyRow>> {
    let mut rows = Vec::with_capacity(reports.len());
    for report in reports {
        let message = format!("{}{}", report.mrn, report.accession_number);
        let digest = hasher.hash(project_slug, &message).await?;
        let image_identifier = digest.chars().take(IMAGE_IDENTIFIER_LENGTH).collect();
        rows.push(RadiologyRow {
            image_identifier,
            procedure_occurrence_id: report.procedure_occurrence_id,
            image_report: report.image_report,
        });
    }
    Ok(rows)
}
