//! The Image Store Adapter (§4.4): a single concrete adapter over one
//! staging Orthanc instance plus the small configuration record the
//! REDESIGN FLAGS call for, replacing the original `Orthanc` base class
//! and its `PIXLRawOrthanc` subclass.

use std::time::Duration;

use serde_json::Value;
use tracing::warn;

use crate::error::{ImagingError, Result};
use crate::orthanc::OrthancClient;

/// URL, credentials and AE title for one staging store instance.
#[derive(Debug, Clone)]
pub struct ImageStoreConfig {
    pub url: String,
    pub username: String,
    pub password: String,
    pub aet: String,
}

#[derive(Debug, Clone)]
pub struct ImageStoreAdapter {
    client: OrthancClient,
    aet: String,
}

impl ImageStoreAdapter {
    pub fn new(config: ImageStoreConfig) -> Self {
        Self {
            client: OrthancClient::new(config.url, config.username, config.password),
            aet: config.aet,
        }
    }

    /// `{Level: Study, Query: {...}, RequestedTags?, Expand?}` against this
    /// instance's own database.
    pub async fn query_local(&self, criteria: &Value) -> Result<Vec<Value>> {
        self.client.query_local(criteria).await
    }

    /// Query a remote modality (the VNA); `None` if it has no matches.
    pub async fn query_remote(&self, criteria: &Value, modality: &str) -> Result<Option<String>> {
        self.client
            .query_remote(criteria, modality, Duration::from_secs(10))
            .await
    }

    /// Initiate a C-MOVE of a prior remote query's results, targeting this
    /// adapter's own AET.
    pub async fn retrieve(&self, query_id: &str) -> Result<String> {
        self.client.retrieve_from_remote(query_id, &self.aet).await
    }

    /// Poll the job until `Success`, erroring on `Failure` or deadline.
    pub async fn wait_job(&self, job_id: &str, deadline: Duration) -> Result<()> {
        let start = tokio::time::Instant::now();
        loop {
            let state = self.client.job_state(job_id).await?;
            match state.as_str() {
                "Success" => return Ok(()),
                "Failure" => {
                    return Err(ImagingError::JobFailed {
                        job_id: job_id.to_string(),
                    })
                }
                _ => {}
            }
            if start.elapsed() > deadline {
                return Err(ImagingError::JobTimedOut {
                    job_id: job_id.to_string(),
                    timeout_secs: deadline.as_secs(),
                });
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Count of jobs in `Pending` state — used as a back-pressure signal.
    pub async fn pending_jobs(&self) -> Result<usize> {
        let jobs = self.client.jobs().await?;
        Ok(jobs
            .iter()
            .filter(|j| j["State"].as_str() == Some("Pending"))
            .count())
    }

    /// Atomically rewrite the project private tag on a study in place.
    pub async fn modify_private_tag(
        &self,
        study_id: &str,
        creator: &str,
        replacements: Value,
    ) -> Result<()> {
        self.client
            .modify_private_tags_by_study(study_id, creator, replacements)
            .await?;
        Ok(())
    }

    /// Command this (raw) store to push the study to its anonymising
    /// sibling without re-fetching from the VNA.
    pub async fn forward_to_anon(&self, study_id: &str) -> Result<()> {
        self.client.send_to_anon(study_id).await?;
        Ok(())
    }

    pub async fn delete(&self, study_id: &str) -> Result<()> {
        self.client.delete(&format!("/studies/{study_id}")).await
    }

    /// Download the study's instances as a single zip archive, ready for
    /// the Exporter to upload under `<pseudo_study_uid>.zip` (§4.7).
    pub async fn download_archive(&self, study_id: &str) -> Result<Vec<u8>> {
        self.client.download_archive(study_id).await
    }

    /// Given a local-presence query that matched more than one study for
    /// the same (MRN, AccessionNumber), keep the one with the most recent
    /// `LastUpdate` and delete the rest (§4.4 ordering and tie-breaks).
    pub async fn keep_most_recent(&self, matches: Vec<Value>) -> Result<Option<Value>> {
        let mut sorted = matches;
        sorted.sort_by(|a, b| {
            let a_ts = a["LastUpdate"].as_str().unwrap_or_default();
            let b_ts = b["LastUpdate"].as_str().unwrap_or_default();
            b_ts.cmp(a_ts)
        });
        let mut iter = sorted.into_iter();
        let survivor = iter.next();
        for stale in iter {
            if let Some(id) = stale["ID"].as_str() {
                if let Err(e) = self.delete(id).await {
                    warn!(study_id = id, error = %e, "failed to delete superseded study");
                }
            }
        }
        Ok(survivor)
    }
}
