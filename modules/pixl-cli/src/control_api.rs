//! A thin client for the Control API's rate and export endpoints (§4.8),
//! used by the `start`/`update`/`export-patient-data` subcommands.
//!
//! The original CLI talked to one Control API per queue (`ehr-api`,
//! `pacs-api`, each its own host:port). This workspace has a single
//! `pixl-api` binary covering every queue, so each call carries the queue
//! name as a query parameter instead of picking a different base URL.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

pub struct ControlApiClient {
    base_url: String,
    client: reqwest::Client,
}

impl ControlApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }

    /// `POST /token-bucket-refresh-rate?queue=<name> {rate}`.
    pub async fn set_rate(&self, queue: &str, rate: f64) -> Result<()> {
        #[derive(Serialize)]
        struct Body {
            rate: f64,
        }
        let url = format!("{}/token-bucket-refresh-rate", self.base_url);
        let resp = self
            .client
            .post(&url)
            .query(&[("queue", queue)])
            .json(&Body { rate })
            .send()
            .await
            .with_context(|| format!("calling {url}"))?;
        if !resp.status().is_success() {
            bail!(
                "rate update for queue '{queue}' rejected: {}",
                resp.status()
            );
        }
        Ok(())
    }

    /// `POST /export-patient-data {project_name, extract_datetime}`.
    pub async fn export_patient_data(
        &self,
        project_name: &str,
        extract_datetime: DateTime<Utc>,
    ) -> Result<()> {
        #[derive(Serialize)]
        struct Body {
            project_name: String,
            extract_datetime: DateTime<Utc>,
        }
        let url = format!("{}/export-patient-data", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&Body {
                project_name: project_name.to_string(),
                extract_datetime,
            })
            .send()
            .await
            .with_context(|| format!("calling {url}"))?;
        if !resp.status().is_success() {
            bail!(
                "export trigger for project '{project_name}' failed: {}",
                resp.status()
            );
        }
        Ok(())
    }

    /// `GET /heart-beat`, used by `status`.
    pub async fn heart_beat(&self) -> Result<bool> {
        let url = format!("{}/heart-beat", self.base_url);
        match self.client.get(&url).send().await {
            Ok(resp) => Ok(resp.status().is_success()),
            Err(_) => Ok(false),
        }
    }
}
