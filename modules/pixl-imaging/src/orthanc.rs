//! A thin REST client over one Orthanc instance (staging PACS). Used for
//! both the "raw" and "anon" stores (§4.4) — they differ only in which
//! credentials and AE title they're constructed with.

use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::error::{ImagingError, Result};

#[derive(Debug, Clone)]
pub struct OrthancClient {
    http: Client,
    base_url: String,
    username: String,
    password: String,
}

impl OrthancClient {
    pub fn new(base_url: impl Into<String>, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            username: username.into(),
            password: password.into(),
        }
    }

    async fn get(&self, path: &str) -> Result<Value> {
        let resp = self
            .http
            .get(format!("{}{path}", self.base_url))
            .basic_auth(&self.username, Some(&self.password))
            .timeout(Duration::from_secs(10))
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json().await?)
    }

    async fn post(&self, path: &str, body: &Value, timeout: Duration) -> Result<Value> {
        let resp = self
            .http
            .post(format!("{}{path}", self.base_url))
            .basic_auth(&self.username, Some(&self.password))
            .json(body)
            .timeout(timeout)
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json().await?)
    }

    pub async fn delete(&self, path: &str) -> Result<()> {
        self.http
            .delete(format!("{}{path}", self.base_url))
            .basic_auth(&self.username, Some(&self.password))
            .timeout(Duration::from_secs(10))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Query this instance's own database for a study matching `query`.
    pub async fn query_local(&self, query: &Value) -> Result<Vec<Value>> {
        let resp = self
            .post("/tools/find", query, Duration::from_secs(10))
            .await?;
        resp.as_array()
            .cloned()
            .ok_or_else(|| ImagingError::UnexpectedResponse("/tools/find did not return an array".into()))
    }

    /// Query a remote modality (VNA) reachable from this node. Returns the
    /// query ID if at least one answer came back, `None` otherwise.
    pub async fn query_remote(
        &self,
        query: &Value,
        modality: &str,
        timeout: Duration,
    ) -> Result<Option<String>> {
        debug!(modality, "querying remote modality");
        let response = self
            .post(&format!("/modalities/{modality}/query"), query, timeout)
            .await?;
        let query_id = response["ID"]
            .as_str()
            .ok_or_else(|| ImagingError::UnexpectedResponse("query response missing ID".into()))?
            .to_string();

        let answers = self.get(&format!("/queries/{query_id}/answers")).await?;
        let has_answers = answers.as_array().is_some_and(|a| !a.is_empty());
        Ok(has_answers.then_some(query_id))
    }

    /// Trigger a C-MOVE retrieve of a prior remote query's results into
    /// this node, returning the asynchronous job ID.
    pub async fn retrieve_from_remote(&self, query_id: &str, target_aet: &str) -> Result<String> {
        let body = serde_json::json!({ "TargetAet": target_aet, "Synchronous": false });
        let response = self
            .post(&format!("/queries/{query_id}/retrieve"), &body, Duration::from_secs(10))
            .await?;
        response["ID"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ImagingError::UnexpectedResponse("retrieve response missing ID".into()))
    }

    pub async fn job_state(&self, job_id: &str) -> Result<String> {
        let job = self.get(&format!("/jobs/{job_id}")).await?;
        job["State"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ImagingError::UnexpectedResponse("job response missing State".into()))
    }

    pub async fn jobs(&self) -> Result<Vec<Value>> {
        let jobs = self.get("/jobs?expand").await?;
        jobs.as_array()
            .cloned()
            .ok_or_else(|| ImagingError::UnexpectedResponse("/jobs did not return an array".into()))
    }

    /// Modify the PIXL project-name private tag on an entire study.
    /// `KeepSource: false` stops Orthanc leaving a duplicate behind.
    pub async fn modify_private_tags_by_study(
        &self,
        study_id: &str,
        private_creator: &str,
        tag_replacement: Value,
    ) -> Result<Value> {
        let body = serde_json::json!({
            "PrivateCreator": private_creator,
            "Permissive": false,
            "KeepSource": false,
            "Replace": tag_replacement,
        });
        self.post(&format!("/studies/{study_id}/modify"), &body, Duration::from_secs(30))
            .await
    }

    /// Forward an already-present study straight to the anon store.
    pub async fn send_to_anon(&self, resource_id: &str) -> Result<Value> {
        let body = serde_json::json!({ "ResourceId": resource_id });
        self.post("/send-to-anon", &body, Duration::from_secs(30)).await
    }

    /// Download the whole study as a zip archive, the bytes the Exporter
    /// packages up under `<pseudo_study_uid>.zip` (§4.7).
    pub async fn download_archive(&self, study_id: &str) -> Result<Vec<u8>> {
        let resp = self
            .http
            .get(format!("{}/studies/{study_id}/archive", self.base_url))
            .basic_auth(&self.username, Some(&self.password))
            .timeout(Duration::from_secs(120))
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.bytes().await?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_trailing_slash_from_base_url() {
        let client = OrthancClient::new("http://orthanc:8042/", "user", "pass");
        assert_eq!(client.base_url, "http://orthanc:8042");
    }
}
