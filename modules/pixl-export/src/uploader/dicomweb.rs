//! DICOMweb transport (§6): POST to the anonymising Orthanc's configured
//! `/dicom-web/servers/{name}/stow` route, asking it to push the study
//! asynchronously. The study itself never leaves the image store's REST
//! surface — we only command the push, matching §1's non-goal that the
//! core does not transport DICOM bytes itself.

use reqwest::Client;
use serde_json::json;

use crate::error::Result;

#[derive(Debug, Clone)]
pub struct DicomwebConfig {
    pub orthanc_url: String,
    pub orthanc_username: String,
    pub orthanc_password: String,
    pub server_name: String,
}

pub struct DicomwebUploader {
    http: Client,
    config: DicomwebConfig,
}

impl DicomwebUploader {
    pub fn new(config: DicomwebConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }

    /// `resource_id` is the anonymising store's local id for the study
    /// (distinct from the pseudo study UID, which is only a DICOM tag
    /// value inside it).
    pub async fn upload(&self, resource_id: &str, _project_slug: &str, _pseudo_uid: &str) -> Result<()> {
        let url = format!(
            "{}/dicom-web/servers/{}/stow",
            self.config.orthanc_url.trim_end_matches('/'),
            self.config.server_name
        );
        self.http
            .post(url)
            .basic_auth(&self.config.orthanc_username, Some(&self.config.orthanc_password))
            .json(&json!({ "Resources": [resource_id], "Synchronous": false }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
