//! XNAT transport (§6): session-authenticated upload into `<project_slug>`
//! as subject `<patient_id>`, experiment labelled from `<pseudo_study_uid>`.

use reqwest::Client;

use crate::error::Result;

#[derive(Debug, Clone)]
pub struct XnatConfig {
    pub base_url: String,
    pub username: String,
    pub password: String,
}

pub struct XnatUploader {
    http: Client,
    config: XnatConfig,
}

impl XnatUploader {
    pub fn new(config: XnatConfig) -> Result<Self> {
        let http = Client::builder().cookie_store(true).build()?;
        Ok(Self { http, config })
    }

    pub async fn upload(
        &self,
        bytes: &[u8],
        patient_id: &str,
        project_slug: &str,
        pseudo_uid: &str,
    ) -> Result<()> {
        self.open_session().await?;

        let url = format!(
            "{}/data/archive/projects/{project_slug}/subjects/{patient_id}/experiments/{pseudo_uid}?format=DICOM",
            self.config.base_url.trim_end_matches('/'),
        );
        self.http
            .post(url)
            .body(bytes.to_vec())
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn open_session(&self) -> Result<()> {
        let url = format!("{}/data/JSESSION", self.config.base_url.trim_end_matches('/'));
        self.http
            .post(url)
            .basic_auth(&self.config.username, Some(&self.config.password))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
