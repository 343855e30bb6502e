//! Client for the external Hashing Service (§6): the single source of the
//! UID salt and of `secure-hash` substitutions, so that two deployments
//! sharing a hasher produce comparable pseudonyms for the same project.

use reqwest::Client;

use crate::error::Result;

#[derive(Debug, Clone)]
pub struct HasherClient {
    http: Client,
    base_url: String,
}

impl HasherClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Hash an arbitrary message under `(project_slug, message)`. Used both
    /// to derive the per-project UID salt and for `secure-hash` tags.
    pub async fn hash(&self, project_slug: &str, message: &str) -> Result<String> {
        let resp = self
            .http
            .get(format!("{}/hash", self.base_url))
            .query(&[("project", project_slug), ("message", message)])
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.text().await?)
    }
}
