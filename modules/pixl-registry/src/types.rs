//! Registry row types (§3 Data Model). One row per project (`Extract`), one
//! row per study the project has ever seen (`Image`).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A project's registry row. `slug` is the stable key every `Image` hangs
/// off of; `extract_id` is the surrogate key used in foreign keys.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Extract {
    pub extract_id: i64,
    pub slug: String,
    pub created_at: DateTime<Utc>,
}

/// A single study tracked against a project, identified per §3's invariant
/// key `(extract_id, mrn, accession_number, study_date)`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Image {
    pub image_id: i64,
    pub extract_id: i64,
    pub mrn: String,
    pub accession_number: String,
    pub study_date: NaiveDate,
    pub study_uid: Option<String>,
    pub pseudo_study_uid: Option<String>,
    pub exported_at: Option<DateTime<Utc>>,
}

impl Image {
    pub fn is_exported(&self) -> bool {
        self.exported_at.is_some()
    }
}
