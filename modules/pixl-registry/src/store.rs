//! The Durable Registry (§4.1): the single source of truth for which
//! studies a project has seen and which have already been exported.
//!
//! Every operation here runs inside one transaction so that a crash between
//! "check" and "record" can never duplicate work — the registry is the
//! thing that makes the rest of the pipeline idempotent.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgPool, Postgres, Transaction};

use pixl_common::{PixlError, PixlOutcome};

use crate::types::{Extract, Image};

/// A study identified well enough to look up or mint a pseudo-UID for.
#[derive(Debug, Clone)]
pub struct StudyInfo {
    pub mrn: String,
    pub accession_number: String,
    pub study_date: NaiveDate,
    pub study_uid: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Registry {
    pool: PgPool,
}

impl Registry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, PixlError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| PixlError::Database(e.to_string()))?;
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<(), PixlError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| PixlError::Database(e.to_string()))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Get the project's `Extract` row, creating it if this is the first
    /// time the registry has seen this slug. The bool is `true` when a new
    /// row was created.
    pub async fn ensure_project(&self, slug: &str) -> Result<(Extract, bool), PixlError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let existing = sqlx::query_as::<_, Extract>(
            "SELECT extract_id, slug, created_at FROM extracts WHERE slug = $1",
        )
        .bind(slug)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;

        let result = match existing {
            Some(extract) => (extract, false),
            None => {
                let extract = sqlx::query_as::<_, Extract>(
                    "INSERT INTO extracts (slug) VALUES ($1)
                     RETURNING extract_id, slug, created_at",
                )
                .bind(slug)
                .fetch_one(&mut *tx)
                .await
                .map_err(db_err)?;
                (extract, true)
            }
        };
        tx.commit().await.map_err(db_err)?;
        Ok(result)
    }

    /// Filter a batch of queued studies down to the ones not yet exported
    /// for this project, per the Open Questions resolution: a brand-new
    /// project has nothing recorded yet, so every message passes through
    /// unconditionally rather than being individually inserted and checked.
    pub async fn filter_unexported(
        &self,
        project_slug: &str,
        studies: Vec<(String, String, NaiveDate)>,
    ) -> Result<Vec<(String, String, NaiveDate)>, PixlError> {
        let (extract, created) = self.ensure_project(project_slug).await?;
        if created {
            return Ok(studies);
        }

        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let mut unexported = Vec::with_capacity(studies.len());
        for (mrn, accession_number, study_date) in studies {
            let existing = sqlx::query_as::<_, Image>(
                "SELECT image_id, extract_id, mrn, accession_number, study_date,
                        study_uid, pseudo_study_uid, exported_at
                 FROM images
                 WHERE extract_id = $1 AND mrn = $2 AND accession_number = $3
                   AND study_date = $4",
            )
            .bind(extract.extract_id)
            .bind(&mrn)
            .bind(&accession_number)
            .bind(study_date)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?;

            match existing {
                Some(image) if image.is_exported() => continue,
                Some(_) => unexported.push((mrn, accession_number, study_date)),
                None => {
                    sqlx::query(
                        "INSERT INTO images (extract_id, mrn, accession_number, study_date)
                         VALUES ($1, $2, $3, $4)",
                    )
                    .bind(extract.extract_id)
                    .bind(&mrn)
                    .bind(&accession_number)
                    .bind(study_date)
                    .execute(&mut *tx)
                    .await
                    .map_err(db_err)?;
                    unexported.push((mrn, accession_number, study_date));
                }
            }
        }
        tx.commit().await.map_err(db_err)?;
        Ok(unexported)
    }

    /// Locate the image by study UID, falling back to MRN + accession
    /// number, and mint a fresh pseudo-UID the first time it is asked for.
    /// Returns `PixlOutcome::Discard` if no matching image row exists at
    /// all — the study was never queued for this project.
    pub async fn assign_or_fetch_pseudo_uid(
        &self,
        project_slug: &str,
        study: &StudyInfo,
        mint_uid: impl Fn() -> String,
    ) -> Result<String, PixlOutcome> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| PixlOutcome::Requeue(e.to_string()))?;

        let extract = sqlx::query_as::<_, Extract>(
            "SELECT extract_id, slug, created_at FROM extracts WHERE slug = $1",
        )
        .bind(project_slug)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| PixlOutcome::Requeue(e.to_string()))?
        .ok_or_else(|| PixlOutcome::Discard(format!("unknown project '{project_slug}'")))?;

        let image = Self::find_unexported_image(&mut tx, extract.extract_id, study).await?;

        let pseudo_uid = match image.pseudo_study_uid {
            Some(uid) => uid,
            None => {
                let uid = Self::mint_unique_pseudo_uid(&mut tx, &mint_uid).await?;
                sqlx::query("UPDATE images SET pseudo_study_uid = $1 WHERE image_id = $2")
                    .bind(&uid)
                    .bind(image.image_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| PixlOutcome::Requeue(e.to_string()))?;
                uid
            }
        };

        tx.commit()
            .await
            .map_err(|e| PixlOutcome::Requeue(e.to_string()))?;
        Ok(pseudo_uid)
    }

    async fn find_unexported_image(
        tx: &mut Transaction<'_, Postgres>,
        extract_id: i64,
        study: &StudyInfo,
    ) -> Result<Image, PixlOutcome> {
        if let Some(study_uid) = &study.study_uid {
            let by_uid = sqlx::query_as::<_, Image>(
                "SELECT image_id, extract_id, mrn, accession_number, study_date,
                        study_uid, pseudo_study_uid, exported_at
                 FROM images
                 WHERE extract_id = $1 AND study_uid = $2 AND exported_at IS NULL",
            )
            .bind(extract_id)
            .bind(study_uid)
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| PixlOutcome::Requeue(e.to_string()))?;
            if let Some(image) = by_uid {
                return Ok(image);
            }
        }

        sqlx::query_as::<_, Image>(
            "SELECT image_id, extract_id, mrn, accession_number, study_date,
                    study_uid, pseudo_study_uid, exported_at
             FROM images
             WHERE extract_id = $1 AND mrn = $2 AND accession_number = $3
               AND exported_at IS NULL",
        )
        .bind(extract_id)
        .bind(&study.mrn)
        .bind(&study.accession_number)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| PixlOutcome::Requeue(e.to_string()))?
        .ok_or_else(|| {
            PixlOutcome::Discard(format!(
                "no registered, unexported image for mrn={} accession={}",
                study.mrn, study.accession_number
            ))
        })
    }

    async fn mint_unique_pseudo_uid(
        tx: &mut Transaction<'_, Postgres>,
        mint_uid: impl Fn() -> String,
    ) -> Result<String, PixlOutcome> {
        for _ in 0..10 {
            let candidate = mint_uid();
            let taken: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM images WHERE pseudo_study_uid = $1)",
            )
            .bind(&candidate)
            .fetch_one(&mut **tx)
            .await
            .map_err(|e| PixlOutcome::Requeue(e.to_string()))?;
            if !taken {
                return Ok(candidate);
            }
        }
        Err(PixlOutcome::Programmer(
            "could not mint a unique pseudo study UID after 10 attempts".into(),
        ))
    }

    /// Whether the image for this pseudo-UID has already been marked
    /// exported (§4.7's idempotence check before upload).
    pub async fn already_exported(&self, pseudo_study_uid: &str) -> Result<bool, PixlOutcome> {
        let exported_at: Option<DateTime<Utc>> =
            sqlx::query_scalar("SELECT exported_at FROM images WHERE pseudo_study_uid = $1")
                .bind(pseudo_study_uid)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| PixlOutcome::Requeue(e.to_string()))?
                .ok_or_else(|| {
                    PixlOutcome::Programmer(format!(
                        "no image for pseudo uid '{pseudo_study_uid}'"
                    ))
                })?;
        Ok(exported_at.is_some())
    }

    /// All exported images for a project, for building the per-project
    /// parquet linker export (§4.7, §4.8 `export-patient-data`).
    pub async fn exported_images(&self, project_slug: &str) -> Result<Vec<Image>, PixlError> {
        sqlx::query_as::<_, Image>(
            "SELECT i.image_id, i.extract_id, i.mrn, i.accession_number, i.study_date,
                    i.study_uid, i.pseudo_study_uid, i.exported_at
             FROM images i
             JOIN extracts e ON e.extract_id = i.extract_id
             WHERE e.slug = $1 AND i.exported_at IS NOT NULL
             ORDER BY i.image_id",
        )
        .bind(project_slug)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)
    }

    /// Set a queue's token-bucket refresh rate (§4.8 `POST
    /// /token-bucket-refresh-rate`). Worker processes poll `get_queue_rate`
    /// to pick up the change without a restart.
    pub async fn set_queue_rate(&self, queue_name: &str, rate_per_sec: f64) -> Result<(), PixlError> {
        sqlx::query(
            "INSERT INTO queue_rates (queue_name, rate_per_sec) VALUES ($1, $2)
             ON CONFLICT (queue_name) DO UPDATE SET rate_per_sec = EXCLUDED.rate_per_sec",
        )
        .bind(queue_name)
        .bind(rate_per_sec)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    /// The queue's current configured rate, if the Control API has ever set
    /// one for it.
    pub async fn get_queue_rate(&self, queue_name: &str) -> Result<Option<f64>, PixlError> {
        sqlx::query_scalar("SELECT rate_per_sec FROM queue_rates WHERE queue_name = $1")
            .bind(queue_name)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)
    }

    /// Record a successful export. Returns `PixlOutcome::AlreadyExported`
    /// if the row was already marked — the caller should treat this as
    /// success, not a failure, per §4.7.
    ///
    /// The guard is expressed as a single `UPDATE ... WHERE exported_at IS
    /// NULL`, not a check-then-write, so two exporters racing on the same
    /// pseudo UID can't both observe "not yet exported" and both upload.
    pub async fn record_export(
        &self,
        pseudo_study_uid: &str,
        when: DateTime<Utc>,
    ) -> Result<(), PixlOutcome> {
        let updated = sqlx::query(
            "UPDATE images SET exported_at = $1
             WHERE pseudo_study_uid = $2 AND exported_at IS NULL",
        )
        .bind(when)
        .bind(pseudo_study_uid)
        .execute(&self.pool)
        .await
        .map_err(|e| PixlOutcome::Requeue(e.to_string()))?;

        if updated.rows_affected() == 1 {
            return Ok(());
        }

        if self.already_exported(pseudo_study_uid).await? {
            Err(PixlOutcome::AlreadyExported)
        } else {
            Err(PixlOutcome::Programmer(format!(
                "no image for pseudo uid '{pseudo_study_uid}'"
            )))
        }
    }
}

fn db_err(e: sqlx::Error) -> PixlError {
    PixlError::Database(e.to_string())
}

#[cfg(feature = "test-utils")]
impl Registry {
    /// Read all images for a project, newest first (for tests).
    pub async fn all_images(&self, project_slug: &str) -> Result<Vec<Image>, PixlError> {
        sqlx::query_as::<_, Image>(
            "SELECT i.image_id, i.extract_id, i.mrn, i.accession_number, i.study_date,
                    i.study_uid, i.pseudo_study_uid, i.exported_at
             FROM images i
             JOIN extracts e ON e.extract_id = i.extract_id
             WHERE e.slug = $1
             ORDER BY i.image_id DESC",
        )
        .bind(project_slug)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn study_info_carries_optional_uid() {
        let info = StudyInfo {
            mrn: "M1".into(),
            accession_number: "A1".into(),
            study_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            study_uid: None,
        };
        assert!(info.study_uid.is_none());
    }
}
