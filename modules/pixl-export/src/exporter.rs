//! The Exporter (§4.7): upload an anonymised study, then record the export
//! exactly once. Idempotent — re-running against an already-exported
//! pseudo UID is treated as success, never a re-upload.

use chrono::Utc;
use pixl_common::PixlOutcome;
use pixl_registry::Registry;

use crate::bundle::StudyBundle;
use crate::uploader::Uploader;

/// Upload `bundle` under `pseudo_study_uid` and record the export, unless
/// it was already recorded — in which case this is a no-op success (§4.7,
/// §7 Already-exported, P1 idempotent export, P7 no-export-without-upload).
pub async fn export_study(
    uploader: &Uploader,
    registry: &Registry,
    bundle: &StudyBundle,
    project_slug: &str,
    pseudo_study_uid: &str,
) -> Result<(), PixlOutcome> {
    if registry.already_exported(pseudo_study_uid).await? {
        return Err(PixlOutcome::AlreadyExported);
    }

    uploader
        .upload(bundle, project_slug, pseudo_study_uid)
        .await
        .map_err(|e| PixlOutcome::Requeue(e.to_string()))?;

    // record_export itself re-checks and rejects a second write, so a race
    // between two workers uploading concurrently still yields one winner.
    registry.record_export(pseudo_study_uid, Utc::now()).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn already_exported_is_distinct_from_requeue() {
        let outcome = PixlOutcome::AlreadyExported;
        assert!(outcome.should_ack());
        assert!(!outcome.should_requeue());
    }
}
