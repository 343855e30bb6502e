//! The Study Coordinator state machine (§4.5): decides, for each queued
//! study, whether it is already present in the raw store, must be
//! retrieved from the VNA, or must simply have its project tag corrected,
//! then triggers the downstream anonymisation pipeline. Idempotent — the
//! same message may be redelivered any number of times with the same
//! observable effect.

use std::time::Duration;

use pixl_common::{private_tag_nickname, PixlOutcome, StudyMessage};
use pixl_imaging::{ImageStoreAdapter, ImagingStudy};
use serde_json::{json, Value};
use tracing::{info, warn};

/// Everything the coordinator needs to act on one message, independent of
/// how it is transported or acknowledged.
pub struct CoordinatorContext<'a> {
    pub raw_store: &'a ImageStoreAdapter,
    pub private_tag_group: u16,
    pub private_tag_creator: &'a str,
    pub vna_modality: &'a str,
    pub transfer_deadline: Duration,
}

/// Run the algorithm of §4.5 against one message. `Ok(())` means the
/// message should be positive-acked (tag corrected, forwarded, or
/// successfully retrieved+tagged); `Err(outcome)` carries the requeue or
/// discard decision.
pub async fn handle_message(ctx: &CoordinatorContext<'_>, msg: &StudyMessage) -> Result<(), PixlOutcome> {
    // Step 1: back-pressure check.
    let pending = ctx
        .raw_store
        .pending_jobs()
        .await
        .map_err(|e| PixlOutcome::Requeue(e.to_string()))?;
    if pending > 0 {
        return Err(PixlOutcome::Requeue(format!(
            "{pending} pending C-MOVE jobs on the raw store"
        )));
    }

    let project_slug = msg.project_slug().0;
    let study = ImagingStudy::new(&msg.mrn, &msg.accession_number);
    let tag_nickname = private_tag_nickname(ctx.private_tag_group);

    // Step 2: local presence query.
    let mut matches = ctx
        .raw_store
        .query_local(&study.orthanc_query_with_project_tag(&tag_nickname))
        .await
        .map_err(|e| PixlOutcome::Requeue(e.to_string()))?;

    let survivor = if matches.len() <= 1 {
        matches.pop()
    } else {
        ctx.raw_store
            .keep_most_recent(matches)
            .await
            .map_err(|e| PixlOutcome::Requeue(e.to_string()))?
    };

    if let Some(resource) = survivor {
        let study_id = resource_id(&resource)?;
        let existing_tag = resource["RequestedTags"]
            .get(&tag_nickname)
            .and_then(Value::as_str);

        // Steps 3-4: tag comparison.
        if existing_tag == Some(project_slug.as_str()) {
            ctx.raw_store
                .forward_to_anon(&study_id)
                .await
                .map_err(|e| PixlOutcome::Requeue(e.to_string()))?;
            info!(study_id, project = %project_slug, "already tagged, forwarded to anon");
            return Ok(());
        }

        ctx.raw_store
            .modify_private_tag(
                &study_id,
                ctx.private_tag_creator,
                json!({ tag_nickname.clone(): project_slug }),
            )
            .await
            .map_err(|e| PixlOutcome::Requeue(e.to_string()))?;
        info!(study_id, project = %project_slug, "corrected project tag");
        return Ok(());
    }

    // Step 5: remote find, UID first then MRN+AccessionNumber.
    let query_id = find_remote(ctx, msg, &study).await?;
    let Some(query_id) = query_id else {
        return Err(PixlOutcome::Discard(format!(
            "no VNA match for mrn={} accession={}",
            msg.mrn, msg.accession_number
        )));
    };

    // Step 6: remote retrieve.
    let job_id = ctx
        .raw_store
        .retrieve(&query_id)
        .await
        .map_err(|e| PixlOutcome::Requeue(e.to_string()))?;
    if let Err(e) = ctx.raw_store.wait_job(&job_id, ctx.transfer_deadline).await {
        warn!(job_id, error = %e, "C-MOVE did not complete");
        return Err(PixlOutcome::Discard(format!("C-MOVE failed or timed out: {e}")));
    }

    // Step 7: post-retrieval tag-set.
    let fresh_matches = ctx
        .raw_store
        .query_local(&study.orthanc_query_with_project_tag(&tag_nickname))
        .await
        .map_err(|e| PixlOutcome::Requeue(e.to_string()))?;
    for resource in fresh_matches {
        let study_id = resource_id(&resource)?;
        ctx.raw_store
            .modify_private_tag(
                &study_id,
                ctx.private_tag_creator,
                json!({ tag_nickname.clone(): project_slug }),
            )
            .await
            .map_err(|e| PixlOutcome::Requeue(e.to_string()))?;
    }
    info!(mrn = %msg.mrn, accession = %msg.accession_number, "retrieved and tagged");
    Ok(())
}

async fn find_remote(
    ctx: &CoordinatorContext<'_>,
    msg: &StudyMessage,
    study: &ImagingStudy,
) -> Result<Option<String>, PixlOutcome> {
    if let Some(study_uid) = &msg.study_uid {
        let query = json!({ "Level": "Study", "Query": { "StudyInstanceUID": study_uid } });
        let found = ctx
            .raw_store
            .query_remote(&query, ctx.vna_modality)
            .await
            .map_err(|e| PixlOutcome::Requeue(e.to_string()))?;
        if found.is_some() {
            return Ok(found);
        }
    }
    ctx.raw_store
        .query_remote(&study.orthanc_query(), ctx.vna_modality)
        .await
        .map_err(|e| PixlOutcome::Requeue(e.to_string()))
}

fn resource_id(resource: &Value) -> Result<String, PixlOutcome> {
    resource["ID"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| PixlOutcome::Programmer("image store resource missing 'ID'".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_id_extracts_id_field() {
        let resource = json!({ "ID": "abc123" });
        assert_eq!(resource_id(&resource).unwrap(), "abc123");
    }

    #[test]
    fn resource_id_rejects_missing_id() {
        let resource = json!({});
        assert!(matches!(resource_id(&resource), Err(PixlOutcome::Programmer(_))));
    }
}
