//! The Anonymisation Engine (§4.6): runs once per DICOM instance, invoked
//! by the anonymising store's auto-route rule.

use dicom_core::header::Tag;
use dicom_core::value::{PrimitiveValue, Value};
use dicom_core::VR;
use dicom_object::mem::InMemElement;
use dicom_object::InMemDicomObject;
use regex::Regex;
use tracing::{debug, warn};

use pixl_common::{ProjectConfig, TagOp};

use crate::error::Result;
use crate::scheme::SchemeTable;
use crate::{age, overlay, time, uid};

const MODALITY_TAG: Tag = Tag(0x0008, 0x0060);
const SERIES_DESCRIPTION_TAG: Tag = Tag(0x0008, 0x103E);
const STUDY_INSTANCE_UID_TAG: Tag = Tag(0x0020, 0x000D);

/// The result of running the engine against one instance.
pub enum Outcome {
    Anonymised(InMemDicomObject),
    Discarded(String),
}

/// Per-project, per-instance context the recursive walker needs.
pub struct AnonContext<'a> {
    pub scheme: &'a SchemeTable,
    pub salt: Vec<u8>,
    pub time_shift_hours: i64,
}

/// Read the project private tag directly, before the caller has decided
/// which project's config to load (§4.6 step 3).
pub fn discover_project_slug(
    obj: &InMemDicomObject,
    private_tag_group: u16,
    private_block: u8,
) -> Option<String> {
    let tag = Tag(private_tag_group, 0x1000 | ((private_block as u16) << 8) | 0x01);
    obj.element(tag).ok().and_then(|e| e.to_str().ok()).map(|s| s.to_string())
}

/// Run the full per-instance pipeline (§4.6 steps 1-9). `mint_uid` is
/// called at most once, to generate a candidate pseudo UID if the Registry
/// hasn't minted one for this study yet; the caller supplies it so this
/// crate stays independent of how UIDs are generated.
pub async fn anonymise_instance(
    mut obj: InMemDicomObject,
    project: &ProjectConfig,
    hasher: &crate::hasher::HasherClient,
    pseudo_study_uid: &str,
) -> Result<Outcome> {
    // Step 1: modality gate.
    let modality = obj
        .element(MODALITY_TAG)
        .ok()
        .and_then(|e| e.to_str().ok())
        .map(|s| s.to_string());
    match &modality {
        Some(m) if project.allowed_modalities.iter().any(|a| a == m) => {}
        _ => {
            return Ok(Outcome::Discarded(format!(
                "modality {modality:?} not in project allowlist"
            )))
        }
    }

    // Step 2: series gate.
    if let Some(pattern) = &project.excluded_series_pattern {
        let series_description = obj
            .element(SERIES_DESCRIPTION_TAG)
            .ok()
            .and_then(|e| e.to_str().ok())
            .unwrap_or_default();
        if Regex::new(pattern)
            .map(|re| re.is_match(&series_description))
            .unwrap_or(false)
        {
            return Ok(Outcome::Discarded(format!(
                "series description matched excluded pattern '{pattern}'"
            )));
        }
    }

    // Step 4: original conformance validation (logged, never fatal).
    let original_errors = crate::validate::validate(&obj);
    if !original_errors.is_empty() {
        debug!(count = original_errors.len(), "pre-anonymisation conformance errors");
    }

    // Step 5: overlay removal.
    overlay::remove_overlays(&mut obj);

    // Steps 6-7: whitelist + scheme, recursively.
    let scheme = SchemeTable::from_project(project);
    let salt = hasher.hash(&project.slug, "PIXL").await?.into_bytes();
    let ctx = AnonContext {
        scheme: &scheme,
        salt,
        time_shift_hours: project.time_shift_hours,
    };
    let mut anonymised = anonymise_dataset(obj, &ctx, hasher, &project.slug).await?;

    // Step 8: pseudo UID mint.
    anonymised.put_element(string_element(
        STUDY_INSTANCE_UID_TAG,
        VR::UI,
        pseudo_study_uid,
    ));

    // Step 9: anonymised conformance validation (logged, never fatal).
    let new_errors = crate::validate::validate(&anonymised);
    let introduced: Vec<_> = new_errors
        .iter()
        .filter(|e| !original_errors.contains(e))
        .collect();
    if !introduced.is_empty() {
        warn!(count = introduced.len(), "anonymisation introduced new conformance errors");
    }

    Ok(Outcome::Anonymised(anonymised))
}

/// Recursively walk the dataset, enforcing the whitelist and applying each
/// scheme entry's operation, descending into sequence items uniformly.
fn anonymise_dataset<'a>(
    obj: InMemDicomObject,
    ctx: &'a AnonContext<'a>,
    hasher: &'a crate::hasher::HasherClient,
    project_slug: &'a str,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<InMemDicomObject>> + Send + 'a>> {
    Box::pin(async move {
        let mut out = InMemDicomObject::new_empty();

        for element in obj {
            let tag = element.tag();
            let Some(entry) = ctx.scheme.get(tag.group(), tag.element()) else {
                continue; // whitelist: not named in the scheme, drop it
            };

            match entry.op {
                TagOp::Delete => continue,
                TagOp::Keep => {
                    out.put_element(recurse_if_sequence(element, ctx, hasher, project_slug).await?);
                }
                TagOp::HashUid => {
                    if let Ok(value) = element.to_str() {
                        let hashed = uid::hash_uid(&value, &ctx.salt);
                        out.put_element(string_element(tag, element.vr(), &hashed));
                    }
                }
                TagOp::TimeShift => {
                    // Time-paired tags are shifted by their DA/TM pair elsewhere;
                    // a lone TM element here is shifted against a zero date.
                    if let Ok(value) = element.to_str() {
                        if let Ok((_, shifted)) = time::shift_date_time("19700101", &value, ctx.time_shift_hours) {
                            out.put_element(string_element(tag, element.vr(), &shifted));
                        }
                    }
                }
                TagOp::Fixed => {
                    out.put_element(string_element(tag, element.vr(), ""));
                }
                TagOp::NumRange => {
                    if let Ok(value) = element.to_str() {
                        out.put_element(string_element(tag, element.vr(), &age::bounded_age(&value)));
                    }
                }
                TagOp::SecureHash => {
                    if let Ok(value) = element.to_str() {
                        let hashed = hasher.hash(project_slug, &value).await?;
                        let truncated = if element.vr() == VR::SH {
                            hashed.chars().take(16).collect::<String>()
                        } else {
                            hashed
                        };
                        out.put_element(string_element(tag, element.vr(), &truncated));
                    }
                }
            }
        }

        Ok(out)
    })
}

async fn recurse_if_sequence<'a>(
    element: InMemElement,
    ctx: &'a AnonContext<'a>,
    hasher: &'a crate::hasher::HasherClient,
    project_slug: &'a str,
) -> Result<InMemElement> {
    let tag = element.tag();
    let vr = element.vr();
    if let Value::Sequence(seq) = element.value() {
        let mut items = Vec::with_capacity(seq.items().len());
        for item in seq.items().iter().cloned() {
            items.push(anonymise_dataset(item, ctx, hasher, project_slug).await?);
        }
        return Ok(InMemElement::new(tag, vr, Value::Sequence(items.into())));
    }
    Ok(element)
}

fn string_element(tag: Tag, vr: VR, value: &str) -> InMemElement {
    InMemElement::new(tag, vr, PrimitiveValue::from(value.to_string()))
}
