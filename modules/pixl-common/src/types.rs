use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// The private block every PIXL private tag is registered under. Combined
/// with a project's configured group, this gives the element the project
/// slug lives at: `0x1000 | (PRIVATE_BLOCK << 8) | 0x01`.
pub const PRIVATE_BLOCK: u8 = 0x10;

/// The Orthanc "tag nickname" (`group,element` hex) for the private
/// project tag, used both to request it in a `/tools/find` query
/// (`RequestedTags`) and to read it back off a study (§4.4, §6).
pub fn private_tag_nickname(group: u16) -> String {
    let element = 0x1000u16 | ((PRIVATE_BLOCK as u16) << 8) | 0x01;
    format!("{group:04x},{element:04x}")
}

/// A project-name slug, safe for filesystem paths, registry rows, and the
/// DICOM private tag value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectSlug(pub String);

impl ProjectSlug {
    pub fn from_project_name(name: &str) -> Self {
        Self(crate::slugify(name))
    }
}

impl std::fmt::Display for ProjectSlug {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The natural key that identifies a study within a project, per §3's
/// invariant: (project_name, mrn, accession_number, study_date).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StudyKey {
    pub project_slug: String,
    pub mrn: String,
    pub accession_number: String,
    pub study_date: NaiveDate,
}

/// The queue payload (§3 StudyMessage), JSON on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudyMessage {
    pub mrn: String,
    pub accession_number: String,
    #[serde(default)]
    pub study_uid: Option<String>,
    pub study_date: NaiveDate,
    pub procedure_occurrence_id: i64,
    pub project_name: String,
    pub extract_datetime: DateTime<Utc>,
}

impl StudyMessage {
    pub fn project_slug(&self) -> ProjectSlug {
        ProjectSlug::from_project_name(&self.project_name)
    }

    pub fn study_key(&self) -> StudyKey {
        StudyKey {
            project_slug: self.project_slug().0,
            mrn: self.mrn.clone(),
            accession_number: self.accession_number.clone(),
            study_date: self.study_date,
        }
    }
}

/// The `export` queue payload: published by the anonymising store once a
/// study is anonymised and stable, consumed by the Exporter worker. Not
/// named explicitly in §3's data model (which only specifies the
/// `imaging` queue's `StudyMessage`), but required by §2/§4.2's "one
/// logical queue per stage" and §4.7's "given an anonymised, stable
/// study" precondition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportMessage {
    /// The anonymising store's local resource id for the study.
    pub study_id: String,
    /// Anonymised PatientID tag value (the pseudo patient identifier).
    pub patient_id: String,
    pub pseudo_study_uid: String,
    pub project_name: String,
}

impl ExportMessage {
    pub fn project_slug(&self) -> ProjectSlug {
        ProjectSlug::from_project_name(&self.project_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let msg = StudyMessage {
            mrn: "M1".into(),
            accession_number: "A1".into(),
            study_uid: Some("1.2.3.4.5".into()),
            study_date: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            procedure_occurrence_id: 42,
            project_name: "Proj X".into(),
            extract_datetime: Utc::now(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        let back: StudyMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back.mrn, "M1");
        assert_eq!(back.project_slug().0, "proj-x");
    }

    #[test]
    fn export_message_slugifies_project_name() {
        let msg = ExportMessage {
            study_id: "orthanc-id".into(),
            patient_id: "PSEUDO1".into(),
            pseudo_study_uid: "1.2.3.4.5.6".into(),
            project_name: "Proj X".into(),
        };
        assert_eq!(msg.project_slug().0, "proj-x");
    }
}
