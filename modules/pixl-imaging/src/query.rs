//! The shape of an Orthanc study-level query, built from a queued study.

use serde_json::{json, Value};

/// Identifies a study by patient ID and accession number, the two fields
/// every PACS/VNA query is keyed on (§4.4, §4.6 step 1).
#[derive(Debug, Clone)]
pub struct ImagingStudy {
    pub mrn: String,
    pub accession_number: String,
}

impl ImagingStudy {
    pub fn new(mrn: impl Into<String>, accession_number: impl Into<String>) -> Self {
        Self {
            mrn: mrn.into(),
            accession_number: accession_number.into(),
        }
    }

    /// The bare study-level find/query payload.
    pub fn orthanc_query(&self) -> Value {
        json!({
            "Level": "Study",
            "Query": {
                "PatientID": self.mrn,
                "AccessionNumber": self.accession_number,
            },
        })
    }

    /// The same query, additionally asking Orthanc to expand each match
    /// with its private PIXL_PROJECT tag so the caller can tell whether a
    /// study already queued for raw ingest belongs to this project.
    pub fn orthanc_query_with_project_tag(&self, tag_nickname: &str) -> Value {
        let mut query = self.orthanc_query();
        query["RequestedTags"] = json!([tag_nickname]);
        query["Expand"] = json!(true);
        query
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_study_level_query() {
        let study = ImagingStudy::new("M1", "A1");
        let query = study.orthanc_query();
        assert_eq!(query["Level"], "Study");
        assert_eq!(query["Query"]["PatientID"], "M1");
        assert_eq!(query["Query"]["AccessionNumber"], "A1");
    }

    #[test]
    fn project_tag_query_expands_and_requests_tag() {
        let study = ImagingStudy::new("M1", "A1");
        let query = study.orthanc_query_with_project_tag("PIXLProjectName");
        assert_eq!(query["Expand"], true);
        assert_eq!(query["RequestedTags"][0], "PIXLProjectName");
    }
}
