//! The packaged study the Exporter hands to an uploader (§4.7): the zip
//! archive plus the handful of fields different transports key off.

use pixl_imaging::ImageStoreAdapter;

use crate::error::Result;

#[derive(Debug, Clone)]
pub struct StudyBundle {
    /// The anonymising store's local resource id for the study.
    pub study_id: String,
    /// Zip archive of the study's instances, as downloaded from the store.
    pub archive_bytes: Vec<u8>,
    /// Anonymised PatientID tag value (used by XNAT as the subject label).
    pub patient_id: String,
}

impl StudyBundle {
    /// Download and package a study from the anonymising store.
    pub async fn fetch(
        anon_store: &ImageStoreAdapter,
        study_id: &str,
        patient_id: impl Into<String>,
    ) -> Result<Self> {
        let archive_bytes = anon_store.download_archive(study_id).await?;
        Ok(Self {
            study_id: study_id.to_string(),
            archive_bytes,
            patient_id: patient_id.into(),
        })
    }

    pub fn archive_name(&self, pseudo_study_uid: &str) -> String {
        format!("{pseudo_study_uid}.zip")
    }
}
