//! Conformance validation, run before and after anonymisation (§4.6 steps 4
//! and 9). This is not a full DICOM conformance checker — it checks the
//! handful of tags the downstream anonymising store and research archive
//! require to be present, which is what the two call sites actually need.

use dicom_core::header::Tag;
use dicom_object::InMemDicomObject;

const REQUIRED_TAGS: &[(Tag, &str)] = &[
    (Tag(0x0008, 0x0016), "SOPClassUID"),
    (Tag(0x0008, 0x0018), "SOPInstanceUID"),
    (Tag(0x0020, 0x000D), "StudyInstanceUID"),
    (Tag(0x0020, 0x000E), "SeriesInstanceUID"),
    (Tag(0x0008, 0x0060), "Modality"),
];

/// Returns the human-readable names of any required tags missing from `obj`.
/// An empty result means the dataset is conformant for our purposes.
pub fn validate(obj: &InMemDicomObject) -> Vec<String> {
    REQUIRED_TAGS
        .iter()
        .filter(|(tag, _)| obj.element(*tag).is_err())
        .map(|(_, name)| name.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicom_core::value::PrimitiveValue;
    use dicom_core::VR;
    use dicom_object::mem::InMemElement;

    #[test]
    fn flags_missing_sop_instance_uid() {
        let mut obj = InMemDicomObject::new_empty();
        obj.put_element(InMemElement::new(
            Tag(0x0008, 0x0016),
            VR::UI,
            PrimitiveValue::from("1.2.3".to_string()),
        ));
        let errors = validate(&obj);
        assert!(errors.contains(&"SOPInstanceUID".to_string()));
    }

    #[test]
    fn empty_object_is_missing_everything() {
        let obj = InMemDicomObject::new_empty();
        assert_eq!(validate(&obj).len(), REQUIRED_TAGS.len());
    }
}
