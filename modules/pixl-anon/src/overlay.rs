//! Overlay plane removal (§4.6 step 5).

use dicom_core::header::Tag;
use dicom_object::InMemDicomObject;

/// Delete every repeating-group overlay element in `(0x6000..0x601E, _)`.
/// Up to 16 overlay planes can be stored this way; none of them survive
/// anonymisation.
pub fn remove_overlays(obj: &mut InMemDicomObject) {
    for group in (0x6000u16..=0x601E).step_by(2) {
        let tags: Vec<Tag> = obj
            .iter()
            .map(|elem| elem.tag())
            .filter(|tag| tag.group() == group)
            .collect();
        for tag in tags {
            obj.remove_element(tag);
        }
    }
}
