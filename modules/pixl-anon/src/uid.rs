//! Deterministic UID pseudonymisation (`hash-uid`, §4.6 step 7).

use sha2::{Digest, Sha512};

/// Keep the DICOM prefix (first four dot-segments) verbatim; hash each
/// remaining segment with the project salt, strip non-digits, and truncate
/// back to the original segment length so the result stays UID-shaped and
/// no longer than the input.
pub fn hash_uid(uid: &str, salt: &[u8]) -> String {
    let segments: Vec<&str> = uid.split('.').collect();
    if segments.len() <= 4 {
        return uid.to_string();
    }

    let prefix = segments[..4].join(".");
    let suffix_segments = &segments[4..];

    let hashed: Vec<String> = suffix_segments
        .iter()
        .map(|segment| hash_segment(segment, salt))
        .collect();

    format!("{prefix}.{}", hashed.join("."))
}

fn hash_segment(segment: &str, salt: &[u8]) -> String {
    let mut hasher = Sha512::new();
    hasher.update(segment.as_bytes());
    hasher.update(salt);
    let digest = hex::encode(hasher.finalize());
    let digits: String = digest.chars().filter(char::is_ascii_digit).collect();

    if segment.len() == 1 {
        digits.chars().take(1).collect()
    } else {
        let trimmed = digits.trim_start_matches('0');
        trimmed.chars().take(segment.len()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_prefix_and_segment_lengths() {
        let uid = "1.2.124.113532.10.122.1.203.20051130.122937.2950157";
        let hashed = hash_uid(uid, b"PIXL");
        let parts: Vec<&str> = hashed.split('.').collect();
        let orig: Vec<&str> = uid.split('.').collect();
        assert_eq!(&parts[..4], &orig[..4]);
        assert_eq!(parts.len(), orig.len());
        for (h, o) in parts[4..].iter().zip(orig[4..].iter()) {
            assert!(h.len() <= o.len());
        }
    }

    #[test]
    fn is_deterministic_for_same_salt() {
        let uid = "1.2.3.4.5.6.7";
        assert_eq!(hash_uid(uid, b"salt"), hash_uid(uid, b"salt"));
    }

    #[test]
    fn differs_across_salts() {
        let uid = "1.2.3.4.5.6.7";
        assert_ne!(hash_uid(uid, b"salt-a"), hash_uid(uid, b"salt-b"));
    }

    #[test]
    fn short_uid_passes_through_unchanged() {
        assert_eq!(hash_uid("1.2.3", b"salt"), "1.2.3");
    }
}
