pub mod config;
pub mod error;
pub mod outcome;
pub mod project;
pub mod types;

pub use config::Config;
pub use error::PixlError;
pub use outcome::PixlOutcome;
pub use project::{ProjectConfig, ProjectConfigTable, TagOp, TagSchemeEntry};
pub use types::{private_tag_nickname, ExportMessage, ProjectSlug, StudyKey, PRIVATE_BLOCK};

/// Normalize a project name into a URL/filesystem-safe slug: lowercase,
/// strip non-alphanumeric (keeping spaces), collapse whitespace, replace
/// spaces with hyphens.
///
/// ```
/// assert_eq!(pixl_common::slugify("Lake Street Study"), "lake-street-study");
/// assert_eq!(pixl_common::slugify("Proj. X!!!"), "proj-x");
/// assert_eq!(pixl_common::slugify("  Multiple   Spaces  "), "multiple-spaces");
/// ```
pub fn slugify(name: &str) -> String {
    let lowered = name.to_lowercase();
    let cleaned: String = lowered
        .chars()
        .map(|c| if c.is_alphanumeric() || c == ' ' { c } else { ' ' })
        .collect();
    cleaned.split_whitespace().collect::<Vec<&str>>().join("-")
}
