//! Project-scoped configuration: tag scheme, modality allowlist, excluded
//! series pattern, time-shift offset, destination. Loaded once at startup
//! from a TOML file keyed by project slug and passed explicitly — there is
//! no hidden ambient global config.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::PixlError;

/// The closed set of anonymisation operations a tag scheme entry can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TagOp {
    Keep,
    Delete,
    HashUid,
    TimeShift,
    Fixed,
    NumRange,
    SecureHash,
}

/// One row of a project's tag scheme, keyed by (group, element).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagSchemeEntry {
    pub group: u16,
    pub element: u16,
    pub op: TagOp,
    #[serde(default)]
    pub name: Option<String>,
}

/// Destination transport selector (§6 Destination transports).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    Ftps,
    Dicomweb,
    Xnat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub slug: String,
    /// DICOM Modality codes this project accepts (§4.6 step 1).
    pub allowed_modalities: Vec<String>,
    /// Regex matched against SeriesDescription to exclude a series (§4.6 step 2).
    #[serde(default)]
    pub excluded_series_pattern: Option<String>,
    /// Tag scheme, applied in order (§3, §4.6 step 7).
    pub tag_scheme: Vec<TagSchemeEntry>,
    /// Signed hour offset applied by the `time-shift` op.
    #[serde(default)]
    pub time_shift_hours: i64,
    /// Where the anonymised study bundle is uploaded.
    pub destination: Destination,
}

/// All projects' configuration, loaded once at startup.
#[derive(Debug, Clone, Default)]
pub struct ProjectConfigTable {
    projects: HashMap<String, ProjectConfig>,
}

#[derive(Debug, Deserialize)]
struct RawTable {
    #[serde(default)]
    project: Vec<ProjectConfig>,
}

impl ProjectConfigTable {
    pub fn load(path: &Path) -> Result<Self, PixlError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| PixlError::Config(format!("reading {}: {e}", path.display())))?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, PixlError> {
        let raw: RawTable =
            toml::from_str(text).map_err(|e| PixlError::Config(format!("parsing project config: {e}")))?;
        let mut projects = HashMap::new();
        for p in raw.project {
            projects.insert(p.slug.clone(), p);
        }
        Ok(Self { projects })
    }

    pub fn get(&self, slug: &str) -> Result<&ProjectConfig, PixlError> {
        self.projects
            .get(slug)
            .ok_or_else(|| PixlError::Config(format!("no configuration for project '{slug}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOML: &str = r#"
[[project]]
slug = "proj-x"
allowed_modalities = ["CR", "DX"]
excluded_series_pattern = "(?i)localizer"
time_shift_hours = -3
destination = "ftps"

[[project.tag_scheme]]
group = 8
element = 20
op = "keep"
name = "StudyDate"

[[project.tag_scheme]]
group = 16
element = 16
op = "delete"
name = "PatientName"
"#;

    #[test]
    fn parses_project_table() {
        let table = ProjectConfigTable::parse(TOML).unwrap();
        let proj = table.get("proj-x").unwrap();
        assert_eq!(proj.allowed_modalities, vec!["CR", "DX"]);
        assert_eq!(proj.tag_scheme.len(), 2);
        assert_eq!(proj.tag_scheme[0].op, TagOp::Keep);
        assert_eq!(proj.destination, Destination::Ftps);
    }

    #[test]
    fn unknown_project_is_configuration_error() {
        let table = ProjectConfigTable::parse(TOML).unwrap();
        assert!(table.get("nope").is_err());
    }
}
