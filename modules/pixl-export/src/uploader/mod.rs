//! Uploader variants (§9 Design Notes): a single `upload` operation over a
//! tagged `Destination`, replacing the Python uploader factory's
//! destination-keyed subclass lookup with a plain sum type.

mod dicomweb;
mod ftps;
mod xnat;

pub use dicomweb::{DicomwebConfig, DicomwebUploader};
pub use ftps::{FtpsConfig, FtpsUploader};
pub use xnat::{XnatConfig, XnatUploader};

use pixl_common::Destination;

use crate::bundle::StudyBundle;
use crate::error::Result;

/// The three destination transports a project can be configured to use.
pub enum Uploader {
    Ftps(FtpsUploader),
    Dicomweb(DicomwebUploader),
    Xnat(XnatUploader),
}

impl Uploader {
    /// `upload(bundle, project_slug, pseudo_uid)` (§9): the one operation
    /// every transport variant exposes, regardless of what it actually
    /// needs from the bundle.
    pub async fn upload(&self, bundle: &StudyBundle, project_slug: &str, pseudo_uid: &str) -> Result<()> {
        match self {
            Uploader::Ftps(u) => u.upload(&bundle.archive_bytes, project_slug, pseudo_uid).await,
            Uploader::Dicomweb(u) => u.upload(&bundle.study_id, project_slug, pseudo_uid).await,
            Uploader::Xnat(u) => {
                u.upload(&bundle.archive_bytes, &bundle.patient_id, project_slug, pseudo_uid)
                    .await
            }
        }
    }
}

/// Destination-keyed factory (§9), the Rust analogue of the Python
/// `get_uploader(project_slug, destination, keyvault_alias)` factory.
pub struct UploaderConfig {
    pub ftps: Option<FtpsConfig>,
    pub dicomweb: Option<DicomwebConfig>,
    pub xnat: Option<XnatConfig>,
}

impl UploaderConfig {
    pub fn build(&self, destination: Destination) -> Result<Uploader> {
        match destination {
            Destination::Ftps => {
                let cfg = self
                    .ftps
                    .clone()
                    .ok_or_else(|| anyhow::anyhow!("no FTPS configuration supplied"))?;
                Ok(Uploader::Ftps(FtpsUploader::new(cfg)))
            }
            Destination::Dicomweb => {
                let cfg = self
                    .dicomweb
                    .clone()
                    .ok_or_else(|| anyhow::anyhow!("no DICOMweb configuration supplied"))?;
                Ok(Uploader::Dicomweb(DicomwebUploader::new(cfg)))
            }
            Destination::Xnat => {
                let cfg = self
                    .xnat
                    .clone()
                    .ok_or_else(|| anyhow::anyhow!("no XNAT configuration supplied"))?;
                Ok(Uploader::Xnat(XnatUploader::new(cfg)?))
            }
        }
    }
}
