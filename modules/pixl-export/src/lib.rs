//! The Exporter (§4.7): packages an anonymised study, uploads it to the
//! configured destination, records the export exactly once, and maintains
//! the per-project parquet linker/OMOP export tree.

pub mod bundle;
pub mod error;
pub mod exporter;
pub mod linker;
pub mod radiology;
pub mod uploader;

pub use bundle::StudyBundle;
pub use error::{ExportError, Result};
pub use exporter::export_study;
pub use linker::{ParquetExport, RadiologyRow};
pub use radiology::{build_linker_rows, DeidentifiedReport, ReportClient};
pub use uploader::{Uploader, UploaderConfig};
