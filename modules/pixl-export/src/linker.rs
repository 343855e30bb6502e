//! Per-project parquet export tree (§4.7, §6 Persisted state): the
//! `radiology.parquet` linker table plus the `public` OMOP subdirectory,
//! written under `<root>/exports/<project_slug>/all_extracts/omop/<extract_time_slug>/…`
//! with a `latest/` symlink maintained atomically.
//!
//! Mirrors the Python `ParquetExport` class: one instance per
//! (project_name, extract_datetime), slugifying both into filesystem-safe
//! path segments.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parquet::basic::Compression;
use parquet::column::writer::ColumnWriter;
use parquet::file::properties::WriterProperties;
use parquet::file::writer::SerializedFileWriter;
use parquet::schema::parser::parse_message_type;

use crate::error::Result;

/// One row of the radiology linker table: the de-identified image
/// identifier, the cohort row it came from, and the (already
/// de-identified, by an external service) report text.
#[derive(Debug, Clone)]
pub struct RadiologyRow {
    pub image_identifier: String,
    pub procedure_occurrence_id: i64,
    pub image_report: String,
}

pub struct ParquetExport {
    export_base: PathBuf,
    current_extract: PathBuf,
    latest_parent_dir: PathBuf,
}

impl ParquetExport {
    pub fn new(export_root: &Path, project_slug: &str, extract_time_slug: &str) -> Self {
        let export_base = export_root.join(project_slug);
        let current_extract = export_base
            .join("all_extracts")
            .join("omop")
            .join(extract_time_slug);
        let latest_parent_dir = export_base.join("latest").join("omop");
        Self {
            export_base,
            current_extract,
            latest_parent_dir,
        }
    }

    /// Copy a pre-built `public` OMOP directory into the export tree and
    /// atomically relink `latest/omop/public` to point at it.
    pub fn copy_public_omop(&self, omop_dir: &Path) -> Result<()> {
        let public_input = omop_dir.join("public");
        if !public_input.is_dir() {
            return Err(anyhow::anyhow!(
                "no public directory in input {}",
                omop_dir.display()
            )
            .into());
        }
        let public_output = self.current_extract.join("public");
        fs::create_dir_all(&public_output)?;
        copy_dir_recursive(&public_input, &public_output)?;

        fs::create_dir_all(&self.latest_parent_dir)?;
        relink(&self.latest_parent_dir.join("public"), &public_output)
    }

    /// Write the radiology linker table and relink `latest/omop/radiology`.
    pub fn export_radiology(&self, rows: &[RadiologyRow]) -> Result<PathBuf> {
        let radiology_output = self.current_extract.join("radiology");
        fs::create_dir_all(&radiology_output)?;
        let parquet_file = radiology_output.join("radiology.parquet");
        write_radiology_parquet(&parquet_file, rows)?;

        fs::create_dir_all(&self.latest_parent_dir)?;
        relink(&self.latest_parent_dir.join("radiology.parquet"), &parquet_file)?;
        Ok(radiology_output)
    }

    pub fn export_base(&self) -> &Path {
        &self.export_base
    }
}

const RADIOLOGY_SCHEMA: &str = r#"
message radiology_linker {
    REQUIRED BYTE_ARRAY image_identifier (UTF8);
    REQUIRED INT64 procedure_occurrence_id;
    REQUIRED BYTE_ARRAY image_report (UTF8);
}
"#;

fn write_radiology_parquet(path: &Path, rows: &[RadiologyRow]) -> Result<()> {
    let schema = Arc::new(parse_message_type(RADIOLOGY_SCHEMA)?);
    let props = Arc::new(WriterProperties::builder().set_compression(Compression::SNAPPY).build());
    let file = fs::File::create(path)?;
    let mut writer = SerializedFileWriter::new(file, schema, props)?;

    let mut row_group_writer = writer.next_row_group()?;

    if let Some(mut col_writer) = row_group_writer.next_column()? {
        let values: Vec<parquet::data_type::ByteArray> = rows
            .iter()
            .map(|r| r.image_identifier.as_str().into())
            .collect();
        if let ColumnWriter::ByteArrayColumnWriter(ref mut w) = col_writer.untyped() {
            w.write_batch(&values, None, None)?;
        }
        col_writer.close()?;
    }

    if let Some(mut col_writer) = row_group_writer.next_column()? {
        let values: Vec<i64> = rows.iter().map(|r| r.procedure_occurrence_id).collect();
        if let ColumnWriter::Int64ColumnWriter(ref mut w) = col_writer.untyped() {
            w.write_batch(&values, None, None)?;
        }
        col_writer.close()?;
    }

    if let Some(mut col_writer) = row_group_writer.next_column()? {
        let values: Vec<parquet::data_type::ByteArray> =
            rows.iter().map(|r| r.image_report.as_str().into()).collect();
        if let ColumnWriter::ByteArrayColumnWriter(ref mut w) = col_writer.untyped() {
            w.write_batch(&values, None, None)?;
        }
        col_writer.close()?;
    }

    row_group_writer.close()?;
    writer.close()?;
    Ok(())
}

fn copy_dir_recursive(from: &Path, to: &Path) -> Result<()> {
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let dest = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            fs::create_dir_all(&dest)?;
            copy_dir_recursive(&entry.path(), &dest)?;
        } else {
            fs::copy(entry.path(), &dest)?;
        }
    }
    Ok(())
}

/// Unlink the existing symlink (if any) and relink to `target`. Readers
/// must tolerate the brief absence between the two steps (§5 Disk).
fn relink(link: &Path, target: &Path) -> Result<()> {
    if link.symlink_metadata().is_ok() {
        fs::remove_file(link)?;
    }
    #[cfg(unix)]
    std::os::unix::fs::symlink(target, link)?;
    #[cfg(not(unix))]
    std::os::windows::fs::symlink_file(target, link)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn writes_and_relinks_radiology_parquet() {
        let dir = tempdir().unwrap();
        let export = ParquetExport::new(dir.path(), "proj-x", "2023-01-01t00-00-00");
        let rows = vec![RadiologyRow {
            image_identifier: "abc123".into(),
            procedure_occurrence_id: 42,
            image_report: "**DE-IDENTIFIED**".into(),
        }];
        let output_dir = export.export_radiology(&rows).unwrap();
        assert!(output_dir.join("radiology.parquet").exists());
        let latest = dir
            .path()
            .join("proj-x")
            .join("latest")
            .join("omop")
            .join("radiology.parquet");
        assert!(latest.symlink_metadata().is_ok());
    }

    #[test]
    fn relink_replaces_existing_symlink() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        fs::write(&a, "a").unwrap();
        fs::write(&b, "b").unwrap();
        let link = dir.path().join("latest.txt");
        relink(&link, &a).unwrap();
        relink(&link, &b).unwrap();
        assert_eq!(fs::read_to_string(&link).unwrap(), "b");
    }
}
