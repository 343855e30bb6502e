//! Cohort ingestion (§6 `populate`): turns a CSV cohort file into
//! `StudyMessage`s ready to publish.
//!
//! The Python source reads an OMOP parquet pair (`public/`, `private/`)
//! joined on `person_id`; that join is the cohort-seeding internals spec.md
//! marks out of scope for the core. This reads the flattened CSV form of
//! the same natural key instead — `mrn,accession_number,study_date,
//! procedure_occurrence_id` — and leaves the parquet join to whatever
//! produced the CSV.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use pixl_common::StudyMessage;

const EXPECTED_HEADERS: [&str; 4] =
    ["mrn", "accession_number", "study_date", "procedure_occurrence_id"];

/// Read every `*.csv` file directly under `cohort_dir` (or the file itself,
/// if `cohort_dir` is not a directory) into `StudyMessage`s for `project_name`.
pub fn messages_from_cohort(
    cohort_dir: &Path,
    project_name: &str,
    extract_datetime: DateTime<Utc>,
) -> anyhow::Result<Vec<StudyMessage>> {
    let files = cohort_files(cohort_dir)?;
    let mut messages = Vec::new();
    for file in files {
        messages.extend(messages_from_csv(&file, project_name, extract_datetime)?);
    }
    if messages.is_empty() {
        anyhow::bail!("no cohort rows found under {}", cohort_dir.display());
    }
    Ok(messages)
}

fn cohort_files(cohort_dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    if cohort_dir.is_file() {
        return Ok(vec![cohort_dir.to_path_buf()]);
    }
    let mut files = Vec::new();
    for entry in std::fs::read_dir(cohort_dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("csv") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn messages_from_csv(
    path: &Path,
    project_name: &str,
    extract_datetime: DateTime<Utc>,
) -> anyhow::Result<Vec<StudyMessage>> {
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_path(path)?;

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    for expected in EXPECTED_HEADERS {
        if !headers.iter().any(|h| h == expected) {
            anyhow::bail!("{}: missing expected column '{expected}'", path.display());
        }
    }

    let mut messages = Vec::new();
    for record in reader.deserialize::<CohortRow>() {
        let row = record?;
        messages.push(StudyMessage {
            mrn: row.mrn,
            accession_number: row.accession_number,
            study_uid: row.study_uid,
            study_date: row.study_date,
            procedure_occurrence_id: row.procedure_occurrence_id,
            project_name: project_name.to_string(),
            extract_datetime,
        });
    }
    Ok(messages)
}

#[derive(Debug, serde::Deserialize)]
struct CohortRow {
    mrn: String,
    accession_number: String,
    #[serde(default)]
    study_uid: Option<String>,
    study_date: NaiveDate,
    procedure_occurrence_id: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_minimal_cohort_csv() {
        let dir = tempfile_dir();
        let path = dir.join("cohort.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "mrn,accession_number,study_date,procedure_occurrence_id").unwrap();
        writeln!(file, "M1,A1,2023-01-01,42").unwrap();

        let messages =
            messages_from_cohort(&path, "proj-x", Utc::now()).expect("cohort should parse");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].mrn, "M1");
        assert_eq!(messages[0].project_name, "proj-x");
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn rejects_missing_column() {
        let dir = tempfile_dir();
        let path = dir.join("bad.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "mrn,accession_number").unwrap();
        writeln!(file, "M1,A1").unwrap();

        assert!(messages_from_cohort(&path, "proj-x", Utc::now()).is_err());
        std::fs::remove_dir_all(&dir).ok();
    }

    fn tempfile_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("pixl-cli-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }
}
