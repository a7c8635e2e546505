use anyhow::{bail, Context, Result};
use log::info;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::model::row::{SourceRow, ID_COLUMN, REQUIRED_COLUMNS};

pub const LEDGER_FILE_NAME: &str = "tracker.csv";

/// Ledger lives next to the input file unless configured otherwise.
pub fn default_ledger_path(input: &Path) -> PathBuf {
    input
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(LEDGER_FILE_NAME)
}

/// An issue CSV as read from disk. The raw records are kept so a rewrite
/// only touches the `Created Issue ID` cell of each row.
#[derive(Debug)]
pub struct CsvTable {
    headers: csv::StringRecord,
    records: Vec<csv::StringRecord>,
    pub rows: Vec<SourceRow>,
}

impl CsvTable {
    /// Rewrite every original column, with `Created Issue ID` taken from `rows` and
    /// appended as the last column when the file had none. Goes through a temporary
    /// file so a failed write leaves the old copy.
    pub fn write(&self, path: &Path) -> Result<()> {
        let id_col = self.headers.iter().position(|h| h == ID_COLUMN);
        let mut headers = self.headers.clone();
        if id_col.is_none() {
            headers.push_field(ID_COLUMN);
        }

        let tmp = path.with_extension("csv.tmp");
        if let Some(parent) = tmp.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut writer = csv::Writer::from_path(&tmp)
            .with_context(|| format!("Failed to create {}", tmp.display()))?;
        writer.write_record(&headers)?;
        for (record, row) in self.records.iter().zip(&self.rows) {
            let mut out = csv::StringRecord::new();
            for i in 0..self.headers.len() {
                if Some(i) == id_col {
                    out.push_field(&row.created_issue_id);
                } else {
                    out.push_field(record.get(i).unwrap_or_default());
                }
            }
            if id_col.is_none() {
                out.push_field(&row.created_issue_id);
            }
            writer.write_record(&out)?;
        }
        writer.flush()?;
        drop(writer);

        std::fs::rename(&tmp, path)
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        Ok(())
    }
}

/// Read an issue CSV. A missing file or a header without the mandatory columns is an error.
pub fn read_table(path: &Path) -> Result<CsvTable> {
    if !path.is_file() {
        bail!("CSV file not found: {}", path.display());
    }
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let headers: csv::StringRecord = reader
        .headers()
        .with_context(|| format!("Failed to read header of {}", path.display()))?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim())
        .collect();
    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|col| !headers.iter().any(|h| h == *col))
        .collect();
    if !missing.is_empty() {
        bail!(
            "{} is missing required column(s): {}",
            path.display(),
            missing.join(", ")
        );
    }

    let mut records = Vec::new();
    let mut rows = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record =
            record.with_context(|| format!("Malformed row {} in {}", idx + 2, path.display()))?;
        let row: SourceRow = record
            .deserialize(Some(&headers))
            .with_context(|| format!("Malformed row {} in {}", idx + 2, path.display()))?;
        records.push(record);
        rows.push(row);
    }
    Ok(CsvTable {
        headers,
        records,
        rows,
    })
}

pub fn read_rows(path: &Path) -> Result<Vec<SourceRow>> {
    Ok(read_table(path)?.rows)
}

/// Write serializable records as CSV, header first.
pub fn write_records<T: Serialize>(path: &Path, records: &[T]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Issue keys already recorded in the ledger. A missing ledger has none.
pub fn recorded_ids(path: &Path) -> Result<HashSet<String>> {
    if !path.exists() || std::fs::metadata(path)?.len() == 0 {
        return Ok(HashSet::new());
    }
    Ok(read_rows(path)?
        .into_iter()
        .map(|r| r.created_issue_id.trim().to_string())
        .filter(|id| !id.is_empty())
        .collect())
}

/// Append newly created rows in a single write. Rows without an ID, or whose ID the
/// ledger already holds, are left out. Returns how many rows were appended.
pub fn append(path: &Path, rows: &[SourceRow]) -> Result<usize> {
    let mut seen = recorded_ids(path)?;
    let fresh: Vec<&SourceRow> = rows
        .iter()
        .filter(|r| r.is_imported())
        .filter(|r| seen.insert(r.created_issue_id.trim().to_string()))
        .collect();
    if fresh.is_empty() {
        return Ok(0);
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let needs_header = !path.exists() || std::fs::metadata(path)?.len() == 0;
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open ledger {}", path.display()))?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(needs_header)
        .from_writer(file);
    for row in &fresh {
        writer.serialize(row)?;
    }
    writer.flush()?;
    info!("Appended {} row(s) to {}", fresh.len(), path.display());
    Ok(fresh.len())
}
