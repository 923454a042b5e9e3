// src/storage/mod.rs
pub mod sheets;
pub mod table;

use std::fs;
use std::path::{Path, PathBuf};

use csv::WriterBuilder;

use crate::utils::error::StorageError;
pub use sheets::SheetsClient;
pub use table::Table;

/// Provenance recorded next to each exported CSV.
#[derive(Debug, Clone)]
pub struct ExportInfo<'a> {
    pub target: &'a str,
    pub source_urls: &'a [String],
    pub pages: usize,
}

pub struct StorageManager {
    base_dir: PathBuf,
}

impl StorageManager {
    /// Creates a new StorageManager with the specified base directory
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Result<Self, StorageError> {
        let base_path = base_dir.as_ref().to_path_buf();

        if !base_path.exists() {
            fs::create_dir_all(&base_path)
                .map_err(StorageError::IoError)?;
        }

        Ok(Self { base_dir: base_path })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Writes the table as UTF-8 CSV, header row first. The file is written
    /// beside the destination and renamed over it, so a failed write leaves
    /// any previous export intact.
    pub fn save_csv(&self, file: &str, table: &Table) -> Result<PathBuf, StorageError> {
        let file_path = self.base_dir.join(file);
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = tmp_path_for(&file_path);
        if let Err(e) = write_csv(&tmp_path, table) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }
        fs::rename(&tmp_path, &file_path)?;

        tracing::info!("Saved {} rows to {}", table.rows.len(), file_path.display());
        Ok(file_path)
    }

    /// Saves metadata about the export in JSON format
    pub fn save_metadata(&self, file: &str, table: &Table, info: &ExportInfo) -> Result<PathBuf, StorageError> {
        let csv_path = self.base_dir.join(file);
        let stem = csv_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| info.target.to_string());
        let file_path = csv_path.with_file_name(format!("{}_meta.json", stem));

        let metadata = serde_json::json!({
            "target": info.target,
            "file": file,
            "source_urls": info.source_urls,
            "pages": info.pages,
            "row_count": table.rows.len(),
            "column_count": table.headers.len(),
            "columns": table.headers,
            "extraction_timestamp": chrono::Utc::now().to_rfc3339(),
        });

        let metadata_str = serde_json::to_string_pretty(&metadata)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;

        fs::write(&file_path, metadata_str)
            .map_err(StorageError::IoError)?;

        tracing::info!("Saved metadata to {}", file_path.display());

        Ok(file_path)
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn write_csv(path: &Path, table: &Table) -> Result<(), StorageError> {
    let mut writer = WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_path(path)?;
    writer.write_record(&table.headers)?;
    for row in &table.rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}
