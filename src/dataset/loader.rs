//! Dataset file discovery and loading
//!
//! CSV files are read with the `csv` crate; `.xlsx`/`.xls` workbooks with
//! calamine, one frame per non-empty sheet. All frames are concatenated by
//! column name.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, Data, Reader};
use tracing::{debug, info};

use super::{CellValue, Dataset};
use crate::error::BuildError;

/// File extensions picked up from the data directory
pub const DATASET_EXTENSIONS: &[&str] = &["xlsx", "xls", "csv"];

/// Loads the files of one build into a single dataset.
///
/// Implementations are blocking; the state layer runs them on the worker pool.
pub trait DatasetLoader: Send + Sync {
    fn load(&self, paths: &[PathBuf]) -> Result<Dataset, BuildError>;
}

/// List candidate dataset files in `dir`, sorted by path.
///
/// A missing directory has no candidates.
pub fn list_dataset_files(dir: &Path) -> Result<Vec<PathBuf>, BuildError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(BuildError::Io {
                path: dir.to_path_buf(),
                source,
            })
        }
    };

    let mut files = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|source| BuildError::Io {
                path: dir.to_path_buf(),
                source,
            })?
            .path();
        if path.is_file() && has_dataset_extension(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn has_dataset_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| DATASET_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Loader for CSV and Excel files on local disk
#[derive(Debug, Clone, Copy, Default)]
pub struct FileDatasetLoader;

impl DatasetLoader for FileDatasetLoader {
    fn load(&self, paths: &[PathBuf]) -> Result<Dataset, BuildError> {
        let mut frames = Vec::new();

        for path in paths {
            let ext = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_ascii_lowercase())
                .unwrap_or_default();

            match ext.as_str() {
                "csv" => frames.extend(read_csv(path)?),
                "xlsx" | "xls" => frames.extend(read_workbook(path)?),
                _ => return Err(BuildError::UnsupportedFile(path.clone())),
            }
        }

        if frames.is_empty() {
            return Err(BuildError::NoRows);
        }

        let merged = Dataset::concat(frames);
        info!(
            "Loaded {} rows, {} columns from {} files",
            merged.row_count(),
            merged.column_count(),
            paths.len()
        );
        Ok(merged)
    }
}

fn read_csv(path: &Path) -> Result<Option<Dataset>, BuildError> {
    let csv_err = |source| BuildError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(csv_err)?;

    let headers: Vec<String> = reader
        .headers()
        .map_err(csv_err)?
        .iter()
        .enumerate()
        .map(|(idx, h)| header_name(h, idx))
        .collect();
    check_unique_headers(path, &headers)?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(csv_err)?;
        rows.push(record.iter().map(CellValue::infer).collect());
    }

    debug!("CSV {} has {} rows", path.display(), rows.len());
    if rows.is_empty() {
        return Ok(None);
    }
    Ok(Some(Dataset::new(headers, rows)))
}

fn read_workbook(path: &Path) -> Result<Vec<Dataset>, BuildError> {
    let workbook_err = |message: String| BuildError::Workbook {
        path: path.to_path_buf(),
        message,
    };

    let mut workbook = open_workbook_auto(path).map_err(|e| workbook_err(e.to_string()))?;
    let sheet_names: Vec<String> = workbook.sheet_names().to_vec();

    let mut frames = Vec::new();
    for sheet in &sheet_names {
        let range = workbook
            .worksheet_range(sheet)
            .map_err(|e| workbook_err(format!("sheet '{}': {}", sheet, e)))?;

        let mut rows = range.rows();
        let Some(header_row) = rows.next() else {
            debug!("Skipping empty sheet '{}'", sheet);
            continue;
        };
        let headers: Vec<String> = header_row
            .iter()
            .enumerate()
            .map(|(idx, cell)| header_name(&cell.to_string(), idx))
            .collect();
        check_unique_headers(path, &headers)?;

        let body: Vec<Vec<CellValue>> = rows
            .map(|row| row.iter().map(workbook_cell).collect::<Vec<_>>())
            .filter(|row| row.iter().any(|c| !c.is_null()))
            .collect();

        if body.is_empty() {
            debug!("Skipping sheet '{}' with no data rows", sheet);
            continue;
        }
        frames.push(Dataset::new(headers, body));
    }

    Ok(frames)
}

fn workbook_cell(cell: &Data) -> CellValue {
    match cell {
        Data::Empty | Data::Error(_) => CellValue::Null,
        Data::Int(i) => CellValue::Int(*i),
        Data::Float(f) => CellValue::Float(*f),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::String(s) if s.trim().is_empty() => CellValue::Null,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::DateTime(_) | Data::DateTimeIso(_) | Data::DurationIso(_) => {
            CellValue::Text(cell.to_string())
        }
    }
}

/// Column names are trimmed; blank headers get a positional name.
fn header_name(raw: &str, idx: usize) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        format!("Unnamed: {}", idx)
    } else {
        trimmed.to_string()
    }
}

/// Frames are merged by column name, so a repeated name would lose cells.
fn check_unique_headers(path: &Path, headers: &[String]) -> Result<(), BuildError> {
    let mut seen = HashSet::new();
    match headers.iter().find(|h| !seen.insert(h.as_str())) {
        Some(column) => Err(BuildError::DuplicateHeader {
            path: path.to_path_buf(),
            column: column.clone(),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_list_dataset_files_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.csv"), "x\n1\n").unwrap();
        fs::write(dir.path().join("a.XLSX"), "").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let files = list_dataset_files(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.XLSX", "b.csv"]);
    }

    #[test]
    fn test_missing_directory_has_no_files() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(list_dataset_files(&missing).unwrap().is_empty());
    }

    #[test]
    fn test_load_csv_files_trims_headers_and_concats() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.csv");
        let b = dir.path().join("b.csv");
        fs::write(&a, " Region ,Sales\nNorth,100\nSouth,150\n").unwrap();
        fs::write(&b, "Region,Sales\nNorth,20\n").unwrap();

        let ds = FileDatasetLoader.load(&[a, b]).unwrap();
        assert_eq!(ds.columns(), &["Region", "Sales"]);
        assert_eq!(ds.row_count(), 3);
        assert_eq!(ds.cell(2, 1), &CellValue::Int(20));
    }

    #[test]
    fn test_header_only_files_yield_no_rows() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.csv");
        fs::write(&a, "Region,Sales\n").unwrap();

        let err = FileDatasetLoader.load(&[a]).unwrap_err();
        assert!(matches!(err, BuildError::NoRows));
    }

    #[test]
    fn test_repeated_header_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.csv");
        fs::write(&a, "Sales, Sales \n1,2\n").unwrap();

        let err = FileDatasetLoader.load(&[a]).unwrap_err();
        assert!(matches!(
            err,
            BuildError::DuplicateHeader { ref column, .. } if column == "Sales"
        ));
    }

    #[test]
    fn test_workbook_sheets_are_concatenated() {
        use rust_xlsxwriter::Workbook;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orders.xlsx");

        let mut workbook = Workbook::new();
        let north = workbook.add_worksheet().set_name("North").unwrap();
        north.write_string(0, 0, "Region").unwrap();
        north.write_string(0, 1, "Sales").unwrap();
        north.write_string(0, 2, "Active").unwrap();
        north.write_string(1, 0, "North").unwrap();
        north.write_number(1, 1, 100.0).unwrap();
        north.write_boolean(1, 2, true).unwrap();
        north.write_string(2, 0, "North").unwrap();
        north.write_number(2, 1, 20.5).unwrap();
        north.write_boolean(2, 2, false).unwrap();
        workbook.add_worksheet().set_name("Blank").unwrap();
        let notes = workbook.add_worksheet().set_name("Notes").unwrap();
        notes.write_string(0, 0, "Comment").unwrap();
        let south = workbook.add_worksheet().set_name("South").unwrap();
        south.write_string(0, 0, "Region").unwrap();
        south.write_string(0, 1, "Sales").unwrap();
        south.write_string(1, 0, "South").unwrap();
        south.write_number(1, 1, 150.0).unwrap();
        workbook.save(&path).unwrap();

        let ds = FileDatasetLoader.load(&[path]).unwrap();
        assert_eq!(ds.columns(), &["Region", "Sales", "Active"]);
        assert_eq!(ds.row_count(), 3);
        assert_eq!(ds.cell(0, 1), &CellValue::Float(100.0));
        assert_eq!(ds.cell(1, 2), &CellValue::Bool(false));
        assert_eq!(ds.cell(2, 0), &CellValue::Text("South".into()));
        assert_eq!(ds.cell(2, 2), &CellValue::Null);
    }

    #[test]
    fn test_blank_header_gets_positional_name() {
        assert_eq!(header_name("  ", 3), "Unnamed: 3");
        assert_eq!(header_name(" Cost ", 0), "Cost");
    }
}
