//! In-memory tabular dataset
//!
//! A dataset is an ordered list of column names plus rows of typed cells.
//! Rows always have exactly one cell per column.

pub mod loader;

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use serde::ser::{Serialize, SerializeMap, Serializer};

pub use loader::{list_dataset_files, DatasetLoader, FileDatasetLoader, DATASET_EXTENSIONS};

/// A single typed cell
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

/// Hashable identity of a cell, used for grouping and distinct counts.
///
/// Numbers compare by value, so `1` and `1.0` are the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DistinctKey {
    Number(u64),
    Bool(bool),
    Text(String),
}

impl CellValue {
    /// Infer a typed cell from raw text (CSV fields, workbook strings)
    pub fn infer(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return CellValue::Null;
        }
        if let Ok(i) = trimmed.parse::<i64>() {
            return CellValue::Int(i);
        }
        if let Ok(f) = trimmed.parse::<f64>() {
            if f.is_finite() {
                return CellValue::Float(f);
            }
        }
        match trimmed.to_ascii_lowercase().as_str() {
            "true" => CellValue::Bool(true),
            "false" => CellValue::Bool(false),
            _ => CellValue::Text(raw.to_string()),
        }
    }

    pub fn is_null(&self) -> bool {
        match self {
            CellValue::Null => true,
            CellValue::Float(f) => f.is_nan(),
            _ => false,
        }
    }

    /// Numeric view of the cell. Text is accepted when it parses as a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Int(i) => Some(*i as f64),
            CellValue::Float(f) if !f.is_nan() => Some(*f),
            CellValue::Text(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
            _ => None,
        }
    }

    pub fn distinct_key(&self) -> Option<DistinctKey> {
        if self.is_null() {
            return None;
        }
        match self {
            CellValue::Int(_) | CellValue::Float(_) => {
                // -0.0 and 0.0 must hash together
                let f = self.as_f64()? + 0.0;
                Some(DistinctKey::Number(f.to_bits()))
            }
            CellValue::Bool(b) => Some(DistinctKey::Bool(*b)),
            CellValue::Text(s) => Some(DistinctKey::Text(s.clone())),
            CellValue::Null => None,
        }
    }

    /// Total order used by sort, max and min.
    ///
    /// Two numeric cells compare by value; anything else compares by its
    /// string form. Callers place nulls themselves.
    pub fn compare(&self, other: &CellValue) -> Ordering {
        match (self, other) {
            (
                CellValue::Int(_) | CellValue::Float(_),
                CellValue::Int(_) | CellValue::Float(_),
            ) => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a.total_cmp(&b),
                _ => Ordering::Equal,
            },
            _ => self.to_string().cmp(&other.to_string()),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            CellValue::Null => serde_json::Value::Null,
            CellValue::Bool(b) => serde_json::Value::Bool(*b),
            CellValue::Int(i) => serde_json::Value::from(*i),
            CellValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            CellValue::Text(s) => serde_json::Value::String(s.clone()),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => Ok(()),
            CellValue::Bool(b) => write!(f, "{}", b),
            CellValue::Int(i) => write!(f, "{}", i),
            CellValue::Float(x) if x.is_nan() => Ok(()),
            CellValue::Float(x) => write!(f, "{}", x),
            CellValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl Serialize for CellValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CellValue::Null => serializer.serialize_none(),
            CellValue::Bool(b) => serializer.serialize_bool(*b),
            CellValue::Int(i) => serializer.serialize_i64(*i),
            CellValue::Float(f) if f.is_finite() => serializer.serialize_f64(*f),
            CellValue::Float(_) => serializer.serialize_none(),
            CellValue::Text(s) => serializer.serialize_str(s),
        }
    }
}

/// One output row: raw column name → cell, in column order
#[derive(Debug, Clone, PartialEq)]
pub struct Record(pub Vec<(String, CellValue)>);

impl Record {
    pub fn get(&self, column: &str) -> Option<&CellValue> {
        self.0.iter().find(|(c, _)| c == column).map(|(_, v)| v)
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (column, value) in &self.0 {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

/// Tabular data loaded from one or more files
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<Vec<CellValue>>,
}

impl Dataset {
    /// Build a dataset, padding or truncating rows to the column count
    pub fn new(columns: Vec<String>, rows: Vec<Vec<CellValue>>) -> Self {
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, CellValue::Null);
                row
            })
            .collect();
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<CellValue>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn cell(&self, row: usize, column: usize) -> &CellValue {
        &self.rows[row][column]
    }

    pub fn record(&self, row: usize) -> Record {
        Record(
            self.columns
                .iter()
                .cloned()
                .zip(self.rows[row].iter().cloned())
                .collect(),
        )
    }

    /// Stack frames vertically, aligning columns by name.
    ///
    /// The result has the union of all columns in first-seen order; cells a
    /// frame does not provide are null.
    pub fn concat(frames: Vec<Dataset>) -> Dataset {
        let mut columns: Vec<String> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();
        for frame in &frames {
            for column in &frame.columns {
                if !positions.contains_key(column) {
                    positions.insert(column.clone(), columns.len());
                    columns.push(column.clone());
                }
            }
        }

        let width = columns.len();
        let mut rows = Vec::with_capacity(frames.iter().map(|f| f.rows.len()).sum());
        for frame in frames {
            let mapping: Vec<usize> = frame.columns.iter().map(|c| positions[c]).collect();
            for row in frame.rows {
                let mut out = vec![CellValue::Null; width];
                for (cell, &target) in row.into_iter().zip(&mapping) {
                    out[target] = cell;
                }
                rows.push(out);
            }
        }

        Dataset { columns, rows }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_cells() {
        assert_eq!(CellValue::infer("42"), CellValue::Int(42));
        assert_eq!(CellValue::infer(" 4.5 "), CellValue::Float(4.5));
        assert_eq!(CellValue::infer("TRUE"), CellValue::Bool(true));
        assert_eq!(CellValue::infer("   "), CellValue::Null);
        assert_eq!(CellValue::infer("North"), CellValue::Text("North".into()));
        assert_eq!(CellValue::infer("NaN"), CellValue::Text("NaN".into()));
    }

    #[test]
    fn test_numbers_share_distinct_key() {
        assert_eq!(
            CellValue::Int(1).distinct_key(),
            CellValue::Float(1.0).distinct_key()
        );
        assert_ne!(
            CellValue::Int(1).distinct_key(),
            CellValue::Text("1".into()).distinct_key()
        );
        assert_eq!(CellValue::Null.distinct_key(), None);
    }

    #[test]
    fn test_compare_numeric_and_text() {
        assert_eq!(
            CellValue::Int(9).compare(&CellValue::Float(10.5)),
            Ordering::Less
        );
        assert_eq!(
            CellValue::Text("b".into()).compare(&CellValue::Text("a".into())),
            Ordering::Greater
        );
    }

    #[test]
    fn test_display_float_without_trailing_zero() {
        assert_eq!(CellValue::Float(100.0).to_string(), "100");
        assert_eq!(CellValue::Float(2.5).to_string(), "2.5");
        assert_eq!(CellValue::Null.to_string(), "");
    }

    #[test]
    fn test_concat_aligns_columns_by_name() {
        let a = Dataset::new(
            vec!["Region".into(), "Sales".into()],
            vec![vec![CellValue::Text("North".into()), CellValue::Int(1)]],
        );
        let b = Dataset::new(
            vec!["Sales".into(), "Plant".into()],
            vec![vec![CellValue::Int(2), CellValue::Text("P1".into())]],
        );

        let merged = Dataset::concat(vec![a, b]);
        assert_eq!(merged.columns(), &["Region", "Sales", "Plant"]);
        assert_eq!(merged.row_count(), 2);
        assert_eq!(merged.cell(1, 0), &CellValue::Null);
        assert_eq!(merged.cell(1, 1), &CellValue::Int(2));
        assert_eq!(merged.cell(0, 2), &CellValue::Null);
    }

    #[test]
    fn test_record_serializes_in_column_order() {
        let ds = Dataset::new(
            vec!["b".into(), "a".into()],
            vec![vec![CellValue::Int(1), CellValue::Text("x".into())]],
        );
        let json = serde_json::to_string(&ds.record(0)).unwrap();
        assert_eq!(json, r#"{"b":1,"a":"x"}"#);
    }
}
