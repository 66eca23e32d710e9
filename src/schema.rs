//! Schema normalization
//!
//! Maps raw column names to semantic keys so plans never reference raw,
//! possibly inconsistent column names directly.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{CompileError, SchemaError};

static NON_ALNUM_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9]+").unwrap());

/// Normalize a raw column name into a semantic key.
///
/// Lower-cases, collapses every run of characters outside `[a-z0-9]` into one
/// `_`, then strips leading and trailing `_`.
pub fn normalize(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    NON_ALNUM_RUN
        .replace_all(&lowered, "_")
        .trim_matches('_')
        .to_string()
}

/// One semantic key and the raw column it resolves to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaEntry {
    pub key: String,
    pub column: String,
}

/// Semantic key → raw column mapping, in column order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    entries: Vec<SchemaEntry>,
    index: HashMap<String, usize>,
}

impl Schema {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.index
            .get(key)
            .map(|&idx| self.entries[idx].column.as_str())
    }

    /// Resolve a key used by a plan step
    pub fn resolve(&self, key: &str) -> Result<&str, CompileError> {
        self.get(key)
            .ok_or_else(|| CompileError::UnknownColumn(key.to_string()))
    }

    pub fn entries(&self) -> &[SchemaEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `key → column` listing, one entry per line, for planner prompts
    pub fn describe(&self) -> String {
        self.entries
            .iter()
            .map(|e| format!("{} → {}", e.key, e.column))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Build the schema for a dataset's columns.
///
/// Two columns that normalize to the same key are rejected instead of letting
/// the later one shadow the earlier.
pub fn build_schema<S: AsRef<str>>(columns: &[S]) -> Result<Schema, SchemaError> {
    let mut schema = Schema::default();

    for column in columns {
        let column = column.as_ref();
        let key = normalize(column);
        if key.is_empty() {
            return Err(SchemaError::EmptyKey(column.to_string()));
        }
        if let Some(&existing) = schema.index.get(&key) {
            return Err(SchemaError::DuplicateKey {
                key,
                first: schema.entries[existing].column.clone(),
                second: column.to_string(),
            });
        }
        schema.index.insert(key.clone(), schema.entries.len());
        schema.entries.push(SchemaEntry {
            key,
            column: column.to_string(),
        });
    }

    Ok(schema)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_normalize_examples() {
        assert_eq!(normalize("Unit Cost ($)"), "unit_cost");
        assert_eq!(normalize("  Vendor-ID "), "vendor_id");
        assert_eq!(normalize("Plant__Code"), "plant_code");
        assert_eq!(normalize("Qty2024"), "qty2024");
        assert_eq!(normalize("Café Región"), "caf_regi_n");
    }

    #[test]
    fn test_build_schema_keeps_column_order() {
        let schema = build_schema(&["Region", "Unit Cost ($)", "Vendor-ID"]).unwrap();
        assert_eq!(schema.len(), 3);
        assert_eq!(schema.get("unit_cost"), Some("Unit Cost ($)"));
        assert_eq!(
            schema.describe(),
            "region → Region\nunit_cost → Unit Cost ($)\nvendor_id → Vendor-ID"
        );
    }

    #[test]
    fn test_collision_is_rejected() {
        let err = build_schema(&["Vendor ID", "vendor-id"]).unwrap_err();
        assert_eq!(
            err,
            SchemaError::DuplicateKey {
                key: "vendor_id".into(),
                first: "Vendor ID".into(),
                second: "vendor-id".into(),
            }
        );
    }

    #[test]
    fn test_symbol_only_column_is_rejected() {
        let err = build_schema(&["Region", "($)"]).unwrap_err();
        assert_eq!(err, SchemaError::EmptyKey("($)".into()));
    }

    #[test]
    fn test_resolve_unknown_key() {
        let schema = build_schema(&["Region"]).unwrap();
        assert_eq!(
            schema.resolve("sales"),
            Err(CompileError::UnknownColumn("sales".into()))
        );
    }

    proptest! {
        #[test]
        fn normalized_keys_are_clean(raw in ".{0,40}") {
            let key = normalize(&raw);
            prop_assert!(key.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'));
            prop_assert!(!key.starts_with('_') && !key.ends_with('_'));
            prop_assert!(!key.contains("__"));
        }

        #[test]
        fn normalize_is_idempotent(raw in ".{0,40}") {
            let once = normalize(&raw);
            prop_assert_eq!(normalize(&once), once.clone());
        }
    }
}
