//! Analytics execution engine
//!
//! Folds a plan's steps over a [`WorkingRelation`]:
//!
//! ```text
//! Rows ──groupby──▶ Grouped ──aggregate──▶ Keyed
//!  │                   │
//!  └─aggregate─▶ scalar (stops)     list_unique (any shape) ─▶ values (stops)
//! ```
//!
//! Every step resolves its semantic keys through the schema when it runs, so
//! steps after a short-circuit are never looked at.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::ser::{Serialize, SerializeMap, Serializer};
use tracing::debug;

use crate::dataset::{CellValue, Dataset, DistinctKey, Record};
use crate::error::CompileError;
use crate::plan::{AggregateKind, Plan, SortOrder, Step};
use crate::schema::Schema;

/// Result of an analytics plan
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    /// Aggregate over ungrouped rows
    Scalar(CellValue),
    /// Group key → reduced value, in current order
    Keyed(Vec<(String, CellValue)>),
    /// Distinct values from `list_unique`
    Values(Vec<CellValue>),
    /// Remaining rows
    Records(Vec<Record>),
}

impl QueryResult {
    /// True when there is nothing to report
    pub fn is_empty(&self) -> bool {
        match self {
            QueryResult::Scalar(v) => v.is_null(),
            QueryResult::Keyed(entries) => entries.is_empty(),
            QueryResult::Values(values) => values.is_empty(),
            QueryResult::Records(records) => records.is_empty(),
        }
    }

    /// Compact JSON used when handing results to text generation
    pub fn to_json_string(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

impl Serialize for QueryResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            QueryResult::Scalar(value) => value.serialize(serializer),
            QueryResult::Keyed(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
            QueryResult::Values(values) => values.serialize(serializer),
            QueryResult::Records(records) => records.serialize(serializer),
        }
    }
}

/// Rows sharing one group key, not yet reduced
#[derive(Debug, Clone)]
struct Partition {
    key: CellValue,
    rows: Vec<usize>,
}

/// A reduced group. Keeps its source rows so `list_unique` still works.
#[derive(Debug, Clone)]
struct KeyedEntry {
    key: CellValue,
    value: CellValue,
    rows: Vec<usize>,
}

/// The engine's intermediate value. Rows are dataset row indices.
#[derive(Debug, Clone)]
enum WorkingRelation {
    Rows(Vec<usize>),
    Grouped(Vec<Partition>),
    Keyed(Vec<KeyedEntry>),
}

impl WorkingRelation {
    fn shape(&self) -> &'static str {
        match self {
            WorkingRelation::Rows(_) => "rows",
            WorkingRelation::Grouped(_) => "grouped",
            WorkingRelation::Keyed(_) => "keyed",
        }
    }

    /// Every dataset row still in play, in original order
    fn source_rows(&self) -> Vec<usize> {
        let mut rows: Vec<usize> = match self {
            WorkingRelation::Rows(rows) => return rows.clone(),
            WorkingRelation::Grouped(parts) => {
                parts.iter().flat_map(|p| p.rows.iter().copied()).collect()
            }
            WorkingRelation::Keyed(entries) => {
                entries.iter().flat_map(|e| e.rows.iter().copied()).collect()
            }
        };
        rows.sort_unstable();
        rows
    }
}

enum Flow {
    Continue(WorkingRelation),
    Done(QueryResult),
}

/// Executes analytics plans against one dataset
#[derive(Debug, Clone)]
pub struct AnalyticsEngine {
    dataset: Arc<Dataset>,
    schema: Arc<Schema>,
}

impl AnalyticsEngine {
    pub fn new(dataset: Arc<Dataset>, schema: Arc<Schema>) -> Self {
        Self { dataset, schema }
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Run a plan. Returns `Ok(None)` for anything but an analytics plan.
    pub fn run(&self, plan: &Plan) -> Result<Option<QueryResult>, CompileError> {
        let Plan::Analytics { steps } = plan else {
            return Ok(None);
        };

        let mut relation = WorkingRelation::Rows((0..self.dataset.row_count()).collect());

        for (idx, step) in steps.iter().enumerate() {
            debug!("step {} ({}) on {} relation", idx, step.op_name(), relation.shape());
            match self.apply(relation, step)? {
                Flow::Continue(next) => relation = next,
                Flow::Done(result) => {
                    if idx + 1 < steps.len() {
                        debug!("{} trailing steps skipped", steps.len() - idx - 1);
                    }
                    return Ok(Some(result));
                }
            }
        }

        self.finish(relation).map(Some)
    }

    fn apply(&self, relation: WorkingRelation, step: &Step) -> Result<Flow, CompileError> {
        match step {
            Step::Filter { column, value } => {
                let rows = match relation {
                    WorkingRelation::Rows(rows) => rows,
                    other => return Err(invalid("filter", &other)),
                };
                let col = self.column(column)?;
                let wanted = value.to_lowercase();
                let wanted_number = value.trim().parse::<f64>().ok().filter(|f| f.is_finite());
                let kept = rows
                    .into_iter()
                    .filter(|&r| filter_matches(self.dataset.cell(r, col), &wanted, wanted_number))
                    .collect();
                Ok(Flow::Continue(WorkingRelation::Rows(kept)))
            }

            Step::GroupBy { column } => {
                let rows = match relation {
                    WorkingRelation::Rows(rows) => rows,
                    other => return Err(invalid("groupby", &other)),
                };
                let col = self.column(column)?;
                Ok(Flow::Continue(WorkingRelation::Grouped(
                    self.partition(&rows, col),
                )))
            }

            Step::Aggregate { kind, metric } => {
                let col = self.column(metric)?;
                match relation {
                    WorkingRelation::Rows(rows) => Ok(Flow::Done(QueryResult::Scalar(
                        self.aggregate(*kind, col, &rows)?,
                    ))),
                    WorkingRelation::Grouped(parts) => {
                        let entries = parts
                            .into_iter()
                            .map(|p| -> Result<KeyedEntry, CompileError> {
                                Ok(KeyedEntry {
                                    value: self.aggregate(*kind, col, &p.rows)?,
                                    key: p.key,
                                    rows: p.rows,
                                })
                            })
                            .collect::<Result<Vec<_>, _>>()?;
                        Ok(Flow::Continue(WorkingRelation::Keyed(entries)))
                    }
                    WorkingRelation::Keyed(_) => Err(CompileError::AlreadyReduced),
                }
            }

            Step::ListUnique { metric } => {
                let col = self.column(metric)?;
                let mut seen = HashSet::new();
                let values = relation
                    .source_rows()
                    .into_iter()
                    .map(|r| self.dataset.cell(r, col))
                    .filter(|cell| cell.distinct_key().is_some_and(|k| seen.insert(k)))
                    .cloned()
                    .collect();
                Ok(Flow::Done(QueryResult::Values(values)))
            }

            Step::Sort { by, order } => match relation {
                WorkingRelation::Keyed(mut entries) => {
                    entries.sort_by(|a, b| order_cells(&a.value, &b.value, *order));
                    Ok(Flow::Continue(WorkingRelation::Keyed(entries)))
                }
                WorkingRelation::Rows(mut rows) => {
                    let by = by.as_deref().ok_or(CompileError::MissingSortKey)?;
                    let col = self.column(by)?;
                    rows.sort_by(|&a, &b| {
                        order_cells(self.dataset.cell(a, col), self.dataset.cell(b, col), *order)
                    });
                    Ok(Flow::Continue(WorkingRelation::Rows(rows)))
                }
                WorkingRelation::Grouped(_) => Err(CompileError::SortBeforeAggregate),
            },

            Step::Limit { count } => Ok(Flow::Continue(match relation {
                WorkingRelation::Rows(mut rows) => {
                    rows.truncate(*count);
                    WorkingRelation::Rows(rows)
                }
                WorkingRelation::Grouped(mut parts) => {
                    parts.truncate(*count);
                    WorkingRelation::Grouped(parts)
                }
                WorkingRelation::Keyed(mut entries) => {
                    entries.truncate(*count);
                    WorkingRelation::Keyed(entries)
                }
            })),
        }
    }

    fn finish(&self, relation: WorkingRelation) -> Result<QueryResult, CompileError> {
        match relation {
            WorkingRelation::Rows(rows) => Ok(QueryResult::Records(
                rows.into_iter().map(|r| self.dataset.record(r)).collect(),
            )),
            WorkingRelation::Keyed(entries) => {
                let mut used = HashSet::new();
                Ok(QueryResult::Keyed(
                    entries
                        .into_iter()
                        .map(|e| (unique_key_label(&e.key, &mut used), e.value))
                        .collect(),
                ))
            }
            WorkingRelation::Grouped(_) => Err(CompileError::UnreducedGroups),
        }
    }

    /// Resolve a semantic key to a dataset column index
    fn column(&self, key: &str) -> Result<usize, CompileError> {
        let raw = self.schema.resolve(key)?;
        self.dataset
            .column_index(raw)
            .ok_or_else(|| CompileError::UnknownColumn(key.to_string()))
    }

    /// Partition rows by the column's value, in order of first occurrence.
    /// Rows with a null key belong to no group.
    fn partition(&self, rows: &[usize], col: usize) -> Vec<Partition> {
        let mut parts: Vec<Partition> = Vec::new();
        let mut index: HashMap<DistinctKey, usize> = HashMap::new();

        for &r in rows {
            let cell = self.dataset.cell(r, col);
            let Some(key) = cell.distinct_key() else {
                continue;
            };
            match index.get(&key) {
                Some(&slot) => parts[slot].rows.push(r),
                None => {
                    index.insert(key, parts.len());
                    parts.push(Partition {
                        key: cell.clone(),
                        rows: vec![r],
                    });
                }
            }
        }

        parts
    }

    fn aggregate(&self, kind: AggregateKind, col: usize, rows: &[usize]) -> Result<CellValue, CompileError> {
        let cells = rows
            .iter()
            .map(|&r| self.dataset.cell(r, col))
            .filter(|c| !c.is_null());

        match kind {
            AggregateKind::Sum => self.sum(col, cells),
            AggregateKind::Avg => {
                let values = self.numbers(col, cells)?;
                if values.is_empty() {
                    return Ok(CellValue::Null);
                }
                let mean = values.iter().sum::<f64>() / values.len() as f64;
                Ok(CellValue::Float(round2(mean)))
            }
            AggregateKind::Max => Ok(cells
                .max_by(|a, b| a.compare(b))
                .cloned()
                .unwrap_or(CellValue::Null)),
            AggregateKind::Min => Ok(cells
                .min_by(|a, b| a.compare(b))
                .cloned()
                .unwrap_or(CellValue::Null)),
            AggregateKind::CountUnique => {
                let distinct: HashSet<DistinctKey> = cells.filter_map(CellValue::distinct_key).collect();
                Ok(CellValue::Int(distinct.len() as i64))
            }
        }
    }

    /// Integer sum while every cell is an integer; float otherwise
    fn sum<'a>(
        &self,
        col: usize,
        cells: impl Iterator<Item = &'a CellValue>,
    ) -> Result<CellValue, CompileError> {
        let mut int_total: Option<i64> = Some(0);
        let mut float_total = 0.0;

        for cell in cells {
            let value = self.numeric(col, cell)?;
            float_total += value;
            int_total = match (int_total, cell) {
                (Some(total), CellValue::Int(i)) => total.checked_add(*i),
                _ => None,
            };
        }

        Ok(match int_total {
            Some(total) => CellValue::Int(total),
            None => CellValue::Float(float_total),
        })
    }

    fn numbers<'a>(
        &self,
        col: usize,
        cells: impl Iterator<Item = &'a CellValue>,
    ) -> Result<Vec<f64>, CompileError> {
        cells.map(|c| self.numeric(col, c)).collect()
    }

    fn numeric(&self, col: usize, cell: &CellValue) -> Result<f64, CompileError> {
        cell.as_f64().ok_or_else(|| CompileError::NonNumeric {
            column: self.dataset.columns()[col].clone(),
            value: cell.to_string(),
        })
    }
}

fn invalid(op: &'static str, relation: &WorkingRelation) -> CompileError {
    CompileError::InvalidTransition {
        op,
        shape: relation.shape(),
    }
}

/// Ordering for sort: by value in the requested direction, nulls always last
fn order_cells(a: &CellValue, b: &CellValue, order: SortOrder) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => match order {
            SortOrder::Asc => a.compare(b),
            SortOrder::Desc => b.compare(a),
        },
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Render a group key for the keyed result. Distinct keys with the same
/// string form (`1` and `"1"` in a mixed column) get a type qualifier.
fn unique_key_label(key: &CellValue, used: &mut HashSet<String>) -> String {
    let base = key.to_string();
    let kind = match key {
        CellValue::Int(_) | CellValue::Float(_) => "number",
        CellValue::Bool(_) => "bool",
        _ => "text",
    };

    let mut label = base.clone();
    let mut n = 1;
    while used.contains(&label) {
        label = if n == 1 {
            format!("{} ({})", base, kind)
        } else {
            format!("{} ({} {})", base, kind, n)
        };
        n += 1;
    }
    used.insert(label.clone());
    label
}

/// Numbers match by value, everything else by case-insensitive string form.
/// Null cells never match.
fn filter_matches(cell: &CellValue, wanted: &str, wanted_number: Option<f64>) -> bool {
    if cell.is_null() {
        return false;
    }
    if let (Some(target), Some(actual)) = (wanted_number, cell.as_f64()) {
        return actual == target;
    }
    cell.to_string().to_lowercase() == wanted
}
