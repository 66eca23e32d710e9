//! Plan model
//!
//! Typed representation of a compiled question. Raw planner output is untyped
//! JSON; [`Plan::parse`] converts it into the closed set of steps below and
//! rejects anything else before execution begins.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{CompileError, PlanError, PlanParseError};

/// A compiled question
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Plan {
    /// Deterministic pipeline over the dataset
    Analytics { steps: Vec<Step> },
    /// Answer from retrieved context
    Explain,
    /// Any other plan type the planner produced
    Unsupported { kind: String },
}

/// One pipeline operation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    Filter {
        column: String,
        value: String,
    },
    #[serde(rename = "groupby")]
    GroupBy {
        column: String,
    },
    Aggregate {
        kind: AggregateKind,
        metric: String,
    },
    ListUnique {
        metric: String,
    },
    Sort {
        #[serde(skip_serializing_if = "Option::is_none")]
        by: Option<String>,
        order: SortOrder,
    },
    Limit {
        count: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateKind {
    Sum,
    Avg,
    Max,
    Min,
    CountUnique,
}

impl AggregateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateKind::Sum => "sum",
            AggregateKind::Avg => "avg",
            AggregateKind::Max => "max",
            AggregateKind::Min => "min",
            AggregateKind::CountUnique => "count_unique",
        }
    }
}

impl FromStr for AggregateKind {
    type Err = CompileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sum" => Ok(AggregateKind::Sum),
            "avg" => Ok(AggregateKind::Avg),
            "max" => Ok(AggregateKind::Max),
            "min" => Ok(AggregateKind::Min),
            "count_unique" => Ok(AggregateKind::CountUnique),
            other => Err(CompileError::UnknownAggregateKind(other.to_string())),
        }
    }
}

impl fmt::Display for AggregateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl FromStr for SortOrder {
    type Err = CompileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(CompileError::UnknownSortOrder(other.to_string())),
        }
    }
}

impl Plan {
    /// Parse raw planner text, tolerating Markdown code fences.
    pub fn parse(raw: &str) -> Result<Plan, PlanError> {
        let body = strip_code_fences(raw);
        let value: Value = serde_json::from_str(&body).map_err(PlanParseError::Json)?;
        Plan::from_value(&value)
    }

    /// Validate an untyped JSON plan into the typed model
    pub fn from_value(value: &Value) -> Result<Plan, PlanError> {
        let obj = value.as_object().ok_or(PlanParseError::NotAnObject)?;
        let kind = obj
            .get("type")
            .and_then(Value::as_str)
            .ok_or(PlanParseError::MissingType)?;

        match kind {
            "explain" => Ok(Plan::Explain),
            "analytics" => {
                let steps = obj.get("steps").ok_or(CompileError::MissingField {
                    op: "plan".to_string(),
                    field: "steps",
                })?;
                let steps = steps.as_array().ok_or_else(|| {
                    CompileError::MalformedStep("'steps' must be a list".to_string())
                })?;
                let steps = steps
                    .iter()
                    .map(Step::from_value)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Plan::Analytics { steps })
            }
            other => Ok(Plan::Unsupported {
                kind: other.to_string(),
            }),
        }
    }

    pub fn is_analytics(&self) -> bool {
        matches!(self, Plan::Analytics { .. })
    }
}

impl Step {
    /// Validate one untyped step.
    ///
    /// Aggregates are accepted both as `{"op": "sum", "metric": ..}` and as
    /// `{"op": "aggregate", "kind": "sum", "metric": ..}`.
    pub fn from_value(value: &Value) -> Result<Step, CompileError> {
        let obj = value
            .as_object()
            .ok_or_else(|| CompileError::MalformedStep(format!("expected an object, got {}", value)))?;
        let op = obj
            .get("op")
            .and_then(Value::as_str)
            .ok_or(CompileError::MissingField {
                op: "step".to_string(),
                field: "op",
            })?;

        match op {
            "filter" => Ok(Step::Filter {
                column: required_str(obj, op, "column")?,
                value: filter_value(obj, op)?,
            }),
            "groupby" => Ok(Step::GroupBy {
                column: required_str(obj, op, "column")?,
            }),
            "aggregate" => Ok(Step::Aggregate {
                kind: required_str(obj, op, "kind")?.parse()?,
                metric: required_str(obj, op, "metric")?,
            }),
            "sum" | "avg" | "max" | "min" | "count_unique" => Ok(Step::Aggregate {
                kind: op.parse()?,
                metric: required_str(obj, op, "metric")?,
            }),
            "list_unique" => Ok(Step::ListUnique {
                metric: required_str(obj, op, "metric")?,
            }),
            "sort" => Ok(Step::Sort {
                by: optional_str(obj, op, "by")?,
                order: match optional_str(obj, op, "order")? {
                    Some(order) => order.parse()?,
                    None => SortOrder::default(),
                },
            }),
            "limit" => Ok(Step::Limit {
                count: limit_count(obj, op)?,
            }),
            other => Err(CompileError::UnknownOperation(other.to_string())),
        }
    }

    pub fn op_name(&self) -> &'static str {
        match self {
            Step::Filter { .. } => "filter",
            Step::GroupBy { .. } => "groupby",
            Step::Aggregate { .. } => "aggregate",
            Step::ListUnique { .. } => "list_unique",
            Step::Sort { .. } => "sort",
            Step::Limit { .. } => "limit",
        }
    }
}

fn required_str(obj: &Map<String, Value>, op: &str, field: &'static str) -> Result<String, CompileError> {
    optional_str(obj, op, field)?.ok_or_else(|| CompileError::MissingField {
        op: op.to_string(),
        field,
    })
}

fn optional_str(
    obj: &Map<String, Value>,
    op: &str,
    field: &'static str,
) -> Result<Option<String>, CompileError> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(CompileError::InvalidField {
            op: op.to_string(),
            field,
            reason: format!("expected a string, got {}", other),
        }),
    }
}

/// Filter values are compared by string form, whatever JSON type they arrive as
fn filter_value(obj: &Map<String, Value>, op: &str) -> Result<String, CompileError> {
    match obj.get("value") {
        None | Some(Value::Null) => Err(CompileError::MissingField {
            op: op.to_string(),
            field: "value",
        }),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(Value::Bool(b)) => Ok(b.to_string()),
        Some(other) => Err(CompileError::InvalidField {
            op: op.to_string(),
            field: "value",
            reason: format!("expected a scalar, got {}", other),
        }),
    }
}

/// Limit accepts `count` or the older `value` key
fn limit_count(obj: &Map<String, Value>, op: &str) -> Result<usize, CompileError> {
    let (field, raw) = match (obj.get("count"), obj.get("value")) {
        (Some(v), _) => ("count", v),
        (None, Some(v)) => ("value", v),
        (None, None) => {
            return Err(CompileError::MissingField {
                op: op.to_string(),
                field: "count",
            })
        }
    };

    let invalid = |reason: String| CompileError::InvalidField {
        op: op.to_string(),
        field,
        reason,
    };

    match raw {
        Value::Number(n) => n
            .as_u64()
            .map(|c| c as usize)
            .ok_or_else(|| invalid(format!("expected a non-negative integer, got {}", n))),
        Value::String(s) => s
            .trim()
            .parse::<usize>()
            .map_err(|_| invalid(format!("expected a non-negative integer, got '{}'", s))),
        other => Err(invalid(format!("expected a non-negative integer, got {}", other))),
    }
}

/// Strip Markdown code fences and surrounding whitespace from model output
pub fn strip_code_fences(text: &str) -> String {
    let text = text.trim();

    let Some((_, after_open)) = text.split_once("```") else {
        return text.to_string();
    };

    // Language tag such as `json`, with or without a newline after it
    let body = after_open.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
    let body = match body.find("```") {
        Some(end) => &body[..end],
        None => body,
    };

    body.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fenced_and_plain_parse_identically() {
        let plain = Plan::parse(r#"{"type":"explain"}"#).unwrap();
        let fenced = Plan::parse("```json\n{\"type\":\"explain\"}\n```").unwrap();
        let bare_fence = Plan::parse("```\n{\"type\":\"explain\"}\n```").unwrap();
        assert_eq!(plain, Plan::Explain);
        assert_eq!(fenced, plain);
        assert_eq!(bare_fence, plain);
    }

    #[test]
    fn test_single_line_fence_keeps_plan() {
        let raw = r#"```json{"type":"analytics","steps":[{"op":"sum","metric":"sales"}]}```"#;
        assert_eq!(
            strip_code_fences(raw),
            r#"{"type":"analytics","steps":[{"op":"sum","metric":"sales"}]}"#
        );
        assert!(Plan::parse(raw).unwrap().is_analytics());
        assert_eq!(
            Plan::parse("```{\"type\":\"explain\"}```").unwrap(),
            Plan::Explain
        );
    }

    #[test]
    fn test_parse_analytics_plan() {
        let raw = r#"{
            "type": "analytics",
            "steps": [
                {"op": "filter", "column": "plant", "value": "P1"},
                {"op": "groupby", "column": "region"},
                {"op": "sum", "metric": "sales"},
                {"op": "sort", "order": "desc"},
                {"op": "limit", "value": 3}
            ]
        }"#;

        let plan = Plan::parse(raw).unwrap();
        assert_eq!(
            plan,
            Plan::Analytics {
                steps: vec![
                    Step::Filter {
                        column: "plant".into(),
                        value: "P1".into()
                    },
                    Step::GroupBy {
                        column: "region".into()
                    },
                    Step::Aggregate {
                        kind: AggregateKind::Sum,
                        metric: "sales".into()
                    },
                    Step::Sort {
                        by: None,
                        order: SortOrder::Desc
                    },
                    Step::Limit { count: 3 },
                ]
            }
        );
    }

    #[test]
    fn test_aggregate_op_form() {
        let step = Step::from_value(&json!({"op": "aggregate", "kind": "count_unique", "metric": "vendor"}))
            .unwrap();
        assert_eq!(
            step,
            Step::Aggregate {
                kind: AggregateKind::CountUnique,
                metric: "vendor".into()
            }
        );
    }

    #[test]
    fn test_numeric_filter_value_uses_string_form() {
        let step = Step::from_value(&json!({"op": "filter", "column": "year", "value": 2024})).unwrap();
        assert_eq!(
            step,
            Step::Filter {
                column: "year".into(),
                value: "2024".into()
            }
        );
    }

    #[test]
    fn test_unknown_operation_is_compile_error() {
        let err = Plan::parse(r#"{"type":"analytics","steps":[{"op":"pivot","column":"x"}]}"#)
            .unwrap_err();
        assert!(matches!(
            err,
            PlanError::Compile(CompileError::UnknownOperation(ref op)) if op == "pivot"
        ));
    }

    #[test]
    fn test_unknown_kind_and_order() {
        let err = Step::from_value(&json!({"op": "aggregate", "kind": "median", "metric": "x"}))
            .unwrap_err();
        assert_eq!(err, CompileError::UnknownAggregateKind("median".into()));

        let err = Step::from_value(&json!({"op": "sort", "order": "up"})).unwrap_err();
        assert_eq!(err, CompileError::UnknownSortOrder("up".into()));
    }

    #[test]
    fn test_missing_fields() {
        let err = Step::from_value(&json!({"op": "groupby"})).unwrap_err();
        assert_eq!(
            err,
            CompileError::MissingField {
                op: "groupby".into(),
                field: "column"
            }
        );

        let err = Step::from_value(&json!({"op": "limit", "count": -1})).unwrap_err();
        assert!(matches!(err, CompileError::InvalidField { field: "count", .. }));
    }

    #[test]
    fn test_malformed_responses_are_parse_errors() {
        assert!(matches!(
            Plan::parse("Sure! Here is your plan"),
            Err(PlanError::Parse(PlanParseError::Json(_)))
        ));
        assert!(matches!(
            Plan::parse("[1, 2]"),
            Err(PlanError::Parse(PlanParseError::NotAnObject))
        ));
        assert!(matches!(
            Plan::parse(r#"{"steps": []}"#),
            Err(PlanError::Parse(PlanParseError::MissingType))
        ));
    }

    #[test]
    fn test_other_plan_types_are_kept() {
        assert_eq!(
            Plan::parse(r#"{"type":"chart"}"#).unwrap(),
            Plan::Unsupported {
                kind: "chart".into()
            }
        );
    }

    #[test]
    fn test_plan_serializes_tagged() {
        let plan = Plan::Analytics {
            steps: vec![Step::GroupBy {
                column: "region".into(),
            }],
        };
        assert_eq!(
            serde_json::to_value(&plan).unwrap(),
            json!({"type": "analytics", "steps": [{"op": "groupby", "column": "region"}]})
        );
    }
}
