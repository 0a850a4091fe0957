//! Plausible filter expressions.
//!
//! On the wire a filter is a JSON array whose first element names the
//! operator:
//!
//! - `[op, dimension, clauses]` or `[op, dimension, clauses, modifiers]` for
//!   the simple operators (`is`, `is_not`, `contains`, ...)
//! - `["and" | "or", [expr, ...]]` with at least one operand
//! - `["not", expr]`
//!
//! Nesting depth is unbounded; every leaf is a simple filter.

use serde::ser::{Serialize, SerializeSeq, Serializer};
use serde_json::{Map, Value};

use crate::error::ToolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimpleOperator {
    Is,
    IsNot,
    Contains,
    NotContains,
    HasDone,
    HasNotDone,
}

impl SimpleOperator {
    pub const ALL: [SimpleOperator; 6] = [
        SimpleOperator::Is,
        SimpleOperator::IsNot,
        SimpleOperator::Contains,
        SimpleOperator::NotContains,
        SimpleOperator::HasDone,
        SimpleOperator::HasNotDone,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SimpleOperator::Is => "is",
            SimpleOperator::IsNot => "is_not",
            SimpleOperator::Contains => "contains",
            SimpleOperator::NotContains => "not_contains",
            SimpleOperator::HasDone => "has_done",
            SimpleOperator::HasNotDone => "has_not_done",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.as_str() == raw)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimpleFilter {
    pub operator: SimpleOperator,
    pub dimension: String,
    pub clauses: Vec<Value>,
    pub modifiers: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterExpression {
    Simple(SimpleFilter),
    And(Vec<FilterExpression>),
    Or(Vec<FilterExpression>),
    Not(Box<FilterExpression>),
}

impl FilterExpression {
    /// Parses one filter node. `path` names the node in error messages,
    /// e.g. `filters[2]`.
    pub fn parse(value: &Value, path: &str) -> Result<Self, ToolError> {
        let items = value
            .as_array()
            .ok_or_else(|| invalid(path, "must be an array"))?;
        let operator = items
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| invalid(path, "must start with an operator string"))?;

        if let Some(operator) = SimpleOperator::parse(operator) {
            return parse_simple(operator, items, path).map(FilterExpression::Simple);
        }

        match operator {
            "and" | "or" => {
                if items.len() != 2 {
                    return Err(invalid(
                        path,
                        format!("'{operator}' filter must have exactly 2 elements, got {}", items.len()),
                    ));
                }
                let operand_path = format!("{path}[1]");
                let operands = items[1].as_array().ok_or_else(|| {
                    invalid(&operand_path, format!("'{operator}' operands must be an array"))
                })?;
                if operands.is_empty() {
                    return Err(invalid(
                        &operand_path,
                        format!("'{operator}' requires at least one operand"),
                    ));
                }
                let operands = operands
                    .iter()
                    .enumerate()
                    .map(|(idx, operand)| Self::parse(operand, &format!("{operand_path}[{idx}]")))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(if operator == "and" {
                    FilterExpression::And(operands)
                } else {
                    FilterExpression::Or(operands)
                })
            }
            "not" => {
                if items.len() != 2 {
                    return Err(invalid(
                        path,
                        format!("'not' filter must have exactly 2 elements, got {}", items.len()),
                    ));
                }
                let operand = Self::parse(&items[1], &format!("{path}[1]"))?;
                Ok(FilterExpression::Not(Box::new(operand)))
            }
            other => Err(invalid(
                path,
                format!(
                    "unknown filter operator '{other}' (expected one of: {}, and, or, not)",
                    SimpleOperator::ALL.map(SimpleOperator::as_str).join(", ")
                ),
            )),
        }
    }

    pub fn operator(&self) -> &'static str {
        match self {
            FilterExpression::Simple(filter) => filter.operator.as_str(),
            FilterExpression::And(_) => "and",
            FilterExpression::Or(_) => "or",
            FilterExpression::Not(_) => "not",
        }
    }
}

fn parse_simple(
    operator: SimpleOperator,
    items: &[Value],
    path: &str,
) -> Result<SimpleFilter, ToolError> {
    if !(3..=4).contains(&items.len()) {
        return Err(invalid(
            path,
            format!(
                "'{}' filter must have 3 or 4 elements, got {}",
                operator.as_str(),
                items.len()
            ),
        ));
    }
    let dimension = items[1]
        .as_str()
        .ok_or_else(|| invalid(&format!("{path}[1]"), "filter dimension must be a string"))?
        .to_string();
    let clauses = items[2]
        .as_array()
        .ok_or_else(|| invalid(&format!("{path}[2]"), "filter values must be an array"))?
        .clone();
    let modifiers = match items.get(3) {
        None => None,
        Some(Value::Object(map)) => Some(map.clone()),
        Some(_) => {
            return Err(invalid(
                &format!("{path}[3]"),
                "filter modifiers must be an object",
            ));
        }
    };
    Ok(SimpleFilter {
        operator,
        dimension,
        clauses,
        modifiers,
    })
}

fn invalid(path: &str, reason: impl AsRef<str>) -> ToolError {
    ToolError::validation(format!("Invalid filter at {path}: {}", reason.as_ref()))
}

impl Serialize for SimpleFilter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = if self.modifiers.is_some() { 4 } else { 3 };
        let mut seq = serializer.serialize_seq(Some(len))?;
        seq.serialize_element(self.operator.as_str())?;
        seq.serialize_element(&self.dimension)?;
        seq.serialize_element(&self.clauses)?;
        if let Some(modifiers) = &self.modifiers {
            seq.serialize_element(modifiers)?;
        }
        seq.end()
    }
}

impl Serialize for FilterExpression {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FilterExpression::Simple(filter) => filter.serialize(serializer),
            FilterExpression::And(operands) | FilterExpression::Or(operands) => {
                let mut seq = serializer.serialize_seq(Some(2))?;
                seq.serialize_element(self.operator())?;
                seq.serialize_element(operands)?;
                seq.end()
            }
            FilterExpression::Not(operand) => {
                let mut seq = serializer.serialize_seq(Some(2))?;
                seq.serialize_element("not")?;
                seq.serialize_element(operand.as_ref())?;
                seq.end()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: Value) -> Result<FilterExpression, ToolError> {
        FilterExpression::parse(&value, "filters[0]")
    }

    fn message(result: Result<FilterExpression, ToolError>) -> String {
        result.expect_err("filter should be rejected").to_string()
    }

    #[test]
    fn three_element_simple_filter_is_valid() {
        let filter = parse(json!(["is", "visit:country_name", ["Germany"]])).unwrap();
        assert_eq!(
            filter,
            FilterExpression::Simple(SimpleFilter {
                operator: SimpleOperator::Is,
                dimension: "visit:country_name".to_string(),
                clauses: vec![json!("Germany")],
                modifiers: None,
            })
        );
    }

    #[test]
    fn simple_filter_accepts_modifier_object() {
        let filter = parse(json!(["contains", "event:page", ["/blog"], {"case_sensitive": false}]))
            .unwrap();
        let FilterExpression::Simple(simple) = filter else {
            panic!("expected simple filter");
        };
        assert_eq!(simple.operator, SimpleOperator::Contains);
        assert_eq!(simple.modifiers.unwrap()["case_sensitive"], json!(false));
    }

    #[test]
    fn simple_filter_rejects_bad_arity_and_shapes() {
        assert!(message(parse(json!(["is", "a"]))).contains("3 or 4 elements, got 2"));
        assert!(message(parse(json!(["is", "a", ["x"], {}, "extra"]))).contains("got 5"));
        assert!(message(parse(json!(["is", 7, ["x"]]))).contains("filters[0][1]"));
        assert!(message(parse(json!(["is", "a", "x"]))).contains("values must be an array"));
        assert!(message(parse(json!(["is", "a", ["x"], "mod"]))).contains("modifiers must be an object"));
    }

    #[test]
    fn and_with_two_operands_is_valid() {
        let filter = parse(json!(["and", [["is", "a", ["x"]], ["is", "b", ["y"]]]])).unwrap();
        let FilterExpression::And(operands) = filter else {
            panic!("expected and");
        };
        assert_eq!(operands.len(), 2);
    }

    #[test]
    fn empty_operand_list_is_invalid() {
        let err = message(parse(json!(["and", []])));
        assert!(err.contains("at least one operand"), "{err}");
        assert!(message(parse(json!(["or", []]))).contains("at least one operand"));
    }

    #[test]
    fn not_with_two_operands_is_invalid() {
        let err = message(parse(json!(["not", ["is", "a", ["x"]], ["is", "b", ["y"]]])));
        assert!(err.contains("exactly 2 elements, got 3"), "{err}");
    }

    #[test]
    fn unknown_operator_is_invalid() {
        let err = message(parse(json!(["bogus", "a", ["x"]])));
        assert!(err.contains("unknown filter operator 'bogus'"), "{err}");
    }

    #[test]
    fn non_array_and_missing_operator_are_invalid() {
        assert!(message(parse(json!({"is": "a"}))).contains("must be an array"));
        assert!(message(parse(json!([]))).contains("operator string"));
        assert!(message(parse(json!([1, "a", ["x"]]))).contains("operator string"));
    }

    #[test]
    fn nested_errors_report_the_leaf_path() {
        let err = message(parse(json!([
            "or",
            [
                ["is", "a", ["x"]],
                ["not", ["and", [["is", "b", ["y"]], ["is", "c"]]]]
            ]
        ])));
        assert!(err.contains("filters[0][1][1][1][1][1]"), "{err}");
    }

    #[test]
    fn deep_nesting_is_accepted_and_serializes_to_wire_form() {
        let raw = json!([
            "not",
            ["or", [
                ["and", [["has_done", "event:goal", ["Signup"]], ["is_not", "visit:source", ["Direct / None"]]]],
                ["not_contains", "event:page", ["/admin"], {"case_sensitive": true}]
            ]]
        ]);
        let filter = parse(raw.clone()).unwrap();
        assert_eq!(filter.operator(), "not");
        assert_eq!(serde_json::to_value(&filter).unwrap(), raw);
    }
}
