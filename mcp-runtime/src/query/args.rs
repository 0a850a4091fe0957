use serde::Serialize;
use serde_json::{Map, Number, Value};

use crate::error::ToolError;
use crate::query::filter::FilterExpression;

const MISSING_SITE_OR_METRICS: &str = "Missing required arguments: site_id and metrics";
const MISSING_DATE: &str = "Missing required arguments: date_range (or date for single day)";

const KNOWN_FIELDS: [&str; 9] = [
    "site_id",
    "metrics",
    "date_range",
    "date",
    "dimensions",
    "filters",
    "order_by",
    "include",
    "pagination",
];

/// Either a named relative window (`"7d"`, `"month"`, `"all"`, ...) or an
/// explicit `[start, end]` pair of ISO8601 dates or date-times.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum DateRange {
    Named(String),
    Custom(String, String),
}

impl DateRange {
    pub fn single_day(date: String) -> Self {
        DateRange::Custom(date.clone(), date)
    }
}

/// How the caller chose the time window. `date_range` takes precedence over
/// `date`; the shadowed `date` is kept only for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateInput {
    Range {
        range: DateRange,
        ignored_date: Option<String>,
    },
    Day(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IncludeOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub imports: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_labels: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_rows: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Pagination {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<Number>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<Number>,
}

/// Arguments of a `plausible_query` call after structural validation.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryArgs {
    pub site_id: String,
    pub metrics: Vec<String>,
    pub date: DateInput,
    pub dimensions: Option<Vec<String>>,
    pub filters: Option<Vec<FilterExpression>>,
    pub order_by: Option<Vec<(String, SortDirection)>>,
    pub include: Option<IncludeOptions>,
    pub pagination: Option<Pagination>,
    /// Top-level keys outside the declared schema, forwarded untouched.
    pub extra: Map<String, Value>,
}

/// Canonical request body for `POST /api/v2/query`. Built once per call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryPayload {
    pub site_id: String,
    pub metrics: Vec<String>,
    pub date_range: DateRange,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filters: Option<Vec<FilterExpression>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_by: Option<Vec<(String, SortDirection)>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include: Option<IncludeOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl QueryArgs {
    pub fn from_arguments(args: &Map<String, Value>) -> Result<Self, ToolError> {
        let site_id = match present(args, "site_id") {
            None => return Err(ToolError::validation(MISSING_SITE_OR_METRICS)),
            Some(Value::String(s)) if s.is_empty() => {
                return Err(ToolError::validation(MISSING_SITE_OR_METRICS));
            }
            Some(Value::String(s)) => s.clone(),
            Some(_) => return Err(ToolError::validation("'site_id' must be a string")),
        };

        let metrics = match present(args, "metrics") {
            None => return Err(ToolError::validation(MISSING_SITE_OR_METRICS)),
            Some(value) => string_array(value, "metrics")?,
        };
        if metrics.is_empty() {
            return Err(ToolError::validation(MISSING_SITE_OR_METRICS));
        }

        let date_range = present(args, "date_range").map(parse_date_range).transpose()?;
        let single_date = match present(args, "date") {
            None => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => return Err(ToolError::validation("'date' must be a string (YYYY-MM-DD)")),
        };
        let date = match (date_range, single_date) {
            (Some(range), ignored_date) => DateInput::Range {
                range,
                ignored_date,
            },
            (None, Some(day)) => DateInput::Day(day),
            (None, None) => return Err(ToolError::validation(MISSING_DATE)),
        };

        let dimensions = present(args, "dimensions")
            .map(|value| string_array(value, "dimensions"))
            .transpose()?;
        let filters = present(args, "filters").map(parse_filters).transpose()?;
        let order_by = present(args, "order_by").map(parse_order_by).transpose()?;
        let include = present(args, "include").map(parse_include).transpose()?;
        let pagination = present(args, "pagination").map(parse_pagination).transpose()?;

        let extra = args
            .iter()
            .filter(|(key, _)| !KNOWN_FIELDS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Ok(Self {
            site_id,
            metrics,
            date,
            dimensions,
            filters,
            order_by,
            include,
            pagination,
            extra,
        })
    }

    /// Resolves the time window and drops the `date` convenience field.
    pub fn into_payload(self) -> QueryPayload {
        let date_range = match self.date {
            DateInput::Range { range, .. } => range,
            DateInput::Day(day) => DateRange::single_day(day),
        };
        QueryPayload {
            site_id: self.site_id,
            metrics: self.metrics,
            date_range,
            dimensions: self.dimensions,
            filters: self.filters,
            order_by: self.order_by,
            include: self.include,
            pagination: self.pagination,
            extra: self.extra,
        }
    }
}

fn present<'a>(args: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    args.get(key).filter(|value| !value.is_null())
}

fn string_array(value: &Value, key: &str) -> Result<Vec<String>, ToolError> {
    let items = value
        .as_array()
        .ok_or_else(|| ToolError::validation(format!("'{key}' must be an array of strings")))?;
    items
        .iter()
        .enumerate()
        .map(|(idx, item)| {
            item.as_str().map(str::to_string).ok_or_else(|| {
                ToolError::validation(format!("'{key}[{idx}]' must be a string"))
            })
        })
        .collect()
}

fn parse_date_range(value: &Value) -> Result<DateRange, ToolError> {
    const SHAPE: &str = "'date_range' must be a string or an array of two date strings";
    match value {
        Value::String(named) => Ok(DateRange::Named(named.clone())),
        Value::Array(items) => match items.as_slice() {
            [Value::String(start), Value::String(end)] => {
                Ok(DateRange::Custom(start.clone(), end.clone()))
            }
            _ => Err(ToolError::validation(SHAPE)),
        },
        _ => Err(ToolError::validation(SHAPE)),
    }
}

fn parse_filters(value: &Value) -> Result<Vec<FilterExpression>, ToolError> {
    let items = value
        .as_array()
        .ok_or_else(|| ToolError::validation("'filters' must be an array of filter expressions"))?;
    items
        .iter()
        .enumerate()
        .map(|(idx, item)| FilterExpression::parse(item, &format!("filters[{idx}]")))
        .collect()
}

fn parse_order_by(value: &Value) -> Result<Vec<(String, SortDirection)>, ToolError> {
    let items = value
        .as_array()
        .ok_or_else(|| ToolError::validation("'order_by' must be an array of [field, direction] pairs"))?;
    items
        .iter()
        .enumerate()
        .map(|(idx, item)| {
            let pair = item.as_array().map(Vec::as_slice);
            let Some([Value::String(field), Value::String(direction)]) = pair else {
                return Err(ToolError::validation(format!(
                    "'order_by[{idx}]' must be a [field, direction] pair of strings"
                )));
            };
            let direction = match direction.as_str() {
                "asc" => SortDirection::Asc,
                "desc" => SortDirection::Desc,
                other => {
                    return Err(ToolError::validation(format!(
                        "'order_by[{idx}]' direction must be 'asc' or 'desc', got '{other}'"
                    )));
                }
            };
            Ok((field.clone(), direction))
        })
        .collect()
}

fn parse_include(value: &Value) -> Result<IncludeOptions, ToolError> {
    let map = value
        .as_object()
        .ok_or_else(|| ToolError::validation("'include' must be an object"))?;
    let mut include = IncludeOptions::default();
    for (key, flag) in map {
        let slot = match key.as_str() {
            "imports" => &mut include.imports,
            "time_labels" => &mut include.time_labels,
            "total_rows" => &mut include.total_rows,
            other => {
                return Err(ToolError::validation(format!(
                    "'include.{other}' is not supported (allowed: imports, time_labels, total_rows)"
                )));
            }
        };
        *slot = Some(flag.as_bool().ok_or_else(|| {
            ToolError::validation(format!("'include.{key}' must be a boolean"))
        })?);
    }
    Ok(include)
}

fn parse_pagination(value: &Value) -> Result<Pagination, ToolError> {
    let map = value
        .as_object()
        .ok_or_else(|| ToolError::validation("'pagination' must be an object"))?;
    let mut pagination = Pagination::default();
    for (key, number) in map {
        let slot = match key.as_str() {
            "limit" => &mut pagination.limit,
            "offset" => &mut pagination.offset,
            other => {
                return Err(ToolError::validation(format!(
                    "'pagination.{other}' is not supported (allowed: limit, offset)"
                )));
            }
        };
        *slot = Some(integer(number).ok_or_else(|| {
            ToolError::validation(format!("'pagination.{key}' must be an integer"))
        })?);
    }
    Ok(pagination)
}

/// Any JSON number with no fractional part. Integral floats such as `100.0`
/// are sent as plain integers; unsigned values beyond `i64` pass through.
fn integer(value: &Value) -> Option<Number> {
    let Value::Number(number) = value else {
        return None;
    };
    if number.is_i64() || number.is_u64() {
        return Some(number.clone());
    }
    let float = number.as_f64()?;
    if !float.is_finite() || float.fract() != 0.0 {
        return None;
    }
    if float >= i64::MIN as f64 && float < i64::MAX as f64 {
        Some(Number::from(float as i64))
    } else {
        Some(number.clone())
    }
}
