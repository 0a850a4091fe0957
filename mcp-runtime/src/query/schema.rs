use serde_json::{Value, json};

use crate::query::filter::SimpleOperator;

pub const QUERY_TOOL_NAME: &str = "plausible_query";

#[derive(Debug)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

impl ToolDefinition {
    pub fn to_value(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "inputSchema": self.input_schema,
        })
    }
}

pub fn tool_definitions() -> Vec<ToolDefinition> {
    vec![query_tool()]
}

const METRICS_DESCRIPTION: &str = "Metrics to compute. Supported values: \
'visitors' (int) unique visitors | \
'visits' (int) visits/sessions | \
'pageviews' (int) pageview events | \
'views_per_visit' (float) pageviews divided by visits | \
'bounce_rate' (float) bounce rate percentage | \
'visit_duration' (int) visit duration in seconds | \
'events' (int) pageviews plus custom events; with a goal filter this is 'Total Conversions' | \
'scroll_depth' (int) page scroll depth averaged per session, requires an event:page filter or dimension | \
'time_on_page' (int) average seconds on a page per visit, requires an event:page filter or dimension | \
'percentage' (float) share of total visitors in the group, requires non-empty dimensions | \
'conversion_rate' (float) share of visitors who completed the goal, requires non-empty dimensions and an event:goal filter or dimension | \
'group_conversion_rate' (float) conversion rate within the same dimension group, requires non-empty dimensions and an event:goal filter or dimension | \
'average_revenue' (Revenue or null) average revenue per revenue goal conversion, requires revenue goals and an event:goal filter or dimension | \
'total_revenue' (Revenue or null) total revenue from revenue goal conversions, requires revenue goals and an event:goal filter or dimension.";

const DATE_RANGE_DESCRIPTION: &str = "Time window of the query. Either an explicit pair \
[\"2024-01-01\", \"2024-07-01\"] of ISO8601 dates, a pair of ISO8601 date-times such as \
[\"2024-01-01T12:00:00+02:00\", \"2024-01-01T15:59:59+02:00\"], or a named range: \
\"day\" (current day) | \"7d\" | \"28d\" | \"30d\" | \"91d\" (last N days relative to today) | \
\"month\" (since the start of this month) | \"6mo\" | \"12mo\" (last N months relative to the start of this month) | \
\"year\" (since the start of this year) | \"all\".";

fn query_tool() -> ToolDefinition {
    let simple_operators: Vec<&str> = SimpleOperator::ALL
        .into_iter()
        .map(SimpleOperator::as_str)
        .collect();

    ToolDefinition {
        name: QUERY_TOOL_NAME,
        description: "Query the Plausible Stats API. Provide site_id, metrics, and either date_range or date. Optional: dimensions, filters, order_by, include, pagination. date is shorthand for date_range [date, date].",
        input_schema: json!({
            "type": "object",
            "required": ["site_id", "metrics"],
            "anyOf": [
                { "required": ["date_range"] },
                { "required": ["date"] }
            ],
            "examples": [
                {
                    "site_id": "example.com",
                    "metrics": ["visitors", "pageviews"],
                    "date": "2024-07-01"
                },
                {
                    "site_id": "example.com",
                    "metrics": ["visitors"],
                    "date_range": ["2024-07-01", "2024-07-07"],
                    "dimensions": ["visit:country_name"],
                    "filters": [["is", "visit:country_name", ["Germany"]]],
                    "order_by": [["visitors", "desc"]],
                    "include": { "total_rows": true },
                    "pagination": { "limit": 100, "offset": 0 }
                }
            ],
            "definitions": {
                "filterExpression": {
                    "oneOf": [
                        { "$ref": "#/definitions/simpleFilter" },
                        { "$ref": "#/definitions/logicalFilter" }
                    ]
                },
                "simpleFilter": {
                    "type": "array",
                    "minItems": 3,
                    "maxItems": 4,
                    "items": [
                        { "type": "string", "enum": simple_operators },
                        { "type": "string" },
                        { "type": "array", "items": {} },
                        { "type": "object" }
                    ],
                    "additionalItems": false
                },
                "logicalFilter": {
                    "oneOf": [
                        {
                            "type": "array",
                            "minItems": 2,
                            "maxItems": 2,
                            "items": [
                                { "type": "string", "enum": ["and", "or"] },
                                {
                                    "type": "array",
                                    "minItems": 1,
                                    "items": { "$ref": "#/definitions/filterExpression" }
                                }
                            ],
                            "additionalItems": false
                        },
                        {
                            "type": "array",
                            "minItems": 2,
                            "maxItems": 2,
                            "items": [
                                { "type": "string", "enum": ["not"] },
                                { "$ref": "#/definitions/filterExpression" }
                            ],
                            "additionalItems": false
                        }
                    ]
                }
            },
            "properties": {
                "site_id": {
                    "type": "string",
                    "description": "Domain of the site to query, as registered in Plausible"
                },
                "metrics": {
                    "type": "array",
                    "items": { "type": "string" },
                    "minItems": 1,
                    "description": METRICS_DESCRIPTION
                },
                "date_range": {
                    "description": DATE_RANGE_DESCRIPTION,
                    "oneOf": [
                        { "type": "string" },
                        {
                            "type": "array",
                            "items": { "type": "string" },
                            "minItems": 2,
                            "maxItems": 2
                        }
                    ]
                },
                "date": {
                    "type": "string",
                    "description": "Single day shorthand (YYYY-MM-DD), sent as date_range [date, date]. Ignored when date_range is also set."
                },
                "dimensions": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Dimensions to group by (e.g. 'visit:country_name', 'event:page')"
                },
                "filters": {
                    "type": "array",
                    "items": { "$ref": "#/definitions/filterExpression" },
                    "description": "Filters in Plausible Stats API syntax. Operators: is, is_not, contains, not_contains, has_done, has_not_done, and, or, not. Example: [\"is\", \"visit:country_name\", [\"Germany\"]] or [\"and\", [[...], [...]]]."
                },
                "order_by": {
                    "type": "array",
                    "items": {
                        "type": "array",
                        "items": [
                            { "type": "string" },
                            { "type": "string", "enum": ["asc", "desc"] }
                        ],
                        "minItems": 2,
                        "maxItems": 2,
                        "additionalItems": false
                    },
                    "description": "Result ordering, e.g. [[\"visitors\", \"desc\"], [\"visit:country_name\", \"asc\"]]"
                },
                "include": {
                    "type": "object",
                    "properties": {
                        "imports": { "type": "boolean" },
                        "time_labels": { "type": "boolean" },
                        "total_rows": { "type": "boolean" }
                    },
                    "additionalProperties": false,
                    "description": "Extra response metadata: imports, time_labels, total_rows."
                },
                "pagination": {
                    "type": "object",
                    "properties": {
                        "limit": { "type": "integer" },
                        "offset": { "type": "integer" }
                    },
                    "additionalProperties": false,
                    "description": "Pagination window (limit and offset)."
                }
            }
        }),
    }
}
