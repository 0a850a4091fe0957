pub mod args;
pub mod filter;
pub mod schema;

pub use args::{DateInput, DateRange, QueryArgs, QueryPayload, SortDirection};
pub use filter::{FilterExpression, SimpleFilter, SimpleOperator};
pub use schema::{QUERY_TOOL_NAME, ToolDefinition, tool_definitions};
